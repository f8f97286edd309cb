//! silence durations derived from the line baud rate

use core::time::Duration;

/// bit periods of silence delimiting frames: one start+8+stop character plus slack
pub const SETTLING_BITS: u32 = 15;

/// bit periods taken by one 8N1 character: start, 8 data and stop bits
pub const CHARACTER_BITS: u32 = 10;

/**
    time needed to transmit `bits` bit periods at `baud`, rounded up to the microsecond

    This is both the settling delay the master leaves between frames and the inter-byte silence after which slaves consider a frame complete, so master and slaves of a bus must agree on `bits`.
    A zero baud rate yields no gap.
*/
pub fn frame_gap(baud: u32, bits: u32) -> Duration {
    if baud == 0 {
        return Duration::ZERO;
    }
    let micros = (u64::from(bits) * 1_000_000).div_ceil(u64::from(baud));
    Duration::from_micros(micros)
}

/// time taken by `bytes` 8N1 characters to leave the wire at `baud`
pub fn transmission_time(baud: u32, bytes: usize) -> Duration {
    let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
    frame_gap(baud, bytes.saturating_mul(CHARACTER_BITS))
}
