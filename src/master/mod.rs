/*!
    asynchronous bus master in `std` environment

    The central resource is the [Bus] struct, which owns the line and serializes every exchange on it. It performs exactly one physical attempt per call.

    access levels:

    - [Bus::transceive] sends a raw frame and waits for a raw response frame, with settling delays and checksum validation
    - [Bus::lock] gives a [Line] holding the bus for several exchanges
    - [Device] is a lightweight reference to [Bus] for one node, adding frame building, retries and an error budget
*/

/// implementation of the bus exchanges, this is the timing sensitive part of the code
mod networking;
/// per-node retry and error budget policy
mod device;
/// transmission counters and degraded bus reporting
mod statistics;
/// serial port transport
mod serial;


pub use networking::*;
pub use device::*;
pub use statistics::*;
pub use serial::*;

use thiserror::Error;

/// error regarding bus communication, `E` is the transport error
#[derive(Error, Debug)]
pub enum Error<E> {
    #[error("problem with uart bus: {0:?}")]
    Bus(E),
    #[error("no complete response arrived in expected time")]
    Timeout,
    #[error("response checksum mismatch")]
    Checksum,
    #[error("response from unexpected address")]
    Address,
    #[error("device exceeded its error budget")]
    Dysfunctional,
    #[error("problem detected on master side: {0}")]
    Master(&'static str),
}
impl<E> Error<E> {
    /// whether another attempt of the same exchange may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Dysfunctional | Self::Master(_))
    }
}
