/*!
    layout of frames exchanged on the line

    ```text
    [address: 1 or 2 bytes, little endian][payload: N bytes][checksum: 1 byte]
    ```

    the checksum covers every byte before it. Address width and checksum algorithm are fixed for a whole bus, they are gathered in [Format].
*/

use core::fmt;
use crate::checksum::ChecksumKind;


/// maximum size of a complete frame, address and checksum included
pub const MAX_FRAME: usize = 256;

/// node address on the bus, only the low byte is meaningful with [AddressWidth::One]
pub type Address = u16;
/// fixed capacity buffer holding one encoded frame
pub type Frame = heapless::Vec<u8, MAX_FRAME>;

/// number of bytes used for addresses on a bus
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    #[default]
    One,
    Two,
}
impl AddressWidth {
    pub const fn bytes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
    /// highest address representable
    pub const fn max(self) -> Address {
        match self {
            Self::One => u8::MAX as Address,
            Self::Two => Address::MAX,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketError {
    /// frame would not fit in the destination buffer
    TooLong,
    /// frame is shorter than an address and a checksum
    TooShort,
    /// address does not fit the bus address width
    InvalidAddress,
    /// trailing checksum does not match
    Checksum,
}
impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TooLong => "frame exceeds buffer capacity",
            Self::TooShort => "frame shorter than address and checksum",
            Self::InvalidAddress => "address does not fit address width",
            Self::Checksum => "frame checksum mismatch",
        })
    }
}
impl core::error::Error for PacketError {}

/// a decoded frame, borrowing its payload from the receive buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Packet<'d> {
    pub address: Address,
    pub payload: &'d [u8],
}

/// frame layout settings shared by every node of one bus
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Format {
    pub width: AddressWidth,
    pub checksum: ChecksumKind,
    /// address accepted by every slave
    pub broadcast: Address,
}
impl Default for Format {
    fn default() -> Self {
        Self::new(AddressWidth::default(), ChecksumKind::default())
    }
}
impl Format {
    /// format with the all-ones broadcast address of the given width
    pub const fn new(width: AddressWidth, checksum: ChecksumKind) -> Self {
        Self {width, checksum, broadcast: width.max()}
    }
    pub const fn with_broadcast(self, broadcast: Address) -> Self {
        Self {broadcast, .. self}
    }

    /// smallest valid frame: address and checksum with an empty payload
    pub const fn min_frame(&self) -> usize {
        self.width.bytes() + self.checksum.size()
    }
    /// size of a frame carrying `payload` bytes
    pub const fn frame_size(&self, payload: usize) -> usize {
        self.min_frame() + payload
    }
    pub fn is_broadcast(&self, address: Address) -> bool {
        address == self.broadcast
    }

    /// serialize a frame in `dst`, returning its size
    pub fn encode(&self, address: Address, payload: &[u8], dst: &mut [u8]) -> Result<usize, PacketError> {
        if address > self.width.max() {
            return Err(PacketError::InvalidAddress);
        }
        let size = self.frame_size(payload.len());
        if size > dst.len() {
            return Err(PacketError::TooLong);
        }
        let width = self.width.bytes();
        dst[.. width].copy_from_slice(&address.to_le_bytes()[.. width]);
        dst[width ..][.. payload.len()].copy_from_slice(payload);
        let (data, checksum) = dst[.. size].split_at_mut(width + payload.len());
        self.checksum.write(data, checksum);
        Ok(size)
    }
    /// serialize a frame in a new fixed capacity buffer
    pub fn build(&self, address: Address, payload: &[u8]) -> Result<Frame, PacketError> {
        let mut buffer = [0u8; MAX_FRAME];
        let size = self.encode(address, payload, &mut buffer)?;
        Frame::from_slice(&buffer[.. size]).map_err(|_| PacketError::TooLong)
    }
    /// leading address of a frame, without any other check
    pub fn address(&self, frame: &[u8]) -> Option<Address> {
        match (self.width, frame) {
            (AddressWidth::One, &[low, ..]) => Some(Address::from(low)),
            (AddressWidth::Two, &[low, high, ..]) => Some(Address::from_le_bytes([low, high])),
            _ => None,
        }
    }
    /// true if the frame is long enough and its trailing checksum matches
    pub fn verify(&self, frame: &[u8]) -> bool {
        frame.len() >= self.min_frame() && self.checksum.check(frame)
    }
    /// check and split a received frame
    pub fn decode<'d>(&self, frame: &'d [u8]) -> Result<Packet<'d>, PacketError> {
        if frame.len() < self.min_frame() {
            return Err(PacketError::TooShort);
        }
        if !self.checksum.check(frame) {
            return Err(PacketError::Checksum);
        }
        let address = self.address(frame).ok_or(PacketError::TooShort)?;
        let payload = &frame[self.width.bytes() .. frame.len() - self.checksum.size()];
        Ok(Packet {address, payload})
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_one_byte_address() {
        let format = Format::new(AddressWidth::One, ChecksumKind::Xor);
        let frame = format.build(0x05, &[0x01, 0x02]).unwrap();
        assert_eq!(frame.as_slice(), &[0x05, 0x01, 0x02, 0x06]);
        assert!(format.verify(&frame));
        assert!(!format.verify(&[0x05, 0x01, 0x02, 0x07]));

        let packet = format.decode(&frame).unwrap();
        assert_eq!(packet.address, 0x05);
        assert_eq!(packet.payload, &[0x01, 0x02]);
    }

    #[test]
    fn two_byte_address_is_little_endian() {
        let format = Format::new(AddressWidth::Two, ChecksumKind::Crc16);
        let frame = format.build(0x1234, &[0xaa]).unwrap();
        assert_eq!(frame.len(), 4);
        assert_eq!(format.min_frame(), 3);
        assert_eq!(&frame[.. 3], &[0x34, 0x12, 0xaa]);
        assert_eq!(format.address(&frame), Some(0x1234));
        assert_eq!(format.decode(&frame).unwrap().payload, &[0xaa]);
        assert_eq!(format.broadcast, 0xffff);
    }

    #[test]
    fn empty_payload_is_minimum_frame() {
        let format = Format::new(AddressWidth::One, ChecksumKind::Crc8);
        let frame = format.build(0x10, &[]).unwrap();
        assert_eq!(frame.len(), format.min_frame());
        assert_eq!(format.min_frame(), 2);
        assert!(format.decode(&frame).unwrap().payload.is_empty());
        assert_eq!(format.decode(&frame[.. 1]), Err(PacketError::TooShort));
    }

    #[test]
    fn rejects_invalid_frames() {
        let format = Format::new(AddressWidth::One, ChecksumKind::Crc8);
        assert_eq!(format.build(0x100, &[]), Err(PacketError::InvalidAddress));
        assert_eq!(format.build(0x01, &[0; MAX_FRAME]), Err(PacketError::TooLong));
        assert_eq!(format.encode(0x01, &[1, 2, 3], &mut [0; 4]), Err(PacketError::TooLong));

        let mut frame = format.build(0x01, &[1, 2, 3]).unwrap();
        frame[2] ^= 0x40;
        assert_eq!(format.decode(&frame), Err(PacketError::Checksum));
    }

    #[test]
    fn no_checksum() {
        let format = Format::new(AddressWidth::One, ChecksumKind::None)
            .with_broadcast(0);
        let frame = format.build(0x07, &[0x42]).unwrap();
        // the checksum byte is still there, only not checked
        assert_eq!(frame.as_slice(), &[0x07, 0x42, 0x00]);
        assert!(format.verify(&[0x07, 0x42, 0x5a]));
        assert!(format.is_broadcast(0));
        assert_eq!(format.min_frame(), 2);
    }
}
