/*!
    integrity algorithms applied to the bytes of a frame preceding its checksum

    all functions here are total: any span, including an empty one, has a checksum.
    On the wire every frame ends with exactly one checksum byte, see [ChecksumKind::byte].
*/

use crc::{Crc, CRC_8_I_CODE, CRC_16_MCRF4XX};


/// CRC-8/I-CODE: poly 0x1d, seed 0xfd, not reflected
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_I_CODE);
/// CRC-16/MCRF4XX: poly 0x1021, seed 0xffff, reflected in and out
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// algorithm producing the trailing checksum of frames, fixed for a whole bus
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    /// checksum byte always zero and never checked
    None,
    /// bitwise xor of all bytes
    #[default]
    Xor,
    /// CRC-8/I-CODE
    Crc8,
    /// CRC-16/MCRF4XX, only its low byte is transmitted
    Crc16,
}

impl ChecksumKind {
    /// number of checksum bytes appended to a frame, the same for every algorithm
    pub const fn size(self) -> usize {
        1
    }
    /// checksum of the given bytes, widened to 16 bits
    pub fn calculate(self, data: &[u8]) -> u16 {
        match self {
            Self::None => 0,
            Self::Xor => u16::from(xor(data)),
            Self::Crc8 => u16::from(crc8(data)),
            Self::Crc16 => crc16(data),
        }
    }
    /// true if `checksum` is the checksum of `data`
    pub fn verify(self, data: &[u8], checksum: u16) -> bool {
        self.calculate(data) == checksum
    }
    /// checksum byte transmitted after `data`: the low byte of [Self::calculate]
    pub fn byte(self, data: &[u8]) -> u8 {
        self.calculate(data).to_le_bytes()[0]
    }
    /**
        write the checksum byte of `data` in `dst`

        `dst` must be exactly [Self::size] bytes long
    */
    pub fn write(self, data: &[u8], dst: &mut [u8]) {
        dst.copy_from_slice(&[self.byte(data)]);
    }
    /// read a checksum byte serialized by [Self::write]
    pub fn read(self, src: &[u8]) -> Option<u8> {
        match src {
            &[checksum] => Some(checksum),
            _ => None,
        }
    }
    /// check the trailing checksum byte of a complete frame
    pub fn check(self, frame: &[u8]) -> bool {
        let Some((&checksum, data)) = frame.split_last()
            else {return false};
        self == Self::None || checksum == self.byte(data)
    }
}

/**
    bitwise xor of all bytes

    a single flipped bit is always detected, but two flips in the same bit position of different bytes cancel out
*/
pub fn xor(data: &[u8]) -> u8 {
    data.iter().fold(0, |checksum, byte| checksum ^ byte)
}
/// table driven CRC-8/I-CODE
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
/// table driven CRC-16/MCRF4XX
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}


#[cfg(test)]
mod tests {
    use super::*;

    const CHECK: &[u8] = b"123456789";
    const KINDS: [ChecksumKind; 3] = [ChecksumKind::Xor, ChecksumKind::Crc8, ChecksumKind::Crc16];

    #[test]
    fn catalog_check_values() {
        assert_eq!(crc8(CHECK), 0x7e);
        assert_eq!(crc16(CHECK), 0x6f91);
        assert_eq!(xor(CHECK), 0x31);
    }

    #[test]
    fn empty_spans() {
        assert_eq!(xor(&[]), 0);
        assert_eq!(crc8(&[]), 0xfd);
        assert_eq!(crc16(&[]), 0xffff);
        for kind in KINDS {
            assert!(kind.verify(&[], kind.calculate(&[])));
        }
    }

    #[test]
    fn xor_scenario() {
        let frame = [0x05, 0x01, 0x02, 0x06];
        assert_eq!(ChecksumKind::Xor.calculate(&frame[.. 3]), 0x06);
        assert!(ChecksumKind::Xor.check(&frame));
        assert!(!ChecksumKind::Xor.verify(&frame[.. 3], 0x07));
        assert!(!ChecksumKind::Xor.check(&[0x05, 0x01, 0x02, 0x07]));
    }

    #[test]
    fn single_bit_corruption_detected() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x00, 0xff];
        for kind in KINDS {
            let checksum = kind.calculate(&data);
            for bit in 0 .. data.len() * 8 {
                let mut corrupted = data;
                corrupted[bit / 8] ^= 1 << (bit % 8);
                assert!(!kind.verify(&corrupted, checksum), "{:?} missed bit {}", kind, bit);
            }
        }
    }

    #[test]
    fn xor_double_flip_cancels() {
        // documented weakness: same bit flipped in two bytes goes unnoticed
        let data = [0x10, 0x20, 0x30];
        let checksum = ChecksumKind::Xor.calculate(&data);
        assert!(ChecksumKind::Xor.verify(&[0x11, 0x21, 0x30], checksum));
        assert!(!ChecksumKind::Crc8.verify(&[0x11, 0x21, 0x30], ChecksumKind::Crc8.calculate(&data)));
    }

    #[test]
    fn serialized_width() {
        let data = [0xaa, 0x55];
        for kind in [ChecksumKind::None, ChecksumKind::Xor, ChecksumKind::Crc8, ChecksumKind::Crc16] {
            assert_eq!(kind.size(), 1);
            let mut frame = [0u8; 3];
            frame[.. 2].copy_from_slice(&data);
            kind.write(&data, &mut frame[2 ..]);
            assert!(kind.check(&frame), "{:?}", kind);
            assert_eq!(kind.read(&frame[2 ..]), Some(kind.byte(&data)));
        }
        assert_eq!(ChecksumKind::None.byte(&data), 0);
        assert_eq!(ChecksumKind::Crc16.read(&[1, 2]), None);
        assert!(!ChecksumKind::Crc16.check(&[]));
        assert!(!ChecksumKind::None.check(&[]));
        assert!(ChecksumKind::None.check(&[0xaa, 0x55, 0x12]));
    }

    #[test]
    fn crc16_low_byte_on_wire() {
        let crc = crc16(CHECK);
        assert_eq!(ChecksumKind::Crc16.byte(CHECK), 0x91);
        assert_eq!(ChecksumKind::Crc16.byte(CHECK), crc.to_le_bytes()[0]);

        let mut frame = [0u8; 10];
        frame[.. 9].copy_from_slice(CHECK);
        ChecksumKind::Crc16.write(CHECK, &mut frame[9 ..]);
        assert_eq!(frame[9], 0x91);
        assert!(ChecksumKind::Crc16.check(&frame));
        frame[9] = 0x6f;
        assert!(!ChecksumKind::Crc16.check(&frame));
    }
}
