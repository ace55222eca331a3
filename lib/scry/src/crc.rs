// 16-bit CCITT CRC (CRC-16/IBM-3740) over packet header and payload bytes.

use crc::{Crc, CRC_16_IBM_3740};

const CRC_CALC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC for a contiguous block of bytes.
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_CALC.checksum(data)
}

/// Compute the CRC over two discontiguous sections, header bytes first.
pub fn crc16_sections(head: &[u8], tail: &[u8]) -> u16 {
    let mut digest = CRC_CALC.digest();
    digest.update(head);
    digest.update(tail);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        // The standard check value for CRC-16/CCITT-FALSE over "123456789".
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc_sections_match_block() {
        let data = b"a larger block of packet bytes";
        let (head, tail) = data.split_at(7);
        assert_eq!(crc16_sections(head, tail), crc16(data));
    }

    #[test]
    fn test_crc_empty() {
        assert_eq!(crc16(&[]), 0xffff);
    }
}
