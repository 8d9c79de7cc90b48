/// CRC-16/CCITT-XModem over the block payload, as sent big-endian in the
/// two trailing bytes of a CRC mode block.
pub fn get_crc16(data: &[u8]) -> u16 {
    crc16::State::<crc16::XMODEM>::calculate(data)
}

/// 8-bit additive checksum used by XModem-Checksum.
pub fn get_checksum(block: &[u8]) -> u8 {
    block.iter().fold(0, |x, &y| x.wrapping_add(y))
}

#[cfg(test)]
mod tests {
    use super::{get_checksum, get_crc16};

    #[test]
    fn test_crc16_xmodem_vector() {
        assert_eq!(0x31C3, get_crc16(b"123456789"));
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(0, get_crc16(&[]));
    }

    #[test]
    fn test_checksum() {
        assert_eq!(0, get_checksum(&[]));
        assert_eq!(6, get_checksum(&[1, 2, 3]));
        // wraps mod 256
        assert_eq!(1, get_checksum(&[0xFF, 0x02]));
        assert_eq!(0x80, get_checksum(&[0x55; 128]));
    }
}
