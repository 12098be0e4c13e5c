//! Two's-complement checksums used by PN532 frames.

/// Length checksum: `LEN + LCS == 0 (mod 256)`.
pub fn lcs(len: u8) -> u8 {
    0u8.wrapping_sub(len)
}

/// Wrapping sum of all bytes.
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Data checksum over TFI, command and data: `sum + DCS == 0 (mod 256)`.
pub fn dcs(body: &[u8]) -> u8 {
    0u8.wrapping_sub(sum(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcs() {
        assert_eq!(lcs(0x02), 0xFE);
        assert_eq!(lcs(0x00), 0x00);
        assert_eq!(lcs(0xFF), 0x01);
    }

    #[test]
    fn test_dcs() {
        assert_eq!(dcs(&[0xD4, 0x02]), 0x2A);
        assert_eq!(dcs(&[]), 0x00);
        assert_eq!(sum(&[0xD4, 0x02, 0x2A]), 0x00);
    }
}
