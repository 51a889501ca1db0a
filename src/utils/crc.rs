/// CRC32 used by Ogg page headers
/// Polynomial: x32 + x26 + x23 + x22 + x16 + x12 + x11 + x10 + x8 + x7 + x5 + x4 + x2 + x + 1
/// Initial value: 0, no reflection, no final xor

const CRC32_POLY: u32 = 0x04C11DB7;

/// Ogg page CRC32 calculator
///
/// Same polynomial as the MPEG-2 CRC but starting from zero. The checksum of a
/// page is computed over the header, with its CRC field set to zero, followed
/// by the body.
pub struct OggCrc {
    /// Lookup table for fast CRC calculation
    table: [u32; 256],
}

impl OggCrc {
    /// Creates a new CRC32 calculator with pre-computed lookup table
    pub fn new() -> Self {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if (crc & 0x80000000) != 0 {
                    (crc << 1) ^ CRC32_POLY
                } else {
                    crc << 1
                };
            }
            *entry = crc;
        }
        Self { table }
    }

    /// Continues a running checksum over `data`
    ///
    /// # Arguments
    ///
    /// * `crc` - Checksum of the bytes seen so far, 0 to start
    /// * `data` - Next bytes
    pub fn update(&self, crc: u32, data: &[u8]) -> u32 {
        data.iter().fold(crc, |crc, &byte| {
            let index = ((crc >> 24) ^ (byte as u32)) & 0xFF;
            (crc << 8) ^ self.table[index as usize]
        })
    }

    /// Calculates the checksum of `data`
    ///
    /// # Examples
    ///
    /// ```
    /// use encmux::utils::OggCrc;
    ///
    /// let crc = OggCrc::new();
    /// assert_eq!(crc.calculate(b"123456789"), 0x89A1897F);
    /// ```
    pub fn calculate(&self, data: &[u8]) -> u32 {
        self.update(0, data)
    }
}

impl Default for OggCrc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_check_value() {
        let crc = OggCrc::new();
        assert_eq!(crc.calculate(b""), 0);
        assert_eq!(crc.calculate(b"123456789"), 0x89A1897F);
    }

    #[quickcheck]
    fn prop_update_is_incremental(head: Vec<u8>, tail: Vec<u8>) -> bool {
        let crc = OggCrc::new();
        let mut whole = head.clone();
        whole.extend_from_slice(&tail);
        crc.update(crc.calculate(&head), &tail) == crc.calculate(&whole)
    }
}
