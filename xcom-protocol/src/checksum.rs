//! SCOM checksum calculation
//!
//! A two byte Fletcher-style sum: `A` starts at 0xFF, `B` at 0, and for each
//! byte `A += byte; B += A` (both modulo 256). The checksum is `[A, B]`.

use xcom_core::{XcomError, XcomResult};

const INITIAL_A: u8 = 0xFF;
const INITIAL_B: u8 = 0x00;

/// Checksum calculator
#[derive(Debug, Clone, Copy)]
pub struct ScomChecksum {
    a: u8,
    b: u8,
}

impl ScomChecksum {
    /// Create a new checksum calculator
    pub fn new() -> Self {
        Self {
            a: INITIAL_A,
            b: INITIAL_B,
        }
    }

    /// Reset to the initial state
    pub fn reset(&mut self) {
        self.a = INITIAL_A;
        self.b = INITIAL_B;
    }

    /// Update with a single byte
    pub fn update(&mut self, byte: u8) {
        self.a = self.a.wrapping_add(byte);
        self.b = self.b.wrapping_add(self.a);
    }

    /// Update with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Checksum bytes in wire order
    pub fn value_bytes(&self) -> [u8; 2] {
        [self.a, self.b]
    }

    /// Compute the checksum of `data` in one go
    pub fn compute(data: &[u8]) -> [u8; 2] {
        let mut calc = Self::new();
        calc.update_bytes(data);
        calc.value_bytes()
    }

    /// Verify `data` against the checksum bytes that followed it on the wire
    pub fn verify(data: &[u8], expected: &[u8], what: &str) -> XcomResult<()> {
        let actual = Self::compute(data);
        if expected != actual {
            return Err(XcomError::MalformedPackage(format!(
                "{} checksum mismatch: got {:02X?}, expected {:02X?}",
                what, expected, actual
            )));
        }
        Ok(())
    }
}

impl Default for ScomChecksum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(ScomChecksum::compute(&[]), [0xFF, 0x00]);
    }

    #[test]
    fn test_known_values() {
        // A: 0xFF+1=0x00, 0x00+2=0x02; B: 0x00, 0x02
        assert_eq!(ScomChecksum::compute(&[0x01, 0x02]), [0x02, 0x02]);
        // Header of a read request from 1 to 101 with 10 data bytes
        let header = [
            0x00, 0x01, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00, 0x00, 0x0A, 0x00,
        ];
        let mut calc = ScomChecksum::new();
        for b in header {
            calc.update(b);
        }
        assert_eq!(calc.value_bytes(), ScomChecksum::compute(&header));
        assert_eq!(ScomChecksum::compute(&header), [0x6F, 0x71]);
    }

    #[test]
    fn test_verify() {
        let data = [0x10, 0x20, 0x30];
        let sum = ScomChecksum::compute(&data);
        assert!(ScomChecksum::verify(&data, &sum, "data").is_ok());
        assert!(ScomChecksum::verify(&data, &[sum[0], sum[1] ^ 1], "data").is_err());
    }
}
