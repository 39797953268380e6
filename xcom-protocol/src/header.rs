//! Frame header and response status flags

use crate::checksum::ScomChecksum;
use xcom_core::{XcomError, XcomResult};

/// Start byte of every frame
pub const START_BYTE: u8 = 0xAA;

/// Bytes covered by the header checksum (flags, addresses, data length)
pub const HEADER_BODY_SIZE: usize = 11;

/// Start byte + header body + header checksum
pub const HEADER_SIZE: usize = 1 + HEADER_BODY_SIZE + 2;

/// Largest `data_length` accepted when decoding
pub const MAX_DATA_LENGTH: usize = 1024;

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_flags: u8,
    pub src_addr: u32,
    pub dst_addr: u32,
    pub data_length: u16,
}

impl FrameHeader {
    /// Encode start byte, header body and header checksum
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = START_BYTE;
        out[1] = self.frame_flags;
        out[2..6].copy_from_slice(&self.src_addr.to_le_bytes());
        out[6..10].copy_from_slice(&self.dst_addr.to_le_bytes());
        out[10..12].copy_from_slice(&self.data_length.to_le_bytes());
        let checksum = ScomChecksum::compute(&out[1..12]);
        out[12..14].copy_from_slice(&checksum);
        out
    }

    /// Decode and validate a header
    ///
    /// `data` must start with the start byte and hold at least
    /// [`HEADER_SIZE`] bytes.
    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(XcomError::MalformedPackage(format!(
                "Header needs {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }
        if data[0] != START_BYTE {
            return Err(XcomError::MalformedPackage(format!(
                "Expected start byte 0xAA, got 0x{:02X}",
                data[0]
            )));
        }
        ScomChecksum::verify(&data[1..12], &data[12..14], "Header")?;

        let header = Self {
            frame_flags: data[1],
            src_addr: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            dst_addr: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
            data_length: u16::from_le_bytes([data[10], data[11]]),
        };
        if header.data_length as usize > MAX_DATA_LENGTH {
            return Err(XcomError::MalformedPackage(format!(
                "Declared data length {} exceeds maximum {}",
                header.data_length, MAX_DATA_LENGTH
            )));
        }
        Ok(header)
    }

    /// Size of the whole frame this header announces
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.data_length as usize + 2
    }
}

/// Status bits reported by the gateway in the `frame_flags` of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseFlags(pub u8);

impl ResponseFlags {
    const MESSAGES_PENDING: u8 = 0x01;
    const RESTARTED: u8 = 0x02;
    const SD_CARD_PRESENT: u8 = 0x04;
    const SD_CARD_FULL: u8 = 0x08;
    const NEW_DATALOG: u8 = 0x10;
    const DATALOG_SUPPORTED: u8 = 0x20;

    /// Unread device messages are waiting
    pub fn messages_pending(&self) -> bool {
        self.0 & Self::MESSAGES_PENDING != 0
    }

    /// The gateway restarted since the previous response
    pub fn restarted(&self) -> bool {
        self.0 & Self::RESTARTED != 0
    }

    pub fn sd_card_present(&self) -> bool {
        self.0 & Self::SD_CARD_PRESENT != 0
    }

    pub fn sd_card_full(&self) -> bool {
        self.0 & Self::SD_CARD_FULL != 0
    }

    pub fn new_datalog(&self) -> bool {
        self.0 & Self::NEW_DATALOG != 0
    }

    pub fn datalog_supported(&self) -> bool {
        self.0 & Self::DATALOG_SUPPORTED != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader {
            frame_flags: 0,
            src_addr: 1,
            dst_addr: 101,
            data_length: 10,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = header().encode();
        assert_eq!(
            bytes,
            [
                0xAA, 0x00, 0x01, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x6F, 0x71
            ]
        );
        assert_eq!(FrameHeader::decode(&bytes).unwrap(), header());
        assert_eq!(header().frame_size(), 26);
    }

    #[test]
    fn test_header_rejects_bad_checksum_and_length() {
        let mut bytes = header().encode();
        bytes[6] ^= 0x01;
        assert!(FrameHeader::decode(&bytes).is_err());

        let too_long = FrameHeader {
            data_length: (MAX_DATA_LENGTH + 1) as u16,
            ..header()
        };
        assert!(FrameHeader::decode(&too_long.encode()).is_err());
    }

    #[test]
    fn test_response_flags() {
        let flags = ResponseFlags(0x25);
        assert!(flags.messages_pending());
        assert!(!flags.restarted());
        assert!(flags.sd_card_present());
        assert!(flags.datalog_supported());
        assert!(!flags.new_datalog());
    }
}
