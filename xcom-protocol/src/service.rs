//! Service part of a frame (the checksummed `frame_data`)

use bytes::{BufMut, Bytes, BytesMut};
use xcom_core::{ObjectType, ServiceId, XcomError, XcomResult};

/// Fixed part of the service: flags, id, object type, object id, property id
pub const SERVICE_HEADER_SIZE: usize = 10;

/// Service flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceFlags(pub u8);

impl ServiceFlags {
    pub const ERROR: u8 = 0x01;
    pub const RESPONSE: u8 = 0x02;

    pub fn request() -> Self {
        Self(0)
    }

    pub fn response() -> Self {
        Self(Self::RESPONSE)
    }

    pub fn error_response() -> Self {
        Self(Self::RESPONSE | Self::ERROR)
    }

    pub fn is_response(&self) -> bool {
        self.0 & Self::RESPONSE != 0
    }

    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR != 0
    }
}

/// Addressed service with its property data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub flags: ServiceFlags,
    pub service_id: ServiceId,
    pub object_type: ObjectType,
    pub object_id: u32,
    pub property_id: u16,
    pub property_data: Bytes,
}

impl Service {
    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        SERVICE_HEADER_SIZE + self.property_data.len()
    }

    /// Append the encoded service to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.flags.0);
        buf.put_u8(self.service_id.to_u8());
        buf.put_u16_le(self.object_type.to_u16());
        buf.put_u32_le(self.object_id);
        buf.put_u16_le(self.property_id);
        buf.put_slice(&self.property_data);
    }

    /// Decode a service from the complete `frame_data`
    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        if data.len() < SERVICE_HEADER_SIZE {
            return Err(XcomError::MalformedPackage(format!(
                "Service needs at least {} bytes, got {}",
                SERVICE_HEADER_SIZE,
                data.len()
            )));
        }
        Ok(Self {
            flags: ServiceFlags(data[0]),
            service_id: ServiceId::from_u8(data[1])?,
            object_type: ObjectType::from_u16(u16::from_le_bytes([data[2], data[3]])),
            object_id: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            property_id: u16::from_le_bytes([data[8], data[9]]),
            property_data: Bytes::copy_from_slice(&data[SERVICE_HEADER_SIZE..]),
        })
    }
}
