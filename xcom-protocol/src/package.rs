//! Complete protocol package: header, service and checksums

use crate::checksum::ScomChecksum;
use crate::header::{FrameHeader, ResponseFlags, HEADER_SIZE, MAX_DATA_LENGTH};
use crate::service::{Service, ServiceFlags};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use xcom_core::{
    address, ErrorCode, ObjectType, PropertyId, ServiceId, XcomError, XcomResult,
};
use xcom_core::constants::MULTI_INFO_OBJECT_ID;
use xcom_core::datatypes::value_format::MULTI_INFO_ITEM_SIZE;

/// One protocol exchange unit
///
/// Checksums are not stored: they are computed by [`Package::encode`] and
/// verified by [`Package::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub frame_flags: u8,
    pub src_addr: u32,
    pub dst_addr: u32,
    pub service: Service,
}

impl Package {
    /// Build a request from this client to `dst_addr`
    pub fn request(
        dst_addr: u32,
        service_id: ServiceId,
        object_type: ObjectType,
        object_id: u32,
        property_id: u16,
        property_data: Bytes,
    ) -> Self {
        Self {
            frame_flags: 0,
            src_addr: address::SOURCE,
            dst_addr,
            service: Service {
                flags: ServiceFlags::request(),
                service_id,
                object_type,
                object_id,
                property_id,
                property_data,
            },
        }
    }

    /// Read the value of a user info
    pub fn read_info(dst_addr: u32, info_nr: u16) -> Self {
        Self::request(
            dst_addr,
            ServiceId::Read,
            ObjectType::Info,
            info_nr as u32,
            PropertyId::INFO_VALUE,
            Bytes::new(),
        )
    }

    /// Read a property of a parameter
    pub fn read_param(dst_addr: u32, param_nr: u16, property_id: u16) -> Self {
        Self::request(
            dst_addr,
            ServiceId::Read,
            ObjectType::Parameter,
            param_nr as u32,
            property_id,
            Bytes::new(),
        )
    }

    /// Write a property of a parameter
    pub fn write_param(dst_addr: u32, param_nr: u16, property_id: u16, data: Bytes) -> Self {
        Self::request(
            dst_addr,
            ServiceId::Write,
            ObjectType::Parameter,
            param_nr as u32,
            property_id,
            data,
        )
    }

    /// Read several infos in one exchange through the gateway
    pub fn read_multi_info(request_data: Bytes) -> Self {
        Self::request(
            address::RCC,
            ServiceId::Read,
            ObjectType::MultiInfo,
            MULTI_INFO_OBJECT_ID,
            PropertyId::MULTI_INFO,
            request_data,
        )
    }

    /// Read entry `index` of the gateway's message log
    pub fn read_message(index: u32) -> Self {
        Self::request(
            address::RCC,
            ServiceId::Read,
            ObjectType::Message,
            index,
            PropertyId::NONE,
            Bytes::new(),
        )
    }

    /// Read the GUID of a device
    pub fn read_guid(dst_addr: u32) -> Self {
        Self::request(
            dst_addr,
            ServiceId::Read,
            ObjectType::Guid,
            0,
            PropertyId::NONE,
            Bytes::new(),
        )
    }

    /// Build the successful response a device would send to this request
    pub fn response_with(&self, frame_flags: u8, property_data: Bytes) -> Self {
        Self {
            frame_flags,
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
            service: Service {
                flags: ServiceFlags::response(),
                property_data,
                ..self.service.clone()
            },
        }
    }

    /// Build the error response a device would send to this request
    pub fn error_response(&self, code: u16) -> Self {
        Self {
            frame_flags: 0,
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
            service: Service {
                flags: ServiceFlags::error_response(),
                property_data: Bytes::copy_from_slice(&code.to_le_bytes()),
                ..self.service.clone()
            },
        }
    }

    /// Encode the package into wire bytes
    pub fn encode(&self) -> XcomResult<Bytes> {
        let data_length = self.service.encoded_len();
        if data_length > MAX_DATA_LENGTH {
            return Err(XcomError::InvalidRequest(format!(
                "Service of {} bytes exceeds maximum frame data length {}",
                data_length, MAX_DATA_LENGTH
            )));
        }
        let header = FrameHeader {
            frame_flags: self.frame_flags,
            src_addr: self.src_addr,
            dst_addr: self.dst_addr,
            data_length: data_length as u16,
        };

        let mut buf = BytesMut::with_capacity(header.frame_size());
        buf.put_slice(&header.encode());
        self.service.encode_into(&mut buf);
        let checksum = ScomChecksum::compute(&buf[HEADER_SIZE..]);
        buf.put_slice(&checksum);
        Ok(buf.freeze())
    }

    /// Decode exactly one complete frame
    pub fn decode(frame: &[u8]) -> XcomResult<Self> {
        let header = FrameHeader::decode(frame)?;
        let frame_size = header.frame_size();
        if frame.len() != frame_size {
            return Err(XcomError::MalformedPackage(format!(
                "Frame announces {} bytes, got {}",
                frame_size,
                frame.len()
            )));
        }
        let data = &frame[HEADER_SIZE..frame_size - 2];
        ScomChecksum::verify(data, &frame[frame_size - 2..], "Data")?;
        let service = Service::decode(data)?;
        Ok(Self {
            frame_flags: header.frame_flags,
            src_addr: header.src_addr,
            dst_addr: header.dst_addr,
            service,
        })
    }

    pub fn is_response(&self) -> bool {
        self.service.flags.is_response()
    }

    pub fn is_error(&self) -> bool {
        self.service.flags.is_error()
    }

    /// Status flags of a response frame
    pub fn response_flags(&self) -> ResponseFlags {
        ResponseFlags(self.frame_flags)
    }

    /// Property data of the service
    pub fn data(&self) -> &Bytes {
        &self.service.property_data
    }

    /// Whether this package is the response to `request`
    ///
    /// It must come from the addressed device and echo the service,
    /// object and property of the request. Multi-info requests all share
    /// one object, so a successful multi-info response must also list the
    /// requested items in order.
    pub fn is_response_to(&self, request: &Package) -> bool {
        self.is_response()
            && self.src_addr == request.dst_addr
            && self.service.service_id == request.service.service_id
            && self.service.object_type == request.service.object_type
            && self.service.object_id == request.service.object_id
            && self.service.property_id == request.service.property_id
            && (self.service.object_type != ObjectType::MultiInfo
                || self.is_error()
                || self.echoes_multi_info_items(request))
    }

    fn echoes_multi_info_items(&self, request: &Package) -> bool {
        let requested = request.service.property_data.chunks_exact(3);
        let Some(answered) = self.service.property_data.get(8..) else {
            return false;
        };
        let answered = answered.chunks_exact(MULTI_INFO_ITEM_SIZE);
        requested.len() == answered.len()
            && requested
                .zip(answered)
                .all(|(req, rsp)| req[..3] == rsp[..3])
    }

    /// Error code of an error response
    pub fn error_code(&self) -> Option<u16> {
        if !self.is_error() {
            return None;
        }
        let data = &self.service.property_data;
        if data.len() >= 2 {
            Some(u16::from_le_bytes([data[0], data[1]]))
        } else {
            Some(0)
        }
    }

    /// Turn an error response into [`XcomError::ResponseIsError`]
    pub fn check_error(&self) -> XcomResult<()> {
        match self.error_code() {
            None => Ok(()),
            Some(code) => Err(XcomError::ResponseIsError {
                code,
                message: ErrorCode::describe(code),
            }),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {}->{} {:?} obj={} prop=0x{:04X} data={}B",
            if self.is_response() { "RSP" } else { "REQ" },
            self.service.service_id,
            self.src_addr,
            self.dst_addr,
            self.service.object_type,
            self.service.object_id,
            self.service.property_id,
            self.service.property_data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_encode_read_info() {
        let bytes = Package::read_info(101, 3023).encode().unwrap();
        assert_eq!(bytes.len(), 26);
        assert_eq!(&bytes[..14], &[
            0xAA, 0x00, 0x01, 0x00, 0x00, 0x00, 0x65, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x6F, 0x71
        ]);
        assert_eq!(&bytes[14..24], &[0x00, 0x01, 0x01, 0x00, 0xCF, 0x0B, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(&bytes[24..], &ScomChecksum::compute(&bytes[14..24]));
    }

    #[test]
    fn test_decode_response() {
        let request = Package::read_info(101, 3023);
        let response = request.response_with(0x20, Bytes::copy_from_slice(&1500.0f32.to_le_bytes()));
        let decoded = Package::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.is_response_to(&request));
        assert!(decoded.response_flags().datalog_supported());
        assert!(decoded.check_error().is_ok());
    }

    #[test]
    fn test_any_single_byte_flip_is_rejected() {
        let request = Package::write_param(101, 1107, PropertyId::UNSAVED_VALUE_QSP, Bytes::from_static(&[0, 0, 0x20, 0x41]));
        let bytes = request.encode().unwrap();
        let mut rng = rand::thread_rng();
        for index in 0..bytes.len() {
            let mut corrupted = bytes.to_vec();
            corrupted[index] ^= rng.gen_range(1..=255u8);
            assert!(
                Package::decode(&corrupted).is_err(),
                "flip at {} was accepted",
                index
            );
        }
    }

    #[test]
    fn test_correlation() {
        let request = Package::read_info(101, 3023);
        let other_device = Package::read_info(102, 3023).response_with(0, Bytes::new());
        let other_info = Package::read_info(101, 3024).response_with(0, Bytes::new());
        assert!(!other_device.is_response_to(&request));
        assert!(!other_info.is_response_to(&request));
        assert!(!request.is_response_to(&request));
    }

    #[test]
    fn test_multi_info_correlation_checks_items() {
        // 3000/MASTER, 3023/SUM
        let request = Package::read_multi_info(Bytes::from_static(&[0xB8, 0x0B, 0x00, 0xCF, 0x0B, 0xFE]));
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&[0xB8, 0x0B, 0x00, 0, 0, 0x40, 0x42]);
        data.extend_from_slice(&[0xCF, 0x0B, 0xFE, 0, 0, 0x80, 0x3F]);
        let response = request.response_with(0, Bytes::from(data));
        assert!(response.is_response_to(&request));

        let other = Package::read_multi_info(Bytes::from_static(&[0xB8, 0x0B, 0x00]));
        assert!(!response.is_response_to(&other));
        assert!(other.error_response(0x0013).is_response_to(&other));
    }

    #[test]
    fn test_error_response() {
        let request = Package::read_param(101, 9999, PropertyId::VALUE_QSP);
        let response = request.error_response(0x0022);
        let decoded = Package::decode(&response.encode().unwrap()).unwrap();
        assert!(decoded.is_response_to(&request));
        assert_eq!(decoded.error_code(), Some(0x0022));
        let err = decoded.check_error().unwrap_err();
        assert_eq!(err.response_code(), Some(0x0022));
        assert!(err.to_string().contains("OBJECT_ID_NOT_FOUND"));
    }

    #[test]
    fn test_oversized_request_rejected() {
        let data = Bytes::from(vec![0u8; MAX_DATA_LENGTH]);
        assert!(Package::read_multi_info(data).encode().is_err());
    }
}
