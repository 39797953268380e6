//! Fixed constants of the SCOM protocol
//!
//! All multi-byte fields on the wire are little-endian.

use crate::error::{XcomError, XcomResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well known device addresses
pub mod address {
    /// Broadcast to every device on the bus
    pub const BROADCAST: u32 = 0;
    /// Address used by this client as the source of every request
    pub const SOURCE: u32 = 1;
    /// Xtender multicast group
    pub const XT_GROUP: u32 = 100;
    /// Remote control / Xcom gateway
    pub const RCC: u32 = 501;
    /// Battery status processor
    pub const BSP: u32 = 601;
    /// Xcom-CAN battery management system (same slot as BSP)
    pub const BMS: u32 = 601;
    /// VarioTrack multicast group
    pub const VT_GROUP: u32 = 300;
    /// VarioString multicast group
    pub const VS_GROUP: u32 = 700;
}

/// Service identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    Read,
    Write,
}

impl ServiceId {
    pub fn to_u8(self) -> u8 {
        match self {
            ServiceId::Read => 0x01,
            ServiceId::Write => 0x02,
        }
    }

    pub fn from_u8(value: u8) -> XcomResult<Self> {
        match value {
            0x01 => Ok(ServiceId::Read),
            0x02 => Ok(ServiceId::Write),
            other => Err(XcomError::MalformedPackage(format!(
                "Unknown service id 0x{:02X}",
                other
            ))),
        }
    }
}

/// Object types addressed by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Info,
    Parameter,
    Message,
    Guid,
    DatalogField,
    MultiInfo,
    Other(u16),
}

impl ObjectType {
    pub fn to_u16(self) -> u16 {
        match self {
            ObjectType::Info => 0x0001,
            ObjectType::Parameter => 0x0002,
            ObjectType::Message => 0x0003,
            ObjectType::Guid => 0x0004,
            ObjectType::DatalogField => 0x0005,
            ObjectType::MultiInfo => 0x000A,
            ObjectType::Other(v) => v,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => ObjectType::Info,
            0x0002 => ObjectType::Parameter,
            0x0003 => ObjectType::Message,
            0x0004 => ObjectType::Guid,
            0x0005 => ObjectType::DatalogField,
            0x000A => ObjectType::MultiInfo,
            other => ObjectType::Other(other),
        }
    }
}

/// Property identifiers
pub struct PropertyId;

impl PropertyId {
    /// Value of a user info
    pub const INFO_VALUE: u16 = 0x0001;
    /// Value of a parameter as stored in flash
    pub const VALUE_QSP: u16 = 0x0005;
    pub const MIN_QSP: u16 = 0x0006;
    pub const MAX_QSP: u16 = 0x0007;
    pub const LEVEL_QSP: u16 = 0x0008;
    /// Value of a parameter in RAM only; lost on restart
    pub const UNSAVED_VALUE_QSP: u16 = 0x000D;
    /// Property used by message and GUID objects
    pub const NONE: u16 = 0x0000;
    /// Property of the multi-info object
    pub const MULTI_INFO: u16 = 0x0001;
}

/// Object id of the multi-info object
pub const MULTI_INFO_OBJECT_ID: u32 = 0x0000_0001;

/// Error codes carried by error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidFrame = 0x0001,
    DeviceNotFound = 0x0002,
    ResponseTimeout = 0x0003,
    ServiceNotSupported = 0x0011,
    InvalidServiceArgument = 0x0012,
    GatewayBusy = 0x0013,
    TypeNotSupported = 0x0021,
    ObjectIdNotFound = 0x0022,
    PropertyNotSupported = 0x0023,
    InvalidDataLength = 0x0024,
    PropertyIsReadOnly = 0x0025,
    InvalidData = 0x0026,
    DataTooSmall = 0x0027,
    DataTooBig = 0x0028,
    WritePropertyFailed = 0x0029,
    ReadPropertyFailed = 0x002A,
    AccessDenied = 0x002B,
    ObjectNotSupported = 0x002C,
    MulticastReadNotSupported = 0x002D,
    ObjectPropertyInvalid = 0x002E,
    FileOrDirNotPresent = 0x002F,
    FileCorrupted = 0x0030,
    InvalidShellArg = 0x0081,
}

impl ErrorCode {
    const ALL: [ErrorCode; 23] = [
        ErrorCode::InvalidFrame,
        ErrorCode::DeviceNotFound,
        ErrorCode::ResponseTimeout,
        ErrorCode::ServiceNotSupported,
        ErrorCode::InvalidServiceArgument,
        ErrorCode::GatewayBusy,
        ErrorCode::TypeNotSupported,
        ErrorCode::ObjectIdNotFound,
        ErrorCode::PropertyNotSupported,
        ErrorCode::InvalidDataLength,
        ErrorCode::PropertyIsReadOnly,
        ErrorCode::InvalidData,
        ErrorCode::DataTooSmall,
        ErrorCode::DataTooBig,
        ErrorCode::WritePropertyFailed,
        ErrorCode::ReadPropertyFailed,
        ErrorCode::AccessDenied,
        ErrorCode::ObjectNotSupported,
        ErrorCode::MulticastReadNotSupported,
        ErrorCode::ObjectPropertyInvalid,
        ErrorCode::FileOrDirNotPresent,
        ErrorCode::FileCorrupted,
        ErrorCode::InvalidShellArg,
    ];

    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u16 == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidFrame => "INVALID_FRAME",
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::ResponseTimeout => "RESPONSE_TIMEOUT",
            ErrorCode::ServiceNotSupported => "SERVICE_NOT_SUPPORTED",
            ErrorCode::InvalidServiceArgument => "INVALID_SERVICE_ARGUMENT",
            ErrorCode::GatewayBusy => "GATEWAY_BUSY",
            ErrorCode::TypeNotSupported => "TYPE_NOT_SUPPORTED",
            ErrorCode::ObjectIdNotFound => "OBJECT_ID_NOT_FOUND",
            ErrorCode::PropertyNotSupported => "PROPERTY_NOT_SUPPORTED",
            ErrorCode::InvalidDataLength => "INVALID_DATA_LENGTH",
            ErrorCode::PropertyIsReadOnly => "PROPERTY_IS_READ_ONLY",
            ErrorCode::InvalidData => "INVALID_DATA",
            ErrorCode::DataTooSmall => "DATA_TOO_SMALL",
            ErrorCode::DataTooBig => "DATA_TOO_BIG",
            ErrorCode::WritePropertyFailed => "WRITE_PROPERTY_FAILED",
            ErrorCode::ReadPropertyFailed => "READ_PROPERTY_FAILED",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::ObjectNotSupported => "OBJECT_NOT_SUPPORTED",
            ErrorCode::MulticastReadNotSupported => "MULTICAST_READ_NOT_SUPPORTED",
            ErrorCode::ObjectPropertyInvalid => "OBJECT_PROPERTY_INVALID",
            ErrorCode::FileOrDirNotPresent => "FILE_OR_DIR_NOT_PRESENT",
            ErrorCode::FileCorrupted => "FILE_CORRUPTED",
            ErrorCode::InvalidShellArg => "INVALID_SHELL_ARG",
        }
    }

    /// Human readable name of a raw error code, including unknown ones
    pub fn describe(code: u16) -> String {
        match Self::from_u16(code) {
            Some(known) => known.as_str().to_string(),
            None => format!("UNKNOWN_ERROR_0x{:04X}", code),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server side reduction applied to an info in a multi-info request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    /// Value of the master device of the family
    Master,
    /// Value of the n-th device of the family (1 to 15)
    Device(u8),
    Average,
    Sum,
}

impl AggregationType {
    pub const MAX_DEVICE: u8 = 15;

    /// Wire code
    ///
    /// # Errors
    /// `InvalidRequest` for a device index outside 1..=15, which would
    /// otherwise collide with another code on the wire.
    pub fn to_u8(self) -> XcomResult<u8> {
        match self {
            AggregationType::Master => Ok(0x00),
            AggregationType::Device(n) => AggregationType::device(n).map(|_| n),
            AggregationType::Average => Ok(0xFD),
            AggregationType::Sum => Ok(0xFE),
        }
    }

    pub fn from_u8(value: u8) -> XcomResult<Self> {
        match value {
            0x00 => Ok(AggregationType::Master),
            n @ 1..=Self::MAX_DEVICE => Ok(AggregationType::Device(n)),
            0xFD => Ok(AggregationType::Average),
            0xFE => Ok(AggregationType::Sum),
            other => Err(XcomError::MalformedValue(format!(
                "Unknown aggregation type 0x{:02X}",
                other
            ))),
        }
    }

    /// Build a per-device aggregation, validating the device index
    pub fn device(index: u8) -> XcomResult<Self> {
        if (1..=Self::MAX_DEVICE).contains(&index) {
            Ok(AggregationType::Device(index))
        } else {
            Err(XcomError::InvalidRequest(format!(
                "Aggregation device index {} outside 1..={}",
                index,
                Self::MAX_DEVICE
            )))
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationType::Master => f.write_str("MASTER"),
            AggregationType::Device(n) => write!(f, "DEVICE{}", n),
            AggregationType::Average => f.write_str("AVERAGE"),
            AggregationType::Sum => f.write_str("SUM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_object_type_roundtrip() {
        for raw in [0x0001u16, 0x0002, 0x0003, 0x0004, 0x0005, 0x000A, 0x0101] {
            assert_eq!(ObjectType::from_u16(raw).to_u16(), raw);
        }
    }

    #[test]
    fn test_error_code_lookup() {
        assert_eq!(ErrorCode::from_u16(0x0002), Some(ErrorCode::DeviceNotFound));
        assert_eq!(ErrorCode::describe(0x0025), "PROPERTY_IS_READ_ONLY");
        assert_eq!(ErrorCode::describe(0x7777), "UNKNOWN_ERROR_0x7777");
    }

    #[test]
    fn test_aggregation_codes() {
        assert_eq!(AggregationType::from_u8(0xFE).unwrap(), AggregationType::Sum);
        assert_eq!(AggregationType::from_u8(3).unwrap(), AggregationType::Device(3));
        assert!(AggregationType::from_u8(0x10).is_err());
        assert!(AggregationType::device(0).is_err());
        assert_eq!(AggregationType::Device(15).to_u8().unwrap(), 15);
        assert_eq!(AggregationType::Sum.to_u8().unwrap(), 0xFE);
        for index in [0u8, 16, 0xFD, 200] {
            let err = AggregationType::Device(index).to_u8().unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidRequest);
        }
        assert_eq!(AggregationType::Average.to_string(), "AVERAGE");
    }
}
