//! On-wire value formats and the value codec
//!
//! Every format is handled in exactly one arm of [`ValueFormat::encode`] and
//! [`ValueFormat::decode`]. Numbers are little-endian. Strings carry a one
//! byte length prefix followed by ISO-8859-1 characters. A multi-info value
//! is a sequence of 7 byte items (`u16` info number, `u8` aggregation type,
//! `f32` value).

use crate::constants::AggregationType;
use crate::datatypes::value::{MultiInfoValue, Value};
use crate::error::{XcomError, XcomResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of one multi-info item on the wire
pub const MULTI_INFO_ITEM_SIZE: usize = 7;

/// Format tag of a datapoint value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueFormat {
    Bool,
    Float,
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    ShortEnum,
    LongEnum,
    String { max_len: u8 },
    MultiInfo,
    /// Menu node; has no value
    Menu,
}

impl ValueFormat {
    /// Fixed byte width, or `None` for variable length formats
    pub fn width(&self) -> Option<usize> {
        match self {
            ValueFormat::Bool | ValueFormat::Int8 | ValueFormat::UInt8 => Some(1),
            ValueFormat::Int16 | ValueFormat::UInt16 | ValueFormat::ShortEnum => Some(2),
            ValueFormat::Float
            | ValueFormat::Int32
            | ValueFormat::UInt32
            | ValueFormat::LongEnum => Some(4),
            ValueFormat::Menu => Some(0),
            ValueFormat::String { .. } | ValueFormat::MultiInfo => None,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, ValueFormat::ShortEnum | ValueFormat::LongEnum)
    }

    pub fn is_menu(&self) -> bool {
        matches!(self, ValueFormat::Menu)
    }

    /// Encode a value into its on-wire bytes
    pub fn encode(&self, value: &Value) -> XcomResult<Vec<u8>> {
        match self {
            ValueFormat::Bool => {
                let b = match value {
                    Value::Bool(b) => *b,
                    other => match other.as_i64() {
                        Some(0) => false,
                        Some(1) => true,
                        _ => return Err(self.mismatch(value)),
                    },
                };
                Ok(vec![b as u8])
            }
            ValueFormat::Float => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
                if !v.is_finite() || v.abs() > f32::MAX as f64 {
                    return Err(XcomError::ValueOutOfRange(format!(
                        "{} does not fit in a 32 bit float",
                        v
                    )));
                }
                Ok((v as f32).to_le_bytes().to_vec())
            }
            ValueFormat::Int8 => {
                Ok((self.integer(value, i8::MIN as i64, i8::MAX as i64)? as i8).to_le_bytes().to_vec())
            }
            ValueFormat::Int16 => {
                Ok((self.integer(value, i16::MIN as i64, i16::MAX as i64)? as i16).to_le_bytes().to_vec())
            }
            ValueFormat::Int32 => {
                Ok((self.integer(value, i32::MIN as i64, i32::MAX as i64)? as i32).to_le_bytes().to_vec())
            }
            ValueFormat::UInt8 => Ok(vec![self.integer(value, 0, u8::MAX as i64)? as u8]),
            ValueFormat::UInt16 | ValueFormat::ShortEnum => {
                Ok((self.integer(value, 0, u16::MAX as i64)? as u16).to_le_bytes().to_vec())
            }
            ValueFormat::UInt32 | ValueFormat::LongEnum => {
                Ok((self.integer(value, 0, u32::MAX as i64)? as u32).to_le_bytes().to_vec())
            }
            ValueFormat::String { max_len } => {
                let s = value.as_str().ok_or_else(|| self.mismatch(value))?;
                let mut out = Vec::with_capacity(s.len() + 1);
                out.push(0);
                for c in s.chars() {
                    let code = c as u32;
                    if code > 0xFF {
                        return Err(XcomError::ValueOutOfRange(format!(
                            "Character {:?} cannot be encoded in ISO-8859-1",
                            c
                        )));
                    }
                    out.push(code as u8);
                }
                let len = out.len() - 1;
                if len > *max_len as usize {
                    return Err(XcomError::ValueOutOfRange(format!(
                        "String of {} characters exceeds maximum length {}",
                        len, max_len
                    )));
                }
                out[0] = len as u8;
                Ok(out)
            }
            ValueFormat::MultiInfo => {
                let Value::MultiInfo(items) = value else {
                    return Err(self.mismatch(value));
                };
                let mut out = Vec::with_capacity(items.len() * MULTI_INFO_ITEM_SIZE);
                for item in items {
                    if !item.value.is_finite() {
                        return Err(XcomError::ValueOutOfRange(format!(
                            "Multi-info value of info {} is not finite",
                            item.nr
                        )));
                    }
                    out.extend_from_slice(&item.nr.to_le_bytes());
                    out.push(item.aggregation.to_u8()?);
                    out.extend_from_slice(&item.value.to_le_bytes());
                }
                Ok(out)
            }
            ValueFormat::Menu => Err(XcomError::InvalidRequest(
                "Menu entries carry no value".to_string(),
            )),
        }
    }

    /// Decode on-wire bytes into a value
    pub fn decode(&self, data: &[u8]) -> XcomResult<Value> {
        if let Some(width) = self.width() {
            if data.len() != width {
                return Err(XcomError::MalformedValue(format!(
                    "{} expects {} bytes, got {}",
                    self,
                    width,
                    data.len()
                )));
            }
        }

        match self {
            ValueFormat::Bool => match data[0] {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(XcomError::MalformedValue(format!(
                    "Invalid boolean byte 0x{:02X}",
                    other
                ))),
            },
            ValueFormat::Float => {
                let v = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Value::Float(v as f64))
            }
            ValueFormat::Int8 => Ok(Value::Int(data[0] as i8 as i64)),
            ValueFormat::Int16 => Ok(Value::Int(i16::from_le_bytes([data[0], data[1]]) as i64)),
            ValueFormat::Int32 => Ok(Value::Int(
                i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64,
            )),
            ValueFormat::UInt8 => Ok(Value::Int(data[0] as i64)),
            ValueFormat::UInt16 => Ok(Value::Int(u16::from_le_bytes([data[0], data[1]]) as i64)),
            ValueFormat::UInt32 => Ok(Value::Int(
                u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64,
            )),
            ValueFormat::ShortEnum => {
                Ok(Value::Enum(u16::from_le_bytes([data[0], data[1]]) as u32))
            }
            ValueFormat::LongEnum => Ok(Value::Enum(u32::from_le_bytes([
                data[0], data[1], data[2], data[3],
            ]))),
            ValueFormat::String { max_len } => {
                let (&len, rest) = data.split_first().ok_or_else(|| {
                    XcomError::MalformedValue("String value without length prefix".to_string())
                })?;
                if len > *max_len {
                    return Err(XcomError::MalformedValue(format!(
                        "String length {} exceeds maximum {}",
                        len, max_len
                    )));
                }
                if rest.len() != len as usize {
                    return Err(XcomError::MalformedValue(format!(
                        "String declares {} bytes but {} are present",
                        len,
                        rest.len()
                    )));
                }
                Ok(Value::String(rest.iter().map(|&b| b as char).collect()))
            }
            ValueFormat::MultiInfo => {
                if data.len() % MULTI_INFO_ITEM_SIZE != 0 {
                    return Err(XcomError::MalformedValue(format!(
                        "Multi-info data of {} bytes is not a multiple of {}",
                        data.len(),
                        MULTI_INFO_ITEM_SIZE
                    )));
                }
                let items = data
                    .chunks_exact(MULTI_INFO_ITEM_SIZE)
                    .map(|chunk| -> XcomResult<MultiInfoValue> {
                        Ok(MultiInfoValue {
                            nr: u16::from_le_bytes([chunk[0], chunk[1]]),
                            aggregation: AggregationType::from_u8(chunk[2])?,
                            value: f32::from_le_bytes([chunk[3], chunk[4], chunk[5], chunk[6]]),
                        })
                    })
                    .collect::<XcomResult<Vec<_>>>()?;
                Ok(Value::MultiInfo(items))
            }
            ValueFormat::Menu => Err(XcomError::InvalidRequest(
                "Menu entries carry no value".to_string(),
            )),
        }
    }

    /// Convert a value received in another representation (user infos
    /// always travel as floats) into the kind this format decodes to.
    pub fn coerce(&self, value: Value) -> XcomResult<Value> {
        match self {
            ValueFormat::Float | ValueFormat::MultiInfo | ValueFormat::String { .. } => Ok(value),
            ValueFormat::Menu => Err(XcomError::InvalidRequest(
                "Menu entries carry no value".to_string(),
            )),
            ValueFormat::Bool => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(&value))?;
                Ok(Value::Bool(v != 0.0))
            }
            ValueFormat::ShortEnum | ValueFormat::LongEnum => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(&value))?;
                if v < 0.0 || v > u32::MAX as f64 {
                    return Err(XcomError::ValueOutOfRange(format!("{} is not a valid enum value", v)));
                }
                Ok(Value::Enum(v.round() as u32))
            }
            _ => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(&value))?;
                Ok(Value::Int(v.round() as i64))
            }
        }
    }

    fn integer(&self, value: &Value, min: i64, max: i64) -> XcomResult<i64> {
        let v = value.as_i64().ok_or_else(|| self.mismatch(value))?;
        if v < min || v > max {
            return Err(XcomError::ValueOutOfRange(format!(
                "{} outside {}..={} for {}",
                v, min, max, self
            )));
        }
        Ok(v)
    }

    fn mismatch(&self, value: &Value) -> XcomError {
        XcomError::InvalidRequest(format!(
            "Cannot encode {} value {} as {}",
            value.kind_name(),
            value,
            self
        ))
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueFormat::Bool => f.write_str("BOOL"),
            ValueFormat::Float => f.write_str("FLOAT"),
            ValueFormat::Int8 => f.write_str("INT8"),
            ValueFormat::Int16 => f.write_str("INT16"),
            ValueFormat::Int32 => f.write_str("INT32"),
            ValueFormat::UInt8 => f.write_str("UINT8"),
            ValueFormat::UInt16 => f.write_str("UINT16"),
            ValueFormat::UInt32 => f.write_str("UINT32"),
            ValueFormat::ShortEnum => f.write_str("SHORT_ENUM"),
            ValueFormat::LongEnum => f.write_str("LONG_ENUM"),
            ValueFormat::String { max_len } => write!(f, "STRING({})", max_len),
            ValueFormat::MultiInfo => f.write_str("MULTI_INFO"),
            ValueFormat::Menu => f.write_str("MENU"),
        }
    }
}

impl FromStr for ValueFormat {
    type Err = XcomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_uppercase();
        let format = match tag.as_str() {
            "BOOL" => ValueFormat::Bool,
            "FLOAT" => ValueFormat::Float,
            "INT8" => ValueFormat::Int8,
            "INT16" => ValueFormat::Int16,
            "INT32" => ValueFormat::Int32,
            "UINT8" => ValueFormat::UInt8,
            "UINT16" => ValueFormat::UInt16,
            "UINT32" => ValueFormat::UInt32,
            "SHORT_ENUM" => ValueFormat::ShortEnum,
            "LONG_ENUM" => ValueFormat::LongEnum,
            "STRING" => ValueFormat::String { max_len: u8::MAX },
            "MULTI_INFO" => ValueFormat::MultiInfo,
            "MENU" => ValueFormat::Menu,
            other => {
                let max_len = other
                    .strip_prefix("STRING(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| XcomError::InvalidData(format!("Unknown value format '{}'", s)))?;
                ValueFormat::String { max_len }
            }
        };
        Ok(format)
    }
}

impl TryFrom<String> for ValueFormat {
    type Error = XcomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueFormat> for String {
    fn from(format: ValueFormat) -> Self {
        format.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use rand::Rng;

    const INTEGER_FORMATS: [(ValueFormat, i64, i64); 6] = [
        (ValueFormat::Int8, i8::MIN as i64, i8::MAX as i64),
        (ValueFormat::Int16, i16::MIN as i64, i16::MAX as i64),
        (ValueFormat::Int32, i32::MIN as i64, i32::MAX as i64),
        (ValueFormat::UInt8, 0, u8::MAX as i64),
        (ValueFormat::UInt16, 0, u16::MAX as i64),
        (ValueFormat::UInt32, 0, u32::MAX as i64),
    ];

    #[test]
    fn test_integer_roundtrip_random() {
        let mut rng = rand::thread_rng();
        for (format, min, max) in INTEGER_FORMATS {
            for v in [min, max, 0.max(min)] {
                let bytes = format.encode(&Value::Int(v)).unwrap();
                assert_eq!(format.decode(&bytes).unwrap(), Value::Int(v), "{}", format);
            }
            for _ in 0..200 {
                let v = rng.gen_range(min..=max);
                let bytes = format.encode(&Value::Int(v)).unwrap();
                assert_eq!(bytes.len(), format.width().unwrap());
                assert_eq!(format.decode(&bytes).unwrap(), Value::Int(v));
            }
        }
    }

    #[test]
    fn test_integer_out_of_range() {
        for (format, min, max) in INTEGER_FORMATS {
            let err = format.encode(&Value::Int(max + 1)).unwrap_err();
            assert_eq!(err.kind(), FailureKind::ValueOutOfRange);
            let err = format.encode(&Value::Int(min - 1)).unwrap_err();
            assert_eq!(err.kind(), FailureKind::ValueOutOfRange);
        }
    }

    #[test]
    fn test_float_roundtrip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let v = rng.gen_range(-1.0e6f32..1.0e6f32) as f64;
            let bytes = ValueFormat::Float.encode(&Value::Float(v)).unwrap();
            assert_eq!(ValueFormat::Float.decode(&bytes).unwrap(), Value::Float(v));
        }
        let bytes = ValueFormat::Float.encode(&Value::Float(1500.0)).unwrap();
        assert_eq!(bytes, 1500.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_float_overflow() {
        let err = ValueFormat::Float.encode(&Value::Float(1.0e40)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ValueOutOfRange);
        let err = ValueFormat::Float.encode(&Value::Float(f64::NAN)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ValueOutOfRange);
    }

    #[test]
    fn test_enum_and_bool() {
        let bytes = ValueFormat::ShortEnum.encode(&Value::Enum(4)).unwrap();
        assert_eq!(bytes, vec![4, 0]);
        assert_eq!(ValueFormat::ShortEnum.decode(&bytes).unwrap(), Value::Enum(4));

        let bytes = ValueFormat::LongEnum.encode(&Value::Enum(0x0001_0000)).unwrap();
        assert_eq!(ValueFormat::LongEnum.decode(&bytes).unwrap(), Value::Enum(0x0001_0000));
        assert!(ValueFormat::ShortEnum.encode(&Value::Enum(0x1_0000)).is_err());

        assert_eq!(ValueFormat::Bool.encode(&Value::Bool(true)).unwrap(), vec![1]);
        assert_eq!(ValueFormat::Bool.decode(&[0]).unwrap(), Value::Bool(false));
        assert!(ValueFormat::Bool.decode(&[2]).is_err());
    }

    #[test]
    fn test_wrong_width_is_malformed() {
        let err = ValueFormat::Float.decode(&[0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedValue);
        let err = ValueFormat::Int16.decode(&[0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedValue);
    }

    #[test]
    fn test_string_codec() {
        let format = ValueFormat::String { max_len: 8 };
        let bytes = format.encode(&Value::from("Größe")).unwrap();
        assert_eq!(bytes[0], 5);
        assert_eq!(format.decode(&bytes).unwrap(), Value::from("Größe"));

        let err = format.encode(&Value::from("way too long")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ValueOutOfRange);

        // truncated: declares 4 bytes, carries 2
        let err = format.decode(&[4, b'a', b'b']).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedValue);
        let err = format.decode(&[]).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedValue);
    }

    #[test]
    fn test_multi_info_codec() {
        let value = Value::MultiInfo(vec![
            MultiInfoValue { nr: 3021, aggregation: AggregationType::Sum, value: 12.5 },
            MultiInfoValue { nr: 3022, aggregation: AggregationType::Device(2), value: -1.0 },
        ]);
        let bytes = ValueFormat::MultiInfo.encode(&value).unwrap();
        assert_eq!(bytes.len(), 2 * MULTI_INFO_ITEM_SIZE);
        assert_eq!(&bytes[0..3], &[0xCD, 0x0B, 0xFE]);
        assert_eq!(ValueFormat::MultiInfo.decode(&bytes).unwrap(), value);
        assert!(ValueFormat::MultiInfo.decode(&bytes[..10]).is_err());
    }

    #[test]
    fn test_coerce_wire_float() {
        assert_eq!(ValueFormat::LongEnum.coerce(Value::Float(3.0)).unwrap(), Value::Enum(3));
        assert_eq!(ValueFormat::Int32.coerce(Value::Float(-7.0)).unwrap(), Value::Int(-7));
        assert_eq!(ValueFormat::Bool.coerce(Value::Float(1.0)).unwrap(), Value::Bool(true));
        assert_eq!(ValueFormat::Float.coerce(Value::Float(0.5)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_format_tags() {
        for format in [
            ValueFormat::Float,
            ValueFormat::LongEnum,
            ValueFormat::UInt16,
            ValueFormat::String { max_len: 32 },
            ValueFormat::Menu,
        ] {
            assert_eq!(format.to_string().parse::<ValueFormat>().unwrap(), format);
        }
        assert_eq!("string".parse::<ValueFormat>().unwrap(), ValueFormat::String { max_len: 255 });
        assert!("DOUBLE".parse::<ValueFormat>().is_err());
    }
}
