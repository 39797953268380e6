//! Decoded values

use crate::constants::AggregationType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One item of a multi-info response (or request echo)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultiInfoValue {
    /// User info number
    pub nr: u16,
    pub aggregation: AggregationType,
    pub value: f32,
}

/// A value read from or written to a device
///
/// The variant follows the kind of the [`ValueFormat`](super::ValueFormat)
/// it was decoded with: all signed and unsigned integer widths share
/// `Int`, both enum widths share `Enum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Float(f64),
    Int(i64),
    Enum(u32),
    String(String),
    MultiInfo(Vec<MultiInfoValue>),
}

impl Value {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Enum(v) => Some(*v as f64),
            Value::String(_) | Value::MultiInfo(_) => None,
        }
    }

    /// Integer view of the value; floats only qualify when they have no
    /// fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(v) => Some(*v),
            Value::Enum(v) => Some(*v as i64),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    Some(*v as i64)
                } else {
                    None
                }
            }
            Value::String(_) | Value::MultiInfo(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Enum(_) => "enum",
            Value::String(_) => "string",
            Value::MultiInfo(_) => "multi-info",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Enum(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::MultiInfo(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}/{}={}", item.nr, item.aggregation, item.value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
