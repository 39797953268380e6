//! Typed values and their on-wire formats

pub mod value;
pub mod value_format;

pub use value::{MultiInfoValue, Value};
pub use value_format::ValueFormat;
