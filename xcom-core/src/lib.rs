//! Core types and utilities for the Xcom/SCOM protocol
//!
//! This crate provides the error type shared by every layer of the stack,
//! the fixed protocol constants (object types, property ids, addresses,
//! error codes) and the typed value codec used to turn property data into
//! values and back.

pub mod constants;
pub mod datatypes;
pub mod error;

pub use constants::{AggregationType, ErrorCode, ObjectType, PropertyId, ServiceId, address};
pub use datatypes::{MultiInfoValue, Value, ValueFormat};
pub use error::{FailureKind, ItemFailure, XcomError, XcomResult};
