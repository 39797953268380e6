//! Xcom/SCOM client
//!
//! This crate sits on top of the protocol stack:
//! - **Engine**: request/response exchanges with timeout, retry and
//!   cancellation over one transport ([`ExchangeEngine`])
//! - **Client**: datapoint reads and writes, batches, messages ([`XcomClient`])
//! - **Batching**: planning of multi-info exchanges ([`BatchPlan`])
//! - **Discovery**: gateway identity and device enumeration ([`XcomDiscover`])
//! - **Blocking**: synchronous adapter ([`BlockingClient`])

pub mod batch;
pub mod blocking;
pub mod client;
pub mod config;
pub mod discover;
pub mod engine;
pub mod statistics;
pub mod values;

pub use batch::{BatchPlan, PlannedExchange};
pub use blocking::BlockingClient;
pub use client::{DeviceMessage, XcomClient};
pub use config::{ClientBuilder, ClientConfig};
pub use discover::{software_version, DiscoveredClient, DiscoveredDevice, XcomDiscover};
pub use engine::ExchangeEngine;
pub use statistics::EngineStatistics;
pub use values::{ResponseItem, Target, ValuesItem, ValuesRequest, ValuesResponse};

pub use xcom_core::{XcomError, XcomResult};
