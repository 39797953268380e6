//! xcom - Rust client for the Studer Xcom/SCOM protocol
//!
//! Talks to Studer-Innotec installations (Xtender, VarioTrack,
//! VarioString, BSP) through an Xcom gateway over TCP, UDP or a serial
//! line.
//!
//! # Architecture
//!
//! The library is organized as a workspace with one crate per layer:
//!
//! - `xcom-core`: protocol constants, value formats, error handling
//! - `xcom-transport`: byte transports (TCP client/server, UDP, serial)
//! - `xcom-protocol`: SCOM frames, services, checksums and the package reader
//! - `xcom-dataset`: device families, addresses, datapoints and messages
//! - `xcom-client`: exchange engine, batched requests and discovery
//!
//! # Usage
//!
//! ```no_run
//! use xcom::client::ClientBuilder;
//! use xcom::dataset::FamilyId;
//!
//! # async fn run() -> xcom::XcomResult<()> {
//! // The gateway connects to us
//! let client = ClientBuilder::new().tcp_server(4001).build()?;
//! client.start().await?;
//!
//! let battery_voltage = client.dataset().get_by_nr(3000, Some(FamilyId::Xt))?.clone();
//! let value = client.request_value(&battery_voltage, "XT1").await?;
//! println!("{}", battery_voltage.display_value(&value));
//!
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use xcom_core::*;

pub mod transport {
    pub use xcom_transport::*;
}

pub mod protocol {
    pub use xcom_protocol::*;
}

pub mod dataset {
    pub use xcom_dataset::*;
}

pub mod client {
    pub use xcom_client::*;
}
