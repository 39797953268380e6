//! Client configuration and builder
//!
//! ```rust,no_run
//! use xcom_client::ClientBuilder;
//! use xcom_dataset::{VoltageAc, VoltageDc};
//! use std::time::Duration;
//!
//! # async fn run() -> xcom_core::XcomResult<()> {
//! // Wait for an Xcom-LAN configured as TCP client to connect on port 4001
//! let client = ClientBuilder::new()
//!     .tcp_server(4001)
//!     .voltage(VoltageAc::Ac240, VoltageDc::Dc48)
//!     .timeout(Duration::from_secs(3))
//!     .build()?;
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use crate::blocking::BlockingClient;
use crate::client::XcomClient;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use xcom_core::{XcomError, XcomResult};
use xcom_dataset::{Dataset, VoltageAc, VoltageDc};
use xcom_protocol::MULTI_INFO_MAX_ITEMS;
use xcom_transport::{
    SerialSettings, SerialTransport, TcpSettings, TcpTransport, TransportLayer, UdpSettings,
    UdpTransport,
};

/// Engine and client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed for the matching response of one attempt
    pub timeout: Duration,
    /// Attempts per exchange, the first one included
    pub max_attempts: u32,
    /// Items per multi-info exchange
    pub multi_info_max_items: usize,
    /// Pause between transport polls when no bytes are available
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_attempts: 3,
            multi_info_max_items: MULTI_INFO_MAX_ITEMS,
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl ClientConfig {
    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> XcomResult<()> {
        if self.timeout.is_zero() {
            return Err(XcomError::InvalidData("timeout must be positive".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(XcomError::InvalidData(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(1..=MULTI_INFO_MAX_ITEMS).contains(&self.multi_info_max_items) {
            return Err(XcomError::InvalidData(format!(
                "multi_info_max_items must be within 1..={}",
                MULTI_INFO_MAX_ITEMS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum TransportType {
    TcpServer { port: u16 },
    TcpClient { address: String },
    Udp { remote: String, local_port: u16 },
    Serial { port_name: String, baud_rate: Option<u32> },
    None,
}

/// Builder for [`XcomClient`]
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    transport_type: TransportType,
    ac: VoltageAc,
    dc: VoltageDc,
    dataset: Option<Arc<Dataset>>,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Defaults: 240 V AC, 48 V DC, [`ClientConfig::default`]
    pub fn new() -> Self {
        Self {
            transport_type: TransportType::None,
            ac: VoltageAc::Ac240,
            dc: VoltageDc::Dc48,
            dataset: None,
            config: ClientConfig::default(),
        }
    }

    /// Listen on `port` for the Xcom-LAN to connect (its "TCP client" mode)
    pub fn tcp_server(mut self, port: u16) -> Self {
        self.transport_type = TransportType::TcpServer { port };
        self
    }

    /// Connect to an Xcom-LAN listening at `address` ("host:port")
    pub fn tcp_client(mut self, address: &str) -> Self {
        self.transport_type = TransportType::TcpClient {
            address: address.to_string(),
        };
        self
    }

    /// Exchange datagrams with a gateway at `remote`, bound to `local_port`
    pub fn udp(mut self, remote: &str, local_port: u16) -> Self {
        self.transport_type = TransportType::Udp {
            remote: remote.to_string(),
            local_port,
        };
        self
    }

    /// Use an Xcom-232i on `port_name`; `None` keeps the 38400 baud default
    pub fn serial(mut self, port_name: &str, baud_rate: Option<u32>) -> Self {
        self.transport_type = TransportType::Serial {
            port_name: port_name.to_string(),
            baud_rate,
        };
        self
    }

    /// Select the embedded dataset for an installation's voltages
    pub fn voltage(mut self, ac: VoltageAc, dc: VoltageDc) -> Self {
        self.ac = ac;
        self.dc = dc;
        self
    }

    /// Use an already built dataset instead of an embedded one
    pub fn dataset(mut self, dataset: Arc<Dataset>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn multi_info_max_items(mut self, max_items: usize) -> Self {
        self.config.multi_info_max_items = max_items;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Build a client over the configured transport
    pub fn build(self) -> XcomResult<XcomClient<Box<dyn TransportLayer>>> {
        let transport = self.transport()?;
        self.build_with(transport)
    }

    /// Build a client over any transport, e.g. an in-memory stream
    pub fn build_with<T: TransportLayer + 'static>(self, transport: T) -> XcomResult<XcomClient<T>> {
        self.config.validate()?;
        let dataset = match self.dataset {
            Some(dataset) => dataset,
            None => Arc::new(Dataset::create(self.ac, self.dc)?),
        };
        Ok(XcomClient::new(transport, dataset, self.config))
    }

    /// Build a synchronous client over the configured transport
    pub fn build_blocking(self) -> XcomResult<BlockingClient<Box<dyn TransportLayer>>> {
        BlockingClient::new(self.build()?)
    }

    fn transport(&self) -> XcomResult<Box<dyn TransportLayer>> {
        let transport: Box<dyn TransportLayer> = match &self.transport_type {
            TransportType::TcpServer { port } => Box::new(TcpTransport::new(TcpSettings::server(*port))),
            TransportType::TcpClient { address } => {
                Box::new(TcpTransport::new(TcpSettings::client(parse_address(address)?)))
            }
            TransportType::Udp { remote, local_port } => Box::new(UdpTransport::new(
                UdpSettings::new(parse_address(remote)?).with_local_port(*local_port),
            )),
            TransportType::Serial {
                port_name,
                baud_rate,
            } => {
                let mut settings = SerialSettings::new(port_name.as_str());
                if let Some(baud_rate) = baud_rate {
                    settings = settings.with_baud_rate(*baud_rate);
                }
                Box::new(SerialTransport::new(settings))
            }
            TransportType::None => {
                return Err(XcomError::InvalidData(
                    "Transport type not configured".to_string(),
                ));
            }
        };
        Ok(transport)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_address(address: &str) -> XcomResult<SocketAddr> {
    address
        .parse()
        .map_err(|e| XcomError::InvalidData(format!("Invalid address '{}': {}", address, e)))
}
