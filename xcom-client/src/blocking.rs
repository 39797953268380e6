//! Synchronous adapter over [`XcomClient`]
//!
//! The client runs on a private current-thread runtime, driven only while
//! one of these methods blocks. Do not call them from inside an async
//! context.

use crate::client::{DeviceMessage, XcomClient};
use crate::discover::{DiscoveredClient, DiscoveredDevice, XcomDiscover};
use crate::statistics::EngineStatistics;
use crate::values::{ValuesRequest, ValuesResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use xcom_core::{Value, XcomResult};
use xcom_dataset::{Address, Datapoint, Dataset};
use xcom_protocol::Guid;
use xcom_transport::TransportLayer;

pub struct BlockingClient<T> {
    runtime: Runtime,
    client: XcomClient<T>,
}

impl<T: TransportLayer> BlockingClient<T> {
    pub fn new(client: XcomClient<T>) -> XcomResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, client })
    }

    /// The wrapped asynchronous client
    pub fn client(&self) -> &XcomClient<T> {
        &self.client
    }

    pub fn start(&self) -> XcomResult<()> {
        self.runtime.block_on(self.client.start())
    }

    pub fn stop(&self) -> XcomResult<()> {
        self.runtime.block_on(self.client.stop())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn peer_address(&self) -> Option<String> {
        self.runtime.block_on(self.client.peer_address())
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        self.client.dataset()
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.client.statistics()
    }

    pub fn request_value(&self, datapoint: &Datapoint, designator: &str) -> XcomResult<Value> {
        self.runtime
            .block_on(self.client.request_value(datapoint, designator))
    }

    pub fn request_value_at(&self, datapoint: &Datapoint, address: Address) -> XcomResult<Value> {
        self.runtime
            .block_on(self.client.request_value_at(datapoint, address))
    }

    pub fn update_value(&self, datapoint: &Datapoint, value: Value, designator: &str) -> XcomResult<()> {
        self.runtime
            .block_on(self.client.update_value(datapoint, value, designator))
    }

    pub fn request_values(&self, request: &ValuesRequest) -> XcomResult<ValuesResponse> {
        self.runtime.block_on(self.client.request_values(request))
    }

    pub fn request_infos(&self, request: &ValuesRequest) -> XcomResult<ValuesResponse> {
        self.runtime.block_on(self.client.request_infos(request))
    }

    pub fn request_message(&self, index: u32) -> XcomResult<DeviceMessage> {
        self.runtime.block_on(self.client.request_message(index))
    }

    pub fn request_guid(&self) -> XcomResult<Guid> {
        self.runtime.block_on(self.client.request_guid())
    }

    pub fn discover_client_info(&self) -> XcomResult<DiscoveredClient> {
        self.runtime
            .block_on(XcomDiscover::new(&self.client).discover_client_info())
    }

    /// See [`XcomDiscover::discover_devices`]; `probe_timeout` bounds each probe
    pub fn discover_devices(
        &self,
        extended: bool,
        probe_timeout: Option<Duration>,
    ) -> XcomResult<Vec<DiscoveredDevice>> {
        let mut discover = XcomDiscover::new(&self.client);
        if let Some(timeout) = probe_timeout {
            discover = discover.with_probe_timeout(timeout);
        }
        self.runtime.block_on(discover.discover_devices(extended))
    }
}
