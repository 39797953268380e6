//! Discovery of the gateway and of the devices behind it

use crate::client::{decode_value, XcomClient};
use log::{debug, info};
use std::time::Duration;
use xcom_core::{address, Value, ValueFormat, XcomError, XcomResult};
use xcom_dataset::{Address, DeviceFamily, IdentityInfos, FAMILIES};
use xcom_protocol::{Guid, Package};
use xcom_transport::TransportLayer;

/// Software version infos of the gateway
const RCC_SOFT_MSB: u16 = 5101;
const RCC_SOFT_LSB: u16 = 5102;

/// The gateway the client talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredClient {
    pub peer_address: Option<String>,
    pub guid: Option<Guid>,
    pub software_version: Option<String>,
}

/// A device that answered its family's identity probe
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub address: Address,
    /// Model name, or the raw identifier when the dataset has no name for it
    pub model: String,
    pub hardware_id: Option<u32>,
    pub software_version: Option<String>,
}

/// Discovery built on the client's exchange engine
pub struct XcomDiscover<'a, T> {
    client: &'a XcomClient<T>,
    probe_timeout: Duration,
}

impl<'a, T: TransportLayer> XcomDiscover<'a, T> {
    pub fn new(client: &'a XcomClient<T>) -> Self {
        Self {
            probe_timeout: client.config().timeout,
            client,
        }
    }

    /// Time allowed to each device probe; absent devices may never answer
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Identify the gateway: peer address, GUID and software version
    pub async fn discover_client_info(&self) -> XcomResult<DiscoveredClient> {
        let guid = absent_on_rejection(self.client.request_guid().await)?;
        let msb = self.read_info_raw(address::RCC, RCC_SOFT_MSB).await?;
        let lsb = self.read_info_raw(address::RCC, RCC_SOFT_LSB).await?;
        let discovered = DiscoveredClient {
            peer_address: self.client.peer_address().await,
            guid,
            software_version: msb.zip(lsb).map(|(msb, lsb)| software_version(msb, lsb)),
        };
        info!(
            "Gateway {} guid={} version={}",
            discovered.peer_address.as_deref().unwrap_or("?"),
            discovered.guid.as_ref().map(|g| g.to_string()).unwrap_or_default(),
            discovered.software_version.as_deref().unwrap_or("?")
        );
        Ok(discovered)
    }

    /// Probe every address of every identifiable family
    ///
    /// A device is present when it answers its family's "ID type" info.
    /// With `extended`, hardware id and software version are read too.
    ///
    /// # Errors
    /// Rejections and timeouts mark a device absent; any other failure
    /// (transport broken, cancelled) aborts the discovery.
    pub async fn discover_devices(&self, extended: bool) -> XcomResult<Vec<DiscoveredDevice>> {
        let mut devices = Vec::new();
        for family in FAMILIES.iter() {
            let Some(identity) = family.identity else {
                continue;
            };
            for value in family.addresses() {
                if let Some(device) = self.probe(family, &identity, value, extended).await? {
                    info!("Found {} {} at {}", family.name, device.model, device.address);
                    devices.push(device);
                }
            }
        }
        Ok(devices)
    }

    async fn probe(
        &self,
        family: &DeviceFamily,
        identity: &IdentityInfos,
        value: u32,
        extended: bool,
    ) -> XcomResult<Option<DiscoveredDevice>> {
        let address = Address::from_value(value)?;
        let request = Package::read_info(value, identity.id_type);
        let response = match self
            .client
            .engine()
            .exchange_with(&request, self.probe_timeout, 1)
            .await
        {
            Ok(response) => response,
            Err(e @ (XcomError::ResponseIsError { .. } | XcomError::Timeout(_))) => {
                debug!("No {} at {}: {}", family.tag, value, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let model = match self
            .client
            .dataset()
            .get_by_nr(identity.id_type, Some(family.id.datapoint_family()))
        {
            Ok(datapoint) => match decode_value(datapoint, response.data())? {
                Value::Enum(raw) => datapoint.enum_value(raw),
                other => other.to_string(),
            },
            Err(_) => ValueFormat::Float.decode(response.data())?.to_string(),
        };

        let mut device = DiscoveredDevice {
            address,
            model,
            hardware_id: None,
            software_version: None,
        };
        if extended {
            device.hardware_id = self.read_info_raw(value, identity.id_hw).await?;
            let msb = self.read_info_raw(value, identity.id_soft_msb).await?;
            let lsb = self.read_info_raw(value, identity.id_soft_lsb).await?;
            device.software_version = msb.zip(lsb).map(|(msb, lsb)| software_version(msb, lsb));
        }
        Ok(Some(device))
    }

    /// Read an info as an unsigned integer; `None` when the device rejects it
    async fn read_info_raw(
        &self,
        address: u32,
        nr: u16,
    ) -> XcomResult<Option<u32>> {
        let result = self
            .client
            .engine()
            .exchange(&Package::read_info(address, nr))
            .await;
        let Some(response) = absent_on_rejection(result)? else {
            return Ok(None);
        };
        let value = ValueFormat::Float.decode(response.data())?;
        Ok(value.as_f64().map(|v| v.max(0.0).round() as u32))
    }
}

fn absent_on_rejection<V>(result: XcomResult<V>) -> XcomResult<Option<V>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(XcomError::ResponseIsError { code, message }) => {
            debug!("Identity info not available: {} (0x{:04X})", message, code);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Version string from the two software id infos
///
/// The high byte of the first is the major version, the second holds
/// minor and patch in its high and low bytes.
pub fn software_version(msb: u32, lsb: u32) -> String {
    format!("{}.{}.{}", msb >> 8, lsb >> 8, lsb & 0xFF)
}
