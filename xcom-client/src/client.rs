//! High level client
//!
//! Resolves designators and datapoints into request packages, runs them
//! through the [`ExchangeEngine`] and decodes the responses with the
//! datapoint's value format.

use crate::batch::{BatchPlan, PlannedExchange};
use crate::config::ClientConfig;
use crate::engine::ExchangeEngine;
use crate::statistics::EngineStatistics;
use crate::values::{ResponseItem, Target, ValuesItem, ValuesRequest, ValuesResponse};
use bytes::Bytes;
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use xcom_core::{
    address, ItemFailure, PropertyId, Value, ValueFormat, XcomError, XcomResult,
};
use xcom_dataset::{Address, Datapoint, Dataset, FamilyId};
use xcom_protocol::{Guid, MessageResponse, MultiInfoRequest, MultiInfoResponse, Package};
use xcom_transport::TransportLayer;

/// An entry of the gateway's message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMessage {
    /// Messages stored in the log
    pub total: u32,
    pub number: u16,
    pub source_address: u32,
    /// Family of the device that raised the message, when known
    pub source_family: Option<FamilyId>,
    pub timestamp: u32,
    pub value: u32,
    pub text: String,
}

/// Asynchronous Xcom client
pub struct XcomClient<T> {
    engine: Arc<ExchangeEngine<T>>,
    dataset: Arc<Dataset>,
    config: ClientConfig,
}

impl<T> std::fmt::Debug for XcomClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XcomClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: TransportLayer> XcomClient<T> {
    pub fn new(transport: T, dataset: Arc<Dataset>, config: ClientConfig) -> Self {
        Self {
            engine: Arc::new(ExchangeEngine::new(transport, config.clone())),
            dataset,
            config,
        }
    }

    /// Open the transport; for a TCP server this waits for the gateway
    pub async fn start(&self) -> XcomResult<()> {
        self.engine.open().await
    }

    /// Cancel pending requests and close the transport
    pub async fn stop(&self) -> XcomResult<()> {
        self.engine.shutdown().await
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    pub async fn peer_address(&self) -> Option<String> {
        self.engine.peer_address().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Engine for raw package exchanges
    pub fn engine(&self) -> &Arc<ExchangeEngine<T>> {
        &self.engine
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.engine.statistics()
    }

    /// Read `datapoint` from the device named by `designator` (`"XT1"`, `"BSP"`)
    pub async fn request_value(&self, datapoint: &Datapoint, designator: &str) -> XcomResult<Value> {
        self.request_value_at(datapoint, Address::resolve(designator)?)
            .await
    }

    pub async fn request_value_at(&self, datapoint: &Datapoint, address: Address) -> XcomResult<Value> {
        check_target(datapoint, &address)?;
        let (value, _) = self.read_single(datapoint, &address).await?;
        Ok(value)
    }

    /// Write a parameter
    ///
    /// The value goes to the device's working memory: it takes effect at
    /// once but reads keep returning the stored value until the device
    /// saves it.
    ///
    /// # Errors
    /// `InvalidRequest` for read-only datapoints, `ValueOutOfRange` when
    /// the value violates the datapoint's limits. Both fail before any I/O.
    pub async fn update_value(
        &self,
        datapoint: &Datapoint,
        value: Value,
        designator: &str,
    ) -> XcomResult<()> {
        self.update_value_at(datapoint, value, Address::resolve(designator)?)
            .await
    }

    pub async fn update_value_at(
        &self,
        datapoint: &Datapoint,
        value: Value,
        address: Address,
    ) -> XcomResult<()> {
        check_target(datapoint, &address)?;
        self.write_single(datapoint, &value, &address).await?;
        Ok(())
    }

    /// Serve a batch of reads and writes
    ///
    /// Failures of individual items are reported in their
    /// [`ResponseItem`]; only planning errors and cancellation fail the
    /// whole batch.
    pub async fn request_values(&self, request: &ValuesRequest) -> XcomResult<ValuesResponse> {
        let plan = BatchPlan::build(request, self.config.multi_info_max_items)?;
        self.execute(request, plan).await
    }

    /// Like [`XcomClient::request_values`], restricted to multi-info reads
    pub async fn request_infos(&self, request: &ValuesRequest) -> XcomResult<ValuesResponse> {
        let plan = BatchPlan::build_multi_info(request, self.config.multi_info_max_items)?;
        self.execute(request, plan).await
    }

    /// Read entry `index` of the gateway's message log
    pub async fn request_message(&self, index: u32) -> XcomResult<DeviceMessage> {
        let response = self.engine.exchange(&Package::read_message(index)).await?;
        let message = MessageResponse::decode(response.data())?;
        Ok(DeviceMessage {
            total: message.message_total,
            number: message.message_number,
            source_address: message.source_address,
            source_family: Address::from_value(message.source_address)
                .ok()
                .map(|address| address.family),
            timestamp: message.timestamp,
            value: message.value,
            text: self.dataset.get_message(message.message_number as u32),
        })
    }

    /// GUID of the gateway
    pub async fn request_guid(&self) -> XcomResult<Guid> {
        let response = self.engine.exchange(&Package::read_guid(address::RCC)).await?;
        Guid::decode(response.data())
    }

    async fn read_single(&self, datapoint: &Datapoint, address: &Address) -> XcomResult<(Value, u8)> {
        let request = if datapoint.is_info() {
            Package::read_info(address.value, datapoint.nr)
        } else {
            Package::read_param(address.value, datapoint.nr, PropertyId::VALUE_QSP)
        };
        let response = self.engine.exchange(&request).await?;
        let value = decode_value(datapoint, response.data())?;
        debug!("{} at {} = {}", datapoint.nr, address, datapoint.display_value(&value));
        Ok((value, response.frame_flags))
    }

    async fn write_single(&self, datapoint: &Datapoint, value: &Value, address: &Address) -> XcomResult<u8> {
        if !datapoint.is_writable() {
            return Err(XcomError::InvalidRequest(format!("{} is read-only", datapoint)));
        }
        datapoint.check_limits(value)?;
        let data = datapoint.format.encode(value)?;
        let request = Package::write_param(
            address.value,
            datapoint.nr,
            PropertyId::UNSAVED_VALUE_QSP,
            Bytes::from(data),
        );
        let response = self.engine.exchange(&request).await?;
        debug!("{} at {} set to {}", datapoint.nr, address, datapoint.display_value(value));
        Ok(response.frame_flags)
    }

    async fn execute_item(&self, item: &ValuesItem) -> XcomResult<(Value, u8)> {
        let Target::Address(address) = &item.target else {
            return Err(XcomError::InvalidRequest(format!(
                "{} needs a multi-info exchange",
                item.target
            )));
        };
        match &item.value {
            Some(value) => {
                let flags = self.write_single(&item.datapoint, value, address).await?;
                Ok((value.clone(), flags))
            }
            None => self.read_single(&item.datapoint, address).await,
        }
    }

    async fn execute_multi_info(&self, request: &MultiInfoRequest) -> XcomResult<(MultiInfoResponse, u8)> {
        let response = self
            .engine
            .exchange(&Package::read_multi_info(request.encode()?))
            .await?;
        Ok((MultiInfoResponse::decode(response.data())?, response.frame_flags))
    }

    async fn execute(&self, request: &ValuesRequest, plan: BatchPlan) -> XcomResult<ValuesResponse> {
        let mut results: Vec<Option<Result<Value, ItemFailure>>> = vec![None; request.len()];
        let mut response = ValuesResponse::default();

        for exchange in plan.exchanges {
            match exchange {
                PlannedExchange::Single { index } => {
                    let item = &request.items[index];
                    results[index] = Some(match self.execute_item(item).await {
                        Ok((value, flags)) => {
                            response.status.0 |= flags;
                            Ok(value)
                        }
                        Err(XcomError::Cancelled) => return Err(XcomError::Cancelled),
                        Err(e) => {
                            warn!("{} at {} failed: {}", item.datapoint.nr, item.target, e);
                            Err(ItemFailure::from(&e))
                        }
                    });
                }
                PlannedExchange::MultiInfo { indexes, request: multi_info } => {
                    match self.execute_multi_info(&multi_info).await {
                        Ok((reply, flags)) => {
                            response.status.0 |= flags;
                            response.flags = Some(reply.flags);
                            response.datetime = Some(reply.datetime);
                            for (position, &index) in indexes.iter().enumerate() {
                                let datapoint = &request.items[index].datapoint;
                                results[index] = Some(match reply.items.get(position) {
                                    Some(item) => datapoint
                                        .format
                                        .coerce(Value::Float(item.value as f64))
                                        .map_err(|e| ItemFailure::from(&e)),
                                    None => Err(ItemFailure::from(&XcomError::MalformedValue(
                                        format!("No multi-info value for {}", datapoint.nr),
                                    ))),
                                });
                            }
                        }
                        Err(XcomError::Cancelled) => return Err(XcomError::Cancelled),
                        Err(e) => {
                            warn!("Multi-info read of {} items failed: {}", indexes.len(), e);
                            let failure = ItemFailure::from(&e);
                            for index in indexes {
                                results[index] = Some(Err(failure.clone()));
                            }
                        }
                    }
                }
            }
        }

        response.items = request
            .items
            .iter()
            .zip(results)
            .map(|(item, result)| ResponseItem {
                datapoint: item.datapoint.clone(),
                target: item.target,
                result: result.unwrap_or_else(|| {
                    Err(ItemFailure::from(&XcomError::InvalidRequest(
                        "Item was not planned".to_string(),
                    )))
                }),
            })
            .collect();
        Ok(response)
    }
}

/// Decode the property data of a read response for `datapoint`
///
/// Infos always travel as floats and are converted to the declared format.
pub(crate) fn decode_value(datapoint: &Datapoint, data: &[u8]) -> XcomResult<Value> {
    if datapoint.is_info() {
        datapoint.format.coerce(ValueFormat::Float.decode(data)?)
    } else {
        datapoint.format.decode(data)
    }
}

fn check_target(datapoint: &Datapoint, address: &Address) -> XcomResult<()> {
    if datapoint.format.is_menu() {
        return Err(XcomError::InvalidRequest(format!(
            "{} is a menu and carries no value",
            datapoint
        )));
    }
    if address.family.datapoint_family() != datapoint.family {
        return Err(XcomError::InvalidRequest(format!(
            "{} does not belong to {}",
            datapoint, address
        )));
    }
    Ok(())
}
