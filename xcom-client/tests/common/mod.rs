//! Simulated Xcom gateway for end-to-end tests
#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use xcom_client::{ClientBuilder, ClientConfig, XcomClient};
use xcom_core::{AggregationType, MultiInfoValue, ObjectType, PropertyId, ServiceId};
use xcom_protocol::{MessageResponse, MultiInfoRequest, MultiInfoResponse, Package, PackageDecoder};
use xcom_transport::StreamTransport;

pub const DATETIME: u32 = 1_700_000_000;

const DEVICE_NOT_FOUND: u16 = 0x0002;
const SERVICE_NOT_SUPPORTED: u16 = 0x0011;
const OBJECT_ID_NOT_FOUND: u16 = 0x0022;
const PROPERTY_NOT_SUPPORTED: u16 = 0x0023;
const INVALID_DATA: u16 = 0x0026;

/// What the simulated installation holds
///
/// Parameter reads are served from flash; writes of the unsaved value only
/// reach RAM.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub present: HashSet<u32>,
    /// Addresses that never answer
    pub silent: HashSet<u32>,
    pub infos: HashMap<(u32, u16), f32>,
    pub flash: HashMap<(u32, u16), Bytes>,
    pub ram: HashMap<(u32, u16), Bytes>,
    pub messages: Vec<MessageResponse>,
    pub guid: [u8; 16],
    /// Responses are delayed by up to this much, reordering them
    pub max_delay: Duration,
}

impl DeviceState {
    pub fn set_info(&mut self, address: u32, nr: u16, value: f32) {
        self.infos.insert((address, nr), value);
    }

    pub fn set_param(&mut self, address: u32, nr: u16, value: f32) {
        self.flash
            .insert((address, nr), Bytes::copy_from_slice(&value.to_le_bytes()));
    }

    fn answer(&mut self, request: &Package) -> Option<Package> {
        let dst = request.dst_addr;
        if self.silent.contains(&dst) {
            return None;
        }
        let service = &request.service;
        let key = (dst, service.object_id as u16);
        let result = match (service.object_type, service.service_id) {
            (ObjectType::MultiInfo, ServiceId::Read) => self.multi_info(request),
            _ if !self.present.contains(&dst) => Err(DEVICE_NOT_FOUND),
            (ObjectType::Info, ServiceId::Read) => self
                .infos
                .get(&key)
                .map(|v| Bytes::copy_from_slice(&v.to_le_bytes()))
                .ok_or(OBJECT_ID_NOT_FOUND),
            (ObjectType::Parameter, ServiceId::Read) => match service.property_id {
                PropertyId::VALUE_QSP => self.flash.get(&key).cloned().ok_or(OBJECT_ID_NOT_FOUND),
                PropertyId::UNSAVED_VALUE_QSP => self
                    .ram
                    .get(&key)
                    .or_else(|| self.flash.get(&key))
                    .cloned()
                    .ok_or(OBJECT_ID_NOT_FOUND),
                _ => Err(PROPERTY_NOT_SUPPORTED),
            },
            (ObjectType::Parameter, ServiceId::Write) => {
                let data = request.data().clone();
                match service.property_id {
                    PropertyId::UNSAVED_VALUE_QSP => {
                        self.ram.insert(key, data);
                        Ok(Bytes::new())
                    }
                    PropertyId::VALUE_QSP => {
                        self.flash.insert(key, data);
                        Ok(Bytes::new())
                    }
                    _ => Err(PROPERTY_NOT_SUPPORTED),
                }
            }
            (ObjectType::Message, ServiceId::Read) => self
                .messages
                .get(service.object_id as usize)
                .map(MessageResponse::encode)
                .ok_or(OBJECT_ID_NOT_FOUND),
            (ObjectType::Guid, ServiceId::Read) => Ok(Bytes::copy_from_slice(&self.guid)),
            _ => Err(SERVICE_NOT_SUPPORTED),
        };
        Some(match result {
            Ok(data) => request.response_with(0, data),
            Err(code) => request.error_response(code),
        })
    }

    fn multi_info(&self, request: &Package) -> Result<Bytes, u16> {
        let items = MultiInfoRequest::decode(request.data())
            .map_err(|_| INVALID_DATA)?
            .items;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let (group, first, last) = family_range(item.info_nr).ok_or(OBJECT_ID_NOT_FOUND)?;
            let lookup = |address: u32| self.infos.get(&(address, item.info_nr)).copied();
            let value = match item.aggregation {
                AggregationType::Master => lookup(first),
                AggregationType::Device(n) => lookup(group + n as u32),
                AggregationType::Sum | AggregationType::Average => {
                    let found: Vec<f32> = (first..=last).filter_map(lookup).collect();
                    let sum: f32 = found.iter().sum();
                    match item.aggregation {
                        _ if found.is_empty() => None,
                        AggregationType::Sum => Some(sum),
                        _ => Some(sum / found.len() as f32),
                    }
                }
            }
            .ok_or(OBJECT_ID_NOT_FOUND)?;
            values.push(MultiInfoValue {
                nr: item.info_nr,
                aggregation: item.aggregation,
                value,
            });
        }
        MultiInfoResponse {
            flags: 0,
            datetime: DATETIME,
            items: values,
        }
        .encode()
        .map_err(|_| INVALID_DATA)
    }
}

/// Group address and device range of the family owning info `nr`
fn family_range(nr: u16) -> Option<(u32, u32, u32)> {
    match nr {
        3000..=3999 => Some((100, 101, 109)),
        7000..=7999 => Some((600, 601, 601)),
        11000..=11999 => Some((300, 301, 315)),
        15000..=15999 => Some((700, 701, 715)),
        _ => None,
    }
}

pub struct Device {
    state: StdMutex<DeviceState>,
    requests: AtomicUsize,
}

impl Device {
    pub fn new(state: DeviceState) -> Arc<Self> {
        Arc::new(Self {
            state: StdMutex::new(state),
            requests: AtomicUsize::new(0),
        })
    }

    /// Requests received so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn ram_value(&self, address: u32, nr: u16) -> Option<Bytes> {
        self.state.lock().unwrap().ram.get(&(address, nr)).cloned()
    }

    fn answer(&self, request: &Package) -> (Option<Package>, Duration) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let delay = if state.max_delay.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=state.max_delay.as_millis() as u64))
        };
        (state.answer(request), delay)
    }
}

/// Answer requests arriving on `stream` until the client goes away
pub async fn serve(stream: DuplexStream, device: Arc<Device>) {
    let (mut reader, writer) = tokio::io::split(stream);
    let writer = Arc::new(Mutex::new(writer));
    let mut decoder = PackageDecoder::new();
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match decoder.decode(&mut buf) {
            Ok(Some(request)) => {
                let (response, delay) = device.answer(&request);
                if let Some(response) = response {
                    let writer = writer.clone();
                    let bytes = response.encode().unwrap();
                    tokio::spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        let _ = writer.lock().await.write_all(&bytes).await;
                    });
                }
                continue;
            }
            Ok(None) => {}
            Err(_) => break,
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(5),
        ..ClientConfig::default()
    }
}

/// Client connected to `device` through an in-memory stream
pub async fn connect(
    device: Arc<Device>,
    config: ClientConfig,
) -> XcomClient<StreamTransport<DuplexStream>> {
    let (client_side, device_side) = tokio::io::duplex(16 * 1024);
    tokio::spawn(serve(device_side, device));
    let client = ClientBuilder::new()
        .config(config)
        .build_with(StreamTransport::new(client_side))
        .unwrap();
    client.start().await.unwrap();
    client
}

/// An installation with three Xtenders, a BSP and the gateway
pub fn installation() -> DeviceState {
    let mut state = DeviceState::default();
    state.present.extend([101, 102, 103, 501, 601]);
    state.set_info(101, 3023, 1500.0);
    state.set_info(102, 3023, 700.0);
    state.set_info(103, 3023, 300.0);
    state.set_info(101, 3000, 51.5);
    state.set_info(101, 3028, 2.0);
    state.set_info(601, 7002, 87.0);
    state.set_param(101, 1138, 60.0);
    state.guid = std::array::from_fn(|i| i as u8);
    state
}
