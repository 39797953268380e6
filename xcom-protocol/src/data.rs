//! Structured property data of multi-info, message and GUID services

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use xcom_core::datatypes::value_format::MULTI_INFO_ITEM_SIZE;
use xcom_core::{AggregationType, MultiInfoValue, Value, ValueFormat, XcomError, XcomResult};

/// Most items one multi-info exchange can carry
pub const MULTI_INFO_MAX_ITEMS: usize = 76;

/// One requested item of a multi-info read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiInfoRequestItem {
    pub info_nr: u16,
    pub aggregation: AggregationType,
}

/// Property data of a multi-info read request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiInfoRequest {
    pub items: Vec<MultiInfoRequestItem>,
}

impl MultiInfoRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info_nr: u16, aggregation: AggregationType) {
        self.items.push(MultiInfoRequestItem {
            info_nr,
            aggregation,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn encode(&self) -> XcomResult<Bytes> {
        if self.items.is_empty() {
            return Err(XcomError::InvalidRequest(
                "Multi-info request without items".to_string(),
            ));
        }
        if self.items.len() > MULTI_INFO_MAX_ITEMS {
            return Err(XcomError::InvalidRequest(format!(
                "Multi-info request of {} items exceeds maximum {}",
                self.items.len(),
                MULTI_INFO_MAX_ITEMS
            )));
        }
        let mut buf = BytesMut::with_capacity(self.items.len() * 3);
        for item in &self.items {
            buf.put_u16_le(item.info_nr);
            buf.put_u8(item.aggregation.to_u8()?);
        }
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        if data.len() % 3 != 0 {
            return Err(XcomError::MalformedValue(format!(
                "Multi-info request of {} bytes is not a multiple of 3",
                data.len()
            )));
        }
        let items = data
            .chunks_exact(3)
            .map(|chunk| -> XcomResult<MultiInfoRequestItem> {
                Ok(MultiInfoRequestItem {
                    info_nr: u16::from_le_bytes([chunk[0], chunk[1]]),
                    aggregation: AggregationType::from_u8(chunk[2])?,
                })
            })
            .collect::<XcomResult<Vec<_>>>()?;
        Ok(Self { items })
    }
}

/// Property data of a multi-info read response
#[derive(Debug, Clone, PartialEq)]
pub struct MultiInfoResponse {
    pub flags: u32,
    /// Gateway time, seconds since 1970 in local time
    pub datetime: u32,
    pub items: Vec<MultiInfoValue>,
}

impl MultiInfoResponse {
    const PREFIX_SIZE: usize = 8;

    pub fn encode(&self) -> XcomResult<Bytes> {
        let values = ValueFormat::MultiInfo.encode(&Value::MultiInfo(self.items.clone()))?;
        let mut buf = BytesMut::with_capacity(Self::PREFIX_SIZE + values.len());
        buf.put_u32_le(self.flags);
        buf.put_u32_le(self.datetime);
        buf.put_slice(&values);
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        if data.len() < Self::PREFIX_SIZE {
            return Err(XcomError::MalformedValue(format!(
                "Multi-info response needs at least {} bytes, got {}",
                Self::PREFIX_SIZE,
                data.len()
            )));
        }
        let items = match ValueFormat::MultiInfo.decode(&data[Self::PREFIX_SIZE..])? {
            Value::MultiInfo(items) => items,
            other => {
                return Err(XcomError::MalformedValue(format!(
                    "Multi-info decode produced {}",
                    other.kind_name()
                )));
            }
        };
        Ok(Self {
            flags: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            datetime: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            items,
        })
    }

    /// Value reported for `info_nr` with `aggregation`, if present
    pub fn find(&self, info_nr: u16, aggregation: AggregationType) -> Option<f32> {
        self.items
            .iter()
            .find(|item| item.nr == info_nr && item.aggregation == aggregation)
            .map(|item| item.value)
    }

    /// Number of bytes a response with `items` items occupies
    pub fn encoded_len(items: usize) -> usize {
        Self::PREFIX_SIZE + items * MULTI_INFO_ITEM_SIZE
    }
}

/// Property data of a message read response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageResponse {
    /// Number of messages in the gateway's log
    pub message_total: u32,
    pub message_number: u16,
    /// Address of the device that raised the message
    pub source_address: u32,
    pub timestamp: u32,
    pub value: u32,
}

impl MessageResponse {
    pub const SIZE: usize = 18;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u32_le(self.message_total);
        buf.put_u16_le(self.message_number);
        buf.put_u32_le(self.source_address);
        buf.put_u32_le(self.timestamp);
        buf.put_u32_le(self.value);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        if data.len() != Self::SIZE {
            return Err(XcomError::MalformedValue(format!(
                "Message response needs {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            message_total: u32_at(0),
            message_number: u16::from_le_bytes([data[4], data[5]]),
            source_address: u32_at(6),
            timestamp: u32_at(10),
            value: u32_at(14),
        })
    }
}

/// 16 byte device GUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub fn decode(data: &[u8]) -> XcomResult<Self> {
        let bytes: [u8; 16] = data.try_into().map_err(|_| {
            XcomError::MalformedValue(format!("GUID needs 16 bytes, got {}", data.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
