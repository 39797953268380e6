//! Batch request and response types

use std::fmt;
use xcom_core::{AggregationType, ItemFailure, Value, XcomResult};
use xcom_dataset::{Address, Datapoint};
use xcom_protocol::ResponseFlags;

/// Where an item is read from or written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One device (or a single-address family)
    Address(Address),
    /// Server side reduction over the datapoint's family, infos only
    Aggregation(AggregationType),
}

impl Target {
    /// Resolve a designator such as `"XT1"` or `"BSP"`
    pub fn resolve(designator: &str) -> XcomResult<Self> {
        Ok(Target::Address(Address::resolve(designator)?))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Address(address) => write!(f, "{}", address),
            Target::Aggregation(aggregation) => write!(f, "{}", aggregation),
        }
    }
}

/// One datapoint access of a [`ValuesRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesItem {
    pub datapoint: Datapoint,
    pub target: Target,
    /// Value to write; `None` reads
    pub value: Option<Value>,
}

impl ValuesItem {
    pub fn read(datapoint: &Datapoint, address: Address) -> Self {
        Self {
            datapoint: datapoint.clone(),
            target: Target::Address(address),
            value: None,
        }
    }

    pub fn aggregated(datapoint: &Datapoint, aggregation: AggregationType) -> Self {
        Self {
            datapoint: datapoint.clone(),
            target: Target::Aggregation(aggregation),
            value: None,
        }
    }

    pub fn write(datapoint: &Datapoint, address: Address, value: Value) -> Self {
        Self {
            datapoint: datapoint.clone(),
            target: Target::Address(address),
            value: Some(value),
        }
    }

    pub fn is_write(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self.target, Target::Aggregation(_))
    }
}

/// Ordered datapoint accesses submitted together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuesRequest {
    pub items: Vec<ValuesItem>,
}

impl ValuesRequest {
    pub fn new(items: Vec<ValuesItem>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: ValuesItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<ValuesItem> for ValuesRequest {
    fn from_iter<I: IntoIterator<Item = ValuesItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Outcome of one [`ValuesItem`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseItem {
    pub datapoint: Datapoint,
    pub target: Target,
    /// Value read (or written), or why this item failed
    pub result: Result<Value, ItemFailure>,
}

impl ResponseItem {
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Results of a [`ValuesRequest`], in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuesResponse {
    pub items: Vec<ResponseItem>,
    /// Flags of the last multi-info response
    pub flags: Option<u32>,
    /// Gateway time of the last multi-info response
    pub datetime: Option<u32>,
    /// Union of the status bits of every response received
    pub status: ResponseFlags,
}

impl ValuesResponse {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that failed
    pub fn failures(&self) -> usize {
        self.items.iter().filter(|item| !item.is_ok()).count()
    }
}
