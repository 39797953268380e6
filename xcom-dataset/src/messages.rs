//! Texts of the messages devices post to the gateway's message log

use std::collections::BTreeMap;
use xcom_core::{XcomError, XcomResult};

const MESSAGES: &str = include_str!("../data/messages.json");

/// Message number to text lookup
#[derive(Debug, Clone, Default)]
pub struct MessageTable {
    texts: BTreeMap<u32, String>,
}

impl MessageTable {
    /// Table embedded in the crate
    pub fn embedded() -> XcomResult<Self> {
        Self::from_json(MESSAGES)
    }

    /// Parse a JSON object mapping message numbers to texts
    pub fn from_json(text: &str) -> XcomResult<Self> {
        let texts = serde_json::from_str(text)
            .map_err(|e| XcomError::InvalidData(format!("Invalid message table: {}", e)))?;
        Ok(Self { texts })
    }

    /// Text of message `nr`, or a placeholder for unknown numbers
    pub fn get(&self, nr: u32) -> String {
        self.texts
            .get(&nr)
            .cloned()
            .unwrap_or_else(|| format!("Unknown message {}", nr))
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
