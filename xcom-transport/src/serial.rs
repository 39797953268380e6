//! Serial port transport implementation
//!
//! The Xcom-232i talks 38400 baud, 8 data bits, even parity, one stop bit.

use crate::stream::{StreamAccessor, StreamTransport, TransportLayer};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};
use xcom_core::{XcomError, XcomResult};

/// Baud rate of the Xcom-232i
pub const XCOM_232I_BAUD_RATE: u32 = 38400;

/// Serial port transport layer settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    /// Timeout applied by the serial driver to blocking operations
    pub timeout: Duration,
}

impl SerialSettings {
    /// Settings matching the Xcom-232i line parameters
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: XCOM_232I_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::Even,
            flow_control: FlowControl::None,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port transport layer implementation
pub struct SerialTransport {
    settings: SerialSettings,
    inner: StreamTransport<SerialStream>,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            inner: StreamTransport::detached(),
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&self) -> XcomResult<()> {
        if !self.inner.is_closed() {
            return Err(XcomError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control)
            .timeout(self.settings.timeout);

        let stream = SerialStream::open(&builder).map_err(|e| {
            XcomError::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        log::info!(
            "Opened serial port {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.inner
            .attach(stream, Some(self.settings.port_name.clone()))
            .await;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn read_available(&self, max_bytes: usize) -> XcomResult<Bytes> {
        self.inner.read_available(max_bytes).await
    }

    async fn write(&self, buf: &[u8]) -> XcomResult<()> {
        self.inner.write(buf).await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn close(&self) -> XcomResult<()> {
        self.inner.close().await
    }

    async fn peer_address(&self) -> Option<String> {
        self.inner.peer_address().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_settings() {
        let settings = SerialSettings::new("/dev/ttyUSB0");
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, XCOM_232I_BAUD_RATE);
        assert_eq!(settings.parity, Parity::Even);

        let settings = settings.with_baud_rate(9600);
        assert_eq!(settings.baud_rate, 9600);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let transport = SerialTransport::new(SerialSettings::new("/dev/does-not-exist-xcom"));
        assert!(transport.open().await.is_err());
        assert!(transport.is_closed());
    }
}
