//! TCP transport implementation
//!
//! An Xcom-LAN gateway (Moxa NPort) can either connect to us (its preferred
//! "TCP client" configuration, we act as server) or accept our connection
//! ("TCP server" configuration, we act as client).

use crate::stream::{StreamAccessor, StreamTransport, TransportLayer};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use xcom_core::{XcomError, XcomResult};

/// Role of this side of the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpMode {
    /// Listen on `address` and accept the gateway's connection
    Server,
    /// Connect to the gateway listening on `address`
    Client,
}

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub address: SocketAddr,
    pub mode: TcpMode,
    /// Bound on connect, or on waiting for the gateway to connect
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Listen on all interfaces at `port` and wait for the gateway
    pub fn server(port: u16) -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], port)),
            mode: TcpMode::Server,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Connect to a gateway at `address`
    pub fn client(address: SocketAddr) -> Self {
        Self {
            address,
            mode: TcpMode::Client,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// TCP transport layer implementation
pub struct TcpTransport {
    settings: TcpSettings,
    listener: Mutex<Option<TcpListener>>,
    inner: StreamTransport<TcpStream>,
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            listener: Mutex::new(None),
            inner: StreamTransport::detached(),
        }
    }

    /// Create a client-mode TCP transport from an address string
    pub fn from_address(address: &str) -> XcomResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| XcomError::InvalidData(format!("Invalid TCP address: {}", e)))?;
        Ok(Self::new(TcpSettings::client(addr)))
    }

    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    /// Bind the listening socket (server mode) and return its local address
    ///
    /// Called implicitly by [`TransportLayer::open`]; calling it first lets
    /// the caller learn the port when binding to port 0.
    pub async fn listen(&self) -> XcomResult<SocketAddr> {
        let mut guard = self.listener.lock().await;
        if let Some(listener) = guard.as_ref() {
            return Ok(listener.local_addr()?);
        }
        let listener = TcpListener::bind(self.settings.address).await.map_err(|e| {
            XcomError::Connection(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("Failed to bind to {}: {}", self.settings.address, e),
            ))
        })?;
        let local = listener.local_addr()?;
        log::info!("Xcom TCP server listening on {}", local);
        *guard = Some(listener);
        Ok(local)
    }

    async fn accept(&self) -> XcomResult<(TcpStream, SocketAddr)> {
        self.listen().await?;
        let guard = self.listener.lock().await;
        let listener = guard
            .as_ref()
            .ok_or_else(|| crate::stream::not_connected("TCP listener"))?;
        let accepted = match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, listener.accept())
                .await
                .map_err(|_| {
                    XcomError::Timeout(format!(
                        "No Xcom gateway connected within {:?}",
                        timeout
                    ))
                })??,
            None => listener.accept().await?,
        };
        Ok(accepted)
    }

    async fn connect(&self) -> XcomResult<(TcpStream, SocketAddr)> {
        let address = self.settings.address;
        let stream = match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(address))
                .await
                .map_err(|_| XcomError::Timeout(format!("Connect to {} timed out", address)))??,
            None => TcpStream::connect(address).await?,
        };
        Ok((stream, address))
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&self) -> XcomResult<()> {
        if !self.inner.is_closed() {
            return Err(XcomError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let (stream, peer) = match self.settings.mode {
            TcpMode::Server => self.accept().await?,
            TcpMode::Client => self.connect().await?,
        };
        stream.set_nodelay(true)?;
        log::info!("Xcom TCP connection established with {}", peer);
        self.inner.attach(stream, Some(peer.ip().to_string())).await;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
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
        self.inner.close().await?;
        if self.listener.lock().await.take().is_some() {
            log::info!("Xcom TCP server stopped listening on {}", self.settings.address);
        }
        Ok(())
    }

    async fn peer_address(&self) -> Option<String> {
        self.inner.peer_address().await
    }
}
