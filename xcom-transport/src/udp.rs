//! UDP transport implementation

use crate::stream::{not_connected, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock};
use xcom_core::{XcomError, XcomResult};

/// Maximum UDP payload size
pub const MAX_UDP_PAYLOAD_SIZE: usize = 65507;

/// UDP transport layer settings
#[derive(Debug, Clone)]
pub struct UdpSettings {
    /// Address of the gateway; datagrams from any other source are dropped
    pub remote_address: SocketAddr,
    /// Local port to bind, 0 for an ephemeral port
    pub local_port: u16,
    /// Bound on sending one datagram
    pub timeout: Option<Duration>,
}

impl UdpSettings {
    /// Create new UDP settings
    pub fn new(remote_address: SocketAddr) -> Self {
        Self {
            remote_address,
            local_port: 0,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// UDP transport layer implementation
///
/// Datagrams are presented as a byte stream: a datagram larger than the
/// caller's read size is kept and handed out by subsequent reads.
pub struct UdpTransport {
    socket: RwLock<Option<Arc<UdpSocket>>>,
    settings: UdpSettings,
    closed: AtomicBool,
    leftover: Mutex<BytesMut>,
}

impl UdpTransport {
    /// Create a new UDP transport layer
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            socket: RwLock::new(None),
            settings,
            closed: AtomicBool::new(true),
            leftover: Mutex::new(BytesMut::new()),
        }
    }

    /// Create UDP transport from address string
    pub fn from_address(address: &str) -> XcomResult<Self> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| XcomError::InvalidData(format!("Invalid UDP address: {}", e)))?;
        Ok(Self::new(UdpSettings::new(addr)))
    }

    /// Local address of the bound socket
    pub async fn local_addr(&self) -> XcomResult<SocketAddr> {
        let socket = self.socket().await?;
        Ok(socket.local_addr()?)
    }

    async fn socket(&self) -> XcomResult<Arc<UdpSocket>> {
        self.socket
            .read()
            .await
            .clone()
            .ok_or_else(|| not_connected("UDP socket"))
    }

    /// Wait for the next datagram from the gateway
    async fn recv_from_remote(&self, socket: &UdpSocket) -> XcomResult<Bytes> {
        let mut buf = vec![0u8; MAX_UDP_PAYLOAD_SIZE];
        loop {
            let (len, addr) = socket.recv_from(&mut buf).await?;
            if addr == self.settings.remote_address {
                buf.truncate(len);
                return Ok(Bytes::from(buf));
            }
            log::debug!("Dropping {} byte datagram from unexpected peer {}", len, addr);
        }
    }
}

#[async_trait]
impl TransportLayer for UdpTransport {
    async fn open(&self) -> XcomResult<()> {
        let mut guard = self.socket.write().await;
        if guard.is_some() {
            return Err(XcomError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let local = SocketAddr::from(([0, 0, 0, 0], self.settings.local_port));
        let socket = UdpSocket::bind(local).await?;
        log::info!(
            "Xcom UDP socket bound to {}, gateway at {}",
            socket.local_addr()?,
            self.settings.remote_address
        );
        *guard = Some(Arc::new(socket));
        self.leftover.lock().await.clear();
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for UdpTransport {
    async fn read_available(&self, max_bytes: usize) -> XcomResult<Bytes> {
        let mut leftover = self.leftover.lock().await;
        if leftover.is_empty() {
            let socket = self.socket().await?;
            let datagram = self.recv_from_remote(&socket).await?;
            leftover.extend_from_slice(&datagram);
        }
        let take = leftover.len().min(max_bytes.max(1));
        Ok(leftover.split_to(take).freeze())
    }

    async fn write(&self, buf: &[u8]) -> XcomResult<()> {
        let socket = self.socket().await?;
        let remote = self.settings.remote_address;

        let mut remaining = buf;
        while !remaining.is_empty() {
            let to_send = remaining.len().min(MAX_UDP_PAYLOAD_SIZE);
            let packet = &remaining[..to_send];

            let sent = match self.settings.timeout {
                Some(timeout) => tokio::time::timeout(timeout, socket.send_to(packet, remote))
                    .await
                    .map_err(|_| XcomError::Write(format!("Send to {} timed out", remote)))??,
                None => socket.send_to(packet, remote).await?,
            };
            remaining.advance(sent);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> XcomResult<()> {
        self.socket.write().await.take();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn peer_address(&self) -> Option<String> {
        Some(self.settings.remote_address.ip().to_string())
    }
}
