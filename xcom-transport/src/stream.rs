//! Stream accessor traits for the transport layer

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, RwLock};
use xcom_core::{XcomError, XcomResult};

/// Stream accessor interface to access a physical stream to an Xcom gateway
///
/// All methods take `&self`: reading and writing may proceed concurrently
/// from different tasks. Implementations serialize concurrent reads among
/// themselves and concurrent writes among themselves.
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Read the bytes currently available, at most `max_bytes`
    ///
    /// # Returns
    ///
    /// The bytes read. An empty buffer means nothing is available right
    /// now; the caller should poll again later. A closed peer is reported
    /// as an error, never as an empty buffer.
    async fn read_available(&self, max_bytes: usize) -> XcomResult<Bytes>;

    /// Write all of `buf` to the stream and flush it
    async fn write(&self, buf: &[u8]) -> XcomResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&self) -> XcomResult<()>;

    /// Address of the remote peer, when the transport has one
    async fn peer_address(&self) -> Option<String> {
        None
    }
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection (connect, or listen and accept)
    async fn open(&self) -> XcomResult<()>;
}

#[async_trait]
impl<T: StreamAccessor + ?Sized> StreamAccessor for Box<T> {
    async fn read_available(&self, max_bytes: usize) -> XcomResult<Bytes> {
        (**self).read_available(max_bytes).await
    }

    async fn write(&self, buf: &[u8]) -> XcomResult<()> {
        (**self).write(buf).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&self) -> XcomResult<()> {
        (**self).close().await
    }

    async fn peer_address(&self) -> Option<String> {
        (**self).peer_address().await
    }
}

#[async_trait]
impl<T: TransportLayer + ?Sized> TransportLayer for Box<T> {
    async fn open(&self) -> XcomResult<()> {
        (**self).open().await
    }
}

pub(crate) fn not_connected(what: &str) -> XcomError {
    XcomError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        format!("{} not connected", what),
    ))
}

/// Transport over any `AsyncRead + AsyncWrite` byte stream
///
/// The stream is split into independently locked read and write halves.
/// It starts detached unless built with [`StreamTransport::new`]; the TCP
/// and serial transports attach their stream when opened.
pub struct StreamTransport<S> {
    reader: Mutex<Option<ReadHalf<S>>>,
    writer: Mutex<Option<WriteHalf<S>>>,
    peer: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Create a transport over an already connected stream
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            peer: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a transport without a stream
    pub fn detached() -> Self {
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            peer: RwLock::new(None),
            closed: AtomicBool::new(true),
        }
    }

    /// Attach a freshly connected stream, replacing any previous one
    pub async fn attach(&self, stream: S, peer: Option<String>) {
        let (reader, writer) = tokio::io::split(stream);
        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(writer);
        *self.peer.write().await = peer;
        self.closed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S> StreamAccessor for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read_available(&self, max_bytes: usize) -> XcomResult<Bytes> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| not_connected("Stream"))?;

        let mut buf = vec![0u8; max_bytes.max(1)];
        match reader.read(&mut buf).await {
            Ok(0) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(XcomError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Stream closed by peer",
                )))
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
            Err(e) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(XcomError::Connection(e))
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> XcomResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| not_connected("Stream"))?;
        writer.write_all(buf).await?;
        writer.flush().await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> XcomResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
        self.peer.write().await.take();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn peer_address(&self) -> Option<String> {
        self.peer.read().await.clone()
    }
}

#[async_trait]
impl<S> TransportLayer for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn open(&self) -> XcomResult<()> {
        if self.reader.lock().await.is_none() {
            return Err(not_connected("Stream"));
        }
        Ok(())
    }
}
