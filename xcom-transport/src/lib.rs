//! Transport layer module for the Xcom/SCOM protocol
//!
//! This crate provides the byte-stream contract consumed by the protocol
//! engine together with TCP (client or server role), UDP and serial
//! implementations. Any `AsyncRead + AsyncWrite` stream can be used through
//! [`StreamTransport`].

pub mod serial;
pub mod stream;
pub mod tcp;
pub mod udp;

pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, StreamTransport, TransportLayer};
pub use tcp::{TcpMode, TcpSettings, TcpTransport};
pub use udp::{MAX_UDP_PAYLOAD_SIZE, UdpSettings, UdpTransport};
pub use xcom_core::{XcomError, XcomResult};
