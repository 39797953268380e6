//! Resynchronizing package reader
//!
//! The transports deliver an unframed byte stream. [`PackageDecoder`] scans
//! it for a start byte, validates header and data checksums, and on any
//! failure drops a single byte and scans again. Only when no valid package
//! shows up within [`MAX_LOOKAHEAD`] discarded bytes does it give up with
//! [`XcomError::Read`].

use crate::header::{FrameHeader, HEADER_SIZE, START_BYTE};
use crate::package::Package;
use crate::service::SERVICE_HEADER_SIZE;
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use xcom_core::{XcomError, XcomResult};
use xcom_transport::StreamAccessor;

/// Discarded bytes tolerated before resynchronization is reported as failed
pub const MAX_LOOKAHEAD: usize = 4096;

/// Bytes requested from the transport per read
const READ_CHUNK: usize = 1024;

/// Counters shared between a reader and whoever reports on it
#[derive(Debug, Default)]
pub struct ReaderStatistics {
    pub packages: AtomicU64,
    pub discarded_bytes: AtomicU64,
    pub checksum_failures: AtomicU64,
    pub resync_failures: AtomicU64,
}

impl ReaderStatistics {
    pub fn clear(&self) {
        self.packages.store(0, Ordering::Relaxed);
        self.discarded_bytes.store(0, Ordering::Relaxed);
        self.checksum_failures.store(0, Ordering::Relaxed);
        self.resync_failures.store(0, Ordering::Relaxed);
    }
}

/// Incremental package decoder over a byte buffer
#[derive(Debug)]
pub struct PackageDecoder {
    discarded: usize,
    max_lookahead: usize,
    stats: Arc<ReaderStatistics>,
}

impl PackageDecoder {
    pub fn new() -> Self {
        Self::with_statistics(Arc::new(ReaderStatistics::default()))
    }

    pub fn with_statistics(stats: Arc<ReaderStatistics>) -> Self {
        Self {
            discarded: 0,
            max_lookahead: MAX_LOOKAHEAD,
            stats,
        }
    }

    pub fn with_max_lookahead(mut self, max_lookahead: usize) -> Self {
        self.max_lookahead = max_lookahead;
        self
    }

    pub fn statistics(&self) -> &Arc<ReaderStatistics> {
        &self.stats
    }

    /// Bytes dropped since the last successfully decoded package
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Forget any resynchronization progress
    pub fn reset(&mut self) {
        self.discarded = 0;
    }

    /// Decode the next package from the front of `buf`
    ///
    /// Consumed bytes (the package and any garbage in front of it) are
    /// removed from `buf`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when `buf` holds no complete package yet.
    pub fn decode(&mut self, buf: &mut BytesMut) -> XcomResult<Option<Package>> {
        loop {
            self.check_lookahead()?;

            match buf.iter().position(|&b| b == START_BYTE) {
                Some(0) => {}
                Some(index) => {
                    self.discard(buf, index);
                    continue;
                }
                None => {
                    let len = buf.len();
                    self.discard(buf, len);
                    self.check_lookahead()?;
                    return Ok(None);
                }
            }

            if buf.len() < HEADER_SIZE {
                return Ok(None);
            }

            let header = match FrameHeader::decode(&buf[..HEADER_SIZE]) {
                Ok(header) if header.data_length as usize >= SERVICE_HEADER_SIZE => header,
                Ok(header) => {
                    log::debug!("Dropping frame with short data length {}", header.data_length);
                    self.discard(buf, 1);
                    continue;
                }
                Err(e) => {
                    self.stats.checksum_failures.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Resynchronizing: {}", e);
                    self.discard(buf, 1);
                    continue;
                }
            };

            let frame_size = header.frame_size();
            if buf.len() < frame_size {
                return Ok(None);
            }

            match Package::decode(&buf[..frame_size]) {
                Ok(package) => {
                    buf.advance(frame_size);
                    if self.discarded > 0 {
                        log::warn!(
                            "Resynchronized after discarding {} bytes",
                            self.discarded
                        );
                    }
                    self.discarded = 0;
                    self.stats.packages.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(package));
                }
                Err(e) => {
                    self.stats.checksum_failures.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Resynchronizing: {}", e);
                    self.discard(buf, 1);
                }
            }
        }
    }

    fn discard(&mut self, buf: &mut BytesMut, count: usize) {
        if count == 0 {
            return;
        }
        buf.advance(count);
        self.discarded += count;
        self.stats
            .discarded_bytes
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn check_lookahead(&mut self) -> XcomResult<()> {
        if self.discarded > self.max_lookahead {
            let discarded = self.discarded;
            self.discarded = 0;
            self.stats.resync_failures.fetch_add(1, Ordering::Relaxed);
            return Err(XcomError::Read(format!(
                "No valid package found in {} bytes",
                discarded
            )));
        }
        Ok(())
    }
}

impl Default for PackageDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads packages from a transport, buffering partial input between calls
#[derive(Debug)]
pub struct PackageReader {
    buffer: BytesMut,
    decoder: PackageDecoder,
    poll_interval: Duration,
}

impl PackageReader {
    pub fn new(decoder: PackageDecoder, poll_interval: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK * 2),
            decoder,
            poll_interval,
        }
    }

    pub fn decoder(&self) -> &PackageDecoder {
        &self.decoder
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered input, e.g. after the transport was reopened
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.decoder.reset();
    }

    /// Read the next valid package from `stream`
    ///
    /// Waits as long as it takes; callers bound the wait with a timeout.
    /// Dropping the returned future loses no data: bytes already received
    /// stay buffered for the next call. Transport errors are reported as
    /// [`XcomError::Read`].
    pub async fn read_package<S>(&mut self, stream: &S) -> XcomResult<Package>
    where
        S: StreamAccessor + ?Sized,
    {
        loop {
            if let Some(package) = self.decoder.decode(&mut self.buffer)? {
                return Ok(package);
            }

            let chunk = stream
                .read_available(READ_CHUNK)
                .await
                .map_err(|e| match e {
                    XcomError::Read(_) => e,
                    other => XcomError::Read(other.to_string()),
                })?;
            if chunk.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            } else {
                self.buffer.extend_from_slice(&chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use xcom_core::FailureKind;

    fn response_bytes(nr: u16, value: f32) -> Bytes {
        Package::read_info(101, nr)
            .response_with(0, Bytes::copy_from_slice(&value.to_le_bytes()))
            .encode()
            .unwrap()
    }

    #[test]
    fn test_garbage_before_package() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x00, 0x13, 0xAA, 0xAA, 0x42, 0xFF]);
        buf.extend_from_slice(&response_bytes(3023, 1500.0));

        let mut decoder = PackageDecoder::new();
        let package = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(package.service.object_id, 3023);
        assert!(buf.is_empty());
        assert_eq!(decoder.discarded(), 0);
        assert_eq!(
            decoder.statistics().discarded_bytes.load(Ordering::Relaxed),
            6
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_partial_package_waits_for_more() {
        let bytes = response_bytes(3000, 48.5);
        let mut decoder = PackageDecoder::new();
        let mut buf = BytesMut::new();
        for (i, b) in bytes.iter().enumerate() {
            buf.extend_from_slice(&[*b]);
            let result = decoder.decode(&mut buf).unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none());
            } else {
                assert_eq!(result.unwrap().service.object_id, 3000);
            }
        }
    }

    #[test]
    fn test_corrupted_package_then_valid_one() {
        let mut corrupted = response_bytes(3000, 1.0).to_vec();
        let last = corrupted.len() - 3;
        corrupted[last] ^= 0x40;

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&corrupted);
        buf.extend_from_slice(&response_bytes(3001, 2.0));

        let mut decoder = PackageDecoder::new();
        let package = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(package.service.object_id, 3001);
        assert!(decoder.statistics().checksum_failures.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_lookahead_exhausted_is_read_failure() {
        let mut decoder = PackageDecoder::new().with_max_lookahead(16);
        let mut buf = BytesMut::from(&[0x55u8; 17][..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Read);
        assert_eq!(decoder.discarded(), 0);
    }

    #[tokio::test]
    async fn test_reader_over_split_stream() {
        let bytes = response_bytes(3023, 1500.0);
        let (head, tail) = bytes.split_at(5);
        let mock = tokio_test::io::Builder::new()
            .read(&[0xDE, 0xAD])
            .read(head)
            .read(tail)
            .build();
        let stream = xcom_transport::StreamTransport::new(mock);

        let mut reader = PackageReader::new(PackageDecoder::new(), Duration::from_millis(1));
        let package = reader.read_package(&stream).await.unwrap();
        assert_eq!(package.service.object_id, 3023);
        assert_eq!(&package.data()[..], &1500.0f32.to_le_bytes());
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_reader_maps_eof_to_read_failure() {
        let mock = tokio_test::io::Builder::new().read(&[0xAA, 0x00]).build();
        let stream = xcom_transport::StreamTransport::new(mock);
        let mut reader = PackageReader::new(PackageDecoder::new(), Duration::from_millis(1));
        let err = reader.read_package(&stream).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Read);
        assert_eq!(reader.buffered(), 2);
    }
}
