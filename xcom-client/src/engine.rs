//! Request/response exchange engine
//!
//! The engine owns the transport. Every exchange goes through two
//! independent guards: the send guard serializes writes, the receive guard
//! serializes reads. Neither is held across attempts, and both are released
//! on every exit path (timeout, error or cancellation) because they are
//! plain scoped `MutexGuard`s.
//!
//! # Correlation
//!
//! With several callers in flight, the caller holding the receive guard may
//! read a response meant for another caller. Such packages are parked in a
//! small bounded queue instead of being dropped; a caller looks at the
//! parked packages first once it holds the receive guard. A parked package
//! is only ever handed to a caller whose request it correlates with, and
//! expires after one timeout.
//!
//! # Known limitation
//!
//! SCOM packages carry no transaction id. A late response nobody waits for
//! any more (its caller timed out) is parked like any other, and a later
//! identical request arriving within one timeout is answered with it
//! instead of with a fresh one. Such a stale reply would be consumed by
//! the next identical request even without parking.

use crate::config::ClientConfig;
use crate::statistics::{increment, EngineStatistics, StatisticsCounters};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use xcom_core::{XcomError, XcomResult};
use xcom_protocol::{Package, PackageDecoder, PackageReader, ReaderStatistics};
use xcom_transport::{StreamAccessor, TransportLayer};

/// Responses kept for other waiting callers
const MAX_PARKED: usize = 64;

struct Parked {
    package: Package,
    at: Instant,
}

struct ReceiveState {
    reader: PackageReader,
    parked: VecDeque<Parked>,
}

/// Sends requests and waits for their correlated responses
pub struct ExchangeEngine<T> {
    transport: T,
    send_guard: Mutex<()>,
    receive: Mutex<ReceiveState>,
    config: ClientConfig,
    cancel: CancellationToken,
    counters: StatisticsCounters,
    reader_stats: Arc<ReaderStatistics>,
}

impl<T: StreamAccessor> ExchangeEngine<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let reader_stats = Arc::new(ReaderStatistics::default());
        let decoder = PackageDecoder::with_statistics(reader_stats.clone());
        Self {
            transport,
            send_guard: Mutex::new(()),
            receive: Mutex::new(ReceiveState {
                reader: PackageReader::new(decoder, config.poll_interval),
                parked: VecDeque::new(),
            }),
            config,
            cancel: CancellationToken::new(),
            counters: StatisticsCounters::default(),
            reader_stats,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Exchange with the configured timeout and attempt count
    pub async fn exchange(&self, request: &Package) -> XcomResult<Package> {
        self.exchange_with(request, self.config.timeout, self.config.max_attempts)
            .await
    }

    /// Send `request` and wait for its response
    ///
    /// # Arguments
    /// * `timeout` - Time allowed per attempt for the matching response
    /// * `max_attempts` - Total attempts, the first one included
    ///
    /// # Errors
    /// * `ResponseIsError` when the device rejects the request (never retried)
    /// * `Timeout`, `Write` or `Read` from the last attempt once all attempts failed
    /// * `Cancelled` after [`ExchangeEngine::shutdown`]
    pub async fn exchange_with(
        &self,
        request: &Package,
        timeout: Duration,
        max_attempts: u32,
    ) -> XcomResult<Package> {
        if self.cancel.is_cancelled() {
            return Err(XcomError::Cancelled);
        }
        let frame = request.encode()?;
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Attempt {}/{}: {}", attempt, max_attempts, request);
            let err = match self.attempt(request, &frame, timeout).await {
                Ok(response) => {
                    increment(&self.counters.responses);
                    if let Err(e) = response.check_error() {
                        increment(&self.counters.error_responses);
                        debug!("Device rejected {}: {}", request, e);
                        return Err(e);
                    }
                    return Ok(response);
                }
                Err(e) => e,
            };

            self.count_failure(&err);
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                error!(
                    "Giving up on {} after {} attempts: {}",
                    request, max_attempts, err
                );
                return Err(err);
            }
            warn!("Attempt {} for {} failed, retrying: {}", attempt, request, err);
            increment(&self.counters.retries);
            attempt += 1;
        }
    }

    async fn attempt(&self, request: &Package, frame: &Bytes, timeout: Duration) -> XcomResult<Package> {
        {
            let _send = self.cancellable(self.send_guard.lock()).await?;
            increment(&self.counters.requests);
            self.cancellable(self.transport.write(frame))
                .await?
                .map_err(|e| match e {
                    XcomError::Write(_) => e,
                    other => XcomError::Write(other.to_string()),
                })?;
        }

        let mut receive = self.cancellable(self.receive.lock()).await?;
        match self
            .cancellable(tokio::time::timeout(
                timeout,
                self.receive_matching(&mut receive, request, timeout),
            ))
            .await?
        {
            Ok(result) => result,
            Err(_) => Err(XcomError::Timeout(format!(
                "No response to {} within {:?}",
                request, timeout
            ))),
        }
    }

    async fn receive_matching(
        &self,
        state: &mut ReceiveState,
        request: &Package,
        max_age: Duration,
    ) -> XcomResult<Package> {
        let now = Instant::now();
        while let Some(oldest) = state.parked.front() {
            if now.duration_since(oldest.at) < max_age {
                break;
            }
            debug!("Dropping expired parked package: {}", oldest.package);
            state.parked.pop_front();
            increment(&self.counters.discarded_packages);
        }
        if let Some(index) = state
            .parked
            .iter()
            .position(|parked| parked.package.is_response_to(request))
        {
            if let Some(parked) = state.parked.remove(index) {
                debug!("Claimed parked package: {}", parked.package);
                return Ok(parked.package);
            }
        }

        loop {
            let package = state.reader.read_package(&self.transport).await?;
            if package.is_response_to(request) {
                return Ok(package);
            }
            if !package.is_response() {
                debug!("Discarding unsolicited package: {}", package);
                increment(&self.counters.discarded_packages);
                continue;
            }
            if state.parked.len() >= MAX_PARKED {
                if let Some(evicted) = state.parked.pop_front() {
                    debug!("Parking full, dropping: {}", evicted.package);
                    increment(&self.counters.discarded_packages);
                }
            }
            debug!("Parking package for another caller: {}", package);
            increment(&self.counters.parked_packages);
            state.parked.push_back(Parked {
                package,
                at: Instant::now(),
            });
        }
    }

    /// Run `future` unless the engine is shut down first
    async fn cancellable<F: Future>(&self, future: F) -> XcomResult<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(XcomError::Cancelled),
            output = future => Ok(output),
        }
    }

    fn count_failure(&self, err: &XcomError) {
        match err {
            XcomError::Timeout(_) => increment(&self.counters.timeouts),
            XcomError::Read(_) => increment(&self.counters.read_failures),
            XcomError::Write(_) => increment(&self.counters.write_failures),
            XcomError::Cancelled => increment(&self.counters.cancelled),
            _ => {}
        }
    }

    /// Cancel in-flight exchanges and close the transport
    ///
    /// Final: exchanges started afterwards fail with `Cancelled`.
    pub async fn shutdown(&self) -> XcomResult<()> {
        self.cancel.cancel();
        self.transport.close().await?;
        info!("Exchange engine shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_connected(&self) -> bool {
        !self.is_shut_down() && !self.transport.is_closed()
    }

    pub async fn peer_address(&self) -> Option<String> {
        self.transport.peer_address().await
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.counters.snapshot(&self.reader_stats)
    }

    pub fn clear_statistics(&self) {
        self.counters.clear();
        self.reader_stats.clear();
    }
}

impl<T: TransportLayer> ExchangeEngine<T> {
    /// Open the transport and forget anything buffered from a previous link
    pub async fn open(&self) -> XcomResult<()> {
        if self.is_shut_down() {
            return Err(XcomError::Cancelled);
        }
        self.transport.open().await?;
        let mut receive = self.receive.lock().await;
        receive.reader.clear();
        receive.parked.clear();
        info!(
            "Transport open, peer {}",
            self.transport
                .peer_address()
                .await
                .unwrap_or_else(|| "unknown".to_string())
        );
        Ok(())
    }
}
