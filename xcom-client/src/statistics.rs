//! Exchange engine statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use xcom_protocol::ReaderStatistics;

/// Snapshot of the exchange engine counters
///
/// Counts attempts, not exchanges: an exchange that succeeds on its third
/// attempt adds 3 to `requests` and 2 to `retries`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatistics {
    /// Request packages written
    pub requests: u64,
    /// Matching responses received, error responses included
    pub responses: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    /// Responses carrying an error status
    pub error_responses: u64,
    pub cancelled: u64,
    /// Packages set aside for another waiting caller
    pub parked_packages: u64,
    /// Packages nobody was waiting for
    pub discarded_packages: u64,
    /// Bytes skipped while resynchronizing
    pub discarded_bytes: u64,
    /// Header or data checksum mismatches
    pub checksum_failures: u64,
}

impl EngineStatistics {
    /// Share of attempts that failed at transport level, in percent
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        let failures = self.timeouts + self.read_failures + self.write_failures;
        failures as f64 / self.requests as f64 * 100.0
    }
}

/// Live counters behind [`EngineStatistics`]
#[derive(Debug, Default)]
pub(crate) struct StatisticsCounters {
    pub requests: AtomicU64,
    pub responses: AtomicU64,
    pub retries: AtomicU64,
    pub timeouts: AtomicU64,
    pub read_failures: AtomicU64,
    pub write_failures: AtomicU64,
    pub error_responses: AtomicU64,
    pub cancelled: AtomicU64,
    pub parked_packages: AtomicU64,
    pub discarded_packages: AtomicU64,
}

pub(crate) fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatisticsCounters {
    pub fn snapshot(&self, reader: &ReaderStatistics) -> EngineStatistics {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        EngineStatistics {
            requests: load(&self.requests),
            responses: load(&self.responses),
            retries: load(&self.retries),
            timeouts: load(&self.timeouts),
            read_failures: load(&self.read_failures),
            write_failures: load(&self.write_failures),
            error_responses: load(&self.error_responses),
            cancelled: load(&self.cancelled),
            parked_packages: load(&self.parked_packages),
            discarded_packages: load(&self.discarded_packages),
            discarded_bytes: load(&reader.discarded_bytes),
            checksum_failures: load(&reader.checksum_failures),
        }
    }

    pub fn clear(&self) {
        for counter in [
            &self.requests,
            &self.responses,
            &self.retries,
            &self.timeouts,
            &self.read_failures,
            &self.write_failures,
            &self.error_responses,
            &self.cancelled,
            &self.parked_packages,
            &self.discarded_packages,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_clear() {
        let counters = StatisticsCounters::default();
        let reader = ReaderStatistics::default();
        increment(&counters.requests);
        increment(&counters.requests);
        increment(&counters.timeouts);
        reader.discarded_bytes.store(7, Ordering::Relaxed);

        let stats = counters.snapshot(&reader);
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.discarded_bytes, 7);
        assert_eq!(stats.failure_rate(), 50.0);

        counters.clear();
        assert_eq!(counters.snapshot(&ReaderStatistics::default()), EngineStatistics::default());
    }
}
