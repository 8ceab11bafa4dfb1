//! Transport metrics for observability
//!
//! Failures inside queued sends never reach the producer, so these counters
//! (together with the diagnostic log) are how an operator sees them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing transport health
///
/// # Example
///
/// ```
/// use log_intake_transport::TransportMetrics;
///
/// let metrics = TransportMetrics::new();
///
/// metrics.record_sent();
/// metrics.record_send_failure();
///
/// assert_eq!(metrics.records_sent(), 1);
/// assert_eq!(metrics.send_failures(), 1);
/// assert_eq!(metrics.failure_rate(), 50.0);
/// ```
#[derive(Debug)]
pub struct TransportMetrics {
    /// Records fully written to the connection
    records_sent: AtomicU64,

    /// Records whose write failed even after the reconnect retry
    send_failures: AtomicU64,

    /// Records dropped by the overflow policy
    dropped_count: AtomicU64,

    /// Entries rejected because a field could not be encoded
    serialization_failures: AtomicU64,

    /// Number of times the queue was found full
    queue_full_events: AtomicU64,

    /// Number of times a producer blocked waiting for queue space
    block_events: AtomicU64,

    /// Successful reconnects after a failed write
    reconnects: AtomicU64,

    /// Jobs that panicked inside a worker
    job_panics: AtomicU64,
}

impl TransportMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            records_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            serialization_failures: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            job_panics: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn records_sent(&self) -> u64 {
        self.records_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn serialization_failures(&self) -> u64 {
        self.serialization_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn job_panics(&self) -> u64 {
        self.job_panics.load(Ordering::Relaxed)
    }

    /// Record a delivered record
    #[inline]
    pub fn record_sent(&self) -> u64 {
        self.records_sent.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a record lost to a network failure
    #[inline]
    pub fn record_send_failure(&self) -> u64 {
        self.send_failures.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped record; returns the previous count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped_count.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_serialization_failure(&self) -> u64 {
        self.serialization_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_queue_full(&self) -> u64 {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_reconnect(&self) -> u64 {
        self.reconnects.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_job_panic(&self) -> u64 {
        self.job_panics.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of attempted records that never reached the wire, as a
    /// percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been attempted.
    pub fn failure_rate(&self) -> f64 {
        let lost = (self.send_failures() + self.dropped_count()) as f64;
        let total = self.records_sent() as f64 + lost;
        if total == 0.0 {
            0.0
        } else {
            (lost / total) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.records_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.dropped_count.store(0, Ordering::Relaxed);
        self.serialization_failures.store(0, Ordering::Relaxed);
        self.queue_full_events.store(0, Ordering::Relaxed);
        self.block_events.store(0, Ordering::Relaxed);
        self.reconnects.store(0, Ordering::Relaxed);
        self.job_panics.store(0, Ordering::Relaxed);
    }
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TransportMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            records_sent: AtomicU64::new(self.records_sent()),
            send_failures: AtomicU64::new(self.send_failures()),
            dropped_count: AtomicU64::new(self.dropped_count()),
            serialization_failures: AtomicU64::new(self.serialization_failures()),
            queue_full_events: AtomicU64::new(self.queue_full_events()),
            block_events: AtomicU64::new(self.block_events()),
            reconnects: AtomicU64::new(self.reconnects()),
            job_panics: AtomicU64::new(self.job_panics()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = TransportMetrics::new();
        assert_eq!(metrics.records_sent(), 0);
        assert_eq!(metrics.send_failures(), 0);
        assert_eq!(metrics.dropped_count(), 0);
        assert_eq!(metrics.reconnects(), 0);
        assert_eq!(metrics.job_panics(), 0);
    }

    #[test]
    fn test_record_returns_previous_value() {
        let metrics = TransportMetrics::new();
        assert_eq!(metrics.record_dropped(), 0);
        assert_eq!(metrics.record_dropped(), 1);
        assert_eq!(metrics.dropped_count(), 2);
    }

    #[test]
    fn test_failure_rate() {
        let metrics = TransportMetrics::new();
        assert_eq!(metrics.failure_rate(), 0.0);

        for _ in 0..90 {
            metrics.record_sent();
        }
        for _ in 0..5 {
            metrics.record_send_failure();
        }
        for _ in 0..5 {
            metrics.record_dropped();
        }

        let rate = metrics.failure_rate();
        assert!((9.9..=10.1).contains(&rate), "Failure rate was {}", rate);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = TransportMetrics::new();
        metrics.record_sent();
        metrics.record_reconnect();
        metrics.record_queue_full();

        metrics.reset();

        assert_eq!(metrics.records_sent(), 0);
        assert_eq!(metrics.reconnects(), 0);
        assert_eq!(metrics.queue_full_events(), 0);
    }

    #[test]
    fn test_metrics_clone_is_snapshot() {
        let metrics = TransportMetrics::new();
        metrics.record_sent();
        metrics.record_sent();

        let snapshot = metrics.clone();
        metrics.record_sent();

        assert_eq!(snapshot.records_sent(), 2);
        assert_eq!(metrics.records_sent(), 3);
    }
}
