// ============================================================================
// Worker Configuration
// ============================================================================

use crate::constants::*;
use std::time::Duration;

/// Timings for the book consumer loop and the producer's shutdown
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Upper bound for a single broker poll
    pub poll_timeout: Duration,
    /// Pause after a storage failure before the message is polled again
    pub retry_delay: Duration,
    /// Deadline for flushing outstanding sends at shutdown
    pub flush_timeout: Duration,
    /// Capacity of the producer's delivery-report channel
    pub delivery_report_capacity: usize,
    /// How often the consumer logs its running totals
    pub stats_interval: Duration,
}

impl WorkerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            poll_timeout: Duration::from_millis(
                std::env::var("CONSUMER_POLL_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CONSUMER_POLL_TIMEOUT_MS),
            ),
            retry_delay: Duration::from_millis(
                std::env::var("CONSUMER_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CONSUMER_RETRY_DELAY_MS),
            ),
            flush_timeout: Duration::from_millis(
                std::env::var("PRODUCER_FLUSH_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_PRODUCER_FLUSH_TIMEOUT_MS),
            ),
            delivery_report_capacity: std::env::var("DELIVERY_REPORT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(DEFAULT_DELIVERY_REPORT_CAPACITY),
            stats_interval: Duration::from_secs(
                std::env::var("WORKER_STATS_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WORKER_STATS_INTERVAL_SECS),
            ),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(DEFAULT_CONSUMER_POLL_TIMEOUT_MS),
            retry_delay: Duration::from_millis(DEFAULT_CONSUMER_RETRY_DELAY_MS),
            flush_timeout: Duration::from_millis(DEFAULT_PRODUCER_FLUSH_TIMEOUT_MS),
            delivery_report_capacity: DEFAULT_DELIVERY_REPORT_CAPACITY,
            stats_interval: Duration::from_secs(DEFAULT_WORKER_STATS_INTERVAL_SECS),
        }
    }
}
