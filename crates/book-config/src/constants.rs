// ============================================================================
// Configuration Constants
// ============================================================================

// Kafka defaults
pub(crate) const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";
pub(crate) const DEFAULT_KAFKA_CLIENT_ID: &str = "beta-book-api";
pub(crate) const DEFAULT_KAFKA_TOPIC_BOOK_PENDING: &str = "topic_book_pending";
pub(crate) const DEFAULT_KAFKA_CONSUMER_GROUP_ID: &str = "beta-book-consumer-group";

// Consumer loop timings (in milliseconds)
pub(crate) const DEFAULT_CONSUMER_POLL_TIMEOUT_MS: u64 = 1000;
// Pause after a storage failure before polling the rewound message again
pub(crate) const DEFAULT_CONSUMER_RETRY_DELAY_MS: u64 = 100;

// Producer shutdown: bounded flush of outstanding sends
pub(crate) const DEFAULT_PRODUCER_FLUSH_TIMEOUT_MS: u64 = 5000;
pub(crate) const DEFAULT_DELIVERY_REPORT_CAPACITY: usize = 1024;

pub(crate) const DEFAULT_WORKER_STATS_INTERVAL_SECS: u64 = 30;
