// ============================================================================
// Kafka Integration
// ============================================================================
//
// Admission publishes every classified book to one topic; the book consumer
// reads it back and stores each book in the table its classification picks.
//
// The two seams are traits so the worker and the admission service run the
// same way against a live broker (producer.rs / consumer.rs) and against the
// in-process log (memory.rs).
//
// ============================================================================

pub mod config;
pub mod consumer;
pub mod memory;
pub mod metrics;
pub mod producer;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use consumer::KafkaLogConsumer;
pub use memory::MemoryLog;
pub use producer::KafkaPublisher;
pub use types::BookEnvelope;

/// One record read from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` when the record was produced without a payload
    pub payload: Option<Vec<u8>>,
}

/// Producer side of the log
#[async_trait]
pub trait EnvelopePublisher: Send + Sync {
    /// Hand a payload to the log for asynchronous delivery.
    ///
    /// Returns once the record is enqueued locally. Records with the same key
    /// land on the same partition.
    async fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    /// Serialize `envelope` and publish it.
    async fn publish(&self, topic: &str, key: &str, envelope: &BookEnvelope) -> Result<()> {
        let payload = envelope.to_bytes()?;
        self.publish_raw(topic, key, payload).await
    }
}

/// Consumer side of the log, with manual offset management
#[async_trait]
pub trait LogConsumer: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Wait up to `timeout` for the next record. `Ok(None)` means nothing arrived.
    async fn poll(&self, timeout: Duration) -> Result<Option<LogRecord>>;

    /// Mark `record` (and everything before it on its partition) as processed.
    async fn commit(&self, record: &LogRecord) -> Result<()>;

    /// Move the read position back to `record` so the next poll returns it again.
    async fn rewind(&self, record: &LogRecord) -> Result<()>;
}
