use anyhow::{Context, Result};
use async_trait::async_trait;
use book_config::KafkaConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

use super::config::create_client_config;
use super::{LogConsumer, LogRecord};

/// Kafka consumer for the book worker
///
/// This consumer is configured for:
/// - Manual offset commits (after successful storage)
/// - Consumer group coordination (several book consumers can share a topic)
/// - Reading from the beginning when the group has no committed offset
pub struct KafkaLogConsumer {
    consumer: StreamConsumer,
}

impl KafkaLogConsumer {
    /// Create a new Kafka consumer. Subscribing happens separately.
    ///
    /// # Arguments
    /// * `config` - Kafka connection details and consumer group.
    ///
    /// # Configuration
    /// - `enable.auto.commit=false`: Manual offset management
    /// - `auto.offset.reset=earliest`: Read from beginning on first start
    /// - `session.timeout.ms=30000`: 30s session timeout
    /// - `heartbeat.interval.ms=3000`: 3s heartbeat interval
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Initializing Kafka consumer"
        );

        let consumer: StreamConsumer = create_client_config(config)
            .set("group.id", &config.consumer_group)
            // Offset management
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            // Performance
            .set("fetch.min.bytes", "1")
            .set("fetch.wait.max.ms", "500")
            .set("max.partition.fetch.bytes", "1048576")
            // Session management
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .context("Failed to create Kafka consumer")?;

        Ok(Self { consumer })
    }
}

#[async_trait]
impl LogConsumer for KafkaLogConsumer {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.consumer
            .subscribe(&[topic])
            .with_context(|| format!("Failed to subscribe to Kafka topic '{}'", topic))?;
        info!(topic = %topic, "Kafka consumer subscribed");
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<LogRecord>> {
        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => return Ok(None),
            Ok(received) => received.context("Kafka consumer error")?,
        };

        Ok(Some(LogRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
        }))
    }

    /// Commits `offset + 1`, the next offset the group should read.
    async fn commit(&self, record: &LogRecord) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .context("Failed to build commit offset list")?;

        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .context("Failed to commit offset")?;

        debug!(
            partition = record.partition,
            offset = record.offset,
            "Offset committed"
        );
        Ok(())
    }

    async fn rewind(&self, record: &LogRecord) -> Result<()> {
        self.consumer
            .seek(
                &record.topic,
                record.partition,
                Offset::Offset(record.offset),
                Duration::from_secs(5),
            )
            .context("Failed to seek back to uncommitted record")?;

        debug!(
            partition = record.partition,
            offset = record.offset,
            "Rewound to uncommitted record"
        );
        Ok(())
    }
}
