use anyhow::{Context, Result};
use async_trait::async_trait;
use book_config::{KafkaConfig, WorkerConfig};
use parking_lot::Mutex;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::create_client_config;
use super::metrics;
use super::EnvelopePublisher;

/// Delivery future waiting for its broker acknowledgment
struct PendingDelivery {
    delivery: DeliveryFuture,
    topic: String,
    key: String,
    enqueued_at: Instant,
}

/// Kafka producer for admitted book envelopes
///
/// `publish_raw` only waits for the local enqueue. The delivery future of
/// every record goes onto a bounded channel that a background task drains,
/// so broker failures show up in logs and metrics instead of in the
/// request path. When that channel is full the report is dropped and
/// counted; the record itself is still delivered.
///
/// Call [`KafkaPublisher::close`] on shutdown to flush what is still queued.
pub struct KafkaPublisher {
    producer: FutureProducer,
    reports: Mutex<Option<mpsc::Sender<PendingDelivery>>>,
    report_task: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaPublisher {
    /// Create the producer and spawn its delivery-report task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `config` - Kafka connection and producer settings.
    /// * `worker` - Supplies the delivery-report channel capacity.
    ///
    /// # Configuration
    /// - `acks`: from `KAFKA_PRODUCER_ACKS`, "all" by default.
    /// - `enable.idempotence`: no duplicates from producer retries.
    /// - `linger.ms`: small batching window.
    pub fn new(config: &KafkaConfig, worker: &WorkerConfig) -> Result<Self> {
        info!("Initializing Kafka producer...");

        let producer: FutureProducer = create_client_config(config)
            // Reliability settings
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                config.producer_enable_idempotence.to_string(),
            )
            .set("max.in.flight.requests.per.connection", "5")
            // Performance settings
            .set("linger.ms", config.producer_linger_ms.to_string())
            .set("batch.size", "16384")
            // Timeout settings
            .set("request.timeout.ms", "30000")
            .set("message.timeout.ms", "120000")
            .create()
            .context("Failed to create Kafka producer")?;

        let (tx, rx) = mpsc::channel(worker.delivery_report_capacity.max(1));
        let report_task = tokio::spawn(drain_delivery_reports(rx));

        info!(
            brokers = %config.brokers,
            client_id = %config.client_id,
            acks = %config.producer_acks,
            "Kafka producer initialized"
        );

        Ok(Self {
            producer,
            reports: Mutex::new(Some(tx)),
            report_task: Mutex::new(Some(report_task)),
        })
    }

    /// Flush queued records and stop the delivery-report task.
    ///
    /// Both the flush and the wait for the report task are bounded by
    /// `timeout`. Publishing after `close` fails.
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        // Dropping the last sender lets the report task finish once the
        // reports already queued are drained.
        drop(self.reports.lock().take());

        info!("Flushing Kafka producer (timeout: {:?})", timeout);
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .context("Flush task panicked")?;

        let report_task = self.report_task.lock().take();
        if let Some(mut handle) = report_task {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(joined) => joined.context("Delivery report task panicked")?,
                Err(_) => {
                    warn!("Delivery report task still busy after {:?}; aborting it", timeout);
                    handle.abort();
                }
            }
        }

        flushed.context("Failed to flush Kafka producer")?;
        info!("Kafka producer closed");
        Ok(())
    }
}

#[async_trait]
impl EnvelopePublisher for KafkaPublisher {
    async fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        // Clone the sender so the lock is not held across the await below
        let reports = self
            .reports
            .lock()
            .clone()
            .context("Kafka publisher is closed")?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        let delivery = match self.producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((kafka_err, _record)) => {
                metrics::KAFKA_PRODUCE_FAILURE.inc();
                error!(
                    error = %kafka_err,
                    topic = %topic,
                    key = %key,
                    "Failed to enqueue record"
                );
                return Err(anyhow::anyhow!("Kafka enqueue failed: {}", kafka_err));
            }
        };
        metrics::KAFKA_PRODUCE_ENQUEUED.inc();

        let pending = PendingDelivery {
            delivery,
            topic: topic.to_string(),
            key: key.to_string(),
            enqueued_at: Instant::now(),
        };
        match reports.try_send(pending) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::KAFKA_DELIVERY_UNTRACKED.inc();
                warn!(
                    topic = %topic,
                    key = %key,
                    "Delivery report queue full, outcome of this record will not be logged"
                );
            }
            Err(TrySendError::Closed(_)) => {
                return Err(anyhow::anyhow!("Delivery report task has stopped"));
            }
        }

        debug!(topic = %topic, key = %key, "Record enqueued");
        Ok(())
    }
}

/// Log and count the outcome of every enqueued record.
///
/// Runs until every sender is dropped and the queued reports are drained.
async fn drain_delivery_reports(mut rx: mpsc::Receiver<PendingDelivery>) {
    let mut delivered: u64 = 0;
    let mut failed: u64 = 0;

    while let Some(pending) = rx.recv().await {
        let latency = pending.enqueued_at.elapsed();

        match pending.delivery.await {
            Ok(Ok((partition, offset))) => {
                delivered += 1;
                metrics::KAFKA_DELIVERY_SUCCESS.inc();
                metrics::KAFKA_DELIVERY_LATENCY.observe(latency.as_secs_f64());
                debug!(
                    topic = %pending.topic,
                    key = %pending.key,
                    partition = partition,
                    offset = offset,
                    latency_ms = latency.as_millis(),
                    "Record delivered"
                );
            }
            Ok(Err((kafka_err, _message))) => {
                failed += 1;
                metrics::KAFKA_DELIVERY_FAILURE.inc();
                error!(
                    error = %kafka_err,
                    topic = %pending.topic,
                    key = %pending.key,
                    latency_ms = latency.as_millis(),
                    "Record delivery failed"
                );
            }
            Err(_canceled) => {
                failed += 1;
                metrics::KAFKA_DELIVERY_FAILURE.inc();
                warn!(
                    topic = %pending.topic,
                    key = %pending.key,
                    "Delivery report dropped before completion"
                );
            }
        }
    }

    info!(delivered = delivered, failed = failed, "Delivery report task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        // Producer creation does not contact the broker
        let publisher =
            KafkaPublisher::new(&KafkaConfig::default(), &WorkerConfig::default()).unwrap();

        // Without a broker the flush may time out; close still returns
        let closed = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.close(Duration::from_millis(200)),
        )
        .await;
        assert!(closed.is_ok());

        let result = publisher
            .publish_raw("topic_book_pending", "key", b"{}".to_vec())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_full_report_queue_does_not_block_publish() {
        // Nothing listens on this port, so no report completes
        let kafka = KafkaConfig {
            brokers: "127.0.0.1:1".to_string(),
            ..KafkaConfig::default()
        };
        let worker = WorkerConfig {
            delivery_report_capacity: 1,
            ..WorkerConfig::default()
        };
        let publisher = KafkaPublisher::new(&kafka, &worker).unwrap();

        let published = tokio::time::timeout(Duration::from_secs(5), async {
            for n in 0..5 {
                publisher
                    .publish_raw("topic_book_pending", &format!("key-{}", n), b"{}".to_vec())
                    .await?;
            }
            anyhow::Ok(())
        })
        .await;
        assert!(matches!(published, Ok(Ok(()))));

        let _ = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.close(Duration::from_millis(200)),
        )
        .await;
    }
}
