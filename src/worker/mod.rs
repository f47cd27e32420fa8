// ============================================================================
// Book Worker
// ============================================================================
//
// The consumer loop. Reads classified books from the log and stores each one
// in the ready or staging table.
//
// Phases: Subscribed -> Polling -> {Idle | Processing} -> Polling -> ... -> Stopped
//
// - subscription failure aborts startup
// - poll errors are logged and the loop continues
// - a record is committed only once it is stored, or once it is known to be
//   undecodable
// - after a failed write the record is rewound and read again on a later poll
//
// processor.rs - decode + route + store for a single record
//
// ============================================================================

pub mod processor;

use anyhow::{Context, Result};
use book_config::WorkerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::kafka::metrics as kafka_metrics;
use crate::kafka::{EnvelopePublisher, LogConsumer, LogRecord};
use crate::metrics;

pub use processor::{process_record, BookSinks, ProcessResult};

/// Where the worker currently is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Starting,
    Subscribed,
    Polling,
    Idle,
    Processing,
    Stopped,
}

/// Running totals for one `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub polled: u64,
    pub stored: u64,
    pub staged: u64,
    pub malformed: u64,
    pub storage_failures: u64,
    pub commit_failures: u64,
    pub poll_errors: u64,
}

/// Topic that receives undecodable payloads before they are skipped
pub struct DeadLetter {
    pub publisher: Arc<dyn EnvelopePublisher>,
    pub topic: String,
}

pub struct BookWorker {
    consumer: Arc<dyn LogConsumer>,
    sinks: BookSinks,
    topic: String,
    dead_letter: Option<DeadLetter>,
    poll_timeout: Duration,
    retry_delay: Duration,
    stats_interval: Duration,
    phase: watch::Sender<WorkerPhase>,
}

impl BookWorker {
    /// # Arguments
    /// * `consumer` - Log the records are read from.
    /// * `sinks` - Ready and staging tables.
    /// * `topic` - Topic to subscribe to.
    /// * `config` - Poll timeout, retry delay and stats interval.
    pub fn new(
        consumer: Arc<dyn LogConsumer>,
        sinks: BookSinks,
        topic: impl Into<String>,
        config: &WorkerConfig,
    ) -> Self {
        let (phase, _) = watch::channel(WorkerPhase::Starting);
        Self {
            consumer,
            sinks,
            topic: topic.into(),
            dead_letter: None,
            poll_timeout: config.poll_timeout,
            retry_delay: config.retry_delay,
            stats_interval: config.stats_interval,
            phase,
        }
    }

    pub fn with_dead_letter(mut self, dead_letter: DeadLetter) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    /// Follow the worker's phase changes
    pub fn phases(&self) -> watch::Receiver<WorkerPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.send_replace(phase);
    }

    /// Run the consumer loop until `shutdown` is cancelled.
    ///
    /// Returns an error only when the subscription fails. A record being
    /// processed when `shutdown` fires is finished first; nothing queued
    /// behind it is drained.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<WorkerStats> {
        self.consumer
            .subscribe(&self.topic)
            .await
            .with_context(|| format!("Failed to subscribe to '{}'", self.topic))?;
        self.set_phase(WorkerPhase::Subscribed);

        info!(
            topic = %self.topic,
            poll_timeout_ms = self.poll_timeout.as_millis(),
            dead_letter = self.dead_letter.as_ref().map(|d| d.topic.as_str()),
            "Book worker started"
        );

        let mut stats = WorkerStats::default();
        let mut last_report = Instant::now();

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            self.set_phase(WorkerPhase::Polling);

            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.consumer.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => self.set_phase(WorkerPhase::Idle),
                Ok(Some(record)) => {
                    self.set_phase(WorkerPhase::Processing);
                    stats.polled += 1;
                    self.handle_record(&record, &mut stats, &shutdown).await;
                }
                Err(e) => {
                    stats.poll_errors += 1;
                    kafka_metrics::KAFKA_CONSUME_FAILURE.inc();
                    warn!(error = %e, "Poll failed, continuing");
                    self.set_phase(WorkerPhase::Idle);
                    self.pause(&shutdown).await;
                }
            }

            if last_report.elapsed() >= self.stats_interval {
                log_stats(&stats);
                last_report = Instant::now();
            }
        }

        self.set_phase(WorkerPhase::Stopped);
        log_stats(&stats);
        info!("Book worker stopped");
        Ok(stats)
    }

    async fn handle_record(
        &self,
        record: &LogRecord,
        stats: &mut WorkerStats,
        shutdown: &CancellationToken,
    ) {
        let result = match process_record(&self.sinks, record).await {
            Ok(result) => result,
            Err(e) => {
                stats.storage_failures += 1;
                metrics::CONSUMER_STORAGE_FAILURES.inc();
                error!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %format!("{:#}", e),
                    "Storage failed, leaving record uncommitted"
                );

                if let Err(e) = self.consumer.rewind(record).await {
                    error!(
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Failed to rewind to uncommitted record"
                    );
                }
                self.pause(shutdown).await;
                return;
            }
        };

        match &result {
            ProcessResult::Stored { .. } => {
                stats.stored += 1;
                metrics::CONSUMER_STORED.inc();
            }
            ProcessResult::Staged { .. } => {
                stats.staged += 1;
                metrics::CONSUMER_STAGED.inc();
            }
            ProcessResult::Malformed { reason } => {
                stats.malformed += 1;
                metrics::CONSUMER_MALFORMED.inc();
                self.forward_dead_letter(record, reason).await;
            }
        }

        if let Err(e) = self.consumer.commit(record).await {
            stats.commit_failures += 1;
            kafka_metrics::KAFKA_COMMIT_FAILURE.inc();
            error!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Offset commit failed"
            );
        }
    }

    /// Best effort: a failed forward is logged and the record is still skipped.
    async fn forward_dead_letter(&self, record: &LogRecord, reason: &str) {
        let Some(dead_letter) = &self.dead_letter else {
            return;
        };

        let key = record
            .key
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let payload = record.payload.clone().unwrap_or_default();

        match dead_letter
            .publisher
            .publish_raw(&dead_letter.topic, &key, payload)
            .await
        {
            Ok(()) => info!(
                dlq_topic = %dead_letter.topic,
                partition = record.partition,
                offset = record.offset,
                reason = %reason,
                "Malformed record forwarded to dead-letter topic"
            ),
            Err(e) => error!(
                dlq_topic = %dead_letter.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to forward malformed record"
            ),
        }
    }

    /// Sleep for the retry delay unless shutdown comes first.
    async fn pause(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.retry_delay) => {}
        }
    }
}

fn log_stats(stats: &WorkerStats) {
    info!(
        polled = stats.polled,
        stored = stats.stored,
        staged = stats.staged,
        malformed = stats.malformed,
        storage_failures = stats.storage_failures,
        commit_failures = stats.commit_failures,
        poll_errors = stats.poll_errors,
        "Book worker stats"
    );

    // Process-wide counters, admission and Kafka client included
    match metrics::gather_metrics() {
        Ok(snapshot) => debug!(metrics = %snapshot, "Metrics snapshot"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::{BookEnvelope, MemoryLog};
    use crate::storage::{BookStore, MemoryBookStore};
    use book_types::Book;
    use chrono::Utc;

    const TOPIC: &str = "topic_book_pending";

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_timeout: Duration::from_millis(20),
            retry_delay: Duration::from_millis(10),
            ..WorkerConfig::default()
        }
    }

    struct Harness {
        log: Arc<MemoryLog>,
        ready: Arc<MemoryBookStore>,
        staging: Arc<MemoryBookStore>,
        worker: BookWorker,
    }

    fn harness() -> Harness {
        let log = Arc::new(MemoryLog::with_partitions(1));
        let ready = Arc::new(MemoryBookStore::new());
        let staging = Arc::new(MemoryBookStore::new());
        let worker = BookWorker::new(
            log.clone(),
            BookSinks {
                ready: ready.clone(),
                staging: staging.clone(),
            },
            TOPIC,
            &fast_config(),
        );
        Harness {
            log,
            ready,
            staging,
            worker,
        }
    }

    async fn publish(log: &MemoryLog, position: i64, is_fibonacci: bool) -> Book {
        let mut book = Book::new(format!("Book {}", position), "Author", 2000);
        book.stamp_new(Utc::now());
        let envelope = BookEnvelope::new(book.clone(), position, is_fibonacci);
        log.publish(TOPIC, &envelope.partition_key(), &envelope)
            .await
            .unwrap();
        book
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_routes_and_commits() {
        let Harness {
            log,
            ready,
            staging,
            worker,
        } = harness();

        let member = publish(&log, 3, true).await;
        let deferred = publish(&log, 4, false).await;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until(|| log.fully_committed(TOPIC)).await;
        shutdown.cancel();
        let stats = task.await.unwrap().unwrap();

        assert_eq!(stats.stored, 1);
        assert_eq!(stats.staged, 1);
        assert!(ready.fetch_by_id(member.id).await.unwrap().is_some());
        assert!(staging.fetch_by_id(deferred.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_phases_end_in_stopped() {
        let Harness { worker, .. } = harness();
        let mut phases = worker.phases();
        assert_eq!(*phases.borrow(), WorkerPhase::Starting);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        phases
            .wait_for(|phase| matches!(phase, WorkerPhase::Polling | WorkerPhase::Idle))
            .await
            .unwrap();
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(*phases.borrow_and_update(), WorkerPhase::Stopped);
    }

    #[tokio::test]
    async fn test_commit_failure_is_not_retried_inline() {
        let Harness {
            log, ready, worker, ..
        } = harness();
        log.fail_next_commits(1);
        publish(&log, 1, true).await;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until(|| ready.inserts() == 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        let stats = task.await.unwrap().unwrap();

        assert_eq!(stats.commit_failures, 1);
        assert_eq!(ready.store_calls(), 1);
        assert_eq!(log.committed_offset(TOPIC, 0), Some(0));
    }

    #[tokio::test]
    async fn test_malformed_forwarded_to_dead_letter() {
        let Harness {
            log,
            ready,
            staging,
            worker,
        } = harness();
        let dead_letters = Arc::new(MemoryLog::with_partitions(1));
        let worker = worker.with_dead_letter(DeadLetter {
            publisher: dead_letters.clone(),
            topic: "topic_book_dlq".to_string(),
        });

        log.publish_raw(TOPIC, "bad", b"not an envelope".to_vec())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        wait_until(|| log.fully_committed(TOPIC)).await;
        shutdown.cancel();
        let stats = task.await.unwrap().unwrap();

        assert_eq!(stats.malformed, 1);
        assert_eq!(ready.store_calls() + staging.store_calls(), 0);

        let forwarded = dead_letters.records("topic_book_dlq");
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].payload.as_deref(), Some(&b"not an envelope"[..]));
    }

    #[tokio::test]
    async fn test_poll_errors_do_not_stop_the_loop() {
        let Harness {
            log, ready, worker, ..
        } = harness();
        log.fail_next_polls(3);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { worker.run(shutdown).await }
        });

        let member = publish(&log, 2, true).await;
        wait_until(|| log.fully_committed(TOPIC) && ready.inserts() == 1).await;
        shutdown.cancel();
        let stats = task.await.unwrap().unwrap();

        assert_eq!(stats.poll_errors, 3);
        assert_eq!(stats.stored, 1);
        assert!(ready.fetch_by_id(member.id).await.unwrap().is_some());
        assert_eq!(log.committed_offset(TOPIC, 0), Some(1));
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_fatal() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl LogConsumer for Unreachable {
            async fn subscribe(&self, _topic: &str) -> Result<()> {
                anyhow::bail!("broker unreachable")
            }
            async fn poll(&self, _timeout: Duration) -> Result<Option<LogRecord>> {
                Ok(None)
            }
            async fn commit(&self, _record: &LogRecord) -> Result<()> {
                Ok(())
            }
            async fn rewind(&self, _record: &LogRecord) -> Result<()> {
                Ok(())
            }
        }

        let worker = BookWorker::new(
            Arc::new(Unreachable),
            BookSinks {
                ready: Arc::new(MemoryBookStore::new()),
                staging: Arc::new(MemoryBookStore::new()),
            },
            TOPIC,
            &fast_config(),
        );

        assert!(worker.run(CancellationToken::new()).await.is_err());
    }
}
