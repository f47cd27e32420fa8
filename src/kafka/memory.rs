// ============================================================================
// In-Process Log
// ============================================================================
//
// A partitioned, offset-committing log that lives in memory. It implements
// both sides of the Kafka seam so the admission service and the book worker
// can run end to end without a broker (tests, local runs).
//
// Semantics follow a single consumer-group member:
// - records with the same key land on the same partition
// - each partition keeps a read position and a committed offset
// - restart() moves every read position back to the committed offset,
//   the way a restarted consumer resumes from the group's commit
//
// ============================================================================

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{EnvelopePublisher, LogConsumer, LogRecord};

const DEFAULT_PARTITIONS: i32 = 3;

#[derive(Debug, Default)]
struct Partition {
    records: Vec<LogRecord>,
    /// Next offset handed out by poll
    position: i64,
    /// Next offset the group would resume from
    committed: i64,
}

#[derive(Debug, Default)]
struct LogState {
    topics: HashMap<String, Vec<Partition>>,
    subscription: Option<String>,
    fail_publishes: usize,
    fail_polls: usize,
    fail_commits: usize,
}

impl LogState {
    fn topic_mut(&mut self, topic: &str, partitions: i32) -> &mut Vec<Partition> {
        self.topics.entry(topic.to_string()).or_insert_with(|| {
            (0..partitions).map(|_| Partition::default()).collect()
        })
    }
}

/// In-memory partitioned log
#[derive(Debug)]
pub struct MemoryLog {
    partitions: i32,
    state: Mutex<LogState>,
    appended: Notify,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            partitions: partitions.max(1),
            state: Mutex::new(LogState::default()),
            appended: Notify::new(),
        }
    }

    /// Partition a key maps to
    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as i32
    }

    /// Make the next `count` publishes fail before anything is appended.
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.lock().fail_publishes = count;
    }

    /// Make the next `count` polls fail, as a broker-reported error would.
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().fail_polls = count;
    }

    /// Make the next `count` commits fail without moving the committed offset.
    pub fn fail_next_commits(&self, count: usize) {
        self.state.lock().fail_commits = count;
    }

    /// Offset the group would resume from on `partition`, if the topic exists
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map(|p| p.committed)
    }

    /// Whether every record on `topic` has been committed
    pub fn fully_committed(&self, topic: &str) -> bool {
        let state = self.state.lock();
        state.topics.get(topic).map_or(true, |partitions| {
            partitions
                .iter()
                .all(|p| p.committed == p.records.len() as i64)
        })
    }

    /// Every record on `topic`, partition by partition
    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|p| p.records.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop uncommitted read progress, as a consumer restart would.
    pub fn restart(&self) {
        let mut state = self.state.lock();
        for partitions in state.topics.values_mut() {
            for partition in partitions.iter_mut() {
                partition.position = partition.committed;
            }
        }
    }

    fn next_record(&self) -> Result<Option<LogRecord>> {
        let mut state = self.state.lock();
        let Some(topic) = state.subscription.clone() else {
            bail!("poll called before subscribe");
        };

        let partitions = state.topic_mut(&topic, self.partitions);
        for partition in partitions.iter_mut() {
            if let Some(record) = partition.records.get(partition.position as usize) {
                let record = record.clone();
                partition.position += 1;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvelopePublisher for MemoryLog {
    async fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let partition = self.partition_for(key);
        {
            let mut state = self.state.lock();
            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                bail!("Kafka enqueue failed: injected failure");
            }

            let partitions = state.topic_mut(topic, self.partitions);
            let log = &mut partitions[partition as usize];
            log.records.push(LogRecord {
                topic: topic.to_string(),
                partition,
                offset: log.records.len() as i64,
                key: Some(key.as_bytes().to_vec()),
                payload: Some(payload),
            });
        }

        self.appended.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl LogConsumer for MemoryLog {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.topic_mut(topic, self.partitions);
        state.subscription = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<LogRecord>> {
        {
            let mut state = self.state.lock();
            if state.fail_polls > 0 {
                state.fail_polls -= 1;
                bail!("Kafka receive error: injected failure");
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Registered before the check, so an append in between still wakes us
            let appended = self.appended.notified();

            if let Some(record) = self.next_record()? {
                return Ok(Some(record));
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, record: &LogRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            bail!("Failed to commit offset: injected failure");
        }

        let Some(partition) = state
            .topics
            .get_mut(&record.topic)
            .and_then(|partitions| partitions.get_mut(record.partition as usize))
        else {
            bail!("Unknown partition {}:{}", record.topic, record.partition);
        };
        partition.committed = partition.committed.max(record.offset + 1);
        Ok(())
    }

    async fn rewind(&self, record: &LogRecord) -> Result<()> {
        let mut state = self.state.lock();
        let Some(partition) = state
            .topics
            .get_mut(&record.topic)
            .and_then(|partitions| partitions.get_mut(record.partition as usize))
        else {
            bail!("Unknown partition {}:{}", record.topic, record.partition);
        };
        partition.position = record.offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "topic_book_pending";

    #[tokio::test]
    async fn test_same_key_same_partition_in_order() {
        let log = MemoryLog::new();
        log.subscribe(TOPIC).await.unwrap();

        for payload in ["one", "two", "three"] {
            log.publish_raw(TOPIC, "book-1", payload.as_bytes().to_vec())
                .await
                .unwrap();
        }

        let expected_partition = log.partition_for("book-1");
        for (offset, payload) in ["one", "two", "three"].iter().enumerate() {
            let record = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
            assert_eq!(record.partition, expected_partition);
            assert_eq!(record.offset, offset as i64);
            assert_eq!(record.payload.as_deref(), Some(payload.as_bytes()));
        }
        assert!(log.poll(Duration::from_millis(10)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_poll_before_subscribe_fails() {
        let log = MemoryLog::new();
        assert!(log.poll(Duration::from_millis(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_publish() {
        let log = std::sync::Arc::new(MemoryLog::new());
        log.subscribe(TOPIC).await.unwrap();

        let publisher = std::sync::Arc::clone(&log);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher
                .publish_raw(TOPIC, "k", b"late".to_vec())
                .await
                .unwrap();
        });

        let record = log.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(record.unwrap().payload.as_deref(), Some(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_restart_resumes_from_commit() {
        let log = MemoryLog::with_partitions(1);
        log.subscribe(TOPIC).await.unwrap();
        log.publish_raw(TOPIC, "k", b"a".to_vec()).await.unwrap();
        log.publish_raw(TOPIC, "k", b"b".to_vec()).await.unwrap();

        let first = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        log.commit(&first).await.unwrap();
        let second = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(log.committed_offset(TOPIC, 0), Some(1));

        // Second record was read but never committed
        log.restart();
        let again = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again, second);
        assert!(!log.fully_committed(TOPIC));

        log.commit(&again).await.unwrap();
        assert!(log.fully_committed(TOPIC));
    }

    #[tokio::test]
    async fn test_rewind_redelivers() {
        let log = MemoryLog::with_partitions(1);
        log.subscribe(TOPIC).await.unwrap();
        log.publish_raw(TOPIC, "k", b"a".to_vec()).await.unwrap();

        let record = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        log.rewind(&record).await.unwrap();
        let again = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let log = MemoryLog::with_partitions(1);
        log.subscribe(TOPIC).await.unwrap();

        log.fail_next_publishes(1);
        assert!(log.publish_raw(TOPIC, "k", b"a".to_vec()).await.is_err());
        assert!(log.records(TOPIC).is_empty());
        log.publish_raw(TOPIC, "k", b"a".to_vec()).await.unwrap();

        log.fail_next_polls(1);
        assert!(log.poll(Duration::from_millis(10)).await.is_err());
        let record = log.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        log.fail_next_commits(1);
        assert!(log.commit(&record).await.is_err());
        assert_eq!(log.committed_offset(TOPIC, 0), Some(0));
        log.commit(&record).await.unwrap();
        assert_eq!(log.committed_offset(TOPIC, 0), Some(1));
    }
}
