// ============================================================================
// Pipeline Integration Tests
// ============================================================================
//
// Admission -> log -> worker -> tables, wired through the in-process log and
// in-memory tables. No broker or database needed.
//
// Run with: cargo test --test pipeline_test
//
// ============================================================================

use book_config::WorkerConfig;
use book_pipeline::admission::BookAdmission;
use book_pipeline::kafka::{BookEnvelope, EnvelopePublisher, MemoryLog};
use book_pipeline::storage::{BookStore, MemoryBookStore, MemoryCoverStore};
use book_pipeline::worker::{BookSinks, BookWorker, WorkerStats};
use book_pipeline::Book;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "topic_book_pending";

struct Pipeline {
    log: Arc<MemoryLog>,
    ready: Arc<MemoryBookStore>,
    staging: Arc<MemoryBookStore>,
    admission: BookAdmission,
}

fn pipeline(partitions: i32) -> Pipeline {
    let log = Arc::new(MemoryLog::with_partitions(partitions));
    let ready = Arc::new(MemoryBookStore::new());
    let staging = Arc::new(MemoryBookStore::new());
    let admission = BookAdmission::new(
        log.clone(),
        TOPIC,
        ready.clone(),
        staging.clone(),
        Arc::new(MemoryCoverStore::new()),
    );
    Pipeline {
        log,
        ready,
        staging,
        admission,
    }
}

fn worker_config(retry_delay: Duration) -> WorkerConfig {
    WorkerConfig {
        poll_timeout: Duration::from_millis(20),
        retry_delay,
        ..WorkerConfig::default()
    }
}

fn spawn_worker(
    p: &Pipeline,
    config: &WorkerConfig,
) -> (CancellationToken, JoinHandle<anyhow::Result<WorkerStats>>) {
    let worker = BookWorker::new(
        p.log.clone(),
        BookSinks {
            ready: p.ready.clone(),
            staging: p.staging.clone(),
        },
        TOPIC,
        config,
    );
    let shutdown = CancellationToken::new();
    let task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });
    (shutdown, task)
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

fn book(n: usize) -> Book {
    Book::new(format!("Title {}", n), format!("Author {}", n), 1990 + n as i32)
}

#[tokio::test]
async fn test_admitted_books_reach_their_tables() {
    let p = pipeline(3);
    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(10)));

    let mut results = Vec::new();
    for n in 1..=7 {
        results.push(p.admission.create(book(n)).await.unwrap());
    }

    wait_until(|| p.ready.len() + p.staging.len() == 7).await;
    wait_until(|| p.log.fully_committed(TOPIC)).await;
    shutdown.cancel();
    let stats = task.await.unwrap().unwrap();

    assert_eq!(stats.stored, 4);
    assert_eq!(stats.staged, 3);

    let ready_positions: Vec<i64> = results
        .iter()
        .filter(|r| r.is_fibonacci)
        .map(|r| r.position)
        .collect();
    assert_eq!(ready_positions, vec![1, 2, 3, 5]);

    for result in &results {
        let table = if result.is_fibonacci { &p.ready } else { &p.staging };
        let stored = table.fetch_by_id(result.book.id).await.unwrap();
        assert_eq!(stored.as_ref().map(|b| &b.title), Some(&result.book.title));
    }
}

#[tokio::test]
async fn test_storage_failure_retried_until_stored() {
    let p = pipeline(1);
    p.ready.fail_next_stores(1);

    // Long enough to observe the uncommitted state between attempts
    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(300)));

    let result = p.admission.create(book(1)).await.unwrap();
    assert!(result.is_fibonacci);

    wait_until(|| p.ready.store_calls() == 1).await;
    assert_eq!(p.ready.inserts(), 0);
    assert_eq!(p.log.committed_offset(TOPIC, 0), Some(0));

    wait_until(|| p.log.committed_offset(TOPIC, 0) == Some(1)).await;
    shutdown.cancel();
    let stats = task.await.unwrap().unwrap();

    assert_eq!(stats.storage_failures, 1);
    assert_eq!(stats.stored, 1);
    assert_eq!(p.ready.store_calls(), 2);
    assert_eq!(p.ready.inserts(), 1);
    assert!(p.ready.fetch_by_id(result.book.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_malformed_record_committed_without_storage() {
    let p = pipeline(1);
    p.log
        .publish_raw(TOPIC, "broken", br#"{"book": "not an object"}"#.to_vec())
        .await
        .unwrap();

    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(10)));

    wait_until(|| p.log.committed_offset(TOPIC, 0) == Some(1)).await;
    shutdown.cancel();
    let stats = task.await.unwrap().unwrap();

    assert_eq!(stats.malformed, 1);
    assert_eq!(p.ready.store_calls(), 0);
    assert_eq!(p.staging.store_calls(), 0);
}

#[tokio::test]
async fn test_pending_queue_in_admission_order_and_reset() {
    let p = pipeline(3);
    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(10)));

    let mut deferred = Vec::new();
    for n in 1..=12 {
        let result = p.admission.create(book(n)).await.unwrap();
        if result.queued {
            deferred.push(result.book.id);
        }
    }
    // Positions 4, 6, 7, 9, 10, 11, 12
    assert_eq!(deferred.len(), 7);

    wait_until(|| p.staging.len() == deferred.len()).await;
    wait_until(|| p.log.fully_committed(TOPIC)).await;
    shutdown.cancel();
    task.await.unwrap().unwrap();

    // Different keys land on different partitions, so storage order is
    // arbitrary; the queue still reads back by admission position.
    let queue: Vec<_> = p
        .admission
        .pending_queue()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(queue, deferred);

    p.admission.reset().await.unwrap();
    assert_eq!(p.admission.status().counter, 0);
    assert!(p.admission.pending_queue().await.unwrap().is_empty());

    let next = p.admission.create(book(13)).await.unwrap();
    assert_eq!(next.position, 1);
}

#[tokio::test]
async fn test_pending_queue_spans_admission_runs() {
    let p = pipeline(3);
    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(10)));

    // A second process run: fresh counter, same log and tables
    let second_run = BookAdmission::new(
        p.log.clone(),
        TOPIC,
        p.ready.clone(),
        p.staging.clone(),
        Arc::new(MemoryCoverStore::new()),
    );

    let mut deferred = Vec::new();
    for admission in [&p.admission, &second_run] {
        for n in 1..=7 {
            let result = admission.create(book(n)).await.unwrap();
            if result.queued {
                deferred.push(result.book.id);
            }
        }
    }
    // Positions 4, 6, 7 of each run
    assert_eq!(deferred.len(), 6);

    wait_until(|| p.staging.len() == deferred.len()).await;
    wait_until(|| p.log.fully_committed(TOPIC)).await;
    shutdown.cancel();
    task.await.unwrap().unwrap();

    let queue: Vec<_> = p
        .admission
        .pending_queue()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(queue, deferred);
}

#[tokio::test]
async fn test_restart_redelivers_uncommitted_without_duplicates() {
    let p = pipeline(1);

    // Stored but never committed, as if the consumer died before committing
    let mut book = book(1);
    book.stamp_new(Utc::now());
    let envelope = BookEnvelope::new(book.clone(), 1, true);
    p.log
        .publish(TOPIC, &envelope.partition_key(), &envelope)
        .await
        .unwrap();
    p.ready.store(&mut book.clone(), 1).await.unwrap();
    p.log.restart();

    let (shutdown, task) = spawn_worker(&p, &worker_config(Duration::from_millis(10)));
    wait_until(|| p.log.fully_committed(TOPIC)).await;
    shutdown.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(p.ready.store_calls(), 2);
    assert_eq!(p.ready.inserts(), 1);
    assert_eq!(p.ready.fetch_all().await.unwrap(), vec![book]);
}

#[tokio::test]
async fn test_concurrent_admissions_get_distinct_positions() {
    let p = Arc::new(pipeline(3));

    let tasks: Vec<_> = (0..50)
        .map(|n| {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.admission.create(book(n)).await.unwrap().position })
        })
        .collect();

    let mut positions = Vec::new();
    for task in tasks {
        positions.push(task.await.unwrap());
    }
    positions.sort_unstable();

    assert_eq!(positions, (1..=50).collect::<Vec<i64>>());
    assert_eq!(p.log.records(TOPIC).len(), 50);
}
