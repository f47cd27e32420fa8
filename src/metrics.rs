use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Admissions by classification ("ready" or "deferred")
pub static ADMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("book_admissions_total", "Total number of admitted books"),
        &["class"]
    )
    .expect("Failed to register book_admissions_total metric")
});

/// Admissions that advanced the counter but could not be published
pub static ADMISSION_PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "book_admission_publish_failures_total",
        "Total number of admissions whose envelope could not be published"
    ))
    .expect("Failed to register book_admission_publish_failures_total metric")
});

/// Books written to the ready table by the consumer
pub static CONSUMER_STORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "book_consumer_stored_total",
        "Total number of books written to the ready table"
    ))
    .expect("Failed to register book_consumer_stored_total metric")
});

/// Books written to the staging table by the consumer
pub static CONSUMER_STAGED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "book_consumer_staged_total",
        "Total number of books written to the staging table"
    ))
    .expect("Failed to register book_consumer_staged_total metric")
});

pub static CONSUMER_MALFORMED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "book_consumer_malformed_total",
        "Total number of undecodable records skipped by the consumer"
    ))
    .expect("Failed to register book_consumer_malformed_total metric")
});

pub static CONSUMER_STORAGE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "book_consumer_storage_failures_total",
        "Total number of records left uncommitted after a failed write"
    ))
    .expect("Failed to register book_consumer_storage_failures_total metric")
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
