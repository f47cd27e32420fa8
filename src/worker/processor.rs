// ============================================================================
// Record Processor
// ============================================================================
//
// Turns one log record back into a stored book.
//
// Commit policy:
// - Stored / Staged -> commit offset
// - Malformed       -> commit offset (the payload can never succeed)
// - Err(..)         -> DO NOT commit; the record is read again
//
// ============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::kafka::{BookEnvelope, LogRecord};
use crate::storage::BookStore;

/// Where a classified book is written
#[derive(Clone)]
pub struct BookSinks {
    /// Books admitted at a Fibonacci position
    pub ready: Arc<dyn BookStore>,
    /// Deferred books
    pub staging: Arc<dyn BookStore>,
}

/// Result of processing one log record
///
/// Every variant is final for the record, so its offset is committed.
/// Storage failures come back as `Err` from [`process_record`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// Written to the ready table
    Stored { position: i64 },
    /// Written to the staging table
    Staged { position: i64 },
    /// Payload could not be decoded
    Malformed { reason: String },
}

/// Decode `record` and store its book in the table picked by its classification.
///
/// # Returns
/// `Err` only when the chosen table rejected the write.
pub async fn process_record(sinks: &BookSinks, record: &LogRecord) -> Result<ProcessResult> {
    let Some(payload) = record.payload.as_deref() else {
        warn!(
            partition = record.partition,
            offset = record.offset,
            "Record without payload"
        );
        return Ok(ProcessResult::Malformed {
            reason: "empty payload".to_string(),
        });
    };

    let envelope = match BookEnvelope::from_bytes(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Malformed book envelope"
            );
            return Ok(ProcessResult::Malformed {
                reason: format!("{:#}", e),
            });
        }
    };

    let BookEnvelope {
        mut book,
        position,
        is_fibonacci,
    } = envelope;

    if is_fibonacci {
        sinks
            .ready
            .store(&mut book, position)
            .await
            .context("Failed to store ready book")?;
        debug!(book_id = %book.id, position = position, "Book stored");
        Ok(ProcessResult::Stored { position })
    } else {
        sinks
            .staging
            .store(&mut book, position)
            .await
            .context("Failed to stage book")?;
        debug!(book_id = %book.id, position = position, "Book staged");
        Ok(ProcessResult::Staged { position })
    }
}
