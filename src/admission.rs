// ============================================================================
// Book Admission
// ============================================================================
//
// Entry point for creating books. Each request:
// 1. takes the next counter position and classifies it
// 2. gets a fresh id and timestamps, and settles the pending set, in the
//    same tracker step
// 3. is published to the pending topic (publish failure fails the request)
// 4. reports its classification; the consumer stores it later
//
// A failed publish does not hand its position back. The counter may skip
// positions that never reach the log. Its pending-set change is undone.
//
// ============================================================================

use book_error::{AppError, AppResult};
use book_types::{Book, BookCover, BookListQuery};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::kafka::{BookEnvelope, EnvelopePublisher};
use crate::metrics;
use crate::sequence::{Admission, SequenceTracker, TrackerStatus};
use crate::storage::{BookStore, CoverStore};

/// Outcome of one create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateBookResult {
    pub book: Book,
    pub position: i64,
    pub is_fibonacci: bool,
    /// `true` when the book was deferred to the staging table
    pub queued: bool,
    pub processed_count: usize,
    /// Deferred books released by this admission, oldest first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processed_books: Vec<Book>,
}

/// Admission service shared by every request task
pub struct BookAdmission {
    tracker: SequenceTracker<Book>,
    publisher: Arc<dyn EnvelopePublisher>,
    topic: String,
    ready: Arc<dyn BookStore>,
    staging: Arc<dyn BookStore>,
    covers: Arc<dyn CoverStore>,
}

impl BookAdmission {
    /// # Arguments
    /// * `publisher` - Log the classified books are published to.
    /// * `topic` - Pending topic name.
    /// * `ready` - Table of books admitted at a Fibonacci position.
    /// * `staging` - Table of deferred books.
    /// * `covers` - Cover metadata of ready books.
    pub fn new(
        publisher: Arc<dyn EnvelopePublisher>,
        topic: impl Into<String>,
        ready: Arc<dyn BookStore>,
        staging: Arc<dyn BookStore>,
        covers: Arc<dyn CoverStore>,
    ) -> Self {
        Self {
            tracker: SequenceTracker::new(),
            publisher,
            topic: topic.into(),
            ready,
            staging,
            covers,
        }
    }

    /// Classify `book` and publish it for asynchronous storage.
    ///
    /// Invalid books are rejected before the counter moves. Any id or
    /// timestamps on `book` are replaced.
    pub async fn create(&self, mut book: Book) -> AppResult<CreateBookResult> {
        book.validate()
            .map_err(|reason| AppError::Validation(reason.to_string()))?;

        // Identity and timestamps are assigned under the tracker lock, so
        // created_at follows admission order across concurrent requests.
        let (admission, book, processed_books) = self.tracker.admit(|_| {
            book.stamp_new(Utc::now());
            book
        });
        let Admission {
            position,
            is_fibonacci,
        } = admission;

        info!(
            position = position,
            is_fibonacci = is_fibonacci,
            book_id = %book.id,
            "Book admitted"
        );

        let envelope = BookEnvelope::new(book, position, is_fibonacci);
        if let Err(e) = self
            .publisher
            .publish(&self.topic, &envelope.partition_key(), &envelope)
            .await
        {
            let book_id = envelope.book.id;
            self.tracker
                .withdraw(admission, processed_books, |pending| pending.id == book_id);

            metrics::ADMISSION_PUBLISH_FAILURES.inc();
            error!(
                position = position,
                book_id = %book_id,
                error = %format!("{:#}", e),
                "Failed to publish book"
            );
            return Err(AppError::Kafka(format!("{:#}", e)));
        }

        let book = envelope.book;
        let class = if is_fibonacci { "ready" } else { "deferred" };
        metrics::ADMISSIONS_TOTAL.with_label_values(&[class]).inc();

        info!(
            position = position,
            book_id = %book.id,
            queued = !is_fibonacci,
            released = processed_books.len(),
            "Book published (stored by consumer)"
        );

        Ok(CreateBookResult {
            book,
            position,
            is_fibonacci,
            queued: !is_fibonacci,
            processed_count: processed_books.len(),
            processed_books,
        })
    }

    pub fn status(&self) -> TrackerStatus {
        self.tracker.snapshot()
    }

    /// Deferred books admitted since the last Fibonacci position, not yet released
    pub fn pending_books(&self) -> Vec<Book> {
        self.tracker.peek_pending()
    }

    /// Books in the staging table, in admission order
    pub async fn pending_queue(&self) -> AppResult<Vec<Book>> {
        self.staging.fetch_all().await.map_err(storage_error)
    }

    /// Counter back to zero, pending set and staging table cleared.
    pub async fn reset(&self) -> AppResult<()> {
        self.tracker.reset();

        let cleared = self.staging.remove_all().await.map_err(|e| {
            error!(error = %format!("{:#}", e), "Failed to clear book queue");
            storage_error(e)
        })?;

        info!(cleared = cleared, "Tracker reset and book queue cleared");
        Ok(())
    }

    /// Books in the ready table matching `query`
    pub async fn ready_books(&self, query: &BookListQuery) -> AppResult<Vec<Book>> {
        self.ready.fetch_filtered(query).await.map_err(storage_error)
    }

    /// A ready book with its covers attached, newest cover first
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        let mut book = self
            .ready
            .fetch_by_id(id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| AppError::NotFound(format!("book {}", id)))?;

        book.book_cover = self
            .covers
            .fetch_by_book_id(id)
            .await
            .map_err(storage_error)?;
        Ok(book)
    }

    /// Record cover metadata for a ready book.
    pub async fn add_cover(
        &self,
        book_id: Uuid,
        file_name: impl Into<String>,
        file_url: impl Into<String>,
    ) -> AppResult<BookCover> {
        if self
            .ready
            .fetch_by_id(book_id)
            .await
            .map_err(storage_error)?
            .is_none()
        {
            return Err(AppError::NotFound(format!("book {}", book_id)));
        }

        let mut cover = BookCover {
            book_id,
            file_name: file_name.into(),
            file_url: file_url.into(),
            ..Default::default()
        };
        self.covers
            .store(&mut cover)
            .await
            .map_err(storage_error)?;
        Ok(cover)
    }

    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        let removed = self.ready.remove(id).await.map_err(storage_error)?;
        if !removed {
            return Err(AppError::NotFound(format!("book {}", id)));
        }
        info!(book_id = %id, "Book removed");
        Ok(())
    }
}

fn storage_error(e: anyhow::Error) -> AppError {
    AppError::Storage(format!("{:#}", e))
}
