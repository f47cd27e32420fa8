// ============================================================================
// Book Storage
// ============================================================================
//
// Two book tables share one row layout:
// - ready   - books admitted at a Fibonacci position
// - staging - deferred books, read back as the pending queue
//
// Covers hang off ready books by book id.
//
// postgres.rs - tables in PostgreSQL (book-db crate)
// memory.rs   - in-process stores with failure injection
//
// ============================================================================

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use book_types::{Book, BookCover, BookListQuery};
use uuid::Uuid;

pub use memory::{MemoryBookStore, MemoryCoverStore};
pub use postgres::{PgBookStore, PgCoverStore};

/// One book table
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Persist `book` at admission `position`.
    ///
    /// Missing identity and timestamps are filled in on `book` first. Storing
    /// an id that is already present is a no-op, so a redelivered envelope
    /// never creates a second row.
    async fn store(&self, book: &mut Book, position: i64) -> Result<()>;

    /// All books in admission order
    async fn fetch_all(&self) -> Result<Vec<Book>>;

    /// Books matching `query`, sorted and paged
    async fn fetch_filtered(&self, query: &BookListQuery) -> Result<Vec<Book>>;

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Book>>;

    /// Returns whether a row was removed
    async fn remove(&self, id: Uuid) -> Result<bool>;

    /// Returns how many rows were removed
    async fn remove_all(&self) -> Result<u64>;
}

/// Cover metadata keyed by book id
#[async_trait]
pub trait CoverStore: Send + Sync {
    async fn store(&self, cover: &mut BookCover) -> Result<()>;

    /// Covers of `book_id`, newest first
    async fn fetch_by_book_id(&self, book_id: Uuid) -> Result<Vec<BookCover>>;
}
