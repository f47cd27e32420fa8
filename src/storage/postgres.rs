use anyhow::{Context, Result};
use async_trait::async_trait;
use book_db::{BookRecord, BookTable, CoverRecord, DbPool};
use book_types::{Book, BookCover, BookListQuery};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::{BookStore, CoverStore};

/// Book table in PostgreSQL
#[derive(Clone)]
pub struct PgBookStore {
    pool: DbPool,
    table: BookTable,
}

impl PgBookStore {
    /// Store for books admitted at a Fibonacci position
    pub fn ready(pool: DbPool) -> Self {
        Self {
            pool,
            table: BookTable::Ready,
        }
    }

    /// Store for deferred books
    pub fn staging(pool: DbPool) -> Self {
        Self {
            pool,
            table: BookTable::Staging,
        }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn store(&self, book: &mut Book, position: i64) -> Result<()> {
        book.fill_missing(Utc::now());
        let record = BookRecord::from_book(book, position)?;

        let inserted = book_db::insert_book(&self.pool, self.table, &record).await?;
        if !inserted {
            debug!(
                table = self.table.as_str(),
                book_id = %book.id,
                "Book already stored, skipping duplicate"
            );
        }
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Book>> {
        let records = book_db::fetch_books(&self.pool, self.table).await?;
        Ok(records.into_iter().map(Book::from).collect())
    }

    async fn fetch_filtered(&self, query: &BookListQuery) -> Result<Vec<Book>> {
        let records = book_db::fetch_books_filtered(&self.pool, self.table, query).await?;
        Ok(records.into_iter().map(Book::from).collect())
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Book>> {
        let record = book_db::fetch_book_by_id(&self.pool, self.table, &id).await?;
        Ok(record.map(Book::from))
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let deleted = book_db::delete_book(&self.pool, self.table, &id).await?;
        Ok(deleted > 0)
    }

    async fn remove_all(&self) -> Result<u64> {
        book_db::delete_all_books(&self.pool, self.table).await
    }
}

/// Cover metadata in PostgreSQL
#[derive(Clone)]
pub struct PgCoverStore {
    pool: DbPool,
}

impl PgCoverStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CoverStore for PgCoverStore {
    async fn store(&self, cover: &mut BookCover) -> Result<()> {
        let now = Utc::now();
        if cover.id.is_nil() {
            cover.id = Uuid::new_v4();
        }
        let created_at = *cover.created_at.get_or_insert(now);
        let updated_at = *cover.updated_at.get_or_insert(now);

        let record = CoverRecord {
            id: cover.id,
            book_id: cover.book_id,
            file_name: cover.file_name.clone(),
            file_url: cover.file_url.clone(),
            created_at,
            updated_at,
        };

        book_db::insert_cover(&self.pool, &record)
            .await
            .with_context(|| format!("Failed to store cover for book {}", cover.book_id))
    }

    async fn fetch_by_book_id(&self, book_id: Uuid) -> Result<Vec<BookCover>> {
        let records = book_db::fetch_covers_by_book_id(&self.pool, &book_id).await?;
        Ok(records.into_iter().map(BookCover::from).collect())
    }
}
