//! # Book Database
//!
//! Connection pooling and queries for the book tables:
//! `books` (ready), `book_queue` (staging) and `book_covers`.

use anyhow::{Context, Result};
use book_config::DbConfig;
use book_types::{Book, BookCover, BookFilter, BookListQuery};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            db_config.acquire_timeout_secs,
        ))
        .idle_timeout(Some(std::time::Duration::from_secs(
            db_config.idle_timeout_secs,
        )))
        .test_before_acquire(true)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Run the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

// ============================================================================
// Book tables
// ============================================================================

/// The two tables with the book row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookTable {
    /// Books admitted at a member position
    Ready,
    /// Deferred books
    Staging,
}

impl BookTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookTable::Ready => "books",
            BookTable::Staging => "book_queue",
        }
    }
}

/// Book row from either book table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookRecord {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookRecord {
    /// Build a row from a book whose identity and timestamps are already set
    pub fn from_book(book: &Book, position: i64) -> Result<Self> {
        if book.id.is_nil() {
            anyhow::bail!("book id must be assigned before storage");
        }
        Ok(Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year,
            position,
            created_at: book.created_at.context("created_at must be assigned")?,
            updated_at: book.updated_at.context("updated_at must be assigned")?,
        })
    }
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Book {
            id: record.id,
            title: record.title,
            author: record.author,
            year: record.year,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            book_cover: Vec::new(),
        }
    }
}

/// Insert a book row. Returns `false` when a row with the same id exists.
pub async fn insert_book(pool: &DbPool, table: BookTable, record: &BookRecord) -> Result<bool> {
    let query = format!(
        r#"
        INSERT INTO {} (id, title, author, year, position, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO NOTHING
        "#,
        table.as_str()
    );

    let result = sqlx::query(&query)
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.author)
        .bind(record.year)
        .bind(record.position)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert book into {}", table.as_str()))?;

    Ok(result.rows_affected() > 0)
}

/// All rows in admission order.
///
/// Admission time leads: positions restart whenever a fresh admission
/// process starts, while the rows outlive it. Position breaks ties.
pub async fn fetch_books(pool: &DbPool, table: BookTable) -> Result<Vec<BookRecord>> {
    let query = format!(
        r#"
        SELECT id, title, author, year, position, created_at, updated_at
        FROM {}
        ORDER BY created_at ASC, position ASC
        "#,
        table.as_str()
    );

    sqlx::query_as::<_, BookRecord>(&query)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to fetch books from {}", table.as_str()))
}

/// Rows matching `query`, sorted and paged the way it asks.
///
/// Ties on the sort column, and the unsorted case, fall back to admission
/// order.
pub async fn fetch_books_filtered(
    pool: &DbPool,
    table: BookTable,
    query: &BookListQuery,
) -> Result<Vec<BookRecord>> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT id, title, author, year, position, created_at, updated_at FROM {} WHERE TRUE",
        table.as_str()
    ));

    if let Some(search) = query.search.as_ref().filter(|s| !s.value.is_empty()) {
        builder
            .push(format!(" AND {} ILIKE ", search.field.column()))
            .push_bind(format!("%{}%", escape_like(&search.value)));
    }

    for filter in &query.filters {
        match filter {
            BookFilter::Title(values) if !values.is_empty() => {
                builder.push(" AND title = ANY(").push_bind(values.clone()).push(")");
            }
            BookFilter::Author(values) if !values.is_empty() => {
                builder.push(" AND author = ANY(").push_bind(values.clone()).push(")");
            }
            BookFilter::Year(values) if !values.is_empty() => {
                builder.push(" AND year = ANY(").push_bind(values.clone()).push(")");
            }
            _ => {}
        }
    }

    if let Some(range) = query.year_range {
        if let Some(from) = range.from {
            builder.push(" AND year >= ").push_bind(from);
        }
        if let Some(to) = range.to {
            builder.push(" AND year <= ").push_bind(to);
        }
    }

    builder.push(" ORDER BY ");
    if let Some(sort) = query.sort {
        builder.push(format!("{} {}, ", sort.field.column(), sort.direction.as_sql()));
    }
    builder.push("created_at ASC, position ASC");

    if let Some((offset, limit)) = query.page_bounds() {
        builder
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
    }

    builder
        .build_query_as::<BookRecord>()
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list books from {}", table.as_str()))
}

/// Escape LIKE wildcards so the search value matches literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn fetch_book_by_id(
    pool: &DbPool,
    table: BookTable,
    id: &Uuid,
) -> Result<Option<BookRecord>> {
    let query = format!(
        r#"
        SELECT id, title, author, year, position, created_at, updated_at
        FROM {}
        WHERE id = $1
        "#,
        table.as_str()
    );

    sqlx::query_as::<_, BookRecord>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to fetch book from {}", table.as_str()))
}

pub async fn delete_book(pool: &DbPool, table: BookTable, id: &Uuid) -> Result<u64> {
    let query = format!("DELETE FROM {} WHERE id = $1", table.as_str());

    let result = sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to delete book from {}", table.as_str()))?;

    Ok(result.rows_affected())
}

pub async fn delete_all_books(pool: &DbPool, table: BookTable) -> Result<u64> {
    let query = format!("DELETE FROM {}", table.as_str());

    let result = sqlx::query(&query)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to clear {}", table.as_str()))?;

    tracing::debug!(
        table = table.as_str(),
        deleted = result.rows_affected(),
        "Cleared book table"
    );

    Ok(result.rows_affected())
}

// ============================================================================
// Covers
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CoverRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CoverRecord> for BookCover {
    fn from(record: CoverRecord) -> Self {
        BookCover {
            id: record.id,
            book_id: record.book_id,
            file_name: record.file_name,
            file_url: record.file_url,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }
}

pub async fn insert_cover(pool: &DbPool, record: &CoverRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO book_covers (id, book_id, file_name, file_url, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(record.id)
    .bind(record.book_id)
    .bind(&record.file_name)
    .bind(&record.file_url)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert book cover")?;

    Ok(())
}

/// Covers of a book, newest first
pub async fn fetch_covers_by_book_id(pool: &DbPool, book_id: &Uuid) -> Result<Vec<CoverRecord>> {
    sqlx::query_as::<_, CoverRecord>(
        r#"
        SELECT id, book_id, file_name, file_url, created_at, updated_at
        FROM book_covers
        WHERE book_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(book_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch book covers")
}
