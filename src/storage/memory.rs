use anyhow::{bail, Result};
use async_trait::async_trait;
use book_types::{Book, BookCover, BookListQuery};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{BookStore, CoverStore};

/// Admission order: created_at, then position
type AdmissionKey = (Option<DateTime<Utc>>, i64);

#[derive(Debug, Default)]
struct BookTableState {
    /// Kept sorted by admission key
    rows: Vec<(AdmissionKey, Book)>,
    fail_stores: usize,
    store_calls: usize,
    inserts: usize,
}

/// In-process book table
///
/// Behaves like the PostgreSQL table (idempotent on id, ordered by
/// admission time then position) and can be told to fail upcoming stores.
#[derive(Debug, Default)]
pub struct MemoryBookStore {
    state: Mutex<BookTableState>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `store` fail without writing.
    pub fn fail_next_stores(&self, count: usize) {
        self.state.lock().fail_stores = count;
    }

    /// Calls to `store`, failed ones included
    pub fn store_calls(&self) -> usize {
        self.state.lock().store_calls
    }

    /// Rows actually written (duplicates and failures excluded)
    pub fn inserts(&self) -> usize {
        self.state.lock().inserts
    }

    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn store(&self, book: &mut Book, position: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.store_calls += 1;
        if state.fail_stores > 0 {
            state.fail_stores -= 1;
            bail!("Failed to insert book: injected failure");
        }

        book.fill_missing(Utc::now());
        if state.rows.iter().any(|(_, stored)| stored.id == book.id) {
            return Ok(());
        }

        let mut row = book.clone();
        row.book_cover.clear();
        // After every row with a key <= ours, so ties keep arrival order
        let key = (row.created_at, position);
        let at = state.rows.partition_point(|(k, _)| *k <= key);
        state.rows.insert(at, (key, row));
        state.inserts += 1;
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<Book>> {
        let state = self.state.lock();
        Ok(state.rows.iter().map(|(_, book)| book.clone()).collect())
    }

    async fn fetch_filtered(&self, query: &BookListQuery) -> Result<Vec<Book>> {
        let state = self.state.lock();
        Ok(query.apply(state.rows.iter().map(|(_, book)| book.clone())))
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<Book>> {
        let state = self.state.lock();
        Ok(state
            .rows
            .iter()
            .find(|(_, book)| book.id == id)
            .map(|(_, book)| book.clone()))
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock();
        let before = state.rows.len();
        state.rows.retain(|(_, book)| book.id != id);
        Ok(state.rows.len() < before)
    }

    async fn remove_all(&self) -> Result<u64> {
        let mut state = self.state.lock();
        let removed = state.rows.len() as u64;
        state.rows.clear();
        Ok(removed)
    }
}

/// In-process cover table
#[derive(Debug, Default)]
pub struct MemoryCoverStore {
    covers: Mutex<Vec<BookCover>>,
}

impl MemoryCoverStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoverStore for MemoryCoverStore {
    async fn store(&self, cover: &mut BookCover) -> Result<()> {
        let now = Utc::now();
        if cover.id.is_nil() {
            cover.id = Uuid::new_v4();
        }
        cover.created_at.get_or_insert(now);
        cover.updated_at.get_or_insert(now);

        self.covers.lock().push(cover.clone());
        Ok(())
    }

    async fn fetch_by_book_id(&self, book_id: Uuid) -> Result<Vec<BookCover>> {
        let covers = self.covers.lock();
        let mut matching: Vec<BookCover> = covers
            .iter()
            .filter(|cover| cover.book_id == book_id)
            .cloned()
            .collect();
        // Newest first; stable sort keeps later inserts ahead on equal timestamps
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
