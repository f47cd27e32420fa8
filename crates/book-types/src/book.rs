use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Book
// ============================================================================

/// A book submitted for admission.
///
/// `id` is nil until an identity is assigned. Admission assigns a fresh one
/// for the envelope; storage only fills it in when it is still missing, so a
/// redelivered envelope keeps the identity it was published with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Book {
    #[serde(default)]
    pub id: Uuid,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub book_cover: Vec<BookCover>,
}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>, year: i32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            year,
            ..Default::default()
        }
    }

    /// Reject books that cannot be admitted.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("title is required");
        }
        if self.author.trim().is_empty() {
            return Err("author is required");
        }
        Ok(())
    }

    /// Overwrite identity and timestamps, dropping any covers.
    ///
    /// Used at admission time: whatever id the caller supplied is replaced.
    pub fn stamp_new(&mut self, now: DateTime<Utc>) {
        self.id = Uuid::new_v4();
        self.created_at = Some(now);
        self.updated_at = Some(now);
        self.book_cover.clear();
    }

    /// Assign identity and timestamps only where they are missing.
    pub fn fill_missing(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        if self.updated_at.is_none() {
            self.updated_at = Some(now);
        }
    }
}

// ============================================================================
// BookCover
// ============================================================================

/// Cover metadata for a stored book. The file itself lives in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BookCover {
    #[serde(default)]
    pub id: Uuid,
    pub book_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
