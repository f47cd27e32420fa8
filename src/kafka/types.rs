use anyhow::{Context, Result};
use book_types::Book;
use serde::{Deserialize, Serialize};

/// Classified book as it travels through the log
///
/// Serialized to JSON as `{"book": {...}, "position": n, "is_fibonacci": b}`.
/// The partition key is the book id, so redeliveries of the same book land
/// on the same partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEnvelope {
    /// Book with identity and timestamps already assigned by admission
    pub book: Book,

    /// Counter value at admission time
    pub position: i64,

    /// Routes the book: `true` to the ready table, `false` to staging
    pub is_fibonacci: bool,
}

impl BookEnvelope {
    pub fn new(book: Book, position: i64, is_fibonacci: bool) -> Self {
        Self {
            book,
            position,
            is_fibonacci,
        }
    }

    /// Partition key for this envelope
    pub fn partition_key(&self) -> String {
        self.book.id.to_string()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize book envelope")
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).context("Failed to deserialize book envelope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_wire_format_field_names() {
        let mut book = Book::new("Dune", "Frank Herbert", 1965);
        book.stamp_new(Utc::now());
        let envelope = BookEnvelope::new(book.clone(), 5, true);

        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["position"], 5);
        assert_eq!(value["is_fibonacci"], true);
        assert_eq!(value["book"]["title"], "Dune");
        assert_eq!(value["book"]["id"], book.id.to_string());
        assert_eq!(envelope.partition_key(), book.id.to_string());
    }

    #[test]
    fn test_decodes_producer_payload() {
        let payload = br#"{
            "book": {
                "id": "2f1c1d0e-6a43-4c4b-9a8e-0c9f5b7f3a11",
                "title": "Neuromancer",
                "author": "William Gibson",
                "year": 1984,
                "created_at": "2024-03-01T10:00:00Z",
                "updated_at": "2024-03-01T10:00:00Z"
            },
            "position": 4,
            "is_fibonacci": false
        }"#;

        let envelope = BookEnvelope::from_bytes(payload).unwrap();
        assert_eq!(envelope.position, 4);
        assert!(!envelope.is_fibonacci);
        assert_eq!(envelope.book.author, "William Gibson");
        assert!(envelope.book.book_cover.is_empty());
    }

    #[test]
    fn test_rejects_malformed_payload() {
        assert!(BookEnvelope::from_bytes(b"not json").is_err());
        assert!(BookEnvelope::from_bytes(br#"{"position": 1}"#).is_err());
        assert!(BookEnvelope::from_bytes(b"").is_err());
    }
}
