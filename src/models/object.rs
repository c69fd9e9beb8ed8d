//! Represents objects as the backend lists them and as clients see them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One entry from a backend listing stream.
///
/// Records are transient views: the gateway never persists them itself, it
/// recomputes them per request from the live backend listing.
#[derive(Clone, FromRow, Debug, PartialEq)]
pub struct ObjectRecord {
    /// Backend-native key, unique within its bucket.
    pub key: String,

    /// Payload size in bytes.
    #[sqlx(rename = "size_bytes", try_from = "i64")]
    pub size: u64,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,

    /// Opaque content hash (hex MD5 for both shipped backends).
    pub etag: Option<String>,

    /// Stored `Content-Type`.
    pub content_type: Option<String>,

    /// Stored `x-amz-meta-filename` value.
    pub filename: Option<String>,
}

/// Metadata persisted alongside each blob on `put`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectMetadata {
    /// Sent back as `Content-Type` on download.
    pub content_type: String,

    /// The client's original filename (`x-amz-meta-filename`).
    pub filename: Option<String>,
}

/// Client-facing view of a resolved object.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_id: String,
    /// Backend key; doubles as the pagination marker.
    pub object_name: String,
    pub category: String,
    pub filename: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

impl FileEntry {
    /// Composite text the keyword filter searches in.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.object_name, self.filename, self.category).to_lowercase()
    }
}
