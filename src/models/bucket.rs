//! Represents a logical bucket, a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket as recorded by the SQLite-backed store.
///
/// Buckets act as flat namespaces for keyed objects. Under the direct
/// addressing scheme the bucket name doubles as the file category.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region the bucket was created in (e.g. "local", "us-east-1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
