//! Object store adapter contract.
//!
//! Every backend implements [`ObjectStore`]. Listings are lazy, single-pass
//! streams in the backend's own order; point operations are keyed by exact
//! backend key. Callers hold the store as `Arc<dyn ObjectStore>`.

use crate::models::object::{ObjectMetadata, ObjectRecord};
use bytes::Bytes;
use futures::{future::BoxFuture, stream::BoxStream};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("region `{0}` is not supported")]
    UnsupportedRegion(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy listing of one bucket.
pub type ObjectStream<'a> = BoxStream<'a, StoreResult<ObjectRecord>>;

/// Payload of an object being read back.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

pub trait ObjectStore: Send + Sync + 'static {
    /// Create `bucket` if absent. A concurrent duplicate create is not an error.
    fn ensure_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Write `data` at `key`, replacing any previous object there.
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> BoxFuture<'a, StoreResult<ObjectRecord>>;

    /// Open an object for reading.
    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<(ObjectRecord, ByteStream)>>;

    fn delete<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    /// Stream every live object of `bucket`. Each call opens a fresh stream.
    fn list_all<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a>;

    /// Cheap round trip used by `/readyz`.
    fn ping(&self) -> BoxFuture<'_, StoreResult<()>>;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, keys that begin with `/`, keys with a
/// `.` or `..` path segment, and keys containing control characters or
/// backslashes. Dots inside a segment (`report..v2.pdf`) are fine.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == "." || segment == "..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(StoreError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn ensure_bucket_name_safe(name: &str) -> StoreResult<()> {
    let reject = |reason: &str| -> StoreResult<()> {
        Err(StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        })
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return reject("must be between 3 and 63 characters");
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
    }

    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return reject("must start and end with a lowercase letter or digit");
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return reject("cannot contain consecutive dots or dot-hyphen combinations");
    }

    if is_ipv4_like(name) {
        return reject("must not be formatted like an IP address");
    }

    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_follow_s3_rules() {
        assert!(ensure_bucket_name_safe("mybucket").is_ok());
        assert!(ensure_bucket_name_safe("docs.2024-archive").is_ok());

        for bad in ["ab", "MyBucket", "-docs", "docs.", "a..b", "a.-b", "192.168.1.1", "has space"] {
            assert!(
                matches!(
                    ensure_bucket_name_safe(bad),
                    Err(StoreError::InvalidBucketName { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn keys_reject_traversal_and_control_bytes() {
        assert!(ensure_key_safe("docs/550e8400-e29b-41d4-a716-446655440000-a.pdf").is_ok());
        assert!(ensure_key_safe("docs/report..v2.pdf").is_ok());
        assert!(ensure_key_safe("docs/a...txt").is_ok());
        for bad in [
            "",
            "/abs",
            "docs/../etc",
            "..",
            "docs/..",
            "./docs",
            "docs/./a",
            "tab\there",
            "back\\slash",
        ] {
            assert!(ensure_key_safe(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(ensure_key_safe(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).is_err());
    }
}
