//! Mapping between client-facing file ids and backend keys.
//!
//! Two addressing schemes exist and a deployment uses exactly one:
//!
//! - **Embedded**: every object lives in the configured bucket under
//!   `<category>/<fileId>-<filename>`; the id is recovered by pattern match.
//! - **Direct**: the key *is* the file id (a fresh UUID), the original
//!   filename travels as `x-amz-meta-filename`, and the bucket name doubles
//!   as the category.
//!
//! The scheme is fixed when the [`FileIdResolver`] is built; nothing else in
//! the crate branches on it.

use crate::models::object::{FileEntry, ObjectRecord};
use clap::ValueEnum;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

static EMBEDDED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})-(.+)$",
    )
    .expect("embedded key pattern is valid")
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AddressingScheme {
    /// `<category>/<fileId>-<filename>` inside one bucket.
    #[default]
    Embedded,
    /// `key = fileId`, one bucket per category.
    Direct,
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("object key `{0}` does not follow the <category>/<fileId>-<filename> layout")]
    MalformedKey(String),
    #[error("category `{0}` must not contain `/`")]
    InvalidCategory(String),
    #[error("category `{0}` names a reserved bucket")]
    ReservedBucket(String),
}

/// Bucket names a direct-scheme upload may not create. `GET /file/files`
/// routes to the default-bucket download, so a bucket called `file` could
/// never be listed.
const RESERVED_BUCKETS: &[&str] = &["file"];

/// Where a new upload goes.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub bucket: String,
    pub key: String,
    pub category: String,
}

/// Parts recovered from an embedded-scheme key.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedKey {
    pub category: String,
    pub file_id: String,
    pub filename: String,
}

impl EmbeddedKey {
    pub fn encode(&self) -> String {
        format!("{}/{}-{}", self.category, self.file_id, self.filename)
    }

    pub fn decode(key: &str) -> Result<Self, ResolveError> {
        let malformed = || ResolveError::MalformedKey(key.to_string());
        let (category, rest) = key.split_once('/').ok_or_else(malformed)?;
        if category.is_empty() || rest.contains('/') {
            return Err(malformed());
        }
        let caps = EMBEDDED_NAME.captures(rest).ok_or_else(malformed)?;
        Ok(Self {
            category: category.to_string(),
            file_id: caps[1].to_string(),
            filename: caps[2].to_string(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct FileIdResolver {
    scheme: AddressingScheme,
    default_bucket: String,
    default_category: String,
}

impl FileIdResolver {
    pub fn new(
        scheme: AddressingScheme,
        default_bucket: impl Into<String>,
        default_category: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            default_bucket: default_bucket.into(),
            default_category: default_category.into(),
        }
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    /// The bucket a listing or lookup reads from: the path bucket when the
    /// route names one, else the configured default.
    pub fn bucket_for(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.default_bucket)
            .to_string()
    }

    /// Decide bucket and key for a new file.
    pub fn placement(
        &self,
        category: Option<&str>,
        file_id: Uuid,
        filename: &str,
    ) -> Result<Placement, ResolveError> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        match self.scheme {
            AddressingScheme::Embedded => {
                let category = category.unwrap_or(&self.default_category);
                if category.contains('/') {
                    return Err(ResolveError::InvalidCategory(category.to_string()));
                }
                let key = EmbeddedKey {
                    category: category.to_string(),
                    file_id: file_id.to_string(),
                    filename: filename.to_string(),
                }
                .encode();
                Ok(Placement {
                    bucket: self.default_bucket.clone(),
                    key,
                    category: category.to_string(),
                })
            }
            AddressingScheme::Direct => {
                let bucket = category
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| self.default_bucket.clone());
                if RESERVED_BUCKETS.contains(&bucket.as_str()) {
                    return Err(ResolveError::ReservedBucket(bucket));
                }
                Ok(Placement {
                    key: file_id.to_string(),
                    category: bucket.clone(),
                    bucket,
                })
            }
        }
    }

    /// Turn a listed record into its client-facing view.
    pub fn resolve(&self, bucket: &str, record: ObjectRecord) -> Result<FileEntry, ResolveError> {
        let (file_id, category, filename) = match self.scheme {
            AddressingScheme::Embedded => {
                let parts = EmbeddedKey::decode(&record.key)?;
                (parts.file_id, parts.category, parts.filename)
            }
            AddressingScheme::Direct => {
                let filename = record
                    .filename
                    .clone()
                    .unwrap_or_else(|| record.key.clone());
                (record.key.clone(), bucket.to_string(), filename)
            }
        };
        Ok(FileEntry {
            file_id,
            object_name: record.key,
            category,
            filename,
            size: record.size,
            last_modified: record.last_modified,
            etag: record.etag,
            content_type: record.content_type,
        })
    }

    /// True when `record` is the object addressed by `file_id`.
    pub fn matches(&self, record: &ObjectRecord, file_id: &str) -> bool {
        match self.scheme {
            AddressingScheme::Embedded => EmbeddedKey::decode(&record.key)
                .map(|parts| parts.file_id.eq_ignore_ascii_case(file_id))
                .unwrap_or(false),
            AddressingScheme::Direct => record.key.eq_ignore_ascii_case(file_id),
        }
    }
}
