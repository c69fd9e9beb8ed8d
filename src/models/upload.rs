//! Request-scoped upload types: items going in, results and failures coming out.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// A decoded file waiting to be validated and uploaded.
#[derive(Clone, Debug)]
pub struct UploadItem {
    pub buffer: Bytes,
    pub filename: String,
    pub mimetype: String,
}

/// One element of a `POST /upload/base64` body.
///
/// Every field is optional at the wire level so that a missing field becomes
/// a per-item error instead of rejecting the whole batch.
#[derive(Debug, Deserialize)]
pub struct Base64File {
    pub filename: Option<String>,
    pub content: Option<String>,
    pub mimetype: Option<String>,
}

impl Base64File {
    /// Decode the payload into an [`UploadItem`].
    ///
    /// Accepts bare base64 as well as `data:<mime>;base64,<payload>` URLs, in
    /// which case the URL's mime type is used when `mimetype` is absent.
    pub fn decode(self) -> Result<UploadItem, UploadFailure> {
        let filename = self.filename.unwrap_or_default();
        let mut reasons = Vec::new();
        if filename.trim().is_empty() {
            reasons.push("filename is required".to_string());
        }
        let content = match self.content {
            Some(content) if !content.is_empty() => content,
            _ => {
                reasons.push("content is required".to_string());
                String::new()
            }
        };
        if !reasons.is_empty() {
            return Err(UploadFailure::new(filename, reasons));
        }

        let (url_mime, payload) = split_data_url(&content);
        let buffer = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|err| {
                UploadFailure::new(
                    filename.clone(),
                    vec![format!("content is not valid base64: {err}")],
                )
            })?;

        let mimetype = self
            .mimetype
            .filter(|m| !m.trim().is_empty())
            .or(url_mime)
            .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());

        Ok(UploadItem {
            buffer: Bytes::from(buffer),
            filename,
            mimetype,
        })
    }
}

fn split_data_url(content: &str) -> (Option<String>, &str) {
    if let Some(rest) = content.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(";base64,") {
            let mime = (!header.is_empty()).then(|| header.to_string());
            return (mime, payload);
        }
    }
    (None, content)
}

/// Where and how a file ended up after a successful upload.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_id: String,
    pub bucket_name: String,
    pub category: String,
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
}

/// A batch entry that did not make it into the store.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UploadFailure {
    pub filename: String,
    pub reasons: Vec<String>,
}

impl UploadFailure {
    pub fn new(filename: impl Into<String>, reasons: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            reasons,
        }
    }
}

/// Partition of a batch into uploaded and failed items, each in completion order.
#[derive(Debug, Default)]
pub struct UploadBatchOutcome {
    pub successful: Vec<UploadResult>,
    pub errors: Vec<UploadFailure>,
}

impl UploadBatchOutcome {
    pub fn total(&self) -> usize {
        self.successful.len() + self.errors.len()
    }

    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            format!("Uploaded {} files successfully", self.successful.len())
        } else {
            format!(
                "Uploaded {} files successfully with {} errors",
                self.successful.len(),
                self.errors.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(filename: Option<&str>, content: Option<&str>, mimetype: Option<&str>) -> Base64File {
        Base64File {
            filename: filename.map(str::to_string),
            content: content.map(str::to_string),
            mimetype: mimetype.map(str::to_string),
        }
    }

    #[test]
    fn decodes_plain_base64_with_default_mimetype() {
        let item = b64(Some("hello.txt"), Some("aGVsbG8="), None)
            .decode()
            .unwrap();
        assert_eq!(item.buffer, Bytes::from_static(b"hello"));
        assert_eq!(item.mimetype, DEFAULT_MIMETYPE);
    }

    #[test]
    fn data_url_supplies_mimetype() {
        let item = b64(Some("a.png"), Some("data:image/png;base64,aGk="), None)
            .decode()
            .unwrap();
        assert_eq!(item.buffer, Bytes::from_static(b"hi"));
        assert_eq!(item.mimetype, "image/png");
    }

    #[test]
    fn explicit_mimetype_wins_over_data_url() {
        let item = b64(
            Some("a.png"),
            Some("data:image/png;base64,aGk="),
            Some("image/x-custom"),
        )
        .decode()
        .unwrap();
        assert_eq!(item.mimetype, "image/x-custom");
    }

    #[test]
    fn missing_fields_are_listed_together() {
        let failure = b64(None, None, None).decode().unwrap_err();
        assert_eq!(failure.filename, "");
        assert_eq!(
            failure.reasons,
            vec!["filename is required", "content is required"]
        );
    }

    #[test]
    fn invalid_base64_is_an_item_failure() {
        let failure = b64(Some("bad.bin"), Some("!!not base64!!"), None)
            .decode()
            .unwrap_err();
        assert_eq!(failure.filename, "bad.bin");
        assert!(failure.reasons[0].starts_with("content is not valid base64"));
    }

    #[test]
    fn batch_message_mentions_errors_only_when_present() {
        let mut outcome = UploadBatchOutcome::default();
        assert_eq!(outcome.message(), "Uploaded 0 files successfully");
        outcome
            .errors
            .push(UploadFailure::new("x", vec!["boom".into()]));
        assert_eq!(
            outcome.message(),
            "Uploaded 0 files successfully with 1 errors"
        );
        assert_eq!(outcome.total(), 1);
    }
}
