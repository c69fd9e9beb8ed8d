//! Bulk upload orchestration.
//!
//! Each item is validated on its own; valid items are uploaded on a bounded
//! pool and every outcome, good or bad, lands in the batch result. One
//! failing item never stops or rolls back the others.

use crate::models::upload::{UploadBatchOutcome, UploadFailure, UploadItem, UploadResult};
use futures::{StreamExt, stream};
use std::future::Future;
use tracing::{debug, warn};

/// Per-item acceptance rules.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_file_size: usize,
    /// Empty means any type. Entries may end in `/*` to accept a whole family.
    pub allowed_mime_types: Vec<String>,
    /// Most files one multipart batch may carry.
    pub max_batch_files: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_mime_types: Vec::new(),
            max_batch_files: 10,
        }
    }
}

impl UploadPolicy {
    /// Every rule the item breaks; empty when it may be uploaded.
    pub fn validate(&self, item: &UploadItem) -> Vec<String> {
        let mut violations = Vec::new();

        if item.filename.trim().is_empty() {
            violations.push("filename is required".to_string());
        } else if item.filename.contains(['/', '\\']) {
            violations.push(format!(
                "filename `{}` must not contain path separators",
                item.filename
            ));
        }

        if item.buffer.is_empty() {
            violations.push("file is empty".to_string());
        } else if item.buffer.len() > self.max_file_size {
            violations.push(format!(
                "file size {} bytes exceeds the limit of {} bytes",
                item.buffer.len(),
                self.max_file_size
            ));
        }

        if !self.mime_allowed(&item.mimetype) {
            violations.push(format!("content type `{}` is not allowed", item.mimetype));
        }

        violations
    }

    fn mime_allowed(&self, mimetype: &str) -> bool {
        if self.allowed_mime_types.is_empty() {
            return true;
        }
        let mimetype = mimetype.trim().to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(family) => mimetype
                    .split_once('/')
                    .is_some_and(|(kind, _)| kind == family),
                None => *allowed == mimetype,
            }
        })
    }
}

/// Fans a batch out over at most `concurrency` simultaneous uploads.
#[derive(Clone, Debug)]
pub struct BulkUploader {
    policy: UploadPolicy,
    concurrency: usize,
}

impl BulkUploader {
    pub fn new(policy: UploadPolicy, concurrency: usize) -> Self {
        Self {
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate and upload every item.
    ///
    /// `items` may already carry decode failures; those go straight to the
    /// error list. `upload` performs the store write for one valid item.
    pub async fn run<F, Fut, E>(
        &self,
        items: Vec<Result<UploadItem, UploadFailure>>,
        upload: F,
    ) -> UploadBatchOutcome
    where
        F: Fn(UploadItem) -> Fut,
        Fut: Future<Output = Result<UploadResult, E>>,
        E: std::fmt::Display,
    {
        let mut outcome = UploadBatchOutcome::default();
        let mut valid = Vec::with_capacity(items.len());

        for item in items {
            match item {
                Err(failure) => outcome.errors.push(failure),
                Ok(item) => {
                    let violations = self.policy.validate(&item);
                    if violations.is_empty() {
                        valid.push(item);
                    } else {
                        debug!("rejecting {}: {:?}", item.filename, violations);
                        outcome
                            .errors
                            .push(UploadFailure::new(item.filename, violations));
                    }
                }
            }
        }

        let mut uploads = stream::iter(valid)
            .map(|item| {
                let filename = item.filename.clone();
                let pending = upload(item);
                async move { (filename, pending.await) }
            })
            .buffer_unordered(self.concurrency);

        while let Some((filename, result)) = uploads.next().await {
            match result {
                Ok(uploaded) => outcome.successful.push(uploaded),
                Err(err) => {
                    warn!("upload of {} failed: {}", filename, err);
                    outcome
                        .errors
                        .push(UploadFailure::new(filename, vec![err.to_string()]));
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    fn item(filename: &str, size: usize, mimetype: &str) -> UploadItem {
        UploadItem {
            buffer: Bytes::from(vec![7u8; size]),
            filename: filename.into(),
            mimetype: mimetype.into(),
        }
    }

    fn result_for(item: &UploadItem) -> UploadResult {
        UploadResult {
            file_id: format!("id-{}", item.filename),
            bucket_name: "mybucket".into(),
            category: "docs".into(),
            key: item.filename.clone(),
            filename: item.filename.clone(),
            size: item.buffer.len() as u64,
            mimetype: item.mimetype.clone(),
        }
    }

    fn policy(max: usize, allowed: &[&str]) -> UploadPolicy {
        UploadPolicy {
            max_file_size: max,
            allowed_mime_types: allowed.iter().map(|s| s.to_string()).collect(),
            ..UploadPolicy::default()
        }
    }

    #[test]
    fn policy_reports_every_violation() {
        let p = policy(4, &["image/*"]);
        let violations = p.validate(&item("", 5, "text/plain"));
        assert_eq!(violations.len(), 3);
        assert_eq!(violations[0], "filename is required");
        assert!(violations[1].contains("exceeds the limit of 4 bytes"));
        assert!(violations[2].contains("text/plain"));
    }

    #[test]
    fn mime_allow_list_supports_wildcards() {
        let p = policy(100, &["image/*", "application/pdf"]);
        assert!(p.validate(&item("a.png", 1, "image/png")).is_empty());
        assert!(p.validate(&item("a.pdf", 1, "Application/PDF")).is_empty());
        assert!(!p.validate(&item("a.txt", 1, "text/plain")).is_empty());
        assert!(!p.validate(&item("a", 1, "imagery")).is_empty());
    }

    #[test]
    fn rejects_empty_payloads_and_paths() {
        let p = UploadPolicy::default();
        assert_eq!(p.validate(&item("a.txt", 0, "text/plain")), vec!["file is empty"]);
        assert_eq!(p.validate(&item("../a.txt", 1, "text/plain")).len(), 1);
    }

    #[tokio::test]
    async fn oversized_item_fails_alone() {
        let uploader = BulkUploader::new(policy(10, &[]), 4);
        let items = vec![
            Ok(item("one.txt", 3, "text/plain")),
            Ok(item("two.txt", 11, "text/plain")),
            Ok(item("three.txt", 5, "text/plain")),
        ];

        let outcome = uploader
            .run(items, |item| async move {
                Ok::<_, String>(result_for(&item))
            })
            .await;

        assert_eq!(outcome.successful.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].filename, "two.txt");
        assert_eq!(outcome.total(), 3);
    }

    #[tokio::test]
    async fn backend_failures_are_isolated_per_item() {
        let uploader = BulkUploader::new(UploadPolicy::default(), 2);
        let items = vec![
            Ok(item("a.txt", 1, "text/plain")),
            Err(UploadFailure::new("b.txt", vec!["content is required".into()])),
            Ok(item("c.txt", 1, "text/plain")),
            Ok(item("d.txt", 1, "text/plain")),
        ];

        let outcome = uploader
            .run(items, |item| async move {
                if item.filename == "c.txt" {
                    Err("backend unavailable".to_string())
                } else {
                    Ok(result_for(&item))
                }
            })
            .await;

        assert_eq!(outcome.total(), 4);
        let mut ok: Vec<_> = outcome.successful.iter().map(|r| r.filename.as_str()).collect();
        ok.sort();
        assert_eq!(ok, vec!["a.txt", "d.txt"]);
        let failed: Vec<_> = outcome.errors.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(failed, vec!["b.txt", "c.txt"]);
        assert_eq!(outcome.errors[1].reasons, vec!["backend unavailable"]);
    }

    #[tokio::test]
    async fn in_flight_uploads_never_exceed_the_pool_width() {
        let uploader = BulkUploader::new(UploadPolicy::default(), 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items = (0..12)
            .map(|i| Ok(item(&format!("f{i}.bin"), 1, "application/octet-stream")))
            .collect();

        let outcome = uploader
            .run(items, |item| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(result_for(&item))
                }
            })
            .await;

        assert_eq!(outcome.successful.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn completion_order_is_preserved() {
        let uploader = BulkUploader::new(UploadPolicy::default(), 4);
        let items = vec![
            Ok(item("slow.txt", 1, "text/plain")),
            Ok(item("fast.txt", 1, "text/plain")),
        ];

        let outcome = uploader
            .run(items, |item| async move {
                if item.filename == "slow.txt" {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                Ok::<_, String>(result_for(&item))
            })
            .await;

        let order: Vec<_> = outcome.successful.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(order, vec!["fast.txt", "slow.txt"]);
    }
}
