//! FileService: the operations the HTTP layer calls.
//!
//! Composes the object store, the file id resolver, the bucket registry and
//! the bulk uploader. Cheap to clone; every clone shares the same store
//! handle.

use crate::{
    models::{
        listing::{ListingPage, ListingQuery},
        object::{FileEntry, ObjectMetadata},
        upload::{UploadBatchOutcome, UploadFailure, UploadItem, UploadResult},
    },
    services::{
        buckets::BucketRegistry,
        file_id::{FileIdResolver, ResolveError},
        listing::collect_page,
        object_store::{ByteStream, ObjectStore, StoreError, StoreResult},
        upload::{BulkUploader, UploadPolicy},
    },
};
use futures::TryStreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Clone)]
pub struct FileService {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<FileIdResolver>,
    buckets: BucketRegistry,
    uploader: Arc<BulkUploader>,
}

impl FileService {
    pub fn new(store: Arc<dyn ObjectStore>, resolver: FileIdResolver, uploader: BulkUploader) -> Self {
        Self {
            buckets: BucketRegistry::new(store.clone()),
            store,
            resolver: Arc::new(resolver),
            uploader: Arc::new(uploader),
        }
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        self.uploader.policy()
    }

    /// Create the configured default bucket up front.
    pub async fn ensure_default_bucket(&self) -> StoreResult<()> {
        self.buckets.ensure(self.resolver.default_bucket()).await
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }

    /// One page of `bucket` (default bucket when `None`).
    pub async fn list_files(
        &self,
        bucket: Option<&str>,
        query: &ListingQuery,
    ) -> GatewayResult<ListingPage> {
        let bucket = self.resolver.bucket_for(bucket);
        let resolver = &self.resolver;
        let page = collect_page(self.store.list_all(&bucket), query, |record| {
            resolver
                .resolve(&bucket, record)
                .map_err(|err| debug!("skipping unaddressable object: {}", err))
                .ok()
        })
        .await?;
        debug!(
            "listed {} files from {} (total_found={}, has_more={})",
            page.files.len(),
            bucket,
            page.total_found,
            page.has_more
        );
        Ok(page)
    }

    /// Linear scan of the bucket for `file_id`. `Ok(None)` when absent.
    pub async fn find_file(&self, bucket: &str, file_id: &str) -> GatewayResult<Option<FileEntry>> {
        let mut records = self.store.list_all(bucket);
        while let Some(record) = records.try_next().await? {
            if self.resolver.matches(&record, file_id) {
                return Ok(Some(self.resolver.resolve(bucket, record)?));
            }
        }
        Ok(None)
    }

    async fn require_file(&self, bucket: &str, file_id: &str) -> GatewayResult<FileEntry> {
        self.find_file(bucket, file_id)
            .await?
            .ok_or_else(|| GatewayError::FileNotFound(file_id.to_string()))
    }

    /// Resolve `file_id` and open its payload.
    pub async fn open_file(
        &self,
        bucket: Option<&str>,
        file_id: &str,
    ) -> GatewayResult<(FileEntry, ByteStream)> {
        let bucket = self.resolver.bucket_for(bucket);
        let entry = self.require_file(&bucket, file_id).await?;
        let (_, body) = self.store.get(&bucket, &entry.object_name).await?;
        Ok((entry, body))
    }

    pub async fn delete_file(&self, bucket: Option<&str>, file_id: &str) -> GatewayResult<FileEntry> {
        let bucket = self.resolver.bucket_for(bucket);
        let entry = self.require_file(&bucket, file_id).await?;
        self.store.delete(&bucket, &entry.object_name).await?;
        info!("deleted {} ({}) from {}", entry.file_id, entry.object_name, bucket);
        Ok(entry)
    }

    /// Validate and store a single file.
    pub async fn upload_file(
        &self,
        item: UploadItem,
        category: Option<&str>,
    ) -> GatewayResult<UploadResult> {
        let violations = self.uploader.policy().validate(&item);
        if !violations.is_empty() {
            return Err(GatewayError::Validation(violations));
        }
        self.store_item(item, category).await
    }

    /// Validate and store a batch; per-item failures are reported, not raised.
    pub async fn upload_batch(
        &self,
        items: Vec<Result<UploadItem, UploadFailure>>,
        category: Option<&str>,
    ) -> UploadBatchOutcome {
        let outcome = self
            .uploader
            .run(items, |item| self.store_item(item, category))
            .await;
        info!(
            "batch upload finished: {} of {} stored, {} failed",
            outcome.successful.len(),
            outcome.total(),
            outcome.errors.len()
        );
        outcome
    }

    async fn store_item(
        &self,
        item: UploadItem,
        category: Option<&str>,
    ) -> GatewayResult<UploadResult> {
        let file_id = Uuid::new_v4();
        let placement = self.resolver.placement(category, file_id, &item.filename)?;
        self.buckets.ensure(&placement.bucket).await?;

        let metadata = ObjectMetadata {
            content_type: item.mimetype.clone(),
            filename: Some(item.filename.clone()),
        };
        let record = self
            .store
            .put(&placement.bucket, &placement.key, item.buffer, metadata)
            .await?;
        debug!("uploaded {} as {}/{}", item.filename, placement.bucket, placement.key);

        Ok(UploadResult {
            file_id: file_id.to_string(),
            bucket_name: placement.bucket,
            category: placement.category,
            key: placement.key,
            filename: item.filename,
            size: record.size,
            mimetype: item.mimetype,
        })
    }
}
