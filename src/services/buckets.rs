//! Bucket lifecycle: make sure a bucket exists before the first write to it.

use crate::services::object_store::{ObjectStore, StoreResult};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::RwLock;
use tracing::debug;

/// Remembers which buckets this process has already ensured.
///
/// Two requests racing on an unknown bucket may both reach the store; the
/// store tolerates the duplicate create. Failures are not remembered, so the
/// next request retries.
#[derive(Clone)]
pub struct BucketRegistry {
    store: Arc<dyn ObjectStore>,
    known: Arc<RwLock<HashSet<String>>>,
}

impl BucketRegistry {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            known: Arc::default(),
        }
    }

    pub async fn ensure(&self, bucket: &str) -> StoreResult<()> {
        if self.known.read().await.contains(bucket) {
            return Ok(());
        }
        self.store.ensure_bucket(bucket).await?;
        debug!("bucket {} ensured", bucket);
        self.known.write().await.insert(bucket.to_string());
        Ok(())
    }
}
