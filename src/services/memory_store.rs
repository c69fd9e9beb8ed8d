//! In-memory object store.
//!
//! Nothing is persisted between runs; useful for tests and throwaway
//! deployments. Listings are snapshots taken when the stream is first polled,
//! in ascending key order like `LocalStore`.

use crate::{
    models::object::{ObjectMetadata, ObjectRecord},
    services::object_store::{
        ByteStream, ObjectStore, ObjectStream, StoreError, StoreResult, ensure_bucket_name_safe,
        ensure_key_safe,
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{
    StreamExt, TryStreamExt,
    future::{self, BoxFuture},
    stream,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
struct StoredObject {
    record: ObjectRecord,
    data: Bytes,
}

#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn snapshot(&self, bucket: &str) -> StoreResult<Vec<ObjectRecord>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
        Ok(objects.values().map(|o| o.record.clone()).collect())
    }
}

impl ObjectStore for MemoryStore {
    fn ensure_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            ensure_bucket_name_safe(bucket)?;
            self.buckets
                .write()
                .await
                .entry(bucket.to_string())
                .or_default();
            Ok(())
        })
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> BoxFuture<'a, StoreResult<ObjectRecord>> {
        Box::pin(async move {
            ensure_key_safe(key)?;
            let mut buckets = self.buckets.write().await;
            let objects = buckets
                .get_mut(bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;

            let record = ObjectRecord {
                key: key.to_string(),
                size: data.len() as u64,
                last_modified: Utc::now(),
                etag: Some(format!("{:x}", md5::compute(&data))),
                content_type: Some(metadata.content_type),
                filename: metadata.filename,
            };
            objects.insert(
                key.to_string(),
                StoredObject {
                    record: record.clone(),
                    data,
                },
            );
            Ok(record)
        })
    }

    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<(ObjectRecord, ByteStream)>> {
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let stored = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
            let body: ByteStream = stream::once(future::ready(Ok(stored.data))).boxed();
            Ok((stored.record, body))
        })
    }

    fn delete<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            buckets
                .get_mut(bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })
    }

    fn list_all<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a> {
        stream::once(self.snapshot(bucket))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
            .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str) -> ObjectMetadata {
        ObjectMetadata {
            content_type: "application/pdf".into(),
            filename: Some(filename.into()),
        }
    }

    #[tokio::test]
    async fn put_requires_an_existing_bucket() {
        let store = MemoryStore::new();
        let err = store
            .put("docs", "k", Bytes::from_static(b"x"), meta("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn lists_in_key_order_and_deletes() {
        let store = MemoryStore::new();
        store.ensure_bucket("docs").await.unwrap();
        for key in ["b", "c", "a"] {
            store
                .put("docs", key, Bytes::from_static(b"x"), meta(key))
                .await
                .unwrap();
        }
        store.delete("docs", "c").await.unwrap();

        let keys: Vec<String> = store
            .list_all("docs")
            .map_ok(|r| r.key)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["a", "b"]);

        assert!(matches!(
            store.delete("docs", "c").await,
            Err(StoreError::ObjectNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn get_returns_payload_and_metadata() {
        let store = MemoryStore::new();
        store.ensure_bucket("docs").await.unwrap();
        store
            .put("docs", "k", Bytes::from_static(b"payload"), meta("a.pdf"))
            .await
            .unwrap();

        let (record, body) = store.get("docs", "k").await.unwrap();
        let chunks: Vec<Bytes> = body.try_collect().await.unwrap();
        assert_eq!(record.filename.as_deref(), Some("a.pdf"));
        assert_eq!(record.size, 7);
        assert_eq!(chunks.concat(), b"payload");
    }
}
