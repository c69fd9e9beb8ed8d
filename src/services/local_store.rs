//! src/services/local_store.rs
//!
//! LocalStore, the durable object store backend. SQLite for metadata and
//! local disk for payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Listing streams rows straight
//! out of SQLite so large buckets are never materialized in memory.

use crate::{
    models::{
        bucket::Bucket,
        object::{ObjectMetadata, ObjectRecord},
    },
    services::object_store::{
        ByteStream, ObjectStore, ObjectStream, StoreError, StoreResult, ensure_bucket_name_safe,
        ensure_key_safe,
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{
    StreamExt, TryStreamExt,
    future::BoxFuture,
    stream,
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const SUPPORTED_REGIONS: [&str; 8] = [
    "local",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-south-1",
    "ap-southeast-1",
];

const SELECT_OBJECT_SQL: &str = "SELECT key, size_bytes, last_modified, etag, content_type, filename
     FROM objects
     WHERE key = ? AND bucket_id = ? AND is_deleted = 0";

const LIST_OBJECTS_SQL: &str = "SELECT key, size_bytes, last_modified, etag, content_type, filename
     FROM objects
     WHERE bucket_id = ? AND is_deleted = 0
     ORDER BY key ASC";

const UPSERT_OBJECT_SQL: &str = r#"
    INSERT INTO objects (
        id, bucket_id, key, filename, content_type, size_bytes,
        etag, last_modified, is_deleted
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
    ON CONFLICT(bucket_id, key) DO UPDATE SET
        filename = excluded.filename,
        content_type = excluded.content_type,
        size_bytes = excluded.size_bytes,
        etag = excluded.etag,
        last_modified = excluded.last_modified,
        is_deleted = 0
    RETURNING key, size_bytes, last_modified, etag, content_type, filename
"#;

/// Open a SQLite pool, creating the database file if needed.
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<usize, sqlx::Error> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for stmt in &statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(statements.len())
}

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Region recorded on newly created buckets.
    region: String,
}

impl LocalStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        region: &str,
    ) -> StoreResult<Self> {
        let region = region.to_lowercase();
        if !SUPPORTED_REGIONS.contains(&region.as_str()) {
            return Err(StoreError::UnsupportedRegion(region));
        }
        Ok(Self {
            db,
            base_path: base_path.into(),
            region,
        })
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), keeping per-directory
    /// file counts small.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn find_bucket(&self, name: &str) -> StoreResult<Option<Bucket>> {
        let bucket = sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(bucket)
    }

    async fn fetch_bucket(&self, name: &str) -> StoreResult<Bucket> {
        ensure_bucket_name_safe(name)?;
        self.find_bucket(name)
            .await?
            .ok_or_else(|| StoreError::BucketNotFound(name.to_string()))
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<ObjectRecord> {
        sqlx::query_as::<_, ObjectRecord>(SELECT_OBJECT_SQL)
            .bind(key)
            .bind(bucket.id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            })
    }

    async fn create_bucket_if_absent(&self, name: &str) -> StoreResult<()> {
        ensure_bucket_name_safe(name)?;
        if self.find_bucket(name).await?.is_some() {
            return Ok(());
        }
        fs::create_dir_all(self.bucket_root(name)).await?;

        let inserted = sqlx::query(
            "INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(&self.region)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match inserted {
            Ok(_) => {
                info!("Created bucket {} in region {}", name, self.region);
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                debug!("bucket {} was created concurrently", name);
                Ok(())
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Write the payload through a temp file, fsync, rename into place, then
    /// upsert the metadata row (S3-like overwrite semantics).
    async fn write_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> StoreResult<ObjectRecord> {
        ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_payload(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let etag = format!("{:x}", md5::compute(&data));
        let upserted = sqlx::query_as::<_, ObjectRecord>(UPSERT_OBJECT_SQL)
            .bind(Uuid::new_v4())
            .bind(bucket_rec.id)
            .bind(key)
            .bind(metadata.filename)
            .bind(metadata.content_type)
            .bind(data.len() as i64)
            .bind(&etag)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await;

        match upserted {
            Ok(record) => {
                debug!("stored {}/{} ({} bytes)", bucket, key, record.size);
                Ok(record)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn open_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> StoreResult<(ObjectRecord, ByteStream)> {
        ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let record = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok((record, ReaderStream::new(file).boxed()))
    }

    /// Soft-delete the metadata row, then remove the payload and prune
    /// empty shard directories.
    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket_rec.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(())
    }

    /// Recursively remove empty directories up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    /// `SELECT 1` plus a write/read/delete of a scratch file under `base_path`.
    async fn check_health(&self) -> StoreResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StoreError::Io(io::Error::other(format!(
                "unexpected sqlite ping result: {one}"
            ))));
        }

        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(StoreError::Io(io::Error::other("scratch file content mismatch")));
        }
        Ok(())
    }
}

async fn write_payload(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

impl ObjectStore for LocalStore {
    fn ensure_bucket<'a>(&'a self, bucket: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.create_bucket_if_absent(bucket))
    }

    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
        metadata: ObjectMetadata,
    ) -> BoxFuture<'a, StoreResult<ObjectRecord>> {
        Box::pin(self.write_object(bucket, key, data, metadata))
    }

    fn get<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<(ObjectRecord, ByteStream)>> {
        Box::pin(self.open_object(bucket, key))
    }

    fn delete<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.remove_object(bucket, key))
    }

    /// Rows come back in ascending key order, one at a time.
    fn list_all<'a>(&'a self, bucket: &'a str) -> ObjectStream<'a> {
        let db = &*self.db;
        stream::once(self.fetch_bucket(bucket))
            .map_ok(move |bucket_rec| {
                sqlx::query_as::<_, ObjectRecord>(LIST_OBJECTS_SQL)
                    .bind(bucket_rec.id)
                    .fetch(db)
                    .map_err(StoreError::from)
            })
            .try_flatten()
            .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.check_health())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
