//! Defines the gateway routes.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Uploads** (always into the configured addressing scheme)
//!   - `POST   /upload`           -> one multipart `file`
//!   - `POST   /upload/multiple`  -> several multipart `files`
//!   - `POST   /upload/base64`    -> JSON batch of base64 payloads
//!
//! - **Files** (the `{bucket}` forms override the default bucket)
//!   - `GET    /files`, `/{bucket}/files`                  -> paginated listing
//!   - `GET    /file/{fileId}`, `/{bucket}/file/{fileId}`  -> download
//!   - `DELETE /file/{fileId}`, `/{bucket}/file/{fileId}`  -> delete

use crate::{
    handlers::{
        file_handlers::{
            delete_bucket_file, delete_file, download_bucket_file, download_file,
            list_bucket_files, list_files, upload_base64, upload_file, upload_multiple,
        },
        health_handlers::{healthz, readyz},
    },
    services::file_service::FileService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Shared state (`FileService`) reaches every handler;
/// request bodies are capped at `body_limit` bytes.
pub fn routes(body_limit: usize) -> Router<FileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // uploads
        .route("/upload", post(upload_file))
        .route("/upload/multiple", post(upload_multiple))
        .route("/upload/base64", post(upload_base64))
        // default-bucket routes
        .route("/files", get(list_files))
        .route("/file/{file_id}", get(download_file).delete(delete_file))
        // bucket-scoped routes
        .route("/{bucket}/files", get(list_bucket_files))
        .route(
            "/{bucket}/file/{file_id}",
            get(download_bucket_file).delete(delete_bucket_file),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}
