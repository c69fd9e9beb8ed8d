//! HTTP handlers for uploads, listings, downloads and deletes.
//! Payloads are streamed back to the client; all storage concerns are
//! delegated to `FileService`.

use crate::{
    errors::AppError,
    models::{
        listing::{ListFilesParams, ListingPage, ListingQuery, QueryEcho},
        object::FileEntry,
        upload::{Base64File, DEFAULT_MIMETYPE, UploadFailure, UploadItem, UploadResult},
    },
    services::file_service::FileService,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    #[serde(flatten)]
    result: UploadResult,
}

#[derive(Serialize)]
struct UploadedFile {
    originalname: String,
    #[serde(flatten)]
    result: UploadResult,
}

#[derive(Serialize)]
struct BatchUploadResponse {
    message: String,
    successful: Vec<UploadedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<UploadFailure>,
}

#[derive(Serialize)]
struct ListFilesResponse {
    #[serde(flatten)]
    page: ListingPage,
    query: QueryEcho,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    message: &'static str,
    file_id: String,
    object_name: String,
}

/// Body of `POST /upload/base64`. `files` is checked by hand so a wrong
/// shape gets a precise message instead of a serde rejection.
#[derive(Debug, Deserialize)]
pub struct Base64UploadRequest {
    #[serde(default)]
    pub files: Value,
    pub category: Option<String>,
}

/// Files and the `category` text field pulled from a multipart body.
struct MultipartUpload {
    files: Vec<UploadItem>,
    category: Option<String>,
}

async fn read_multipart(
    mut multipart: Multipart,
    file_field: &str,
    max_files: usize,
) -> Result<MultipartUpload, AppError> {
    let mut upload = MultipartUpload {
        files: Vec::new(),
        category: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "category" {
            upload.category = Some(field.text().await?);
        } else if name == file_field {
            if upload.files.len() == max_files {
                return Err(AppError::validation(
                    "Too many files",
                    vec![format!("at most {} files may be uploaded at once", max_files)],
                ));
            }
            let filename = field.file_name().map(client_basename).unwrap_or_default();
            let mimetype = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
            let buffer = field.bytes().await?;
            upload.files.push(UploadItem {
                buffer,
                filename,
                mimetype,
            });
        } else {
            debug!("ignoring multipart field `{}`", name);
        }
    }

    Ok(upload)
}

/// Browsers may send a full client path; keep the last component only.
fn client_basename(raw: &str) -> String {
    raw.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// `POST /upload`
pub async fn upload_file(
    State(service): State<FileService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_multipart(multipart, "file", 1).await?;
    let Some(item) = upload.files.into_iter().next() else {
        return Err(AppError::validation(
            "No file uploaded",
            vec!["multipart field `file` is required".into()],
        ));
    };

    let result = service
        .upload_file(item, upload.category.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully.",
            result,
        }),
    ))
}

/// `POST /upload/multiple`
pub async fn upload_multiple(
    State(service): State<FileService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let max_files = service.upload_policy().max_batch_files;
    let upload = read_multipart(multipart, "files", max_files).await?;
    if upload.files.is_empty() {
        return Err(AppError::bad_request("No files provided"));
    }

    let items = upload.files.into_iter().map(Ok).collect();
    Ok(batch_response(&service, items, upload.category.as_deref()).await)
}

/// `POST /upload/base64`
pub async fn upload_base64(
    State(service): State<FileService>,
    body: Result<Json<Base64UploadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body?;
    let Value::Array(files) = request.files else {
        return Err(AppError::bad_request("Files must be an array of base64 data"));
    };

    let items = files
        .into_iter()
        .map(|value| {
            serde_json::from_value::<Base64File>(value)
                .map_err(|err| UploadFailure::new("", vec![format!("invalid file entry: {err}")]))
                .and_then(Base64File::decode)
        })
        .collect();
    Ok(batch_response(&service, items, request.category.as_deref()).await)
}

async fn batch_response(
    service: &FileService,
    items: Vec<Result<UploadItem, UploadFailure>>,
    category: Option<&str>,
) -> (StatusCode, Json<BatchUploadResponse>) {
    let outcome = service.upload_batch(items, category).await;
    let body = BatchUploadResponse {
        message: outcome.message(),
        successful: outcome
            .successful
            .into_iter()
            .map(|result| UploadedFile {
                originalname: result.filename.clone(),
                result,
            })
            .collect(),
        errors: outcome.errors,
    };
    (StatusCode::CREATED, Json(body))
}

/// `GET /files`
pub async fn list_files(
    State(service): State<FileService>,
    Query(params): Query<ListFilesParams>,
) -> Result<impl IntoResponse, AppError> {
    list(&service, None, params).await
}

/// `GET /{bucket}/files`
pub async fn list_bucket_files(
    State(service): State<FileService>,
    Path(bucket): Path<String>,
    Query(params): Query<ListFilesParams>,
) -> Result<impl IntoResponse, AppError> {
    list(&service, Some(&bucket), params).await
}

async fn list(
    service: &FileService,
    bucket: Option<&str>,
    params: ListFilesParams,
) -> Result<Json<ListFilesResponse>, AppError> {
    let query = ListingQuery::parse(&params)
        .map_err(|details| AppError::validation("Invalid query parameters", details))?;
    let page = service.list_files(bucket, &query).await?;
    Ok(Json(ListFilesResponse {
        page,
        query: QueryEcho::new(&params, &query),
    }))
}

/// `GET /file/{fileId}`
pub async fn download_file(
    State(service): State<FileService>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    download(&service, None, &file_id).await
}

/// `GET /{bucket}/file/{fileId}`
pub async fn download_bucket_file(
    State(service): State<FileService>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    download(&service, Some(&bucket), &file_id).await
}

async fn download(
    service: &FileService,
    bucket: Option<&str>,
    file_id: &str,
) -> Result<Response, AppError> {
    let (entry, body) = service.open_file(bucket, file_id).await?;
    let mut response = Response::new(Body::from_stream(body));
    set_file_headers(response.headers_mut(), &entry);
    Ok(response)
}

/// `DELETE /file/{fileId}`
pub async fn delete_file(
    State(service): State<FileService>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    remove(&service, None, file_id).await
}

/// `DELETE /{bucket}/file/{fileId}`
pub async fn delete_bucket_file(
    State(service): State<FileService>,
    Path((bucket, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    remove(&service, Some(&bucket), file_id).await
}

async fn remove(
    service: &FileService,
    bucket: Option<&str>,
    file_id: String,
) -> Result<Json<DeleteResponse>, AppError> {
    let entry = service.delete_file(bucket, &file_id).await?;
    Ok(Json(DeleteResponse {
        message: "File deleted successfully.",
        file_id,
        object_name: entry.object_name,
    }))
}

fn set_file_headers(headers: &mut HeaderMap, entry: &FileEntry) {
    let content_type = entry
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_MIMETYPE);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIMETYPE)),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(entry.size));

    headers.insert(
        header::CONTENT_DISPOSITION,
        attachment_disposition(&entry.filename),
    );

    if let Some(etag) = entry.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&entry.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// `attachment; filename="..."` with characters a quoted header value cannot
/// carry replaced by `_`.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
