use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use crate::{auth::jwt::AuthUser, error::ApiError, error::MessageBody, state::AppState};

use super::dto::{DeleteRequest, DownloadQuery, ListQuery, RenameRequest};
use super::repo_types::FileRecord;
use super::services::{attachment_header, delete_file, list_files, read_file, rename_file};
use super::upload::UploadedFile;

const UPLOAD_FIELD: &str = "files";

// --- routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list))
        .route("/download", get(download))
}

pub fn write_routes(body_limit_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/rename", post(rename))
        .route("/delete", post(delete))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let records = list_files(
        state.files.as_ref(),
        user_id,
        q.col.as_deref(),
        q.ord.as_deref(),
    )
    .await?;
    Ok(Json(records))
}

#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DownloadQuery>,
) -> Result<(HeaderMap, Bytes), ApiError> {
    let (record, body) = read_file(state.files.as_ref(), state.blobs.as_ref(), user_id, q.id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = HeaderValue::from_str(&attachment_header(&record))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok((headers, body))
}

/// POST /upload (multipart)
/// Every `files` part is one file; other parts are ignored.
#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    let mut files = Vec::new();
    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        ApiError::Validation("Malformed upload body".into())
    })? {
        if !matches!(field.name(), Some(UPLOAD_FIELD) | Some("files[]")) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let body = field.bytes().await.map_err(|e| {
            warn!(error = %e, file = %filename, "could not read upload part");
            ApiError::Validation("Malformed upload body".into())
        })?;
        files.push(UploadedFile { filename, body });
    }

    let dir = state.config.upload.dir.join(user_id.to_string());
    let report = state.uploads.ingest(user_id, &dir, files).await;
    Ok((
        report.http_status(),
        Json(MessageBody {
            message: report.message(),
        }),
    ))
}

#[instrument(skip(state))]
pub async fn rename(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<RenameRequest>,
) -> Result<Json<FileRecord>, ApiError> {
    let record = rename_file(state.files.as_ref(), user_id, req.id, &req.name).await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<MessageBody>, ApiError> {
    delete_file(state.files.as_ref(), state.blobs.as_ref(), user_id, req.id).await?;
    Ok(Json(MessageBody {
        message: "File deleted.".into(),
    }))
}
