//! HTTP routes over the upload pipeline and the image library.
//!
//! - POST /api/upload - multipart batch, one `files` part per image
//! - GET /api/upload/{job_id}/status - polled job snapshot
//! - POST /api/upload/{job_id}/duplicate-action - resolve a paused duplicate
//! - POST /api/upload/{job_id}/position - resolve a paused crop
//! - GET /api/images/{id}/download - original upload
//! - GET /api/images/{id}/frame - canvas-sized JPEG
//! - GET /health

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use frametagger::{
    CropBox, DuplicateAction, IngestError, JobManager, JobStatusResponse, LibraryImage,
    LibraryStore, SqliteLibrary, StorageError, UploadFile,
};

const UPLOAD_FIELD: &str = "files";

#[derive(Clone)]
pub struct AppState {
    pub manager: JobManager,
    pub library: Arc<SqliteLibrary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateActionBody {
    pub filename: String,
    pub action: DuplicateAction,
}

#[derive(Debug, Deserialize)]
pub struct PositionBody {
    pub filename: String,
    pub crop_box: CropBox,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ingest(IngestError),
    BadRequest(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Ingest(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Ingest(err) => {
                let status = match &err {
                    IngestError::NoFilesProvided => StatusCode::BAD_REQUEST,
                    IngestError::InvalidImage(_) | IngestError::InvalidCropBox(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    IngestError::NotFound(_) => StatusCode::NOT_FOUND,
                    IngestError::StateMismatch { .. } => StatusCode::CONFLICT,
                    IngestError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    IngestError::JobTableFull(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                if status.is_server_error() {
                    warn!("Request failed: {}", err);
                }
                (status, err.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// POST /api/upload
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError::BadRequest(format!("Malformed upload: {}", e))),
        };
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("File part without a filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read '{}': {}", filename, e)))?;
        files.push(UploadFile::new(filename, bytes.to_vec()));
    }

    let job_id = state.manager.submit(files)?;
    Ok(Json(UploadResponse { job_id }))
}

/// GET /api/upload/{job_id}/status
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    Ok(Json(state.manager.status(&job_id)?))
}

/// POST /api/upload/{job_id}/duplicate-action
async fn duplicate_action(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<DuplicateActionBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .manager
        .resolve_duplicate(&job_id, &body.filename, body.action)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// POST /api/upload/{job_id}/position
async fn position(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(body): Json<PositionBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .manager
        .resolve_position(&job_id, &body.filename, body.crop_box)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// Looks up image `id` and reads one of its artifacts on the blocking pool.
async fn read_artifact<F>(
    library: Arc<SqliteLibrary>,
    id: i64,
    read: F,
) -> Result<(LibraryImage, Vec<u8>), ApiError>
where
    F: FnOnce(&SqliteLibrary, &LibraryImage) -> Result<Vec<u8>, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let image = library
            .get(id)?
            .ok_or_else(|| IngestError::NotFound(format!("image {}", id)))?;
        let bytes = read(&library, &image)?;
        Ok((image, bytes))
    })
    .await
    .map_err(|e| ApiError::Ingest(IngestError::StorageFailure(e.to_string())))?
}

/// Header-safe rendering of a user supplied filename.
fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// GET /api/images/{id}/download
async fn download_original(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (image, bytes) =
        read_artifact(state.library, id, |library, image| library.original_bytes(image)).await?;

    let mime = mime_guess::from_path(&image.original_filename)
        .first_or_octet_stream()
        .to_string();
    info!(image_id = id, filename = %image.original_filename, "Serving original");
    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&image.original_filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/images/{id}/frame
async fn frame(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let (_, bytes) =
        read_artifact(state.library, id, |library, image| library.frame_bytes(image)).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn build_router(state: AppState, upload_body_limit: usize) -> Router {
    let upload_route = Router::new()
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(upload_body_limit));

    Router::new()
        .merge(upload_route)
        .route("/api/upload/{job_id}/status", get(job_status))
        .route("/api/upload/{job_id}/duplicate-action", post(duplicate_action))
        .route("/api/upload/{job_id}/position", post(position))
        .route("/api/images/{id}/download", get(download_original))
        .route("/api/images/{id}/frame", get(frame))
        .route("/health", get(health))
        .with_state(state)
}
