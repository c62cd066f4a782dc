//! HTTP request handlers for the media API.
//!
//! # Endpoints
//!
//! - `GET {prefix}/{*path}` - Serve an original or a resized derivative
//! - `DELETE {prefix}/{folder}/{image}` - Delete an original and its derivatives
//! - `POST {prefix}` - Upload originals (multipart, field `files`)
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        Path, State,
    },
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::engine::{MediaService, UploadedFile};
use crate::error::{ReadError, UploadError};
use crate::store::ImageStore;

use super::auth::OptionalAuth;

/// Header naming where a served image came from.
pub const IMAGE_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-image-source");

/// Multipart field names accepted by the upload endpoint.
const UPLOAD_FIELDS: [&str; 2] = ["files", "files[]"];

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the media service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ImageStore> {
    pub media: Arc<MediaService<S>>,

    /// Cache-Control max-age for served images, in seconds
    pub cache_max_age: u32,
}

impl<S: ImageStore> AppState<S> {
    pub fn new(media: MediaService<S>) -> Self {
        Self::with_cache_max_age(media, 3600)
    }

    pub fn with_cache_max_age(media: MediaService<S>, cache_max_age: u32) -> Self {
        Self {
            media: Arc::new(media),
            cache_max_age,
        }
    }
}

impl<S: ImageStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            media: Arc::clone(&self.media),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Successful upload: request paths of the stored originals.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filepathes: Vec<String>,
}

/// Rejected upload: one message per problem.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadErrorResponse {
    pub files: Vec<String>,
}

// =============================================================================
// Error Mapping
// =============================================================================

impl ReadError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReadError::InvalidPath { .. }
            | ReadError::NotFound(_)
            | ReadError::DimensionLimit { .. } => StatusCode::NOT_FOUND,
            ReadError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ReadError::Store(_) | ReadError::Origin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert ReadError to a bodyless HTTP response.
///
/// 404s are logged at DEBUG level, server errors at ERROR level.
impl IntoResponse for ReadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Server error: {}", self);
        } else {
            debug!(status = status.as_u16(), "Client error: {}", self);
        }
        status.into_response()
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::Validation(files) => {
                warn!(errors = ?files, "Upload rejected");
                (StatusCode::BAD_REQUEST, Json(UploadErrorResponse { files })).into_response()
            }
            UploadError::Store(e) => {
                error!(error = %e, "Failed to store upload");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve an image.
///
/// # Response
///
/// - `200 OK`: image bytes
/// - `404 Not Found`: bad path, or nothing locally or at the origin
/// - `500 Internal Server Error`: storage or origin failure
///
/// # Headers
///
/// - `Content-Type` from the extension
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Image-Source: original|cached|generated|proxy`
pub async fn read_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
) -> Result<Response, ReadError> {
    let image = state.media.read(&path).await?;

    let headers = [
        (header::CONTENT_TYPE, image.content_type.to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (IMAGE_SOURCE_HEADER, image.source.as_str().to_string()),
    ];
    Ok((StatusCode::OK, headers, image.data).into_response())
}

/// Delete an original with its derivatives. No response body.
pub async fn delete_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    auth: OptionalAuth,
    Path(path): Path<String>,
) -> StatusCode {
    if !auth.authorized {
        warn!(path = %path, "Unauthorized delete");
        return StatusCode::FORBIDDEN;
    }
    state.media.delete(&path).await.status_code()
}

/// Store uploaded originals.
///
/// # Response
///
/// - `200 OK`: `{"filepathes": ["<folder>/<name>.<ext>", ...]}`
/// - `400 Bad Request`: `{"files": ["<message>", ...]}`
/// - `403 Forbidden`: missing or invalid token
/// - `500 Internal Server Error`: storage failure
pub async fn upload_handler<S: ImageStore>(
    State(state): State<AppState<S>>,
    auth: OptionalAuth,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    if !auth.authorized {
        warn!("Unauthorized upload");
        return StatusCode::FORBIDDEN.into_response();
    }
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(error = %rejection, "Upload is not multipart");
            return (
                StatusCode::BAD_REQUEST,
                Json(UploadErrorResponse {
                    files: vec![rejection.body_text()],
                }),
            )
                .into_response();
        }
    };

    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_rejection(e),
        };
        if !field.name().is_some_and(|n| UPLOAD_FIELDS.contains(&n)) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        match field.bytes().await {
            Ok(data) => files.push(UploadedFile::new(file_name, data)),
            Err(e) => return multipart_rejection(e),
        }
    }

    match state.media.upload(files).await {
        Ok(filepathes) => Json(UploadResponse { filepathes }).into_response(),
        Err(e) => e.into_response(),
    }
}

fn multipart_rejection(err: MultipartError) -> Response {
    let status = err.status();
    warn!(status = status.as_u16(), error = %err, "Malformed upload");
    (
        status,
        Json(UploadErrorResponse {
            files: vec![err.body_text()],
        }),
    )
        .into_response()
}

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "<crate version>"}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
