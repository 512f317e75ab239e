//! Upload Routes
//!
//! HTTP endpoints for S3 multipart uploads. All inputs travel in headers.
//!
//! Endpoints:
//! - POST /upload/initiate - Start an upload (`X-File-Name`, `X-Total-Parts`)
//! - POST /upload/part - Upload one part, raw body (`X-Upload-ID`, `X-Part-Number`, `Content-Length`)
//! - POST /upload/complete - Assemble the object (`X-Upload-ID`)
//! - POST /upload/abort - Abandon the upload (`X-Upload-ID`)

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};

use crate::error::UploadError;
use crate::state::AppState;
use crate::upload::{
    parse_upload_id, FinishResponse, InitiateRequest, InitiateResponse, PartUploadRequest,
    PartUploadResponse,
};

pub const X_FILE_NAME: &str = "x-file-name";
pub const X_TOTAL_PARTS: &str = "x-total-parts";
pub const X_UPLOAD_ID: &str = "x-upload-id";
pub const X_PART_NUMBER: &str = "x-part-number";

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router(max_part_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/initiate", post(initiate))
        .route(
            "/part",
            post(upload_part).layer(DefaultBodyLimit::max(max_part_bytes)),
        )
        .route("/complete", post(complete))
        .route("/abort", post(abort))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload/initiate
async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InitiateResponse>, UploadError> {
    let request = InitiateRequest::parse(
        header_str(&headers, X_FILE_NAME),
        header_str(&headers, X_TOTAL_PARTS),
    )?;

    let response = state.orchestrator().initiate(request).await?;
    Ok(Json(response))
}

/// POST /upload/part
///
/// The part data is the raw request body.
async fn upload_part(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PartUploadResponse>, UploadError> {
    let request = PartUploadRequest::parse(
        header_str(&headers, X_UPLOAD_ID),
        header_str(&headers, X_PART_NUMBER),
        header_str(&headers, header::CONTENT_LENGTH.as_str()),
    )?;

    let response = state.orchestrator().upload_part(request, body).await?;
    Ok(Json(response))
}

/// POST /upload/complete
async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FinishResponse>, UploadError> {
    let upload_id = parse_upload_id(header_str(&headers, X_UPLOAD_ID))?;
    let response = state.orchestrator().complete_upload(&upload_id).await?;
    Ok(Json(response))
}

/// POST /upload/abort
async fn abort(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FinishResponse>, UploadError> {
    let upload_id = parse_upload_id(header_str(&headers, X_UPLOAD_ID))?;
    let response = state.orchestrator().abort_upload(&upload_id).await?;
    Ok(Json(response))
}

// ============================================================================
// Helpers
// ============================================================================

/// Header value as UTF-8 text; invalid UTF-8 counts as absent
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
}
