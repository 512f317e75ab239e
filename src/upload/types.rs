//! Request and response records for the multipart upload API

use serde::{Deserialize, Serialize};

use crate::error::UploadError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of parts in one multipart upload (S3 limit)
pub const MAX_PART_COUNT: u32 = 10_000;

// ============================================================================
// Requests
// ============================================================================

/// Validated input for `initiate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateRequest {
    pub file_name: String,
    pub total_parts: u32,
}

impl InitiateRequest {
    pub fn parse(file_name: Option<&str>, total_parts: Option<&str>) -> Result<Self, UploadError> {
        let file_name = require_non_empty("X-File-Name", file_name)?;
        let total_parts = parse_positive("X-Total-Parts", total_parts)?;

        if total_parts > MAX_PART_COUNT {
            return Err(UploadError::InvalidArgument(format!(
                "X-Total-Parts must not exceed {}",
                MAX_PART_COUNT
            )));
        }

        Ok(Self {
            file_name,
            total_parts,
        })
    }
}

/// Validated input for `upload_part`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartUploadRequest {
    pub upload_id: String,
    pub part_number: u32,
    pub content_length: u64,
}

impl PartUploadRequest {
    pub fn parse(
        upload_id: Option<&str>,
        part_number: Option<&str>,
        content_length: Option<&str>,
    ) -> Result<Self, UploadError> {
        let upload_id = parse_upload_id(upload_id)?;
        let part_number = parse_positive("X-Part-Number", part_number)?;
        let content_length = content_length
            .map(str::trim)
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or_else(|| UploadError::InvalidArgument("Invalid Content-Length header".into()))?;

        Ok(Self {
            upload_id,
            part_number,
            content_length,
        })
    }
}

/// Validate the `X-Upload-ID` header
pub fn parse_upload_id(raw: Option<&str>) -> Result<String, UploadError> {
    require_non_empty("X-Upload-ID", raw)
}

fn require_non_empty(header: &str, raw: Option<&str>) -> Result<String, UploadError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(UploadError::InvalidArgument(format!(
            "{} header is required",
            header
        ))),
    }
}

fn parse_positive(header: &str, raw: Option<&str>) -> Result<u32, UploadError> {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .ok_or_else(|| UploadError::InvalidArgument(format!("Invalid {} header", header)))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub upload_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartUploadResponse {
    pub part_number: u32,
    pub etag: String,
}

/// Response for both completion and abort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishResponse {
    pub message: String,
    pub key: String,
}
