//! Storage types

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A part accepted by the store, as passed back on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_number: u32,
    pub etag: String,
}

/// The four multipart operations a store exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Initiate,
    UploadPart,
    Complete,
    Abort,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initiate => "initiate",
            Self::UploadPart => "upload-part",
            Self::Complete => "complete",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Multipart upload capability of an object store
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Start a multipart upload and return the store's upload id
    async fn initiate(&self, key: &str) -> Result<String, StorageError>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String, StorageError>;

    /// Assemble the object. `parts` must be in ascending part-number order.
    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartInfo],
    ) -> Result<(), StorageError>;

    /// Abort an in-progress multipart upload
    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError>;
}
