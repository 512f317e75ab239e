//! Storage module for S3-compatible multipart backends
//!
//! Supports MinIO, Cloudflare R2, Backblaze B2, AWS S3, and an in-memory
//! store for local development.

mod deadline;
mod memory;
mod s3_client;
mod types;

use std::sync::Arc;

pub use deadline::DeadlineStore;
pub use memory::{compute_etag, CompletionRecord, MemoryStore};
pub use s3_client::S3Client;
pub use types::*;

use crate::config::{StorageConfig, StorageProvider};

/// Build the configured store, wrapped in the per-call deadline
pub async fn connect(config: &StorageConfig) -> Arc<dyn MultipartStore> {
    match config.provider {
        StorageProvider::Memory => {
            tracing::warn!("Using in-memory store; uploaded objects will not persist");
            Arc::new(DeadlineStore::new(MemoryStore::new(), config.call_timeout))
        }
        _ => {
            let client = S3Client::new(config).await;
            Arc::new(DeadlineStore::new(client, config.call_timeout))
        }
    }
}
