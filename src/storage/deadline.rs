//! Per-call deadline for store operations

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

use super::types::{MultipartStore, PartInfo, StoreOperation};

/// Wraps a store so that no call outlives `timeout`
pub struct DeadlineStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: MultipartStore> DeadlineStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: StoreOperation,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation = %operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store call exceeded deadline"
                );
                Err(StorageError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<S: MultipartStore> MultipartStore for DeadlineStore<S> {
    async fn initiate(&self, key: &str) -> Result<String, StorageError> {
        self.bounded(StoreOperation::Initiate, self.inner.initiate(key))
            .await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String, StorageError> {
        self.bounded(
            StoreOperation::UploadPart,
            self.inner
                .upload_part(key, upload_id, part_number, body, content_length),
        )
        .await
    }

    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartInfo],
    ) -> Result<(), StorageError> {
        self.bounded(
            StoreOperation::Complete,
            self.inner.complete(key, upload_id, parts),
        )
        .await
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.bounded(StoreOperation::Abort, self.inner.abort(key, upload_id))
            .await
    }
}
