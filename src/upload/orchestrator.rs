//! Upload Orchestrator
//!
//! Drives each upload through `Initiated -> PartsArriving* -> Completed | Aborted`
//! against the session registry and the multipart store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::CompletionPolicy;
use crate::error::{StorageError, UploadError};
use crate::storage::MultipartStore;

use super::session::SessionRegistry;
use super::types::{
    FinishResponse, InitiateRequest, InitiateResponse, PartUploadRequest, PartUploadResponse,
};

pub struct UploadOrchestrator {
    registry: SessionRegistry,
    store: Arc<dyn MultipartStore>,
    policy: CompletionPolicy,
}

impl UploadOrchestrator {
    pub fn new(
        registry: SessionRegistry,
        store: Arc<dyn MultipartStore>,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            policy,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start a multipart upload under a collision-resistant key
    pub async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse, UploadError> {
        let key = object_key(&request.file_name);

        let upload_id = self
            .registry
            .create(self.store.as_ref(), key.clone(), request.total_parts)
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            key = %key,
            total_parts = request.total_parts,
            "Multipart upload initiated"
        );

        Ok(InitiateResponse { upload_id, key })
    }

    /// Forward one part to the store and record its ETag
    ///
    /// No lock is held while the store call is outstanding.
    pub async fn upload_part(
        &self,
        request: PartUploadRequest,
        body: Bytes,
    ) -> Result<PartUploadResponse, UploadError> {
        let session = self.registry.get(&request.upload_id).await?;

        if request.part_number > session.expected_parts() {
            return Err(UploadError::InvalidArgument(format!(
                "X-Part-Number {} exceeds declared total of {}",
                request.part_number,
                session.expected_parts()
            )));
        }

        if body.len() as u64 != request.content_length {
            return Err(UploadError::InvalidArgument(format!(
                "Content-Length {} does not match body of {} bytes",
                request.content_length,
                body.len()
            )));
        }

        let etag = self
            .store
            .upload_part(
                session.object_key(),
                session.upload_id(),
                request.part_number,
                body,
                request.content_length,
            )
            .await?;

        let received = session.record_part(request.part_number, etag.clone());

        tracing::debug!(
            upload_id = %request.upload_id,
            part_number = request.part_number,
            parts_received = received,
            total_parts = session.expected_parts(),
            "Part uploaded"
        );

        Ok(PartUploadResponse {
            part_number: request.part_number,
            etag,
        })
    }

    /// Assemble the object from the recorded parts
    pub async fn complete_upload(&self, upload_id: &str) -> Result<FinishResponse, UploadError> {
        if self.policy == CompletionPolicy::Retain {
            // Fail an incomplete set without giving up the session
            self.registry.get(upload_id).await?.completion_parts()?;
        }

        let session = self.registry.take_for_completion(upload_id).await?;
        let parts = session.completion_parts()?;

        let completed = self
            .store
            .complete(session.object_key(), session.upload_id(), &parts)
            .await;

        if let Err(e) = completed {
            match self.policy {
                // The store may have finished the upload after the deadline fired
                CompletionPolicy::Retain if matches!(e, StorageError::Timeout { .. }) => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        key = %session.object_key(),
                        error = %e,
                        "Completion timed out with unknown outcome, session dropped"
                    );
                }
                CompletionPolicy::Retain => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %e,
                        "Completion failed, session kept for retry"
                    );
                    self.registry.reinstate(session).await;
                }
                CompletionPolicy::Consume => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        key = %session.object_key(),
                        error = %e,
                        "Completion failed, session dropped; store-side upload left open"
                    );
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            upload_id = %upload_id,
            key = %session.object_key(),
            parts = parts.len(),
            "Multipart upload completed"
        );

        Ok(FinishResponse {
            message: "Upload completed successfully".to_string(),
            key: session.object_key().to_string(),
        })
    }

    /// Drop the session and abort the upload at the store
    pub async fn abort_upload(&self, upload_id: &str) -> Result<FinishResponse, UploadError> {
        let session = self.registry.take_for_completion(upload_id).await?;

        self.store
            .abort(session.object_key(), session.upload_id())
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            key = %session.object_key(),
            parts_received = session.received_parts(),
            "Multipart upload aborted"
        );

        Ok(FinishResponse {
            message: "Upload aborted".to_string(),
            key: session.object_key().to_string(),
        })
    }

    /// Abort every session at least `ttl` old
    ///
    /// Returns the number of sessions removed.
    pub async fn reap_expired(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let expired = self.registry.drain_expired(ttl, now).await;

        for session in &expired {
            match self
                .store
                .abort(session.object_key(), session.upload_id())
                .await
            {
                Ok(()) => tracing::debug!(
                    upload_id = %session.upload_id(),
                    key = %session.object_key(),
                    "Aborted expired upload"
                ),
                Err(e) => tracing::warn!(
                    upload_id = %session.upload_id(),
                    error = %e,
                    "Failed to abort expired upload"
                ),
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Reaped expired upload sessions");
        }

        expired.len()
    }

    /// Start background expiry sweep
    pub fn start_reaper_task(
        self: Arc<Self>,
        ttl: Duration,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;
                self.reap_expired(ttl, Utc::now()).await;
            }
        })
    }
}

/// `<uuid>_<file name>`, so unrelated uploads of the same name never collide
fn object_key(file_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), file_name)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::storage::{DeadlineStore, MemoryStore, StoreOperation};

    fn orchestrator(policy: CompletionPolicy) -> (Arc<UploadOrchestrator>, MemoryStore) {
        let store = MemoryStore::new();
        let orchestrator = UploadOrchestrator::new(
            SessionRegistry::new(),
            Arc::new(store.clone()),
            policy,
        );
        (Arc::new(orchestrator), store)
    }

    fn initiate_request(file_name: &str, total_parts: u32) -> InitiateRequest {
        InitiateRequest {
            file_name: file_name.to_string(),
            total_parts,
        }
    }

    fn part(upload_id: &str, part_number: u32, body: &'static [u8]) -> (PartUploadRequest, Bytes) {
        (
            PartUploadRequest {
                upload_id: upload_id.to_string(),
                part_number,
                content_length: body.len() as u64,
            },
            Bytes::from_static(body),
        )
    }

    async fn send_part(
        orchestrator: &UploadOrchestrator,
        upload_id: &str,
        part_number: u32,
        body: &'static [u8],
    ) -> Result<PartUploadResponse, UploadError> {
        let (request, body) = part(upload_id, part_number, body);
        orchestrator.upload_part(request, body).await
    }

    #[tokio::test]
    async fn test_initiate_issues_unique_ids_and_suffixed_keys() {
        let (orchestrator, _) = orchestrator(CompletionPolicy::Consume);

        let mut ids = HashSet::new();
        for _ in 0..20 {
            let response = orchestrator
                .initiate(initiate_request("doc.pdf", 2))
                .await
                .unwrap();
            assert!(response.key.ends_with("_doc.pdf"));
            assert!(ids.insert(response.upload_id));
        }
    }

    #[tokio::test]
    async fn test_out_of_order_parts_complete_in_order() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("doc.pdf", 2))
            .await
            .unwrap();

        send_part(&orchestrator, &upload.upload_id, 2, b"world").await.unwrap();
        send_part(&orchestrator, &upload.upload_id, 1, b"hello ").await.unwrap();

        let done = orchestrator.complete_upload(&upload.upload_id).await.unwrap();
        assert_eq!(done.key, upload.key);

        let completions = store.completions();
        assert_eq!(completions.len(), 1);
        let numbers: Vec<u32> = completions[0].parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(store.object(&upload.key).unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_complete_without_parts_is_incomplete_and_consumes() {
        let (orchestrator, _) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap();

        let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::IncompletePartSet {
                received: 0,
                expected: 1
            }
        ));

        let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_retain_policy_keeps_incomplete_session() {
        let (orchestrator, _) = orchestrator(CompletionPolicy::Retain);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap();

        let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
        assert!(matches!(err, UploadError::IncompletePartSet { .. }));

        send_part(&orchestrator, &upload.upload_id, 1, b"data").await.unwrap();
        orchestrator.complete_upload(&upload.upload_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_on_complete() {
        for policy in [CompletionPolicy::Consume, CompletionPolicy::Retain] {
            let (orchestrator, store) = orchestrator(policy);
            let upload = orchestrator
                .initiate(initiate_request("a.txt", 1))
                .await
                .unwrap();
            send_part(&orchestrator, &upload.upload_id, 1, b"data").await.unwrap();

            store.fail(StoreOperation::Complete);
            let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
            assert!(matches!(err, UploadError::StoreUnavailable(_)));
            store.recover(StoreOperation::Complete);

            let retry = orchestrator.complete_upload(&upload.upload_id).await;
            match policy {
                CompletionPolicy::Consume => {
                    assert!(matches!(retry, Err(UploadError::SessionNotFound(_))));
                    assert_eq!(store.open_uploads(), 1);
                }
                CompletionPolicy::Retain => {
                    assert!(retry.is_ok());
                    assert_eq!(store.open_uploads(), 0);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_retain_policy_drops_session_on_completion_timeout() {
        struct SlowComplete(MemoryStore);

        #[async_trait::async_trait]
        impl MultipartStore for SlowComplete {
            async fn initiate(&self, key: &str) -> Result<String, StorageError> {
                self.0.initiate(key).await
            }

            async fn upload_part(
                &self,
                key: &str,
                upload_id: &str,
                part_number: u32,
                body: Bytes,
                content_length: u64,
            ) -> Result<String, StorageError> {
                self.0
                    .upload_part(key, upload_id, part_number, body, content_length)
                    .await
            }

            async fn complete(
                &self,
                _key: &str,
                _upload_id: &str,
                _parts: &[crate::storage::PartInfo],
            ) -> Result<(), StorageError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }

            async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
                self.0.abort(key, upload_id).await
            }
        }

        let orchestrator = UploadOrchestrator::new(
            SessionRegistry::new(),
            Arc::new(DeadlineStore::new(
                SlowComplete(MemoryStore::new()),
                Duration::from_millis(20),
            )),
            CompletionPolicy::Retain,
        );
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap();
        send_part(&orchestrator, &upload.upload_id, 1, b"data").await.unwrap();

        let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::StoreUnavailable(StorageError::Timeout { .. })
        ));
        assert!(orchestrator.registry().is_empty().await);

        let retry = orchestrator.complete_upload(&upload.upload_id).await;
        assert!(matches!(retry, Err(UploadError::SessionNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_parts_all_recorded() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let total = 32u32;
        let upload = orchestrator
            .initiate(initiate_request("big.bin", total))
            .await
            .unwrap();

        let handles: Vec<_> = (1..=total)
            .rev()
            .map(|n| {
                let orchestrator = orchestrator.clone();
                let upload_id = upload.upload_id.clone();
                tokio::spawn(async move {
                    let body = Bytes::from(n.to_be_bytes().to_vec());
                    let request = PartUploadRequest {
                        upload_id,
                        part_number: n,
                        content_length: body.len() as u64,
                    };
                    orchestrator.upload_part(request, body).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = orchestrator.registry().get(&upload.upload_id).await.unwrap();
        assert_eq!(session.received_parts(), total as usize);

        orchestrator.complete_upload(&upload.upload_id).await.unwrap();
        let numbers: Vec<u32> = store.completions()[0]
            .parts
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, (1..=total).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completion_has_one_winner() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap();
        send_part(&orchestrator, &upload.upload_id, 1, b"data").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                let upload_id = upload.upload_id.clone();
                tokio::spawn(async move { orchestrator.complete_upload(&upload_id).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(UploadError::SessionNotFound(_)) => not_found += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(not_found, 7);
        assert_eq!(store.completions().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_upload_id() {
        let (orchestrator, _) = orchestrator(CompletionPolicy::Consume);

        let err = send_part(&orchestrator, "missing", 1, b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(_)));

        let err = orchestrator.complete_upload("missing").await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(_)));

        let err = orchestrator.abort_upload("missing").await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_part_validation() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 2))
            .await
            .unwrap();

        let err = send_part(&orchestrator, &upload.upload_id, 3, b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));

        let request = PartUploadRequest {
            upload_id: upload.upload_id.clone(),
            part_number: 1,
            content_length: 10,
        };
        let err = orchestrator
            .upload_part(request, Bytes::from_static(b"short"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));

        store.fail(StoreOperation::UploadPart);
        let err = send_part(&orchestrator, &upload.upload_id, 1, b"x").await.unwrap_err();
        assert!(matches!(err, UploadError::StoreUnavailable(_)));

        let session = orchestrator.registry().get(&upload.upload_id).await.unwrap();
        assert_eq!(session.received_parts(), 0);
    }

    #[tokio::test]
    async fn test_reupload_replaces_etag() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap();

        send_part(&orchestrator, &upload.upload_id, 1, b"first").await.unwrap();
        let second = send_part(&orchestrator, &upload.upload_id, 1, b"second").await.unwrap();

        orchestrator.complete_upload(&upload.upload_id).await.unwrap();
        assert_eq!(store.completions()[0].parts[0].etag, second.etag);
        assert_eq!(store.object(&upload.key).unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_abort_upload() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 2))
            .await
            .unwrap();
        send_part(&orchestrator, &upload.upload_id, 1, b"x").await.unwrap();

        let aborted = orchestrator.abort_upload(&upload.upload_id).await.unwrap();
        assert_eq!(aborted.key, upload.key);
        assert_eq!(store.aborted(), vec![upload.upload_id.clone()]);
        assert_eq!(store.open_uploads(), 0);

        let err = orchestrator.complete_upload(&upload.upload_id).await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_reap_expired_aborts_at_store() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        let upload = orchestrator
            .initiate(initiate_request("a.txt", 2))
            .await
            .unwrap();

        let ttl = Duration::from_secs(3600);
        assert_eq!(orchestrator.reap_expired(ttl, Utc::now()).await, 0);

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(orchestrator.reap_expired(ttl, later).await, 1);
        assert_eq!(store.aborted(), vec![upload.upload_id.clone()]);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_initiate() {
        let (orchestrator, store) = orchestrator(CompletionPolicy::Consume);
        store.fail(StoreOperation::Initiate);

        let err = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StoreUnavailable(_)));
        assert!(orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_deadline_applies_through_orchestrator() {
        struct SlowInitiate;

        #[async_trait::async_trait]
        impl MultipartStore for SlowInitiate {
            async fn initiate(&self, _key: &str) -> Result<String, crate::error::StorageError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok("late".to_string())
            }

            async fn upload_part(
                &self,
                _key: &str,
                _upload_id: &str,
                _part_number: u32,
                _body: Bytes,
                _content_length: u64,
            ) -> Result<String, crate::error::StorageError> {
                unreachable!()
            }

            async fn complete(
                &self,
                _key: &str,
                _upload_id: &str,
                _parts: &[crate::storage::PartInfo],
            ) -> Result<(), crate::error::StorageError> {
                unreachable!()
            }

            async fn abort(
                &self,
                _key: &str,
                _upload_id: &str,
            ) -> Result<(), crate::error::StorageError> {
                unreachable!()
            }
        }

        let orchestrator = UploadOrchestrator::new(
            SessionRegistry::new(),
            Arc::new(DeadlineStore::new(SlowInitiate, Duration::from_millis(20))),
            CompletionPolicy::Consume,
        );

        let err = orchestrator
            .initiate(initiate_request("a.txt", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StoreUnavailable(_)));
        assert!(orchestrator.registry().is_empty().await);
    }
}
