//! Upload Session Registry
//!
//! Owns every in-flight upload session:
//! - The map itself sits behind a single async `RwLock`, held only for
//!   insert/lookup/remove and never across a store call
//! - Each session carries its own ledger mutex, so unrelated uploads never
//!   contend on part bookkeeping
//! - Removal for completion is one step under the write lock, so at most one
//!   caller can finish a given upload

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::error::{StorageError, UploadError};
use crate::storage::{MultipartStore, PartInfo};

use super::ledger::PartLedger;

// ============================================================================
// Upload Session
// ============================================================================

/// In-memory record correlating an upload id with its declared and received parts
#[derive(Debug)]
pub struct UploadSession {
    upload_id: String,
    object_key: String,
    expected_parts: u32,
    created_at: DateTime<Utc>,
    ledger: Mutex<PartLedger>,
}

impl UploadSession {
    pub fn new(upload_id: String, object_key: String, expected_parts: u32) -> Self {
        Self {
            upload_id,
            object_key,
            expected_parts,
            created_at: Utc::now(),
            ledger: Mutex::new(PartLedger::new()),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn expected_parts(&self) -> u32 {
        self.expected_parts
    }

    /// Record a part and return how many distinct parts are now held
    pub fn record_part(&self, part_number: u32, etag: String) -> usize {
        let mut ledger = self.ledger.lock();
        if let Some(previous) = ledger.add_part(part_number, etag) {
            tracing::debug!(
                upload_id = %self.upload_id,
                part_number = part_number,
                previous_etag = %previous,
                "Part re-uploaded, replacing earlier ETag"
            );
        }
        ledger.len()
    }

    pub fn received_parts(&self) -> usize {
        self.ledger.lock().len()
    }

    /// Ordered parts for the store's complete call
    ///
    /// The completeness check and the ordered read share one lock acquisition.
    pub fn completion_parts(&self) -> Result<Vec<PartInfo>, UploadError> {
        let ledger = self.ledger.lock();
        if !ledger.is_complete(self.expected_parts) {
            tracing::debug!(
                upload_id = %self.upload_id,
                missing = ?ledger.missing_parts(self.expected_parts),
                "Completion attempted with missing parts"
            );
            return Err(UploadError::IncompletePartSet {
                received: ledger.len(),
                expected: self.expected_parts,
            });
        }
        Ok(ledger.ordered_parts())
    }

    /// Whether the session is at least `ttl` old at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age >= ttl)
            .unwrap_or(false)
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// Concurrent map from upload id to session
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<UploadSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initiate at the store and register the resulting session
    ///
    /// Nothing is registered when the store call fails.
    pub async fn create(
        &self,
        store: &dyn MultipartStore,
        object_key: String,
        expected_parts: u32,
    ) -> Result<String, UploadError> {
        let upload_id = store.initiate(&object_key).await?;

        let mut sessions = self.sessions.write().await;
        match sessions.entry(upload_id.clone()) {
            Entry::Occupied(_) => {
                tracing::error!(upload_id = %upload_id, "Store returned an upload id already in use");
                Err(StorageError::DuplicateUploadId(upload_id).into())
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(UploadSession::new(
                    upload_id.clone(),
                    object_key,
                    expected_parts,
                )));
                Ok(upload_id)
            }
        }
    }

    /// Look up a session without removing it
    pub async fn get(&self, upload_id: &str) -> Result<Arc<UploadSession>, UploadError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(upload_id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.to_string()))
    }

    /// Remove and return a session in one step
    pub async fn take_for_completion(
        &self,
        upload_id: &str,
    ) -> Result<Arc<UploadSession>, UploadError> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(upload_id)
            .ok_or_else(|| UploadError::SessionNotFound(upload_id.to_string()))
    }

    /// Put a previously taken session back
    pub async fn reinstate(&self, session: Arc<UploadSession>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.upload_id().to_string(), session);
    }

    /// Remove and return every session at least `ttl` old
    pub async fn drain_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<Arc<UploadSession>> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(ttl, now))
            .map(|s| s.upload_id().to_string())
            .collect();

        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
