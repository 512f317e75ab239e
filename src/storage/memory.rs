//! In-process multipart store
//!
//! Keeps pending parts and assembled objects in memory. Used for local
//! development (`S3_PROVIDER=memory`) and throughout the test suite.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StorageError;

use super::types::{MultipartStore, PartInfo, StoreOperation};

/// A completed assembly as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<PartInfo>,
}

/// Multipart store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    pending: HashMap<String, PendingUpload>,
    objects: HashMap<String, Bytes>,
    completions: Vec<CompletionRecord>,
    aborted: Vec<String>,
    failing: HashSet<StoreOperation>,
}

struct PendingUpload {
    key: String,
    parts: BTreeMap<u32, StoredPart>,
}

struct StoredPart {
    etag: String,
    data: Bytes,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail until [`MemoryStore::recover`]
    pub fn fail(&self, operation: StoreOperation) {
        self.inner.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: StoreOperation) {
        self.inner.lock().failing.remove(&operation);
    }

    /// Assembled object bytes, if completed
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().objects.get(key).cloned()
    }

    /// Every successful completion, in call order
    pub fn completions(&self) -> Vec<CompletionRecord> {
        self.inner.lock().completions.clone()
    }

    /// Upload ids aborted so far
    pub fn aborted(&self) -> Vec<String> {
        self.inner.lock().aborted.clone()
    }

    /// Number of multipart uploads still open
    pub fn open_uploads(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn check_available(
        inner: &MemoryStoreInner,
        operation: StoreOperation,
    ) -> Result<(), StorageError> {
        if inner.failing.contains(&operation) {
            return Err(StorageError::sdk(operation, "injected failure"));
        }
        Ok(())
    }
}

/// Quoted SHA-256 digest, shaped like an S3 ETag
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(data)))
}

fn pending_mut<'a>(
    inner: &'a mut MemoryStoreInner,
    operation: StoreOperation,
    key: &str,
    upload_id: &str,
) -> Result<&'a mut PendingUpload, StorageError> {
    match inner.pending.get_mut(upload_id) {
        Some(upload) if upload.key == key => Ok(upload),
        Some(_) => Err(StorageError::rejected(
            operation,
            format!("key {} does not match upload {}", key, upload_id),
        )),
        None => Err(StorageError::rejected(
            operation,
            format!("no such upload: {}", upload_id),
        )),
    }
}

#[async_trait]
impl MultipartStore for MemoryStore {
    async fn initiate(&self, key: &str) -> Result<String, StorageError> {
        let mut inner = self.inner.lock();
        Self::check_available(&inner, StoreOperation::Initiate)?;

        let upload_id = Uuid::new_v4().simple().to_string();
        inner.pending.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String, StorageError> {
        let operation = StoreOperation::UploadPart;
        let mut inner = self.inner.lock();
        Self::check_available(&inner, operation)?;

        if body.len() as u64 != content_length {
            return Err(StorageError::rejected(
                operation,
                format!(
                    "body is {} bytes, declared {}",
                    body.len(),
                    content_length
                ),
            ));
        }

        let upload = pending_mut(&mut inner, operation, key, upload_id)?;
        let etag = compute_etag(&body);
        upload.parts.insert(
            part_number,
            StoredPart {
                etag: etag.clone(),
                data: body,
            },
        );

        Ok(etag)
    }

    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartInfo],
    ) -> Result<(), StorageError> {
        let operation = StoreOperation::Complete;
        let mut inner = self.inner.lock();
        Self::check_available(&inner, operation)?;

        if parts.is_empty() {
            return Err(StorageError::rejected(operation, "no parts supplied"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StorageError::rejected(
                operation,
                "parts are not in ascending order",
            ));
        }

        let upload = pending_mut(&mut inner, operation, key, upload_id)?;
        let mut object = Vec::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some(stored) if stored.etag == part.etag => object.extend_from_slice(&stored.data),
                Some(_) => {
                    return Err(StorageError::rejected(
                        operation,
                        format!("etag mismatch for part {}", part.part_number),
                    ))
                }
                None => {
                    return Err(StorageError::rejected(
                        operation,
                        format!("part {} was never uploaded", part.part_number),
                    ))
                }
            }
        }

        inner.pending.remove(upload_id);
        inner.objects.insert(key.to_string(), Bytes::from(object));
        inner.completions.push(CompletionRecord {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            parts: parts.to_vec(),
        });

        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        let operation = StoreOperation::Abort;
        let mut inner = self.inner.lock();
        Self::check_available(&inner, operation)?;

        pending_mut(&mut inner, operation, key, upload_id)?;
        inner.pending.remove(upload_id);
        inner.aborted.push(upload_id.to_string());

        Ok(())
    }
}
