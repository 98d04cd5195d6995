/// In-memory blob store
///
/// Used by tests and by `STORAGE_BACKEND=memory` for throwaway deployments.
/// Besides storing objects it records every `put` and `delete` call and can
/// be told to fail or stall specific operations, which is how the image
/// reconciler's failure handling is exercised.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{key::validate_key_syntax, signer::UrlSigner, BlobError, BlobStore, DeleteOutcome, StoredBlob};

/// Map-backed [`BlobStore`]
#[derive(Debug)]
pub struct MemoryBlobStore {
    objects: DashMap<String, StoredBlob>,
    signer: UrlSigner,
    failing_deletes: DashSet<String>,
    failing_presigns: DashSet<String>,
    delete_delay: Mutex<Option<Duration>>,
    put_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: DashMap::new(),
            signer,
            failing_deletes: DashSet::new(),
            failing_presigns: DashSet::new(),
            delete_delay: Mutex::new(None),
            put_calls: Mutex::new(Vec::new()),
            delete_calls: Mutex::new(Vec::new()),
        }
    }

    /// Stores an object without recording a `put` call.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Bytes>, content_type: &str) {
        self.objects.insert(
            key.into(),
            StoredBlob {
                bytes: bytes.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Makes every later `delete(key)` fail with a backend error.
    pub fn fail_deletes_for(&self, key: impl Into<String>) {
        self.failing_deletes.insert(key.into());
    }

    /// Makes every later `presign_get(key)` fail with a backend error.
    pub fn fail_presigns_for(&self, key: impl Into<String>) {
        self.failing_presigns.insert(key.into());
    }

    /// Stalls each `delete` for `delay` before it takes effect.
    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    /// Keys passed to `put`, in call order.
    pub fn put_calls(&self) -> Vec<String> {
        self.put_calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Keys passed to `delete`, in call order.
    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(calls: &Mutex<Vec<String>>, key: &str) {
        calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError> {
        validate_key_syntax(key)?;
        Self::record(&self.put_calls, key);
        self.insert(key, bytes, content_type);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredBlob, BlobError> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, BlobError> {
        Self::record(&self.delete_calls, key);

        let delay = *self.delete_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_deletes.contains(key) {
            return Err(BlobError::Backend(format!("injected delete failure for {}", key)));
        }

        Ok(match self.objects.remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, BlobError> {
        if self.failing_presigns.contains(key) {
            return Err(BlobError::Backend(format!("injected presign failure for {}", key)));
        }
        Ok(self.signer.sign_url(key, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryBlobStore {
        MemoryBlobStore::new(UrlSigner::new(b"memory-store-secret-0123456789abcd", "http://localhost").unwrap())
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = store();
        store
            .put("uploads/1-1.png", Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();

        let blob = store.get("uploads/1-1.png").await.unwrap();
        assert_eq!(blob.content_type, "image/png");
        assert_eq!(&blob.bytes[..], b"\x89PNG");

        assert_eq!(store.delete("uploads/1-1.png").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete("uploads/1-1.png").await.unwrap(), DeleteOutcome::NotFound);
        assert!(matches!(store.get("uploads/1-1.png").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_records_calls_but_not_inserts() {
        let store = store();
        store.insert("uploads/seeded.png", Bytes::new(), "image/png");
        store.put("uploads/put.png", Bytes::new(), "image/png").await.unwrap();
        store.delete("uploads/seeded.png").await.unwrap();

        assert_eq!(store.put_calls(), vec!["uploads/put.png"]);
        assert_eq!(store.delete_calls(), vec!["uploads/seeded.png"]);
        assert_eq!(store.keys(), vec!["uploads/put.png"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = store();
        store.insert("uploads/a.png", Bytes::new(), "image/png");
        store.fail_deletes_for("uploads/a.png");
        store.fail_presigns_for("uploads/a.png");

        assert!(matches!(store.delete("uploads/a.png").await, Err(BlobError::Backend(_))));
        assert!(store.contains("uploads/a.png"));
        assert!(store
            .presign_get("uploads/a.png", Duration::from_secs(60))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_put_rejects_unsafe_key() {
        let store = store();
        let result = store.put("../etc/passwd", Bytes::new(), "text/plain").await;
        assert!(matches!(result, Err(BlobError::InvalidKey(_))));
    }
}
