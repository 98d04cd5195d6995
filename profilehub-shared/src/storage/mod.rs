/// Blob storage for user images
///
/// [`BlobStore`] is the narrow interface the rest of the system sees: put,
/// get, delete and a signed, time-limited read URL. Handlers and the image
/// reconciler share one `Arc<dyn BlobStore>` for the whole process.
///
/// # Backends
///
/// - [`local::LocalDiskStore`]: files under a root directory
/// - [`memory::MemoryBlobStore`]: in-process map with failure injection
///
/// Both hand out URLs pointing at the API's `GET /v1/blobs/{key}` route,
/// signed by [`signer::UrlSigner`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use profilehub_shared::storage::{BlobStore, DeleteOutcome, memory::MemoryBlobStore, signer::UrlSigner};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let signer = UrlSigner::new(b"0123456789abcdef0123456789abcdef", "http://localhost:8080")?;
/// let store = MemoryBlobStore::new(signer);
///
/// store.put("uploads/1-1.png", Bytes::from_static(b"png"), "image/png").await?;
/// let url = store.presign_get("uploads/1-1.png", Duration::from_secs(60)).await?;
/// assert!(url.contains("signature="));
///
/// assert_eq!(store.delete("uploads/1-1.png").await?, DeleteOutcome::Deleted);
/// assert_eq!(store.delete("uploads/1-1.png").await?, DeleteOutcome::NotFound);
/// # Ok(())
/// # }
/// ```

pub mod key;
pub mod local;
pub mod memory;
pub mod signer;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

pub use key::KeyError;
pub use signer::SignatureError;

/// Content type used when a stored object has no recorded type
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result of a delete call. A missing object is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Object bytes with the content type recorded at upload
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError>;

    /// Reads an object. Missing keys yield [`BlobError::NotFound`].
    async fn get(&self, key: &str) -> Result<StoredBlob, BlobError>;

    /// Removes an object.
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, BlobError>;

    /// Returns a URL that grants read access to `key` for `ttl`.
    ///
    /// Does not check that the object exists.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, BlobError>;
}
