/// Local filesystem blob store
///
/// Objects are plain files under a root directory, with the key used as the
/// relative path. The content type lives next to each object in a
/// `<file>.meta` sidecar. Every key is checked with
/// [`validate_key_syntax`] before it touches the filesystem.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use super::{
    key::validate_key_syntax, signer::UrlSigner, BlobError, BlobStore, DeleteOutcome, StoredBlob,
    DEFAULT_CONTENT_TYPE,
};

const META_SUFFIX: &str = ".meta";

/// Directory-backed [`BlobStore`]
#[derive(Debug, Clone)]
pub struct LocalDiskStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalDiskStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>, signer: UrlSigner) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened local blob store");
        Ok(Self { root, signer })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key_syntax(key)?;
        Ok(self.root.join(key))
    }

    fn meta_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }
}

#[async_trait]
impl BlobStore for LocalDiskStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError> {
        let path = self.object_path(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;
        fs::write(Self::meta_path(&path), content_type.as_bytes()).await?;

        debug!(key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredBlob, BlobError> {
        let path = self.object_path(key)?;

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let content_type = match fs::read_to_string(Self::meta_path(&path)).await {
            Ok(ct) if !ct.trim().is_empty() => ct.trim().to_string(),
            _ => DEFAULT_CONTENT_TYPE.to_string(),
        };

        Ok(StoredBlob {
            bytes: Bytes::from(bytes),
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, BlobError> {
        let path = self.object_path(key)?;

        let outcome = match fs::remove_file(&path).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) if e.kind() == ErrorKind::NotFound => DeleteOutcome::NotFound,
            Err(e) => return Err(e.into()),
        };

        // A missing sidecar is fine; the object itself is what counts.
        if let Err(e) = fs::remove_file(Self::meta_path(&path)).await {
            if e.kind() != ErrorKind::NotFound {
                debug!(key, error = %e, "Could not remove blob metadata");
            }
        }

        Ok(outcome)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, BlobError> {
        validate_key_syntax(key)?;
        Ok(self.signer.sign_url(key, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> LocalDiskStore {
        let signer =
            UrlSigner::new(b"local-store-secret-0123456789abcdef", "http://localhost:8080").unwrap();
        LocalDiskStore::open(dir.path().join("blobs"), signer).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .put("uploads/1-1.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        assert!(store.root().join("uploads/1-1.jpg").exists());
        assert!(store.root().join("uploads/1-1.jpg.meta").exists());

        let blob = store.get("uploads/1-1.jpg").await.unwrap();
        assert_eq!(&blob.bytes[..], b"jpeg");
        assert_eq!(blob.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_delete_reports_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store
            .put("uploads/1-1.gif", Bytes::from_static(b"gif"), "image/gif")
            .await
            .unwrap();

        assert_eq!(store.delete("uploads/1-1.gif").await.unwrap(), DeleteOutcome::Deleted);
        assert!(!store.root().join("uploads/1-1.gif.meta").exists());
        assert_eq!(store.delete("uploads/1-1.gif").await.unwrap(), DeleteOutcome::NotFound);
        assert!(matches!(store.get("uploads/1-1.gif").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_metadata_falls_back_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        tokio::fs::create_dir_all(store.root().join("uploads")).await.unwrap();
        tokio::fs::write(store.root().join("uploads/raw.bin"), b"raw").await.unwrap();

        let blob = store.get("uploads/raw.bin").await.unwrap();
        assert_eq!(blob.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        for key in ["../outside.png", "/etc/passwd", "uploads/../../x"] {
            assert!(matches!(
                store.put(key, Bytes::new(), "image/png").await,
                Err(BlobError::InvalidKey(_))
            ));
            assert!(matches!(store.delete(key).await, Err(BlobError::InvalidKey(_))));
        }
    }

    #[tokio::test]
    async fn test_presign_points_at_blob_route() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let url = store
            .presign_get("uploads/1-1.png", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/v1/blobs/uploads/1-1.png?expires="));
    }
}
