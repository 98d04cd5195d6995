/// Image reconciliation
///
/// When a profile update replaces the image list, every key that was in the
/// old list but is missing from the new one has to be removed from the blob
/// store. The rules:
///
/// - The difference is set-based. Position changes never cause deletes.
/// - Each dropped key gets exactly one delete call, even if it appeared
///   twice in the old list.
/// - Deletes run concurrently and independently, each under its own
///   timeout. One failure never stops the others.
/// - A failed delete is logged and reported, but the key still leaves the
///   list. The object may be orphaned.
/// - "Not found" counts as deleted.
/// - The new list is returned exactly as given.
/// - Nothing is ever uploaded here.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use profilehub_shared::images::ImageReconciler;
/// use profilehub_shared::storage::{memory::MemoryBlobStore, signer::UrlSigner};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let signer = UrlSigner::new(b"0123456789abcdef0123456789abcdef", "http://localhost")?;
/// let store = Arc::new(MemoryBlobStore::new(signer));
/// let reconciler = ImageReconciler::new(store, Duration::from_secs(5));
///
/// let current = vec!["uploads/a.png".to_string(), "uploads/b.png".to_string()];
/// let desired = vec!["uploads/b.png".to_string(), "uploads/c.png".to_string()];
///
/// let outcome = reconciler.reconcile(&current, desired.clone()).await;
/// assert_eq!(outcome.keys, desired);
/// assert_eq!(outcome.deleted, vec!["uploads/a.png".to_string()]);
/// # Ok(())
/// # }
/// ```

use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::storage::{BlobStore, DeleteOutcome};

/// Default per-call timeout for blob deletes
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_millis(5000);

/// A key whose delete call did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDeletion {
    pub key: String,
    pub reason: String,
}

/// What a reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// The authoritative image list to persist
    pub keys: Vec<String>,

    /// Keys whose delete succeeded or found nothing to delete
    pub deleted: Vec<String>,

    /// Keys whose delete failed or timed out; these may be orphaned
    pub failed: Vec<FailedDeletion>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Keys present in `current` but absent from `desired`.
///
/// Each such key appears once, in order of first appearance in `current`.
pub fn keys_to_delete(current: &[String], desired: &[String]) -> Vec<String> {
    let keep: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();

    current
        .iter()
        .filter(|key| !keep.contains(key.as_str()))
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect()
}

/// Deletes the images an update drops
#[derive(Clone)]
pub struct ImageReconciler {
    store: Arc<dyn BlobStore>,
    delete_timeout: Duration,
}

impl ImageReconciler {
    pub fn new(store: Arc<dyn BlobStore>, delete_timeout: Duration) -> Self {
        Self {
            store,
            delete_timeout,
        }
    }

    pub fn delete_timeout(&self) -> Duration {
        self.delete_timeout
    }

    /// Deletes `current - desired` from the store and returns `desired` as
    /// the new list.
    ///
    /// Always completes; every delete has been attempted by the time it
    /// returns.
    pub async fn reconcile(&self, current: &[String], desired: Vec<String>) -> Reconciliation {
        let to_delete = keys_to_delete(current, &desired);

        if to_delete.is_empty() {
            debug!(kept = desired.len(), "No images to delete");
            return Reconciliation {
                keys: desired,
                ..Default::default()
            };
        }

        debug!(count = to_delete.len(), "Deleting dropped images");

        let results = join_all(to_delete.into_iter().map(|key| self.delete_one(key))).await;

        let mut outcome = Reconciliation {
            keys: desired,
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(key) => outcome.deleted.push(key),
                Err(failure) => outcome.failed.push(failure),
            }
        }

        info!(
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            kept = outcome.keys.len(),
            "Image reconciliation finished"
        );
        outcome
    }

    /// Deletes every key in `keys`. Used when a user is removed.
    pub async fn purge(&self, keys: &[String]) -> Reconciliation {
        self.reconcile(keys, Vec::new()).await
    }

    /// Runs [`reconcile`](Self::reconcile) concurrently with `write`, the
    /// caller's persistence of the new list.
    ///
    /// The write's error is returned as is. Deletes that already went out
    /// are not undone; the record keeps its old list while those objects
    /// may be gone.
    pub async fn commit<T, E, W>(
        &self,
        current: &[String],
        desired: Vec<String>,
        write: W,
    ) -> Result<(T, Reconciliation), E>
    where
        W: Future<Output = Result<T, E>>,
    {
        let (reconciliation, written) = tokio::join!(self.reconcile(current, desired), write);

        match written {
            Ok(value) => Ok((value, reconciliation)),
            Err(e) => {
                warn!(
                    deleted = reconciliation.deleted.len(),
                    "Persisting image list failed after deletes were issued"
                );
                Err(e)
            }
        }
    }

    async fn delete_one(&self, key: String) -> Result<String, FailedDeletion> {
        match tokio::time::timeout(self.delete_timeout, self.store.delete(&key)).await {
            Ok(Ok(DeleteOutcome::Deleted)) => Ok(key),
            Ok(Ok(DeleteOutcome::NotFound)) => {
                debug!(key = %key, "Image already absent from store");
                Ok(key)
            }
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to delete image, it may be orphaned");
                Err(FailedDeletion {
                    key,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_ms = millis_saturating(self.delete_timeout),
                    "Image delete timed out, it may be orphaned"
                );
                Err(FailedDeletion {
                    key,
                    reason: "delete timed out".to_string(),
                })
            }
        }
    }
}

fn millis_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{memory::MemoryBlobStore, signer::UrlSigner};
    use bytes::Bytes;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_timeout_millis_saturate() {
        assert_eq!(millis_saturating(Duration::from_millis(5000)), 5000);
        assert_eq!(millis_saturating(Duration::MAX), u64::MAX);
    }

    fn seeded_store(list: &[&str]) -> Arc<MemoryBlobStore> {
        let signer =
            UrlSigner::new(b"reconcile-test-secret-0123456789ab", "http://localhost").unwrap();
        let store = Arc::new(MemoryBlobStore::new(signer));
        for key in list {
            store.insert(*key, Bytes::from_static(b"img"), "image/png");
        }
        store
    }

    fn reconciler(store: &Arc<MemoryBlobStore>) -> ImageReconciler {
        ImageReconciler::new(store.clone(), DEFAULT_DELETE_TIMEOUT)
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_keys_to_delete_is_set_difference() {
        assert_eq!(
            keys_to_delete(&keys(&["a", "b", "c"]), &keys(&["c", "d"])),
            keys(&["a", "b"])
        );
        assert!(keys_to_delete(&keys(&["a", "b"]), &keys(&["b", "a"])).is_empty());
        assert_eq!(
            keys_to_delete(&keys(&["a", "a", "b"]), &keys(&["b"])),
            keys(&["a"])
        );
    }

    #[tokio::test]
    async fn test_partial_replace() {
        let store = seeded_store(&["k1", "k2", "k3"]);
        store.insert("k4", Bytes::new(), "image/png");

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1", "k2", "k3"]), keys(&["k1", "k3", "k4"]))
            .await;

        assert_eq!(outcome.keys, keys(&["k1", "k3", "k4"]));
        assert_eq!(store.delete_calls(), vec!["k2"]);
        assert_eq!(store.keys(), keys(&["k1", "k3", "k4"]));
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_reorder_only_deletes_nothing() {
        let store = seeded_store(&["k1", "k2"]);

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1", "k2"]), keys(&["k2", "k1"]))
            .await;

        assert_eq!(outcome.keys, keys(&["k2", "k1"]));
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_deletes_everything() {
        let store = seeded_store(&["k1", "k2"]);

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1", "k2"]), Vec::new())
            .await;

        assert!(outcome.keys.is_empty());
        assert_eq!(sorted(store.delete_calls()), keys(&["k1", "k2"]));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_one_failing_delete_does_not_stop_the_rest() {
        let store = seeded_store(&["k1", "k2", "k3"]);
        store.fail_deletes_for("k2");

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1", "k2", "k3"]), keys(&["k3"]))
            .await;

        assert_eq!(outcome.keys, keys(&["k3"]));
        assert_eq!(sorted(store.delete_calls()), keys(&["k1", "k2"]));
        assert_eq!(outcome.deleted, keys(&["k1"]));
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].key, "k2");
        assert!(!store.contains("k1"));
        assert!(store.contains("k2"));
    }

    #[tokio::test]
    async fn test_duplicates_in_current_delete_once() {
        let store = seeded_store(&["k1", "k2"]);

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1", "k1", "k2"]), keys(&["k2"]))
            .await;

        assert_eq!(outcome.keys, keys(&["k2"]));
        assert_eq!(store.delete_calls(), vec!["k1"]);
    }

    #[tokio::test]
    async fn test_duplicates_in_desired_are_preserved() {
        let store = seeded_store(&["k1"]);

        let outcome = reconciler(&store)
            .reconcile(&keys(&["k1"]), keys(&["k1", "k1"]))
            .await;

        assert_eq!(outcome.keys, keys(&["k1", "k1"]));
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_retried_reconcile_is_harmless() {
        let store = seeded_store(&["k1", "k2"]);
        let reconciler = reconciler(&store);

        let first = reconciler.reconcile(&keys(&["k1", "k2"]), keys(&["k2"])).await;
        let second = reconciler.reconcile(&keys(&["k1", "k2"]), keys(&["k2"])).await;

        assert_eq!(first.keys, second.keys);
        assert_eq!(store.delete_calls(), vec!["k1", "k1"]);
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn test_never_uploads() {
        let store = seeded_store(&["k1"]);

        reconciler(&store)
            .reconcile(&keys(&["k1"]), keys(&["new1", "new2"]))
            .await;

        assert!(store.put_calls().is_empty());
        assert!(!store.contains("new1"));
    }

    #[tokio::test]
    async fn test_missing_object_counts_as_deleted() {
        let store = seeded_store(&[]);

        let outcome = reconciler(&store).reconcile(&keys(&["gone"]), Vec::new()).await;

        assert_eq!(outcome.deleted, keys(&["gone"]));
        assert!(outcome.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_delete_times_out() {
        let store = seeded_store(&["k1"]);
        store.set_delete_delay(Duration::from_secs(30));

        let reconciler = ImageReconciler::new(store.clone(), Duration::from_millis(100));
        let outcome = reconciler.reconcile(&keys(&["k1"]), Vec::new()).await;

        assert!(outcome.keys.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].reason, "delete timed out");
        assert!(store.contains("k1"));
    }

    #[tokio::test]
    async fn test_purge_removes_all() {
        let store = seeded_store(&["k1", "k2"]);

        let outcome = reconciler(&store).purge(&keys(&["k1", "k2"])).await;

        assert!(outcome.keys.is_empty());
        assert_eq!(sorted(outcome.deleted), keys(&["k1", "k2"]));
    }

    #[tokio::test]
    async fn test_commit_returns_write_result() {
        let store = seeded_store(&["k1", "k2"]);

        let (written, outcome) = reconciler(&store)
            .commit(&keys(&["k1", "k2"]), keys(&["k2"]), async {
                Ok::<_, std::io::Error>(42)
            })
            .await
            .unwrap();

        assert_eq!(written, 42);
        assert_eq!(outcome.deleted, keys(&["k1"]));
    }

    #[tokio::test]
    async fn test_commit_propagates_write_failure_without_rollback() {
        let store = seeded_store(&["k1", "k2"]);

        let result = reconciler(&store)
            .commit(&keys(&["k1", "k2"]), keys(&["k2"]), async {
                Err::<(), _>("database unavailable")
            })
            .await;

        assert_eq!(result.unwrap_err(), "database unavailable");
        assert_eq!(store.delete_calls(), vec!["k1"]);
        assert!(!store.contains("k1"));
    }
}
