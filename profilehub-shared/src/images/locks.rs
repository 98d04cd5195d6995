/// Per-user update locks
///
/// Update and delete handlers take the user's lock before loading the
/// record and keep it until the new image list is written. Two requests for
/// the same user in one process therefore run one after the other instead
/// of both diffing against the same stale list. Requests for different
/// users never wait on each other.
///
/// # Example
///
/// ```
/// use profilehub_shared::images::UserLocks;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let locks = UserLocks::new();
/// let user_id = Uuid::new_v4();
///
/// let _guard = locks.lock(user_id).await;
/// // load, reconcile, write
/// # }
/// ```

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Map size above which idle entries are dropped on the next `lock` call
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `user_id`. Released on drop.
    pub async fn lock(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        if self.locks.len() >= PRUNE_THRESHOLD {
            self.prune_idle();
        }

        let mutex = self.locks.entry(user_id).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drops entries nobody holds or waits on.
    pub fn prune_idle(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of users with a lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let user_id = Uuid::new_v4();

        let guard = locks.lock(user_id).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(user_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();

        let _first = locks.lock(Uuid::new_v4()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;

        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = Uuid::new_v4();

        let _guard = locks.lock(held).await;
        drop(locks.lock(Uuid::new_v4()).await);

        locks.prune_idle();
        assert_eq!(locks.len(), 1);
        assert!(locks.locks.contains_key(&held));
    }
}
