//! Per-request async locks.

use dashmap::DashMap;
use resq_types::RequestId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per request id, created on first use and removed once
/// nobody holds or waits on it.
///
/// Callers on the same id serialize; different ids never contend.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<RequestId, Arc<Mutex<()>>>,
}

/// Exclusive access to one id. Releasing the last guard for an id drops its
/// map entry.
pub(crate) struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    id: RequestId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub(crate) async fn lock(&self, id: &RequestId) -> KeyGuard<'_> {
        // The map shard guard must be released before awaiting.
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        KeyGuard {
            locks: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map
        // still refers to this mutex. `lock` clones under the same shard lock.
        self.locks
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&RequestId::from("r-1")).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_ids_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&RequestId::from("a")).await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&RequestId::from("b")))
            .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_removed() {
        let locks = KeyedLocks::new();
        let held = locks.lock(&RequestId::from("held")).await;
        drop(locks.lock(&RequestId::from("free")).await);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(KeyedLocks::new());
        let first = locks.lock(&RequestId::from("r-1")).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&RequestId::from("r-1")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert!(locks.len() <= 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn many_ids_leave_no_entries_behind() {
        let locks = KeyedLocks::new();
        for i in 0..100 {
            let _guard = locks.lock(&RequestId::new(format!("r-{i}"))).await;
        }
        assert_eq!(locks.len(), 0);
    }
}
