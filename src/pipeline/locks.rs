//! Per-thread mutual exclusion.
//!
//! One async mutex per thread id. A cycle holds its thread's guard from
//! the dedup re-check through the memory write, so cycles on one thread
//! never interleave while other threads proceed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
pub struct ThreadLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `thread_id`.
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(thread_id).await.lock_owned().await
    }

    async fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(thread_id) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.locks.write().await;
        Arc::clone(
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop entries nobody holds or waits on.
    pub async fn prune(&self) {
        let mut locks = self.locks.write().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_thread_is_serialized() {
        let locks = Arc::new(ThreadLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, active, peak) = (locks.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("t1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_threads_do_not_block() {
        let locks = ThreadLocks::new();
        let _t1 = locks.acquire("t1").await;
        let t2 = tokio::time::timeout(Duration::from_millis(100), locks.acquire("t2")).await;
        assert!(t2.is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = ThreadLocks::new();
        let held = locks.acquire("t1").await;
        drop(locks.acquire("t2").await);
        assert_eq!(locks.tracked().await, 2);

        locks.prune().await;
        assert_eq!(locks.tracked().await, 1);

        drop(held);
        locks.prune().await;
        assert_eq!(locks.tracked().await, 0);
    }
}
