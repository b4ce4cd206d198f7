//! Per-site deploy serialization (spec.md §4.2, §9 "per-site activation
//! serialization"). The Store's atomic rename keeps a single activation
//! from ever exposing a broken `current` symlink, but it does not stop two
//! concurrent deploys to the same site from both completing and racing to
//! decide which one ends up active. spec.md §9 calls for a mutex around
//! the deploy *handler* rather than inside the Store, so the
//! manifest -> `.complete` -> activate sequence is observed as one step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct DeployLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, site: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(site.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquires the lock for `site`, blocking out any other deploy or
    /// activation of the same site until the returned guard is dropped.
    pub async fn acquire(&self, site: &str) -> OwnedMutexGuard<()> {
        self.handle(site).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_site_but_not_cross_site() {
        let locks = Arc::new(DeployLocks::new());
        let overlap = Arc::new(AtomicU32::new(0));
        let max_overlap = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let locks = locks.clone();
            let overlap = overlap.clone();
            let max_overlap = max_overlap.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("blog").await;
                let cur = overlap.fetch_add(1, Ordering::SeqCst) + 1;
                max_overlap.fetch_max(cur, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                overlap.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_overlap.load(Ordering::SeqCst), 1);

        // A different site's lock is independent and can run concurrently.
        let start = tokio::time::Instant::now();
        let g1 = locks.acquire("blog").await;
        let other = locks.clone();
        let h = tokio::spawn(async move {
            let _g2 = other.acquire("demo").await;
        });
        h.await.unwrap();
        drop(g1);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
