//! Per-path advisory locks
//!
//! Transactions lock every normalized path they can touch before taking
//! backups and release them after apply or rollback. Locks are taken in
//! sorted order so two transactions with overlapping paths cannot deadlock.

use aide_types::WorkspacePath;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Normalized lock key of a raw path; `None` for unparsable paths and the root
#[must_use]
pub fn lock_key(raw: &str) -> Option<String> {
    WorkspacePath::parse(raw)
        .ok()
        .filter(|p| !p.is_root())
        .map(|p| p.as_string())
}

/// Registry of path locks
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every path is locked by the caller
    pub async fn acquire<I, S>(&self, paths: I) -> PathLockGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = paths.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = Arc::clone(&*self.inner.entry(key.clone()).or_default());
            guards.push(lock.lock_owned().await);
        }

        PathLockGuard {
            registry: self.clone(),
            keys,
            guards,
        }
    }

    /// Whether `path` is currently held
    #[must_use]
    pub fn is_locked(&self, path: &str) -> bool {
        self.inner
            .get(path)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of paths with a registered lock
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct PathLockGuard {
    registry: PathLocks,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl PathLockGuard {
    /// Locked paths, sorted
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Only the registry still references an idle lock.
            self.registry
                .inner
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lock_keys_are_normalized_paths() {
        assert_eq!(lock_key("./src//a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(lock_key("."), None);
        assert_eq!(lock_key("../escape.ts"), None);
    }

    #[tokio::test]
    async fn locks_are_released_and_pruned_on_drop() {
        let locks = PathLocks::new();
        let guard = locks.acquire(["src/b.ts", "src/a.ts", "src/a.ts"]).await;
        assert_eq!(guard.paths(), ["src/a.ts", "src/b.ts"]);
        assert!(locks.is_locked("src/a.ts"));

        drop(guard);
        assert!(!locks.is_locked("src/a.ts"));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn overlapping_acquisitions_are_serialized() {
        let locks = PathLocks::new();
        let first = locks.acquire(["src/a.ts", "src/b.ts"]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(["src/b.ts", "src/c.ts"]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn disjoint_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.acquire(["src/a.ts"]).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(["src/b.ts"])).await;
        assert!(b.is_ok());
    }
}
