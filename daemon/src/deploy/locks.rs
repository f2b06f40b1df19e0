//! Keyed serialization of deployment runs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type LockKey = (String, String);

/// Keyed locks: runs for the same `(repository, stage)` wait for each other,
/// different keys proceed in parallel
#[derive(Debug, Clone, Default)]
pub struct DeployLocks {
    locks: Arc<Mutex<HashMap<LockKey, Arc<Mutex<()>>>>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other run holds `(repository, stage)`
    ///
    /// The returned guard releases the key when dropped.
    pub async fn acquire(&self, repository: &str, stage: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry((repository.to_string(), stage.to_string()))
                .or_default()
                .clone()
        };
        debug!("Waiting for deploy lock {}/{}", repository, stage);
        lock.lock_owned().await
    }

    /// Number of keys that have been locked at least once
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
