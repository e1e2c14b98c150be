//! Per-application serialization of working-tree mutations

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Keyed async mutex: one holder per application name at a time.
///
/// Two deploys of the same app would otherwise race on its local path and temp
/// directories. Different apps never block each other.
#[derive(Default)]
pub struct DeployLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeployLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, app: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(app) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(app.to_string()).or_default().clone()
    }

    /// Wait until `app` is free and hold it until the guard drops.
    pub async fn acquire(&self, app: &str) -> OwnedMutexGuard<()> {
        self.lock_for(app).await.lock_owned().await
    }

    /// Names of apps with a run in progress.
    pub async fn busy_apps(&self) -> Vec<String> {
        let locks = self.locks.read().await;
        let mut busy: Vec<String> = locks
            .iter()
            .filter(|(_, lock)| lock.try_lock().is_err())
            .map(|(name, _)| name.clone())
            .collect();
        busy.sort();
        busy
    }
}
