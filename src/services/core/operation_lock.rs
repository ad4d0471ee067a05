//! Per-package operation locks.
//!
//! Extraction, replacement and deletion of one package are totally ordered;
//! different packages never wait on each other. Guards are owned so they can
//! be held across `spawn_blocking` awaits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Returned when the lock could not be taken within the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout;

#[derive(Default)]
pub struct PackageLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, package_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(package_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait up to `timeout` for exclusive access to one package.
    pub async fn acquire(
        &self,
        package_id: i64,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, LockTimeout> {
        let slot = self.slot(package_id);
        tokio::time::timeout(timeout, slot.lock_owned())
            .await
            .map_err(|_| LockTimeout)
    }

    /// Drop the lock entry of a deleted package. Holders keep their guard.
    pub fn forget(&self, package_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&package_id);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "tests/operation_lock_tests.rs"]
mod tests;
