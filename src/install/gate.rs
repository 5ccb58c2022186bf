//! Admission control for install/uninstall operations.
//!
//! Operations on the same package name queue behind a per-name async mutex;
//! a semaphore caps how many operations run at once across all packages.

use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

pub struct OperationGate {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

/// Held for the duration of one operation. Dropping it admits the next one.
#[derive(Debug)]
pub struct OperationPermit {
    _permit: OwnedSemaphorePermit,
    _name: OwnedMutexGuard<()>,
}

impl OperationGate {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            locks: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for exclusive access to `name`, then for a global slot.
    pub async fn acquire(&self, name: &str) -> Result<OperationPermit> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(name.to_string()).or_default())
        };

        let name_guard = lock.lock_owned().await;
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .context("operation gate is closed")?;
        debug!(
            "Admitted operation on {} ({} slots left)",
            name,
            self.semaphore.available_permits()
        );

        Ok(OperationPermit {
            _permit: permit,
            _name: name_guard,
        })
    }
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
