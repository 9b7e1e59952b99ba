use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::StoreError;

/// Idle lock entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Serializes mutations per owner key. Different owners never contend.
#[derive(Clone)]
pub struct OwnerLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    timeout: Duration,
}

/// Held for the duration of one owner-scoped mutation. Released on drop.
pub struct OwnerGuard {
    _guard: OwnedMutexGuard<()>,
    owner_key: String,
    wait_time: Duration,
}

impl OwnerGuard {
    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }
}

impl OwnerLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub async fn acquire(&self, owner_key: &str) -> Result<OwnerGuard, StoreError> {
        let start = Instant::now();

        let lock = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks
                .entry(owner_key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(owner_key.to_string()))?;

        let wait_time = start.elapsed();
        debug!(owner_key, wait_ms = wait_time.as_millis() as u64, "owner lock acquired");

        Ok(OwnerGuard {
            _guard: guard,
            owner_key: owner_key.to_string(),
            wait_time,
        })
    }

    /// Number of owners with a lock entry.
    pub fn tracked_owners(&self) -> usize {
        self.locks.lock().len()
    }
}
