//! MutexKv - Named advisory locks
//!
//! Operations that touch the same backend object from different resources
//! (a router and its interfaces) serialize on the object's id.

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map from key to an async mutex, created on first use
///
/// Entries are never removed.
#[derive(Debug, Default)]
pub struct MutexKv {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock; released when dropped
#[derive(Debug)]
pub struct KeyLock {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl MutexKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock named `key`
    pub async fn lock(&self, key: &str) -> KeyLock {
        // Clone the Arc out so the map shard is not held across the await
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        debug!("Locking {}", key);
        let guard = mutex.lock_owned().await;
        debug!("Locked {}", key);
        KeyLock {
            key: key.to_string(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        debug!("Unlocked {}", self.key);
    }
}
