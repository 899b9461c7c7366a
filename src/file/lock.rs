//! Per-name mutual exclusion for stored files.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async mutexes keyed by stored name.
///
/// Entries exist only while some task holds or waits for the name.
#[derive(Debug, Default)]
pub struct NameLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    /// Wait until `name` is free and take it.
    pub async fn acquire(locks: &Arc<Self>, name: &str) -> NameGuard {
        let entry = {
            let mut entries = locks.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = entry.lock_owned().await;

        NameGuard {
            name: name.to_string(),
            guard: Some(guard),
            locks: Arc::clone(locks),
        }
    }

    /// Number of names currently tracked.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no name is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one stored name. Released on drop.
#[derive(Debug)]
pub struct NameGuard {
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<NameLocks>,
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut entries = self
            .locks
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the Arc under this same lock, so a count of one
        // means only the table still references the entry.
        if entries
            .get(&self.name)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            entries.remove(&self.name);
        }
    }
}
