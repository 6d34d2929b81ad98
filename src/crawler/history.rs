//! Duplicate-admission ledger

use crate::storage::StorageError;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Append-only set of history keys
pub trait CrawlHistory: Send + Sync {
    /// Records `key` and reports whether this call admitted it
    ///
    /// Exactly one caller receives `Ok(true)` for a given key, even when
    /// calls race.
    fn register(&self, key: &str) -> Result<bool, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHistory {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrawlHistory for InMemoryHistory {
    fn register(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.keys.lock().insert(key.to_string()))
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.keys.lock().len())
    }
}
