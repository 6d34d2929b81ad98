//! Work queue of admitted, not yet dispatched steps

use crate::crawler::step::QueueEntry;
use crate::storage::StorageError;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Ordered store of admitted steps
///
/// `pop` never blocks; an empty queue returns `Ok(None)`. An empty pop does
/// not by itself mean the crawl is over, since in-flight pages may still
/// discover new work.
pub trait CrawlQueue: Send + Sync {
    fn push(&self, entry: QueueEntry) -> Result<(), StorageError>;

    fn pop(&self) -> Result<Option<QueueEntry>, StorageError>;

    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// First-in first-out queue held in memory
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrawlQueue for InMemoryQueue {
    fn push(&self, entry: QueueEntry) -> Result<(), StorageError> {
        self.entries.lock().push_back(entry);
        Ok(())
    }

    fn pop(&self) -> Result<Option<QueueEntry>, StorageError> {
        Ok(self.entries.lock().pop_front())
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.lock().len())
    }
}
