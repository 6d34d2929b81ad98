//! Concurrency gate for downloads
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - Non-blocking permit acquisition for the dispatch loop
//! - Reporting how many slots are in use

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of steps that may be in flight at once
///
/// A step holds one permit from dispatch until its pipeline has finished;
/// dropping the permit frees the slot.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    /// Global semaphore for limiting concurrent downloads
    semaphore: Arc<Semaphore>,

    /// Total number of slots
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Takes a slot if one is free, without waiting
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    /// Number of slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_idle(&self) -> bool {
        self.in_use() == 0
    }
}
