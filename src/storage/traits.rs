//! Storage traits and error types
//!
//! This module defines the run bookkeeping interface for storage backends
//! and the error type shared by every persistent queue and history.

use crate::output::CrawlStats;
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Run bookkeeping for resumable crawls
///
/// Implementations share one underlying store with the queue and history
/// they hand out, so every method takes `&self`.
pub trait Storage {
    /// Creates a new crawl run and returns its ID
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&self, run_id: i64) -> StorageResult<()>;

    /// Drops the persisted queue and history so the next run starts fresh
    fn clear_crawl_state(&self) -> StorageResult<()>;

    /// Records how a crawl ended and returns the status it was given
    ///
    /// A crawl that was cancelled or stopped by a limit with steps still
    /// queued is `Interrupted`, so the next run resumes it.
    fn finish_run(&self, run_id: i64, stats: &CrawlStats) -> StorageResult<RunStatus> {
        if stats.cancelled || stats.pending > 0 {
            self.update_run_status(run_id, RunStatus::Interrupted)?;
            Ok(RunStatus::Interrupted)
        } else {
            self.complete_run(run_id)?;
            Ok(RunStatus::Completed)
        }
    }
}
