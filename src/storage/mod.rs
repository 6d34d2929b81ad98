//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - A durable work queue and history for resumable crawls
//! - Run records that decide whether a crawl picks up where it stopped

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{SqliteHistory, SqliteQueue, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

/// One invocation of the crawler against a database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    /// RFC 3339 start time
    pub started_at: String,
    pub finished_at: Option<String>,
    /// Hash of the configuration file the run was started with
    pub config_hash: String,
    pub status: RunStatus,
}

impl RunRecord {
    /// True when this run stopped early and was started with the same configuration
    pub fn resumable_with(&self, config_hash: &str) -> bool {
        self.status.is_unfinished() && self.config_hash == config_hash
    }
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Self::Running, Self::Completed, Self::Interrupted, Self::Failed]
            .into_iter()
            .find(|status| status.as_str() == s)
    }

    /// A run left `Running` was killed before it could record how it ended
    pub fn is_unfinished(self) -> bool {
        matches!(self, Self::Running | Self::Interrupted)
    }
}
