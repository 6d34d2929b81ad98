//! Crawl lifecycle states

use std::fmt;

/// Lifecycle state of a crawl
///
/// A crawl moves strictly forward: `Idle -> Running -> Stopping -> Completed`.
/// A crawl that drains naturally skips `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Configured but `run` has not been called
    Idle,

    /// Admitting and dispatching work
    Running,

    /// No new work is dispatched; in-flight downloads finish normally
    Stopping,

    /// Terminal; completion events have fired
    Completed,
}

impl CrawlState {
    /// Returns true if the transition to `next` moves the lifecycle forward
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Stopping)
                | (Self::Running, Self::Completed)
                | (Self::Stopping, Self::Completed)
        )
    }

    /// Returns true while `run` is in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
