//! Crawl lifecycle notifications
//!
//! Listeners are called synchronously from whichever task raised the event,
//! so they should return quickly. The two `before`/`after` hooks may veto a
//! page by setting `cancel`.

use crate::crawler::context::PropertyBag;
use crate::crawler::downloader::DownloadError;
use crate::crawler::pipeline::StepFault;
use crate::crawler::step::CrawlStep;
use crate::output::CrawlStats;
use std::sync::Arc;

/// Observer of crawl events; every method defaults to doing nothing
pub trait CrawlListener: Send + Sync {
    /// Called before a step is downloaded
    ///
    /// `cancel` starts out true when the step was marked as not allowed.
    fn before_download(&self, _step: &CrawlStep, _cancel: &mut bool) {}

    /// Called after a successful download, before the pipeline runs
    ///
    /// `cancel` starts out true when the step was marked as not allowed.
    fn after_download(&self, _context: &PropertyBag, _cancel: &mut bool) {}

    /// Cumulative body bytes read so far
    fn download_progress(&self, _step: &CrawlStep, _bytes: u64) {}

    fn download_fault(&self, _step: &CrawlStep, _referrer: Option<&CrawlStep>, _error: &DownloadError) {}

    fn pipeline_fault(&self, _context: &PropertyBag, _fault: &StepFault) {}

    /// Raised exactly once when a run ends, however it ended
    fn crawl_finished(&self, _stats: &CrawlStats) {}

    /// Raised before `crawl_finished` when the run was cancelled
    fn cancelled(&self) {}
}

/// Fans events out to every registered listener
#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Vec<Arc<dyn CrawlListener>>,
}

impl EventHub {
    pub fn new(listeners: Vec<Arc<dyn CrawlListener>>) -> Self {
        Self { listeners }
    }

    /// Returns true when a listener vetoed the download
    pub fn before_download(&self, step: &CrawlStep) -> bool {
        let mut cancel = !step.is_allowed;
        for listener in &self.listeners {
            listener.before_download(step, &mut cancel);
        }
        cancel
    }

    /// Returns true when a listener vetoed processing
    pub fn after_download(&self, context: &PropertyBag) -> bool {
        let mut cancel = !context.step.is_allowed;
        for listener in &self.listeners {
            listener.after_download(context, &mut cancel);
        }
        cancel
    }

    pub fn download_progress(&self, step: &CrawlStep, bytes: u64) {
        for listener in &self.listeners {
            listener.download_progress(step, bytes);
        }
    }

    pub fn download_fault(&self, step: &CrawlStep, referrer: Option<&CrawlStep>, error: &DownloadError) {
        for listener in &self.listeners {
            listener.download_fault(step, referrer, error);
        }
    }

    pub fn pipeline_fault(&self, context: &PropertyBag, fault: &StepFault) {
        for listener in &self.listeners {
            listener.pipeline_fault(context, fault);
        }
    }

    pub fn crawl_finished(&self, stats: &CrawlStats) {
        for listener in &self.listeners {
            listener.crawl_finished(stats);
        }
    }

    pub fn cancelled(&self) {
        for listener in &self.listeners {
            listener.cancelled();
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
