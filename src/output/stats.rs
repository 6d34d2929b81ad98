//! Statistics for a finished crawl run
//!
//! The orchestrator fills a [`CrawlStats`] when a run ends and passes it both
//! to the `crawl_finished` listeners and back to the caller of `run`.

use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

/// Counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    /// Steps dispatched for download
    pub visited: u64,

    /// Downloads that ended in a terminal fault
    pub download_errors: u64,

    /// Pipeline steps that failed or panicked
    pub pipeline_faults: u64,

    /// Pipeline steps abandoned at their deadline
    pub timed_out_steps: u64,

    /// Distinct addresses ever admitted, including earlier runs when resuming
    pub admitted: u64,

    /// Steps still queued when the run ended
    pub pending: u64,

    /// Wall time of the run
    pub elapsed: Duration,

    /// True when the run ended through `cancel`
    pub cancelled: bool,
}

impl CrawlStats {
    /// Pages per second over the whole run
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.visited as f64 / secs
        } else {
            0.0
        }
    }
}

/// Renders statistics as a human readable block
pub fn format_statistics(stats: &CrawlStats) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Crawl Statistics ===\n");
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "  Pages visited: {}", stats.visited);
    let _ = writeln!(out, "  Addresses admitted: {}", stats.admitted);
    let _ = writeln!(out, "  Still queued: {}", stats.pending);
    let _ = writeln!(
        out,
        "  Elapsed: {:.1}s ({:.2} pages/s)",
        stats.elapsed.as_secs_f64(),
        stats.rate()
    );
    let _ = writeln!(out);

    if stats.download_errors + stats.pipeline_faults + stats.timed_out_steps > 0 {
        let _ = writeln!(out, "Faults:");
        let _ = writeln!(out, "  Download errors: {}", stats.download_errors);
        let _ = writeln!(out, "  Pipeline faults: {}", stats.pipeline_faults);
        let _ = writeln!(out, "  Timed out steps: {}", stats.timed_out_steps);
        let _ = writeln!(out);
    }

    if stats.cancelled {
        let _ = writeln!(out, "Run was cancelled before the queue drained.");
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStats) {
    print!("{}", format_statistics(stats));
}
