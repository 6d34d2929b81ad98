//! Ordered processing pipeline applied to every downloaded page
//!
//! Steps run one at a time against the page's [`PropertyBag`]. A step that
//! fails or panics is reported and the next step still runs. A step with a
//! deadline that it overruns is abandoned at its next await point and
//! skipped without a fault.

use crate::crawler::context::PropertyBag;
use crate::crawler::coordinator::Crawler;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// One stage of page processing
///
/// Steps are shared by every page of the crawl, so any state they keep must
/// be safe to use from several pages at once. Newly found addresses are
/// handed back through [`Crawler::add_step`].
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Name used in logs and fault reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Deadline for one invocation; `None` waits indefinitely
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn process(&self, crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()>;
}

/// Gives an existing step a deadline
pub struct WithTimeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S: PipelineStep> WithTimeout<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<S: PipelineStep> PipelineStep for WithTimeout<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn process(&self, crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()> {
        self.inner.process(crawler, context).await
    }
}

/// A step that failed while processing a page
#[derive(Debug, Error)]
pub enum StepFault {
    #[error("Step '{step}' failed: {source:#}")]
    Error {
        step: String,
        source: anyhow::Error,
    },

    #[error("Step '{step}' panicked: {message}")]
    Panic { step: String, message: String },
}

/// How one step invocation ended
#[derive(Debug)]
pub enum StepOutcome {
    Completed,
    TimedOut(Duration),
    Failed(StepFault),
}

/// Runs one step against a page, isolating failures and enforcing its deadline
pub async fn run_step(
    step: &dyn PipelineStep,
    crawler: &Crawler,
    context: &mut PropertyBag,
) -> StepOutcome {
    let guarded = AssertUnwindSafe(step.process(crawler, context)).catch_unwind();

    let result = match step.timeout() {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => return StepOutcome::TimedOut(limit),
        },
        None => guarded.await,
    };

    match result {
        Ok(Ok(())) => StepOutcome::Completed,
        Ok(Err(source)) => StepOutcome::Failed(StepFault::Error {
            step: step.name().to_string(),
            source,
        }),
        Err(panic) => StepOutcome::Failed(StepFault::Panic {
            step: step.name().to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Tally of one pipeline run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub completed: usize,
    pub timed_out: usize,
    pub faults: usize,
}

/// Fixed, ordered list of steps
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Arc<dyn PipelineStep>>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, calling `on_fault` for each failed step
    pub async fn run(
        &self,
        crawler: &Crawler,
        context: &mut PropertyBag,
        mut on_fault: impl FnMut(&PropertyBag, &StepFault) + Send,
    ) -> PipelineReport {
        let mut report = PipelineReport::default();

        for step in &self.steps {
            let started = Instant::now();
            match run_step(step.as_ref(), crawler, context).await {
                StepOutcome::Completed => {
                    report.completed += 1;
                    tracing::trace!(
                        "Step '{}' finished {} in {:?}",
                        step.name(),
                        context.step.url,
                        started.elapsed()
                    );
                }
                StepOutcome::TimedOut(limit) => {
                    report.timed_out += 1;
                    tracing::warn!(
                        "Step '{}' timed out after {:?} on {}, skipping",
                        step.name(),
                        limit,
                        context.step.url
                    );
                }
                StepOutcome::Failed(fault) => {
                    report.faults += 1;
                    tracing::error!("{} on {}", fault, context.step.url);
                    on_fault(context, &fault);
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| s.name()))
            .finish()
    }
}
