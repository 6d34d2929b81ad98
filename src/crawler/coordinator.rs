//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the state machine that drives a crawl:
//! - Admitting discovered addresses exactly once
//! - Dispatching queued steps through the concurrency gate
//! - Running the pipeline over every downloaded page
//! - Stopping on cancel, time, visit or error limits
//!
//! Every admission and every completion triggers a dispatch pass. Dispatch
//! decisions are serialized by one lock while downloads and pipelines run as
//! independent tasks.

use crate::config::Config;
use crate::crawler::context::Properties;
use crate::crawler::downloader::{DownloadError, DownloadMethod, DownloaderFactory};
use crate::crawler::events::{CrawlListener, EventHub};
use crate::crawler::fetcher::{build_http_client, WebDownloaderFactory};
use crate::crawler::history::{CrawlHistory, InMemoryHistory};
use crate::crawler::pipeline::{Pipeline, PipelineStep};
use crate::crawler::queue::{CrawlQueue, InMemoryQueue};
use crate::crawler::scheduler::ConcurrencyGate;
use crate::crawler::step::{CrawlStep, QueueEntry};
use crate::output::CrawlStats;
use crate::policy::{CrawlerRules, UrlPolicy};
use crate::state::CrawlState;
use crate::url::{is_crawlable_scheme, url_key, UrlComponents};
use crate::{RippleError, Result};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit};
use url::Url;

/// Handle to one crawl
///
/// Cloning is cheap and every clone drives the same crawl. Pipeline steps
/// receive a `&Crawler` so they can admit the links they discover.
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<Inner>,
}

struct Inner {
    seed: Url,
    components: UrlComponents,
    max_depth: Option<u32>,
    max_visited: Option<u64>,
    max_crawl_time: Option<Duration>,
    max_download_errors: Option<u64>,

    pipeline: Pipeline,
    queue: Arc<dyn CrawlQueue>,
    history: Arc<dyn CrawlHistory>,
    policy: Arc<dyn UrlPolicy>,
    downloaders: Arc<dyn DownloaderFactory>,
    events: EventHub,
    gate: ConcurrencyGate,

    state: Mutex<CrawlState>,
    /// Serializes dispatch passes; reentrant so a listener may cancel mid-pass
    dispatch_lock: ReentrantMutex<()>,
    started_at: Mutex<Option<Instant>>,
    cancelled: AtomicBool,
    visited: AtomicU64,
    download_errors: AtomicU64,
    pipeline_faults: AtomicU64,
    timed_out_steps: AtomicU64,
    done: watch::Sender<bool>,
}

/// Assembles a [`Crawler`]
///
/// Anything not supplied falls back to a default: in-memory queue and
/// history, [`CrawlerRules`] built from the configuration, and a reqwest
/// downloader.
pub struct CrawlerBuilder {
    seed: Url,
    config: Config,
    steps: Vec<Arc<dyn PipelineStep>>,
    queue: Option<Arc<dyn CrawlQueue>>,
    history: Option<Arc<dyn CrawlHistory>>,
    policy: Option<Arc<dyn UrlPolicy>>,
    downloaders: Option<Arc<dyn DownloaderFactory>>,
    listeners: Vec<Arc<dyn CrawlListener>>,
}

impl CrawlerBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Appends a pipeline step; steps run in the order they are added
    pub fn step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn queue<Q: CrawlQueue + 'static>(mut self, queue: Q) -> Self {
        self.queue = Some(Arc::new(queue));
        self
    }

    pub fn history<H: CrawlHistory + 'static>(mut self, history: H) -> Self {
        self.history = Some(Arc::new(history));
        self
    }

    pub fn policy<P: UrlPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn downloader_factory<F: DownloaderFactory + 'static>(mut self, factory: F) -> Self {
        self.downloaders = Some(Arc::new(factory));
        self
    }

    pub fn listener<L: CrawlListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Builds the crawler in the `Idle` state
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to `run`
    /// * `Err(RippleError)` - The HTTP client or the default policy could not be built
    pub fn build(self) -> Result<Crawler> {
        let config = self.config;
        let client = build_http_client(&config.download)?;

        let policy: Arc<dyn UrlPolicy> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(CrawlerRules::new(&self.seed, &config, client.clone())?),
        };
        let downloaders: Arc<dyn DownloaderFactory> = match self.downloaders {
            Some(factory) => factory,
            None => Arc::new(WebDownloaderFactory::new(client, &config.download)),
        };

        let (done, _) = watch::channel(false);

        let inner = Inner {
            seed: self.seed,
            components: config.urls.components(),
            max_depth: config.crawler.max_depth,
            max_visited: config.crawler.max_visited,
            max_crawl_time: config.crawler.max_crawl_time(),
            max_download_errors: config.crawler.max_download_errors,
            pipeline: Pipeline::new(self.steps),
            queue: self.queue.unwrap_or_else(|| Arc::new(InMemoryQueue::new())),
            history: self
                .history
                .unwrap_or_else(|| Arc::new(InMemoryHistory::new())),
            policy,
            downloaders,
            events: EventHub::new(self.listeners),
            gate: ConcurrencyGate::new(config.crawler.max_concurrent_downloads),
            state: Mutex::new(CrawlState::Idle),
            dispatch_lock: ReentrantMutex::new(()),
            started_at: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            visited: AtomicU64::new(0),
            download_errors: AtomicU64::new(0),
            pipeline_faults: AtomicU64::new(0),
            timed_out_steps: AtomicU64::new(0),
            done,
        };

        Ok(Crawler {
            inner: Arc::new(inner),
        })
    }
}

/// Holds a gate slot for one dispatched step
///
/// Dropping it frees the slot and starts a new dispatch pass, on success,
/// fault, veto and panic alike.
struct InFlight {
    crawler: Crawler,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        drop(self.permit.take());
        if tokio::runtime::Handle::try_current().is_ok() {
            self.crawler.dispatch();
        }
    }
}

impl Crawler {
    /// Starts assembling a crawl rooted at `seed`
    pub fn builder(seed: Url) -> CrawlerBuilder {
        CrawlerBuilder {
            seed,
            config: Config::default(),
            steps: Vec::new(),
            queue: None,
            history: None,
            policy: None,
            downloaders: None,
            listeners: Vec::new(),
        }
    }

    pub fn seed(&self) -> &Url {
        &self.inner.seed
    }

    pub fn state(&self) -> CrawlState {
        *self.inner.state.lock()
    }

    /// Steps dispatched for download so far
    pub fn visited_count(&self) -> u64 {
        self.inner.visited.load(Ordering::SeqCst)
    }

    pub fn download_errors(&self) -> u64 {
        self.inner.download_errors.load(Ordering::SeqCst)
    }

    /// Steps currently holding a gate slot
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_use()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Runs the crawl to completion
    ///
    /// Admits the seed at depth 0, or drains the queue when it already holds
    /// entries from an earlier run. Resolves once every in-flight page has
    /// finished and either the queue is empty or the crawl is stopping.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStats)` - The run ended; `cancelled` tells whether it was cut short
    /// * `Err(RippleError::AlreadyStarted)` - `run` was already called on this crawl
    /// * `Err(RippleError::Storage)` - The queue or history failed while admitting the seed
    pub async fn run(&self) -> Result<CrawlStats> {
        let pending = {
            let mut state = self.inner.state.lock();
            if *state != CrawlState::Idle {
                return Err(RippleError::AlreadyStarted);
            }
            let pending = self.inner.queue.len()?;
            *state = CrawlState::Running;
            pending
        };
        *self.inner.started_at.lock() = Some(Instant::now());

        // The time limit also covers admitting the seed, whose policy check may hit the network
        let crawl = async {
            let failure = self.start(pending).await;
            self.wait_until_done().await;
            failure
        };

        let failure = match self.inner.max_crawl_time {
            Some(limit) => {
                tokio::select! {
                    failure = crawl => failure,
                    _ = tokio::time::sleep(limit) => {
                        self.stop("maximum crawl time reached");
                        self.wait_until_done().await;
                        None
                    }
                }
            }
            None => crawl.await,
        };

        *self.inner.state.lock() = CrawlState::Completed;

        let stats = self.stats();
        if stats.cancelled {
            self.inner.events.cancelled();
        }
        self.inner.events.crawl_finished(&stats);
        tracing::info!(
            "Crawl finished: {} visited, {} download errors, {} pipeline faults in {:?}",
            stats.visited,
            stats.download_errors,
            stats.pipeline_faults,
            stats.elapsed
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    /// Offers a discovered address to the crawl
    ///
    /// The address is dropped without error when the crawl is stopping, its
    /// scheme is not http(s), it is at or beyond the maximum depth, the
    /// policy denies it, or it was admitted before. Rejecting the seed
    /// (depth 0) stops the crawl.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Admitted or silently dropped
    /// * `Err(RippleError::NotRunning)` - The crawl has not started or has completed
    /// * `Err(RippleError::Storage)` - The history or queue failed
    pub async fn add_step(&self, url: Url, depth: u32) -> Result<()> {
        self.admit(url, depth, None, Properties::new()).await
    }

    /// Offers a link found on `referrer`, carrying `properties` into the new page's context
    pub async fn add_step_from(
        &self,
        url: Url,
        depth: u32,
        referrer: &CrawlStep,
        properties: Properties,
    ) -> Result<()> {
        self.admit(url, depth, Some(referrer.clone()), properties)
            .await
    }

    /// Cancels a running crawl
    ///
    /// Queued steps are abandoned; in-flight pages finish normally.
    pub fn cancel(&self) -> Result<()> {
        if !self.state().is_active() {
            return Err(RippleError::NotRunning);
        }
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return Err(RippleError::AlreadyCancelled);
        }
        self.stop("cancelled");
        Ok(())
    }

    /// Drains a resumed queue, or admits the seed on a fresh crawl
    async fn start(&self, pending: usize) -> Option<RippleError> {
        if pending > 0 {
            tracing::info!("Resuming crawl with {} queued steps", pending);
            self.dispatch();
            return None;
        }

        tracing::info!("Starting crawl at {}", self.inner.seed);
        let seed = self.inner.seed.clone();
        match self.admit(seed, 0, None, Properties::new()).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!("Failed to admit seed: {}", e);
                self.stop("seed admission failed");
                Some(e)
            }
        }
    }

    async fn admit(
        &self,
        url: Url,
        depth: u32,
        referrer: Option<CrawlStep>,
        properties: Properties,
    ) -> Result<()> {
        match self.state() {
            CrawlState::Idle | CrawlState::Completed => return Err(RippleError::NotRunning),
            CrawlState::Stopping => {
                tracing::debug!("Stopping, dropping {}", url);
                return Ok(());
            }
            CrawlState::Running => {}
        }

        if !self.is_admissible(&url, depth, referrer.as_ref()).await? {
            if depth == 0 {
                tracing::warn!("Seed {} was rejected", url);
                self.stop("seed rejected");
            }
            return Ok(());
        }

        let mut step = CrawlStep::new(url, depth);
        step.is_external = self.inner.policy.is_external(&step.url);
        tracing::debug!("Admitted {}", step);

        self.inner
            .queue
            .push(QueueEntry::new(step, referrer, properties))?;
        self.dispatch();
        Ok(())
    }

    async fn is_admissible(&self, url: &Url, depth: u32, referrer: Option<&CrawlStep>) -> Result<bool> {
        if !is_crawlable_scheme(url) {
            tracing::debug!("Skipping {}: unsupported scheme", url);
            return Ok(false);
        }

        if let Some(max) = self.inner.max_depth {
            if depth >= max {
                tracing::debug!("Skipping {}: depth {} reaches limit {}", url, depth, max);
                return Ok(false);
            }
        }

        if !self.inner.policy.is_allowed(url, referrer).await {
            return Ok(false);
        }

        let key = url_key(url, &self.inner.components);
        let admitted = self.inner.history.register(&key)?;
        if !admitted {
            tracing::debug!("Skipping {}: already seen", url);
        }
        Ok(admitted)
    }

    /// Enters `Stopping` and runs a dispatch pass so completion can be detected
    fn stop(&self, reason: &str) {
        let _pass = self.inner.dispatch_lock.lock();
        self.enter_stopping(reason);
        self.dispatch_locked();
    }

    fn enter_stopping(&self, reason: &str) {
        let mut state = self.inner.state.lock();
        if state.can_transition_to(CrawlState::Stopping) {
            *state = CrawlState::Stopping;
            tracing::info!("Stopping crawl: {}", reason);
        }
    }

    fn dispatch(&self) {
        let _pass = self.inner.dispatch_lock.lock();
        self.dispatch_locked();
    }

    fn dispatch_locked(&self) {
        if self.state() == CrawlState::Running && self.time_exceeded() {
            self.enter_stopping("maximum crawl time reached");
        }

        while self.state() == CrawlState::Running {
            if let Some(max) = self.inner.max_visited {
                if self.visited_count() >= max {
                    self.enter_stopping("maximum visited count reached");
                    break;
                }
            }

            let Some(permit) = self.inner.gate.try_acquire() else {
                break;
            };

            let entry = match self.inner.queue.pop() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read from the queue: {}", e);
                    self.enter_stopping("queue failure");
                    break;
                }
            };

            if self.inner.events.before_download(&entry.step) {
                tracing::debug!("Download of {} vetoed", entry.step.url);
                continue;
            }

            self.inner.visited.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(self.clone().process_entry(entry, permit));
        }

        if self.inner.gate.is_idle() && (self.state() == CrawlState::Stopping || self.queue_is_empty()) {
            self.inner.done.send_replace(true);
        }
    }

    fn queue_is_empty(&self) -> bool {
        match self.inner.queue.is_empty() {
            Ok(empty) => empty,
            Err(e) => {
                tracing::error!("Failed to inspect the queue: {}", e);
                true
            }
        }
    }

    fn time_exceeded(&self) -> bool {
        match (self.inner.max_crawl_time, *self.inner.started_at.lock()) {
            (Some(limit), Some(started)) => started.elapsed() >= limit,
            _ => false,
        }
    }

    async fn wait_until_done(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Downloads one step and runs the pipeline over it
    async fn process_entry(self, entry: QueueEntry, permit: OwnedSemaphorePermit) {
        let _in_flight = InFlight {
            crawler: self.clone(),
            permit: Some(permit),
        };

        let QueueEntry {
            step,
            referrer,
            properties,
        } = entry;
        let events = &self.inner.events;
        let downloader = self.inner.downloaders.create();
        let progress = |bytes: u64| events.download_progress(&step, bytes);

        tracing::debug!("Downloading {}", step);
        let result = downloader
            .download(&step, referrer.as_ref(), DownloadMethod::Get, &progress)
            .await;

        let mut context = match result {
            Ok(context) => context,
            Err(error) => {
                self.record_download_error(&step, referrer.as_ref(), &error);
                return;
            }
        };

        context.referrer = referrer;
        context.properties.extend(properties);

        if events.after_download(&context) {
            tracing::debug!("Processing of {} vetoed", step.url);
            return;
        }

        let report = self
            .inner
            .pipeline
            .run(&self, &mut context, |page, fault| events.pipeline_fault(page, fault))
            .await;

        self.inner
            .pipeline_faults
            .fetch_add(report.faults as u64, Ordering::SeqCst);
        self.inner
            .timed_out_steps
            .fetch_add(report.timed_out as u64, Ordering::SeqCst);
    }

    fn record_download_error(&self, step: &CrawlStep, referrer: Option<&CrawlStep>, error: &DownloadError) {
        let errors = self.inner.download_errors.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!("{}", error);

        if let Some(max) = self.inner.max_download_errors {
            if errors > max {
                self.stop("maximum download errors exceeded");
            }
        }

        self.inner.events.download_fault(step, referrer, error);
    }

    fn stats(&self) -> CrawlStats {
        let started_at = *self.inner.started_at.lock();
        let elapsed = started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();

        CrawlStats {
            visited: self.visited_count(),
            download_errors: self.download_errors(),
            pipeline_faults: self.inner.pipeline_faults.load(Ordering::SeqCst),
            timed_out_steps: self.inner.timed_out_steps.load(Ordering::SeqCst),
            admitted: self.inner.history.len().unwrap_or_default() as u64,
            pending: self.inner.queue.len().unwrap_or_default() as u64,
            elapsed,
            cancelled: self.is_cancelled(),
        }
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("seed", &self.inner.seed.as_str())
            .field("state", &self.state())
            .field("visited", &self.visited_count())
            .field("in_flight", &self.in_flight())
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}
