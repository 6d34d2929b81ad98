//! Orchestration tests against an in-process fake site
//!
//! These cover admission, dedup, the concurrency gate, stop conditions,
//! step isolation, events and resumption without any network traffic.

use crate::common::{offline_config, site_url, Counter, CountingStep, FakeSite, Recorder, SITE};
use async_trait::async_trait;
use ripple_crawl::crawler::{
    Crawler, HtmlDocumentProcessor, PipelineStep, PropertyBag, WithTimeout,
};
use ripple_crawl::policy::{AllowAll, UrlPolicy};
use ripple_crawl::storage::{RunStatus, SqliteStorage, Storage};
use ripple_crawl::{CrawlState, CrawlStep, RippleError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn seed() -> Url {
    Url::parse(SITE).unwrap()
}

/// Step that cancels the crawl on the seed page and remembers what cancel returned
#[derive(Clone, Default)]
struct CancelOnSeed {
    results: Arc<parking_lot::Mutex<Vec<String>>>,
}

#[async_trait]
impl PipelineStep for CancelOnSeed {
    async fn process(&self, crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()> {
        if context.step.depth == 0 {
            for _ in 0..2 {
                let outcome = match crawler.cancel() {
                    Ok(()) => "ok".to_string(),
                    Err(e) => e.to_string(),
                };
                self.results.lock().push(outcome);
            }
        }
        Ok(())
    }
}

struct FailingStep;

#[async_trait]
impl PipelineStep for FailingStep {
    fn name(&self) -> &str {
        "failing"
    }

    async fn process(&self, _crawler: &Crawler, _context: &mut PropertyBag) -> anyhow::Result<()> {
        anyhow::bail!("step refused the page")
    }
}

struct PanickingStep;

#[async_trait]
impl PipelineStep for PanickingStep {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn process(&self, _crawler: &Crawler, _context: &mut PropertyBag) -> anyhow::Result<()> {
        panic!("step blew up")
    }
}

struct StallingStep;

#[async_trait]
impl PipelineStep for StallingStep {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn process(&self, _crawler: &Crawler, _context: &mut PropertyBag) -> anyhow::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Offers the same address ten times at once, differing only by fragment
struct Flood {
    accepted: Arc<AtomicUsize>,
}

#[async_trait]
impl PipelineStep for Flood {
    async fn process(&self, crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()> {
        if context.step.depth > 0 {
            return Ok(());
        }

        let offers = (0..10).map(move |i| {
            let url = site_url(&format!("/shared#part-{}", i));
            crawler.add_step(url, 1)
        });
        for result in futures::future::join_all(offers).await {
            result?;
            self.accepted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Rejects one path and marks another host as external but allowed
struct PickyPolicy;

#[async_trait]
impl UrlPolicy for PickyPolicy {
    async fn is_allowed(&self, url: &Url, _referrer: Option<&CrawlStep>) -> bool {
        url.path() != "/blocked"
    }

    fn is_external(&self, url: &Url) -> bool {
        url.host_str() != Some("site.test")
    }
}

#[tokio::test]
async fn test_each_address_is_fetched_once() {
    let site = FakeSite::new()
        .page("/", &["/a", "/b", "/a#top", "/b#bottom", "/"])
        .page("/a", &["/", "/b"])
        .page("/b", &["/a"])
        .shared();

    let mut config = offline_config();
    config.crawler.max_concurrent_downloads = 4;

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 3);
    assert_eq!(stats.admitted, 3);
    for path in ["/", "/a", "/b"] {
        assert_eq!(site.fetch_count(path), 1, "{} fetched more than once", path);
    }
    assert_eq!(crawler.state(), CrawlState::Completed);
    assert_eq!(crawler.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_offers_admit_once() {
    let site = FakeSite::new().page("/", &[]).page("/shared", &[]).shared();
    let accepted = Arc::new(AtomicUsize::new(0));

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(Flood {
            accepted: Arc::clone(&accepted),
        })
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(accepted.load(Ordering::SeqCst), 10);
    assert_eq!(site.fetch_count("/shared"), 1);
    assert_eq!(stats.visited, 2);
}

#[tokio::test]
async fn test_gate_bounds_concurrent_downloads() {
    let pages: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
    let links: Vec<&str> = pages.iter().map(String::as_str).collect();
    let mut site = FakeSite::new().page("/", &links).delay(Duration::from_millis(30));
    for page in &pages {
        site = site.page(page, &[]);
    }
    let site = site.shared();

    let mut config = offline_config();
    config.crawler.max_concurrent_downloads = 3;

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 11);
    assert!(site.max_active() <= 3, "saw {} active downloads", site.max_active());
    assert!(site.max_active() >= 2);
}

#[tokio::test]
async fn test_max_depth_limits_admission() {
    let site = FakeSite::new()
        .page("/", &["/a"])
        .page("/a", &["/b"])
        .page("/b", &["/c"])
        .shared();

    let mut config = offline_config();
    config.crawler.max_depth = Some(2);

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    assert_eq!(site.fetched(), vec!["/", "/a"]);
}

#[tokio::test]
async fn test_zero_max_depth_finishes_without_fetching() {
    let site = FakeSite::new().page("/", &["/a"]).shared();
    let recorder = Recorder::shared();

    let mut config = offline_config();
    config.crawler.max_depth = Some(0);

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 0);
    assert!(site.fetched().is_empty());
    assert_eq!(recorder.events(), vec!["crawl_finished"]);
}

#[tokio::test]
async fn test_rejected_seed_stops_crawl() {
    let site = FakeSite::new().page("/blocked", &["/a"]).shared();
    let recorder = Recorder::shared();

    let crawler = Crawler::builder(site_url("/blocked"))
        .config(offline_config())
        .policy(PickyPolicy)
        .downloader_factory(site.factory())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 0);
    assert!(!stats.cancelled);
    assert_eq!(recorder.events(), vec!["crawl_finished"]);
}

#[tokio::test]
async fn test_policy_tags_external_steps() {
    let site = FakeSite::new()
        .page("/", &["https://elsewhere.test/x", "/blocked", "/a"])
        .page("/a", &[])
        .page("/x", &[])
        .shared();
    let recorder = Recorder::shared();

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .policy(PickyPolicy)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    let before = recorder.before.lock().clone();
    let external: Vec<_> = before
        .iter()
        .filter(|s| s.is_external)
        .map(|s| s.url.as_str().to_string())
        .collect();
    assert_eq!(external, vec!["https://elsewhere.test/x"]);
    assert!(before.iter().all(|s| s.url.path() != "/blocked"));
    assert_eq!(site.fetch_count("/a"), 1);
}

#[tokio::test]
async fn test_max_visited_stops_dispatch() {
    let site = FakeSite::new()
        .page("/", &["/a", "/b", "/c", "/d", "/e"])
        .shared();

    let mut config = offline_config();
    config.crawler.max_visited = Some(3);
    config.crawler.max_concurrent_downloads = 1;

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 3);
    assert_eq!(site.fetched().len(), 3);
    assert!(!stats.cancelled);
    assert_eq!(stats.pending, 3);
}

#[tokio::test]
async fn test_download_error_limit_stops_crawl() {
    let site = FakeSite::new()
        .page("/", &["/a", "/b", "/c", "/d"])
        .failing("/a")
        .failing("/b")
        .failing("/c")
        .failing("/d")
        .shared();
    let recorder = Recorder::shared();

    let mut config = offline_config();
    config.crawler.max_download_errors = Some(1);
    config.crawler.max_concurrent_downloads = 1;

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
    assert_eq!(stats.download_errors, 2);
    assert_eq!(crawler.download_errors(), 2);
    assert_eq!(recorder.download_faults.lock().len(), 2);
    assert!(recorder.download_faults.lock()[0].starts_with("/a "));
    assert!(!stats.cancelled);
}

#[tokio::test]
async fn test_failing_and_panicking_steps_do_not_block_the_pipeline() {
    let site = FakeSite::new().page("/", &["/a"]).page("/a", &[]).shared();
    let counter = Counter::shared();
    let recorder = Recorder::shared();

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .step(FailingStep)
        .step(PanickingStep)
        .step(CountingStep(Arc::clone(&counter)))
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 2);
    assert_eq!(counter.runs(), 2);
    assert_eq!(stats.pipeline_faults, 4);

    let faults = recorder.pipeline_faults.lock().clone();
    assert_eq!(faults.len(), 4);
    assert!(faults.iter().any(|f| f.contains("failing") && f.contains("refused")));
    assert!(faults.iter().any(|f| f.contains("panicking") && f.contains("blew up")));
}

#[tokio::test]
async fn test_timed_out_step_is_skipped_without_fault() {
    let site = FakeSite::new().page("/", &[]).shared();
    let counter = Counter::shared();
    let recorder = Recorder::shared();

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(WithTimeout::new(StallingStep, Duration::from_millis(50)))
        .step(CountingStep(Arc::clone(&counter)))
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.timed_out_steps, 1);
    assert_eq!(stats.pipeline_faults, 0);
    assert_eq!(counter.runs(), 1);
    assert!(recorder.pipeline_faults.lock().is_empty());
}

#[tokio::test]
async fn test_cancel_abandons_queue_and_fires_events_in_order() {
    let site = FakeSite::new()
        .page("/", &["/a", "/b", "/c"])
        .page("/a", &[])
        .shared();
    let canceller = CancelOnSeed::default();
    let recorder = Recorder::shared();

    let mut config = offline_config();
    config.crawler.max_concurrent_downloads = 1;

    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .step(canceller.clone())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert!(stats.cancelled);
    assert_eq!(site.fetched(), vec!["/"]);
    assert_eq!(stats.pending, 3);
    assert_eq!(
        *canceller.results.lock(),
        vec![
            "ok".to_string(),
            RippleError::AlreadyCancelled.to_string()
        ]
    );
    assert_eq!(recorder.events(), vec!["cancelled", "crawl_finished"]);
    assert_eq!(recorder.finished.lock().len(), 1);
    assert!(matches!(crawler.cancel(), Err(RippleError::NotRunning)));
}

#[tokio::test]
async fn test_invalid_usage() {
    let site = FakeSite::new().page("/", &[]).shared();
    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .build()
        .unwrap();

    assert!(matches!(
        crawler.add_step(site_url("/early"), 1).await,
        Err(RippleError::NotRunning)
    ));
    assert!(matches!(crawler.cancel(), Err(RippleError::NotRunning)));

    crawler.run().await.unwrap();

    assert!(matches!(crawler.run().await, Err(RippleError::AlreadyStarted)));
    assert!(matches!(
        crawler.add_step(site_url("/late"), 1).await,
        Err(RippleError::NotRunning)
    ));
}

#[tokio::test]
async fn test_before_download_veto_skips_fetch() {
    let site = FakeSite::new()
        .page("/", &["/secret", "/public"])
        .page("/public", &[])
        .page("/secret", &[])
        .shared();
    let recorder = Recorder::shared();
    recorder.veto_download("/secret");

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(site.fetch_count("/secret"), 0);
    assert_eq!(site.fetch_count("/public"), 1);
    assert_eq!(stats.visited, 2);
}

#[tokio::test]
async fn test_after_download_veto_skips_pipeline() {
    let site = FakeSite::new().page("/", &["/a"]).page("/a", &[]).shared();
    let counter = Counter::shared();
    let recorder = Recorder::shared();
    recorder.veto_processing("/");

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .step(CountingStep(Arc::clone(&counter)))
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(site.fetched(), vec!["/"]);
    assert_eq!(stats.visited, 1);
    assert_eq!(counter.runs(), 0);
}

#[tokio::test]
async fn test_links_carry_referrer_and_properties() {
    let site = FakeSite::new()
        .page("/", &["a"])
        .page("/a", &[])
        .shared();
    let counter = Counter::shared();
    let recorder = Recorder::shared();

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .step(CountingStep(Arc::clone(&counter)))
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    let seed_page = counter.page("/").unwrap();
    assert_eq!(seed_page.referrer, None);
    assert_eq!(seed_page.title.as_deref(), Some("/"));

    let child = counter.page("/a").unwrap();
    assert_eq!(child.referrer.as_deref(), Some("/"));
    assert_eq!(child.original_url.as_deref(), Some("a"));
    assert_eq!(child.original_referrer.as_deref(), Some(SITE));
    assert!(!recorder.progress.lock().is_empty());
}

#[tokio::test]
async fn test_unfetched_pages_report_status_without_links() {
    let site = FakeSite::new().page("/", &["/missing"]).shared();
    let counter = Counter::shared();

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .policy(AllowAll)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .step(CountingStep(Arc::clone(&counter)))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.download_errors, 0);
    assert_eq!(counter.page("/missing").unwrap().status, 404);
}

#[tokio::test]
async fn test_resume_drains_persisted_queue() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    let site = FakeSite::new()
        .page("/", &["/a", "/b"])
        .page("/a", &["/", "/b"])
        .page("/b", &["/a"])
        .shared();

    let mut config = offline_config();
    config.crawler.max_concurrent_downloads = 1;

    // First run cancels on the seed, leaving /a and /b queued on disk
    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let crawler = Crawler::builder(seed())
            .config(config.clone())
            .queue(storage.queue())
            .history(storage.history())
            .downloader_factory(site.factory())
            .step(HtmlDocumentProcessor::new())
            .step(CancelOnSeed::default())
            .build()
            .unwrap();

        let stats = crawler.run().await.unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.pending, 2);
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    let crawler = Crawler::builder(seed())
        .config(config)
        .queue(storage.queue())
        .history(storage.history())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(site.fetched(), vec!["/", "/a", "/b"]);
    assert_eq!(stats.visited, 2);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.admitted, 3);
}

#[tokio::test]
async fn test_time_limit_stops_without_cancelling() {
    let links: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    let mut site = FakeSite::new().page("/", &link_refs);
    for link in &links {
        site = site.page(link, &[]);
    }
    let site = site.delay(Duration::from_millis(100)).shared();

    let mut config = offline_config();
    config.crawler.max_concurrent_downloads = 1;
    config.crawler.max_crawl_time_secs = Some(1);

    let recorder = Recorder::shared();
    let crawler = Crawler::builder(seed())
        .config(config)
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert!(stats.visited < 21, "visited {}", stats.visited);
    assert!(stats.pending > 0);
    assert!(!stats.cancelled);
    assert_eq!(recorder.events(), vec!["crawl_finished"]);
    assert_eq!(crawler.state(), CrawlState::Completed);
}

#[tokio::test]
async fn test_limited_run_is_recorded_for_resumption() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    let site = FakeSite::new()
        .page("/", &["/a"])
        .page("/a", &[])
        .shared();

    let mut limited = offline_config();
    limited.crawler.max_concurrent_downloads = 1;
    limited.crawler.max_visited = Some(1);

    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let run_id = storage.create_run("hash").unwrap();
        let crawler = Crawler::builder(seed())
            .config(limited)
            .queue(storage.queue())
            .history(storage.history())
            .downloader_factory(site.factory())
            .step(HtmlDocumentProcessor::new())
            .build()
            .unwrap();

        let stats = crawler.run().await.unwrap();
        assert!(!stats.cancelled);
        assert_eq!(stats.pending, 1);
        assert_eq!(storage.finish_run(run_id, &stats).unwrap(), RunStatus::Interrupted);
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert!(run.resumable_with("hash"));

    let crawler = Crawler::builder(seed())
        .config(offline_config())
        .queue(storage.queue())
        .history(storage.history())
        .downloader_factory(site.factory())
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(site.fetched(), vec!["/", "/a"]);
    assert_eq!(stats.visited, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(storage.finish_run(run.id, &stats).unwrap(), RunStatus::Completed);
}
