//! Integration tests for the crawler over HTTP
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end with the reqwest downloader.

use crate::common::{Counter, CountingStep, Recorder};
use ripple_crawl::config::Config;
use ripple_crawl::crawler::{Crawler, HtmlDocumentProcessor};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page: &str, body: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html(body))
        .expect(hits)
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, rules: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rules.to_string(), "text/plain"))
        .mount(server)
        .await;
}

fn seed_of(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    mount_page(
        &server,
        "/",
        r#"<a href="/one">1</a> <a href="/two">2</a> <a href="/three">3</a>"#,
        1,
    )
    .await;
    for page in ["/one", "/two", "/three"] {
        mount_page(
            &server,
            page,
            r#"<a href="/">home</a> <a href="/one">1</a> <a href="/two#x">2</a>"#,
            1,
        )
        .await;
    }

    let counter = Counter::shared();
    let crawler = Crawler::builder(seed_of(&server))
        .config(Config::default())
        .step(HtmlDocumentProcessor::new())
        .step(CountingStep(Arc::clone(&counter)))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 4);
    assert_eq!(stats.download_errors, 0);
    assert_eq!(counter.runs(), 4);
    assert_eq!(counter.page("/two").unwrap().title.as_deref(), Some("Test"));
}

#[tokio::test]
async fn test_robots_disallow_is_respected() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;

    mount_page(
        &server,
        "/",
        r#"<a href="/private/page">secret</a> <a href="/public">public</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/private/page", "", 0).await;
    mount_page(&server, "/public", "", 1).await;

    let crawler = Crawler::builder(seed_of(&server))
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.visited, 2);
}

#[tokio::test]
async fn test_external_links_are_not_followed() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;

    // Same machine, different host name, so the link counts as external
    let external = other.uri().replace("127.0.0.1", "localhost");
    mount_page(
        &server,
        "/",
        &format!(r#"<a href="{}/elsewhere">out</a>"#, external),
        1,
    )
    .await;
    mount_page(&other, "/elsewhere", "", 0).await;

    let mut config = Config::default();
    config.crawler.adhere_to_robots = false;

    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.visited, 1);
}

#[tokio::test]
async fn test_referer_header_is_sent() {
    let server = MockServer::start().await;
    let seed = seed_of(&server);

    mount_page(&server, "/", r#"<a href="/child">child</a>"#, 1).await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .and(header("referer", seed.as_str()))
        .respond_with(html(""))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.crawler.adhere_to_robots = false;

    let crawler = Crawler::builder(seed)
        .config(config)
        .step(HtmlDocumentProcessor::new())
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();
    assert_eq!(stats.visited, 2);
}

#[tokio::test]
async fn test_network_failures_are_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("slow").set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.crawler.adhere_to_robots = false;
    config.download.read_timeout_ms = 200;
    config.download.retry_count = 2;
    config.download.retry_wait_ms = 10;

    let recorder = Recorder::shared();
    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.visited, 1);
    assert_eq!(stats.download_errors, 1);
    let faults = recorder.download_faults.lock().clone();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("after 3 attempts"), "{}", faults[0]);
}

#[tokio::test]
async fn test_error_status_is_a_page_not_a_fault() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.crawler.adhere_to_robots = false;
    config.download.retry_count = 2;

    let counter = Counter::shared();
    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .step(HtmlDocumentProcessor::new())
        .step(CountingStep(Arc::clone(&counter)))
        .build()
        .unwrap();

    let stats = crawler.run().await.unwrap();

    assert_eq!(stats.download_errors, 0);
    assert_eq!(counter.page("/").unwrap().status, 500);
}

#[tokio::test]
async fn test_large_body_is_capped_and_spilled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 10_000], "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.crawler.adhere_to_robots = false;
    config.download.max_content_size = Some(4096);
    config.download.max_size_in_ram = 1024;
    config.download.buffer_size = 1024;

    let counter = Counter::shared();
    let recorder = Recorder::shared();
    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .step(CountingStep(Arc::clone(&counter)))
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    crawler.run().await.unwrap();

    let page = counter.page("/").unwrap();
    assert_eq!(page.content_len, 4096);
    assert!(page.spilled);

    let progress = recorder.progress.lock().clone();
    assert_eq!(progress.last(), Some(&4096));
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
}

async fn mount_slow_robots(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow: /".to_string(), "text/plain")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_slow_robots_gives_up_at_read_timeout() {
    let server = MockServer::start().await;
    mount_slow_robots(&server, Duration::from_secs(30)).await;
    mount_page(&server, "/", "", 1).await;

    let mut config = Config::default();
    config.download.read_timeout_ms = 500;

    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .build()
        .unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(6), crawler.run())
        .await
        .expect("crawl should not wait on robots.txt past the read timeout")
        .unwrap();

    assert_eq!(stats.visited, 1);
}

#[tokio::test]
async fn test_time_limit_covers_seed_admission() {
    let server = MockServer::start().await;
    mount_slow_robots(&server, Duration::from_secs(30)).await;
    mount_page(&server, "/", "", 0).await;

    let mut config = Config::default();
    config.download.read_timeout_ms = 20_000;
    config.crawler.max_crawl_time_secs = Some(1);

    let recorder = Recorder::shared();
    let crawler = Crawler::builder(seed_of(&server))
        .config(config)
        .listener(Arc::clone(&recorder))
        .build()
        .unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(6), crawler.run())
        .await
        .expect("crawl should end at its time limit")
        .unwrap();

    assert_eq!(stats.visited, 0);
    assert!(!stats.cancelled);
    assert_eq!(recorder.events(), vec!["crawl_finished"]);
    assert_eq!(crawler.state(), ripple_crawl::CrawlState::Completed);
}
