//! Integration tests for Ripple-Crawl
//!
//! `orchestrator_tests` drive the crawler against an in-process fake site;
//! `crawl_tests` use wiremock servers to exercise the real HTTP downloader.

mod crawl_tests;
mod orchestrator_tests;
