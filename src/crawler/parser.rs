//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title, meta tags and visible text
//! - The document base address
//!
//! [`HtmlDocumentProcessor`] wraps the parser as a pipeline step that stores
//! the results on the page context and admits every link one level deeper.

use crate::crawler::context::{Properties, PropertyBag, PropertyValue};
use crate::crawler::coordinator::Crawler;
use crate::crawler::pipeline::PipelineStep;
use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// Property holding the link as written in the page
pub const ORIGINAL_URL: &str = "original-url";

/// Property holding the address of the page the link was found on
pub const ORIGINAL_REFERRER_URL: &str = "original-referrer-url";

/// Property holding the page's `<meta name content>` pairs
pub const META: &str = "meta";

/// Elements whose text is never shown to a reader
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// A link found in a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLink {
    /// The href as written
    pub href: String,

    /// The href resolved against the document base
    pub url: Url,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// `(name, content)` of every named meta tag, names lowercased
    pub meta: Vec<(String, String)>,

    /// Visible body text with whitespace collapsed
    pub text: Option<String>,

    /// Resolved `<base href>` when the head declares one
    pub base: Option<Url>,

    /// All followable links found on the page
    pub links: Vec<ParsedLink>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
///
/// Relative links resolve against `<head><base href>` when present and
/// `page_url` otherwise.
///
/// # Example
///
/// ```
/// use ripple_crawl::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let base = extract_base(&document, page_url);
    let base_url = base.as_ref().unwrap_or(page_url);

    ParsedPage {
        title: extract_title(&document),
        meta: extract_meta(&document),
        text: extract_text(&document),
        links: extract_links(&document, base_url),
        base,
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_meta(document: &Html) -> Vec<(String, String)> {
    let Some(meta_selector) = selector("meta[name][content]") else {
        return Vec::new();
    };

    document
        .select(&meta_selector)
        .filter_map(|element| {
            let name = element.value().attr("name")?.trim().to_lowercase();
            let content = element.value().attr("content")?.trim().to_string();
            (!name.is_empty()).then_some((name, content))
        })
        .collect()
}

fn extract_base(document: &Html, page_url: &Url) -> Option<Url> {
    let base_selector = selector("head base[href]")?;
    let href = document
        .select(&base_selector)
        .next()?
        .value()
        .attr("href")?;
    page_url.join(href.trim()).ok()
}

fn extract_text(document: &Html) -> Option<String> {
    let body_selector = selector("body")?;
    let body = document.select(&body_selector).next()?;

    let mut raw = String::new();
    collect_text(body, &mut raw);

    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if !HIDDEN_ELEMENTS.contains(&el.name()) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<ParsedLink> {
    let mut links = Vec::new();

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(link) = resolve_link(href, base_url) {
                    links.push(link);
                }
            }
        }
    }

    if let Some(canonical_selector) = selector("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(link) = resolve_link(href, base_url) {
                    links.push(link);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<ParsedLink> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let url = base_url.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    Some(ParsedLink {
        href: href.to_string(),
        url,
    })
}

/// Pipeline step that parses HTML pages and follows their links
///
/// Only successful (200) responses declaring an HTML content type are
/// touched. Each link is offered to the crawl at the page's depth plus one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDocumentProcessor;

impl HtmlDocumentProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineStep for HtmlDocumentProcessor {
    fn name(&self) -> &str {
        "html-document"
    }

    async fn process(&self, crawler: &Crawler, context: &mut PropertyBag) -> anyhow::Result<()> {
        if context.status != StatusCode::OK || !context.is_html() {
            return Ok(());
        }

        let html = context
            .content
            .text()
            .with_context(|| format!("reading body of {}", context.step.url))?;
        let parsed = parse_html(&html, &context.response_url);

        context.title = parsed.title;
        context.text = parsed.text;
        if !parsed.meta.is_empty() {
            let meta: Vec<PropertyValue> = parsed
                .meta
                .into_iter()
                .map(|(name, content)| PropertyValue::List(vec![name.into(), content.into()]))
                .collect();
            context.set(META, meta);
        }

        let depth = context.step.depth + 1;
        tracing::trace!(
            "Found {} links on {}",
            parsed.links.len(),
            context.step.url
        );

        for link in parsed.links {
            let mut properties = Properties::new();
            properties.insert(ORIGINAL_URL.to_string(), link.href.into());
            properties.insert(
                ORIGINAL_REFERRER_URL.to_string(),
                context.step.url.clone().into(),
            );

            crawler
                .add_step_from(link.url, depth, &context.step, properties)
                .await
                .with_context(|| format!("admitting links from {}", context.step.url))?;
        }

        Ok(())
    }
}
