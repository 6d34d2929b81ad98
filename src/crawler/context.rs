//! Per-page context handed through the processing pipeline
//!
//! A `PropertyBag` is created by the downloader, owned by exactly one
//! pipeline run, and dropped once the last step has finished with it.

use crate::crawler::step::CrawlStep;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use tempfile::NamedTempFile;
use url::Url;

/// Extension data keyed by name
pub type Properties = BTreeMap<String, PropertyValue>;

/// A tagged value stored in a page's extension data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Url(Url),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::Url(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Url> for PropertyValue {
    fn from(value: Url) -> Self {
        Self::Url(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Downloaded body, kept in memory or spilled to a temporary file
///
/// Every call to [`Content::reader`] starts from the beginning, so several
/// steps can read the same body independently.
#[derive(Debug, Clone)]
pub enum Content {
    Memory(Arc<[u8]>),
    File(Arc<NamedTempFile>),
}

impl Content {
    pub fn empty() -> Self {
        Self::Memory(Arc::from(Vec::new()))
    }

    /// Opens a fresh reader positioned at the start of the body
    pub fn reader(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            Self::File(file) => Ok(Box::new(file.reopen()?)),
        }
    }

    pub fn bytes(&self) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.reader()?.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Reads the whole body as text, replacing invalid UTF-8
    pub fn text(&self) -> io::Result<String> {
        Ok(String::from_utf8_lossy(&self.bytes()?).into_owned())
    }

    pub fn len(&self) -> io::Result<u64> {
        match self {
            Self::Memory(bytes) => Ok(bytes.len() as u64),
            Self::File(file) => Ok(file.as_file().metadata()?.len()),
        }
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Memory(Arc::from(bytes))
    }
}

/// Mutable state of one page while it moves through the pipeline
#[derive(Debug)]
pub struct PropertyBag {
    /// The step that produced this page
    pub step: CrawlStep,

    /// The page that linked here; `None` for the seed
    pub referrer: Option<CrawlStep>,

    pub status: StatusCode,

    pub content_type: Option<String>,

    /// Address the response was served from, after redirects
    pub response_url: Url,

    pub headers: HeaderMap,

    pub content: Content,

    pub title: Option<String>,

    pub text: Option<String>,

    pub properties: Properties,
}

impl PropertyBag {
    /// Creates an empty context for a step
    pub fn new(step: CrawlStep, status: StatusCode) -> Self {
        let response_url = step.url.clone();
        Self {
            step,
            referrer: None,
            status,
            content_type: None,
            response_url,
            headers: HeaderMap::new(),
            content: Content::empty(),
            title: None,
            text: None,
            properties: Properties::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    /// Returns true when the response declares an HTML body
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().map_or(false, |ct| {
            let mime = ct.split(';').next().unwrap_or("").trim();
            mime.eq_ignore_ascii_case("text/html")
                || mime.eq_ignore_ascii_case("application/xhtml+xml")
        })
    }
}
