use serde::{Deserialize, Serialize};
use std::fmt::Write;
use url::Url;

/// One component of an address that may participate in its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlComponent {
    Scheme,
    UserInfo,
    Host,
    Port,
    Path,
    Query,
    Fragment,
}

impl UrlComponent {
    const ALL: [UrlComponent; 7] = [
        Self::Scheme,
        Self::UserInfo,
        Self::Host,
        Self::Port,
        Self::Path,
        Self::Query,
        Self::Fragment,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Scheme => 1,
            Self::UserInfo => 1 << 1,
            Self::Host => 1 << 2,
            Self::Port => 1 << 3,
            Self::Path => 1 << 4,
            Self::Query => 1 << 5,
            Self::Fragment => 1 << 6,
        }
    }
}

/// The set of components used to build an address's history key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UrlComponents(u8);

impl UrlComponents {
    /// Everything an HTTP request line and Host header carry
    ///
    /// Scheme, host, port, path and query. Fragments and credentials are
    /// ignored, so `/page#a` and `/page#b` are the same address.
    pub fn http_request_url() -> Self {
        Self::from_components(&[
            UrlComponent::Scheme,
            UrlComponent::Host,
            UrlComponent::Port,
            UrlComponent::Path,
            UrlComponent::Query,
        ])
    }

    pub fn all() -> Self {
        Self::from_components(&UrlComponent::ALL)
    }

    pub fn from_components(components: &[UrlComponent]) -> Self {
        Self(components.iter().fold(0, |bits, c| bits | c.bit()))
    }

    pub fn contains(&self, component: UrlComponent) -> bool {
        self.0 & component.bit() != 0
    }

    pub fn to_vec(&self) -> Vec<UrlComponent> {
        UrlComponent::ALL
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect()
    }
}

impl Default for UrlComponents {
    fn default() -> Self {
        Self::http_request_url()
    }
}

/// Builds the history key of an address under a component mask
///
/// Two addresses with the same key are treated as the same work item.
/// Default ports are omitted, so `http://a.com:80/` and `http://a.com/`
/// produce the same key.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::{url_key, UrlComponents};
///
/// let a = Url::parse("https://example.com/page#top").unwrap();
/// let b = Url::parse("https://example.com/page#bottom").unwrap();
/// let mask = UrlComponents::http_request_url();
/// assert_eq!(url_key(&a, &mask), url_key(&b, &mask));
/// ```
pub fn url_key(url: &Url, components: &UrlComponents) -> String {
    let mut key = String::with_capacity(url.as_str().len());

    if components.contains(UrlComponent::Scheme) {
        key.push_str(url.scheme());
        key.push_str("://");
    }

    if components.contains(UrlComponent::UserInfo) && !url.username().is_empty() {
        key.push_str(url.username());
        if let Some(password) = url.password() {
            key.push(':');
            key.push_str(password);
        }
        key.push('@');
    }

    if components.contains(UrlComponent::Host) {
        if let Some(host) = url.host_str() {
            key.push_str(host);
        }
    }

    if components.contains(UrlComponent::Port) {
        if let Some(port) = url.port() {
            let _ = write!(key, ":{}", port);
        }
    }

    if components.contains(UrlComponent::Path) {
        key.push_str(url.path());
    }

    if components.contains(UrlComponent::Query) {
        if let Some(query) = url.query() {
            key.push('?');
            key.push_str(query);
        }
    }

    if components.contains(UrlComponent::Fragment) {
        if let Some(fragment) = url.fragment() {
            key.push('#');
            key.push_str(fragment);
        }
    }

    key
}
