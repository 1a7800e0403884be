//! Core types for medium-harvest

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Platform-assigned identifier of a post
///
/// Article identity is the post id, never the URL: the same post is served
/// under several tracking variants of its URL.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Create a new PostId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PostId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of an outgoing request
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON
    Json(serde_json::Value),
    /// Sent verbatim
    Text(String),
}

/// A single HTTP request handed to a [`Transport`](crate::transport::Transport)
#[derive(Clone, Debug)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: String,
    /// Header overrides, merged last over transport defaults
    pub headers: BTreeMap<String, String>,
    /// Optional body
    pub body: Option<RequestBody>,
    /// Per-call timeout (None = transport default)
    pub timeout: Option<Duration>,
    /// Per-call cache lifetime (None = cache default)
    pub cache_ttl: Option<Duration>,
    /// Skip the cache lookup; a 200 response is still stored
    pub bypass_cache: bool,
}

impl Request {
    /// Build a request with no body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
            cache_ttl: None,
            bypass_cache: false,
        }
    }

    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// POST request with a JSON body
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, url).with_body(RequestBody::Json(body))
    }

    /// Set the body
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add or replace a header override
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Override the timeout for this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the cache lifetime for this call
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Skip the cache lookup for this call
    pub fn bypassing_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// Normalized result of one transport exchange
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// URL the response belongs to
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,
    /// Raw body text
    pub body: String,
}

impl Response {
    /// Whether the status is exactly 200, the only cacheable status
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Reference to one article found in a tag archive
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    /// Stable post identifier
    pub post_id: PostId,
    /// Post title
    pub title: String,
    /// Author display name
    pub author: String,
    /// First publication instant
    pub published_at: DateTime<Utc>,
    /// Publication date (UTC)
    pub published: NaiveDate,
    /// Tag the post was discovered under
    pub tag: String,
    /// Canonical article URL
    pub url: String,
}

/// Article author as found on the page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name
    pub name: String,
    /// Absolute profile URL, when one was found
    pub profile_url: Option<String>,
}

/// Outcome of converting one HTML document
///
/// Failures are values, not errors, so batch callers can report
/// "succeeded N of M" without unwinding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParsedArticle {
    /// The page was converted
    Parsed {
        /// Article title
        title: String,
        /// Body as Markdown
        markdown: String,
        /// Author, when the page exposes one
        author: Option<Author>,
    },
    /// The page could not be converted
    Failed {
        /// Why conversion failed
        reason: String,
    },
}

impl ParsedArticle {
    /// Failed result with a reason
    pub fn failed(reason: impl Into<String>) -> Self {
        ParsedArticle::Failed {
            reason: reason.into(),
        }
    }

    /// Whether conversion succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ParsedArticle::Parsed { .. })
    }

    /// Title of a parsed article
    pub fn title(&self) -> Option<&str> {
        match self {
            ParsedArticle::Parsed { title, .. } => Some(title),
            ParsedArticle::Failed { .. } => None,
        }
    }

    /// Markdown body of a parsed article
    pub fn markdown(&self) -> Option<&str> {
        match self {
            ParsedArticle::Parsed { markdown, .. } => Some(markdown),
            ParsedArticle::Failed { .. } => None,
        }
    }

    /// Failure reason
    pub fn reason(&self) -> Option<&str> {
        match self {
            ParsedArticle::Parsed { .. } => None,
            ParsedArticle::Failed { reason } => Some(reason),
        }
    }
}
