//! Error types for medium-harvest
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`], the top-level error returned by fallible library calls
//! - [`TransportError`], the failure of a single HTTP exchange, classified by [`TransportErrorKind`]
//! - [`DiscoveryError`], failures of a tag-archive walk
//! - [`BatchItemError`], the recorded failure of one unit of batch work
//!
//! Conversion failures have no error type; they are carried in-band by
//! [`ParsedArticle::Failed`](crate::types::ParsedArticle).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for medium-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for medium-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transport.api_key")
        key: Option<String>,
    },

    /// Cache database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A fetch failed at the transport level
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Tag discovery failed
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Classification of a transport failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The request or the upstream gateway timed out
    Timeout,
    /// The connection could not be established or was dropped
    ConnectionFailed,
    /// The exchange completed but produced something unusable
    ProtocolError,
    /// The origin or the scraping service throttled us
    RateLimited,
    /// Credentials were rejected or access was denied
    Forbidden,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::ConnectionFailed => "connection failed",
            TransportErrorKind::ProtocolError => "protocol error",
            TransportErrorKind::RateLimited => "rate limited",
            TransportErrorKind::Forbidden => "forbidden",
        };
        f.write_str(s)
    }
}

/// Failure of a single transport exchange
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// What went wrong, used by the retry policy
    pub kind: TransportErrorKind,
    /// Human-readable detail
    pub message: String,
    /// HTTP status that triggered the error, if the exchange got that far
    pub status: Option<u16>,
}

impl TransportError {
    /// Create a transport error without an HTTP status
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Timeout shorthand
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// Connection failure shorthand
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionFailed, message)
    }

    /// Protocol error shorthand
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ProtocolError, message)
    }

    /// Map an HTTP status to a transport error.
    ///
    /// Returns `None` for statuses that are handed back to the caller as a
    /// normal response (2xx, 3xx and unclassified 4xx such as 404).
    ///
    /// | status          | kind               |
    /// |-----------------|--------------------|
    /// | 408, 504        | `Timeout`          |
    /// | 429             | `RateLimited`      |
    /// | 401, 403, 407   | `Forbidden`        |
    /// | 502, 503        | `ConnectionFailed` |
    /// | other 5xx       | `ProtocolError`    |
    pub fn from_status(status: u16, url: &str) -> Option<Self> {
        let kind = match status {
            408 | 504 => TransportErrorKind::Timeout,
            429 => TransportErrorKind::RateLimited,
            401 | 403 | 407 => TransportErrorKind::Forbidden,
            502 | 503 => TransportErrorKind::ConnectionFailed,
            500..=599 => TransportErrorKind::ProtocolError,
            _ => return None,
        };
        Some(Self {
            kind,
            message: format!("HTTP {} from {}", status, url),
            status: Some(status),
        })
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("request to {} timed out", url))
        } else if err.is_connect() || err.is_request() {
            Self::connection_failed(format!("connection to {} failed: {}", url, err))
        } else {
            Self::protocol(format!("bad response from {}: {}", url, err))
        }
    }
}

/// Tag discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The requested window is empty or nonsensical
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    /// A date string could not be parsed
    #[error("invalid date '{0}': expected YYYY-MM-DD, 'today' or 'now'")]
    InvalidDate(String),

    /// Page size must be at least one
    #[error("page size must be greater than zero")]
    InvalidPageSize,

    /// No tag given
    #[error("tag must not be empty")]
    EmptyTag,

    /// A page could not be fetched after retries
    #[error("failed to fetch archive page: {0}")]
    Transport(#[from] TransportError),

    /// The archive endpoint answered with a status we cannot use
    #[error("archive endpoint returned HTTP {0}")]
    UnexpectedStatus(u16),

    /// The archive page body did not have the expected shape
    #[error("malformed archive page: {0}")]
    MalformedPage(String),
}

/// Terminal failure of one batch item
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BatchItemError {
    /// Fetch failed after the retry policy gave up
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The page was fetched but could not be converted
    #[error("conversion failed: {reason}")]
    Conversion {
        /// Reason reported by the converter
        reason: String,
    },

    /// The URL was rejected before any request was made
    #[error("unsafe URL: {0}")]
    UnsafeUrl(String),

    /// Anything else a worker wants to report
    #[error("{0}")]
    Other(String),
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_retryable_and_terminal_codes() {
        let cases = [
            (408, Some(TransportErrorKind::Timeout)),
            (504, Some(TransportErrorKind::Timeout)),
            (429, Some(TransportErrorKind::RateLimited)),
            (401, Some(TransportErrorKind::Forbidden)),
            (403, Some(TransportErrorKind::Forbidden)),
            (407, Some(TransportErrorKind::Forbidden)),
            (502, Some(TransportErrorKind::ConnectionFailed)),
            (503, Some(TransportErrorKind::ConnectionFailed)),
            (500, Some(TransportErrorKind::ProtocolError)),
            (200, None),
            (301, None),
            (404, None),
            (410, None),
        ];

        for (status, expected) in cases {
            let mapped = TransportError::from_status(status, "https://medium.com/x");
            assert_eq!(
                mapped.as_ref().map(|e| e.kind),
                expected,
                "unexpected mapping for HTTP {}",
                status
            );
            if let Some(err) = mapped {
                assert_eq!(err.status, Some(status));
            }
        }
    }

    #[test]
    fn transport_error_display_includes_kind_and_message() {
        let err = TransportError::timeout("request to https://medium.com timed out");
        assert_eq!(
            err.to_string(),
            "timeout: request to https://medium.com timed out"
        );
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("api key required", "transport.api_key") {
            Error::Config { message, key } => {
                assert_eq!(message, "api key required");
                assert_eq!(key.as_deref(), Some("transport.api_key"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn batch_item_error_wraps_transport_error() {
        let err: BatchItemError = TransportError::from_status(403, "https://medium.com/p")
            .unwrap()
            .into();
        assert!(matches!(err, BatchItemError::Transport(ref t) if t.kind == TransportErrorKind::Forbidden));
        assert!(err.to_string().contains("HTTP 403"));
    }
}
