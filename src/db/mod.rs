//! Database layer for medium-harvest
//!
//! Durable SQLite response cache shared by every concurrent fetch.
//!
//! ## Submodules
//!
//! Methods on [`CacheStore`] are organized by concern:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`cache`]: Cache entry reads, writes and expiry

use crate::types::Response;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod cache;
mod migrations;

/// A persisted response together with its bookkeeping timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cache key the entry is stored under
    pub key: String,
    /// The stored response (always status 200)
    pub response: Response,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
    /// When the entry stops being served (None = never)
    pub expires_at: Option<DateTime<Utc>>,
}

/// Cache row from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub(crate) struct CacheRow {
    /// Cache key
    pub cache_key: String,
    /// URL the response belongs to
    pub url: String,
    /// HTTP status code
    pub status_code: i64,
    /// Headers as a JSON object
    pub headers: String,
    /// Response body
    pub body: String,
    /// Unix timestamp (fractional seconds) of the write
    pub created_at: f64,
    /// Lifetime in seconds (NULL = never expires)
    pub ttl_seconds: Option<f64>,
}

/// Durable response cache backed by SQLite
///
/// The pool runs in WAL mode, so readers never wait on a concurrent writer and
/// every write is a single statement: an entry is either fully present or absent.
pub struct CacheStore {
    pool: SqlitePool,
}
