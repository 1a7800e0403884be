//! Cache entry reads, writes and expiry.

use crate::error::DatabaseError;
use crate::types::Response;
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{CacheEntry, CacheRow, CacheStore};

/// Current time as fractional unix seconds
fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn to_datetime(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_micros((secs * 1_000_000.0) as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

impl CacheRow {
    fn is_expired(&self, now: f64) -> bool {
        self.ttl_seconds
            .is_some_and(|ttl| now - self.created_at > ttl)
    }

    fn into_entry(self) -> CacheEntry {
        // A corrupt header blob degrades to no headers rather than a miss
        let headers: BTreeMap<String, String> =
            serde_json::from_str(&self.headers).unwrap_or_default();
        let stored_at = to_datetime(self.created_at);
        let expires_at = self
            .ttl_seconds
            .map(|ttl| to_datetime(self.created_at + ttl));

        CacheEntry {
            key: self.cache_key,
            response: Response {
                url: self.url,
                status: u16::try_from(self.status_code).unwrap_or(200),
                headers,
                body: self.body,
            },
            stored_at,
            expires_at,
        }
    }
}

impl CacheStore {
    /// Look up a live entry
    ///
    /// Expired entries read as absent and are deleted on the way out.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<CacheRow> = sqlx::query_as(
            r#"
            SELECT cache_key, url, status_code, headers, body, created_at, ttl_seconds
            FROM http_cache
            WHERE cache_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to read cache entry: {}",
                e
            )))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        if row.is_expired(unix_now()) {
            tracing::debug!(key, url = %row.url, "Cache entry expired");
            self.evict_stale(key, row.created_at).await?;
            return Ok(None);
        }

        Ok(Some(row.into_entry()))
    }

    /// Store a response under `key`
    ///
    /// Only status 200 is persisted; any other status is ignored and `false`
    /// is returned. An existing entry for the key is replaced.
    pub async fn put(&self, key: &str, response: &Response, ttl: Option<Duration>) -> Result<bool> {
        if !response.is_ok() {
            return Ok(false);
        }

        let headers = serde_json::to_string(&response.headers)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO http_cache
                (cache_key, url, status_code, headers, body, created_at, ttl_seconds)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(&response.url)
        .bind(i64::from(response.status))
        .bind(headers)
        .bind(&response.body)
        .bind(unix_now())
        .bind(ttl.map(|t| t.as_secs_f64()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write cache entry: {}",
                e
            )))
        })?;

        Ok(true)
    }

    /// Remove the entry for `key`, if any
    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM http_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete cache entry: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete the entry for `key` only if it is still the one written at
    /// `created_at`
    ///
    /// A writer that replaced the row since it was read keeps its entry.
    pub(crate) async fn evict_stale(&self, key: &str, created_at: f64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM http_cache WHERE cache_key = ? AND created_at = ?")
            .bind(key)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to evict expired cache entry: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM http_cache WHERE ttl_seconds IS NOT NULL AND (? - created_at) > ttl_seconds",
        )
        .bind(unix_now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to purge expired cache entries: {}",
                e
            )))
        })?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::info!(purged, "Purged expired cache entries");
        }
        Ok(purged)
    }

    /// Number of stored entries, live or not yet purged
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM http_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count cache entries: {}",
                    e
                )))
            })?;

        Ok(count as u64)
    }
}
