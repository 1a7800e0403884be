//! Caching decorator over any transport.

use super::Transport;
use crate::db::CacheStore;
use crate::error::TransportError;
use crate::types::{Request, RequestBody, Response};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Stable cache key for a request
///
/// SHA-256 (lowercase hex) of a canonical JSON document holding the upper-case
/// method, the URL, the JSON body and the text body. Keys are sorted, items
/// are separated by `", "` and `": "`, and non-ASCII text is written as-is, so
/// keys stay compatible with caches written by other tools. Headers and
/// timeouts do not participate.
pub fn cache_key(request: &Request) -> String {
    let (json, data) = match &request.body {
        Some(RequestBody::Json(value)) => (value.clone(), Value::Null),
        Some(RequestBody::Text(text)) => (Value::Null, Value::String(text.clone())),
        None => (Value::Null, Value::Null),
    };

    let document = serde_json::json!({
        "method": request.method.as_str().to_ascii_uppercase(),
        "url": request.url,
        "json": json,
        "data": data,
    });

    let mut raw = String::new();
    write_canonical(&document, &mut raw);
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Serialize with sorted keys regardless of how the map orders them
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json escapes only quotes, backslashes and control characters
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

/// Serves repeat requests from the [`CacheStore`]
///
/// Only status-200 responses are stored. Cache failures never fail a fetch:
/// a read error counts as a miss and a write error skips the write.
pub struct CachedTransport {
    inner: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    default_ttl: Option<Duration>,
}

impl CachedTransport {
    /// Wrap `inner`, storing responses for `default_ttl` (None = forever)
    pub fn new(
        inner: Arc<dyn Transport>,
        store: Arc<CacheStore>,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            inner,
            store,
            default_ttl,
        }
    }

    /// The backing store
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}

#[async_trait]
impl Transport for CachedTransport {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let key = cache_key(request);

        if !request.bypass_cache {
            match self.store.get(&key).await {
                Ok(Some(entry)) => {
                    tracing::debug!(url = %request.url, key = %key, "Cache hit");
                    return Ok(entry.response);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "Cache read failed, fetching");
                }
            }
        }

        let response = self.inner.fetch(request).await?;

        if response.is_ok() {
            let ttl = request.cache_ttl.or(self.default_ttl);
            if let Err(e) = self.store.put(&key, &response, ttl).await {
                tracing::warn!(url = %request.url, error = %e, "Cache write failed");
            }
        }

        Ok(response)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    /// Answers every request with a fixed status and counts calls
    struct Scripted {
        status: u16,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Response {
                url: request.url.clone(),
                status: self.status,
                headers: BTreeMap::new(),
                body: format!("call {}", n),
            })
        }
    }

    async fn store() -> (NamedTempFile, Arc<CacheStore>) {
        let file = NamedTempFile::new().unwrap();
        let store = CacheStore::open(file.path()).await.unwrap();
        (file, Arc::new(store))
    }

    #[test]
    fn key_matches_known_digests() {
        assert_eq!(
            cache_key(&Request::get("https://medium.com/p/abc")),
            "f9bad6e4b8dd2379d64301a18e3472c77d88fa3a59c498e802b6eead2ad44929"
        );

        let graphql = Request::post_json(
            "https://medium.com/_/graphql",
            json!([{"operationName": "Q", "variables": {"first": 2, "after": "", "tagSlug": "café"}}]),
        );
        assert_eq!(
            cache_key(&graphql),
            "d9b394dd0442e448f4e4f532c3564be936cf1dea35481206bc4737ff80e0bb1b"
        );

        let form = Request::new(reqwest::Method::POST, "https://medium.com/form")
            .with_body(RequestBody::Text("a=1&b=2".into()));
        assert_eq!(
            cache_key(&form),
            "eaf2150c7c18be3f90caa7b91ae42ff4e911d152ed25c0d079dc98af5e24e0a6"
        );
    }

    #[test]
    fn key_ignores_headers_and_timeouts() {
        let plain = Request::get("https://medium.com/p/abc");
        let decorated = Request::get("https://medium.com/p/abc")
            .with_header("x-trace", "1")
            .with_timeout(Duration::from_secs(3))
            .bypassing_cache();
        assert_eq!(cache_key(&plain), cache_key(&decorated));

        let lower = Request::new(reqwest::Method::from_bytes(b"get").unwrap(), "https://medium.com/p/abc");
        assert_eq!(cache_key(&lower), cache_key(&plain));
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let (_file, store) = store().await;
        let inner = Scripted::new(200);
        let cached = CachedTransport::new(inner.clone(), Arc::clone(&store), None);

        let request = Request::get("https://medium.com/p/abc");
        let first = cached.fetch(&request).await.unwrap();
        let second = cached.fetch(&request).await.unwrap();

        assert_eq!(inner.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(second.body, "call 1");
    }

    #[tokio::test]
    async fn non_200_responses_are_not_cached() {
        let (_file, store) = store().await;
        let inner = Scripted::new(404);
        let cached = CachedTransport::new(inner.clone(), Arc::clone(&store), None);

        let request = Request::get("https://medium.com/p/gone");
        assert_eq!(cached.fetch(&request).await.unwrap().status, 404);
        assert_eq!(cached.fetch(&request).await.unwrap().status, 404);

        assert_eq!(inner.calls(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bypass_skips_lookup_but_refreshes_entry() {
        let (_file, store) = store().await;
        let inner = Scripted::new(200);
        let cached = CachedTransport::new(inner.clone(), Arc::clone(&store), None);

        let request = Request::get("https://medium.com/p/abc");
        cached.fetch(&request).await.unwrap();

        let fresh = cached
            .fetch(&request.clone().bypassing_cache())
            .await
            .unwrap();
        assert_eq!(fresh.body, "call 2");

        let served = cached.fetch(&request).await.unwrap();
        assert_eq!(served.body, "call 2");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn per_request_ttl_overrides_default() {
        let (_file, store) = store().await;
        let cached = CachedTransport::new(
            Scripted::new(200),
            Arc::clone(&store),
            Some(Duration::from_secs(3600)),
        );

        let request = Request::get("https://medium.com/p/abc").with_cache_ttl(Duration::from_secs(5));
        cached.fetch(&request).await.unwrap();

        let entry = store.get(&cache_key(&request)).await.unwrap().unwrap();
        let lifetime = entry.expires_at.unwrap() - entry.stored_at;
        assert!((lifetime.num_milliseconds() - 5_000).abs() <= 1);
    }

    #[tokio::test]
    async fn unavailable_cache_degrades_to_passthrough() {
        let (_file, store) = store().await;
        let inner = Scripted::new(200);
        let cached = CachedTransport::new(inner.clone(), Arc::clone(&store), None);

        store.pool().close().await;

        let request = Request::get("https://medium.com/p/abc");
        assert_eq!(cached.fetch(&request).await.unwrap().body, "call 1");
        assert_eq!(cached.fetch(&request).await.unwrap().body, "call 2");
        assert_eq!(inner.calls(), 2);
    }
}
