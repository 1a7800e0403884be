//! Pluggable HTTP transports
//!
//! Every network exchange in the crate goes through the single-method
//! [`Transport`] capability. Three implementations compose by wrapping:
//!
//! - [`DirectTransport`] talks to the origin, optionally through a proxy pool
//! - [`ManagedTransport`] delegates fetching to a remote scraping service
//! - [`CachedTransport`] decorates either one with the durable response cache
//!
//! Retries are not a transport concern; see [`crate::retry`].

use crate::config::{CacheConfig, TransportConfig, TransportKind};
use crate::db::CacheStore;
use crate::error::TransportError;
use crate::types::{Request, Response};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

mod cached;
mod direct;
mod managed;

pub use cached::{CachedTransport, cache_key};
pub use direct::DirectTransport;
pub use managed::ManagedTransport;

/// Performs one HTTP exchange and returns a normalized response
///
/// Implementations must be shareable across concurrent workers. Statuses that
/// map to a [`TransportError`] (see [`TransportError::from_status`]) are
/// returned as errors; every other status is returned as a [`Response`].
///
/// # Examples
///
/// ```no_run
/// use medium_harvest::transport::{DirectTransport, Transport};
/// use medium_harvest::config::TransportConfig;
/// use medium_harvest::types::Request;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = DirectTransport::new(&TransportConfig::default())?;
/// let response = transport.fetch(&Request::get("https://medium.com/")).await?;
/// println!("{} bytes", response.body.len());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        (**self).fetch(request).await
    }
}

/// Build the transport stack described by the configuration
///
/// Resolves the variant, and wraps it in a [`CachedTransport`] when a cache
/// store is supplied.
pub fn build_transport(
    transport: &TransportConfig,
    cache: &CacheConfig,
    store: Option<Arc<CacheStore>>,
) -> Result<Arc<dyn Transport>> {
    let inner: Arc<dyn Transport> = match transport.resolved_kind() {
        TransportKind::Managed => Arc::new(ManagedTransport::new(transport)?),
        TransportKind::Direct | TransportKind::Auto => Arc::new(DirectTransport::new(transport)?),
    };

    tracing::debug!(
        kind = ?transport.resolved_kind(),
        proxies = transport.proxies.len(),
        cached = store.is_some(),
        "Transport configured"
    );

    Ok(match store {
        Some(store) => Arc::new(CachedTransport::new(inner, store, cache.ttl)),
        None => inner,
    })
}

/// Flatten reqwest headers into a lowercase name → value map
///
/// Repeated headers are joined with ", "; values that are not valid UTF-8 are skipped.
pub(crate) fn header_map(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        out.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

/// Read a reqwest response into a [`Response`], mapping error statuses
pub(crate) async fn read_response(
    response: reqwest::Response,
    url: &str,
) -> std::result::Result<Response, TransportError> {
    let status = response.status().as_u16();
    if let Some(err) = TransportError::from_status(status, url) {
        return Err(err);
    }

    let headers = header_map(response.headers());
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::from_reqwest(&e, url))?;

    Ok(Response {
        url: url.to_string(),
        status,
        headers,
        body,
    })
}
