//! Direct transport: plain HTTP with browser-like headers and a proxy pool.

use super::{Transport, read_response};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::types::{Request, RequestBody, Response};
use crate::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

const ACCEPT: &str =
    "application/json,text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const REFERER: &str = "https://medium.com/";

/// Desktop Chrome and Edge user agents, one picked per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36 Edg/129.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36 Edg/128.0.0.0",
];

/// One pre-built client per route out of the machine
struct Route {
    proxy: Option<String>,
    client: reqwest::Client,
}

/// Issues requests from the local network identity, optionally via proxies
///
/// A client is built per configured proxy up front; each call picks one
/// uniformly at random. The pool is immutable, so selection needs no lock.
pub struct DirectTransport {
    routes: Vec<Route>,
    extra_headers: BTreeMap<String, String>,
}

impl DirectTransport {
    /// Build the client pool from configuration
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut routes = Vec::with_capacity(config.proxies.len().max(1));

        if config.proxies.is_empty() {
            routes.push(Route {
                proxy: None,
                client: Self::client_builder(config).build().map_err(|e| {
                    Error::Other(format!("Failed to create HTTP client: {}", e))
                })?,
            });
        }

        for proxy_url in &config.proxies {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                Error::config(
                    format!("invalid proxy '{}': {}", proxy_url, e),
                    "transport.proxies",
                )
            })?;
            let client = Self::client_builder(config)
                .proxy(proxy)
                .build()
                .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
            routes.push(Route {
                proxy: Some(proxy_url.clone()),
                client,
            });
        }

        let extra_headers = config
            .extra_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();

        Ok(Self {
            routes,
            extra_headers,
        })
    }

    fn client_builder(config: &TransportConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder().timeout(config.timeout)
    }

    /// Number of routes in the pool (1 when no proxy is configured)
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn pick_route(&self) -> &Route {
        let idx = if self.routes.len() > 1 {
            rand::thread_rng().gen_range(0..self.routes.len())
        } else {
            0
        };
        &self.routes[idx]
    }

    /// Browser defaults, then configured extras, then per-request overrides
    fn merged_headers(&self, request: &Request) -> BTreeMap<String, String> {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), user_agent.to_string());
        headers.insert("accept".to_string(), ACCEPT.to_string());
        headers.insert("accept-language".to_string(), ACCEPT_LANGUAGE.to_string());
        headers.insert("referer".to_string(), REFERER.to_string());

        for (k, v) in self.extra_headers.iter().chain(request.headers.iter()) {
            headers.insert(k.to_ascii_lowercase(), v.clone());
        }
        headers
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let route = self.pick_route();
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            proxy = route.proxy.as_deref().unwrap_or("none"),
            "Direct fetch"
        );

        let mut builder = route.client.request(request.method.clone(), &request.url);

        for (name, value) in self.merged_headers(request) {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, &request.url))?;

        let final_url = response.url().to_string();
        read_response(response, &final_url).await
    }
}
