//! The library entry point
//!
//! A [`Harvester`] owns the configured transport stack and exposes the
//! top-level calls: [`discover`](Harvester::discover),
//! [`convert_one`](Harvester::convert_one),
//! [`batch_convert`](Harvester::batch_convert) and
//! [`batch_fetch`](Harvester::batch_fetch).

use crate::batch::{self, BatchOptions, BatchProgress, BatchResult};
use crate::config::Config;
use crate::convert;
use crate::db::CacheStore;
use crate::discovery::{DiscoveryQuery, Explorer};
use crate::error::BatchItemError;
use crate::retry::with_retry_until_cancelled;
use crate::transport::{Transport, build_transport};
use crate::types::{ArticleRef, ParsedArticle, Request, Response};
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Discovers and converts articles through one transport stack
///
/// # Examples
///
/// ```no_run
/// use medium_harvest::{Config, Harvester};
/// use medium_harvest::discovery::{DateWindow, DiscoveryQuery};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let harvester = Harvester::new(Config::default()).await?;
///
/// let window = DateWindow::from_dates("2024-03-01", "2024-03-31")?;
/// let refs = harvester.discover(&DiscoveryQuery::new("rust", window)).await?;
///
/// let urls = refs.into_iter().map(|r| r.url).collect();
/// let result = harvester
///     .batch_convert(urls, None, CancellationToken::new(), |p| {
///         println!("{}/{}", p.completed, p.total)
///     })
///     .await;
/// println!("{} converted, {} failed", result.succeeded, result.failed);
/// # Ok(())
/// # }
/// ```
pub struct Harvester {
    config: Config,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<CacheStore>>,
}

impl Harvester {
    /// Validate the configuration, open the cache and build the transport
    ///
    /// The cache database is only opened when `config.cache.enabled` is set.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let cache = if config.cache.enabled {
            Some(Arc::new(
                CacheStore::open(&config.cache.database_path).await?,
            ))
        } else {
            None
        };

        let transport = build_transport(&config.transport, &config.cache, cache.clone())?;

        tracing::info!(
            kind = ?config.transport.resolved_kind(),
            cache = cache.is_some(),
            "Harvester ready"
        );

        Ok(Self {
            config,
            transport,
            cache,
        })
    }

    /// Use an already-built transport instead of the configured one
    ///
    /// The cache section of `config` is ignored; wrap `transport` in a
    /// [`CachedTransport`](crate::transport::CachedTransport) to cache.
    pub fn with_transport(transport: Arc<dyn Transport>, config: Config) -> Self {
        Self {
            config,
            transport,
            cache: None,
        }
    }

    /// The transport every request goes through
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The cache store, when one was opened
    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// List the posts of a tag inside a date window, newest first
    pub async fn discover(&self, query: &DiscoveryQuery) -> Result<Vec<ArticleRef>> {
        let explorer = Explorer::new(
            Arc::clone(&self.transport),
            self.config.discovery.clone(),
            self.config.retry.clone(),
        );
        Ok(explorer.discover(query).await?)
    }

    /// Fetch and convert one article
    ///
    /// Never fails: rejected URLs, transport errors and non-200 statuses all
    /// come back as [`ParsedArticle::Failed`].
    pub async fn convert_one(&self, url: &str) -> ParsedArticle {
        match self.fetch_and_convert(url, &CancellationToken::new()).await {
            Ok(parsed) => parsed,
            Err(e) => ParsedArticle::failed(e.to_string()),
        }
    }

    /// Fetch and convert many articles with bounded concurrency
    ///
    /// `concurrency` falls back to the configured batch concurrency. Pages
    /// that fetch but do not convert are reported as
    /// [`BatchItemError::Conversion`].
    pub async fn batch_convert<P>(
        &self,
        urls: Vec<String>,
        concurrency: Option<usize>,
        cancel: CancellationToken,
        on_progress: P,
    ) -> BatchResult<ParsedArticle>
    where
        P: FnMut(BatchProgress),
    {
        let options = BatchOptions {
            concurrency: concurrency.unwrap_or(self.config.batch.concurrency),
            cancel,
        };
        let cancel = &options.cancel;

        batch::run(
            urls,
            |url: String| async move {
                match self.fetch_and_convert(&url, cancel).await? {
                    ParsedArticle::Failed { reason } => Err(BatchItemError::Conversion { reason }),
                    parsed => Ok(parsed),
                }
            },
            &options,
            on_progress,
        )
        .await
    }

    /// Fetch many pages with bounded concurrency, without converting them
    ///
    /// Every response the transport hands back is a success, whatever its
    /// status; only rejected URLs and transport failures count as failed.
    pub async fn batch_fetch<P>(
        &self,
        urls: Vec<String>,
        concurrency: Option<usize>,
        cancel: CancellationToken,
        on_progress: P,
    ) -> BatchResult<Response>
    where
        P: FnMut(BatchProgress),
    {
        let options = BatchOptions {
            concurrency: concurrency.unwrap_or(self.config.batch.concurrency),
            cancel,
        };
        let cancel = &options.cancel;

        batch::run(
            urls,
            |url: String| async move { self.fetch_page(&url, cancel).await },
            &options,
            on_progress,
        )
        .await
    }

    /// Policy check, then fetch with retry
    async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Response, BatchItemError> {
        if !self.config.url_policy.permits(url) {
            tracing::warn!(url, "Refusing to fetch URL outside the allowed hosts");
            return Err(BatchItemError::UnsafeUrl(url.to_string()));
        }

        let request = Request::get(url);
        let response = with_retry_until_cancelled(&self.config.retry, cancel, || {
            self.transport.fetch(&request)
        })
        .await?;
        Ok(response)
    }

    /// Fetch, then convert
    ///
    /// A non-200 response is an in-band failure, not an error.
    async fn fetch_and_convert(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<ParsedArticle, BatchItemError> {
        let response = self.fetch_page(url, cancel).await?;

        if response.status != 200 {
            tracing::debug!(url, status = response.status, "Article fetch returned non-200");
            return Ok(ParsedArticle::failed(format!("HTTP {}", response.status)));
        }

        Ok(convert::convert(&response.body, url))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, TransportKind, UrlPolicy};
    use crate::error::{TransportError, TransportErrorKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const ARTICLE: &str = "<html><body><article><h1>Title</h1><p>Body</p></article></body></html>";

    enum Reply {
        Page(u16, &'static str),
        Fail(TransportErrorKind),
    }

    #[derive(Default)]
    struct Pages {
        replies: HashMap<String, Reply>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl Pages {
        fn with(mut self, url: &str, reply: Reply) -> Self {
            self.replies.insert(url.to_string(), reply);
            self
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Transport for Pages {
        async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(request.url.clone())
                .or_default() += 1;

            match self.replies.get(&request.url) {
                Some(Reply::Page(status, body)) => Ok(Response {
                    url: request.url.clone(),
                    status: *status,
                    headers: Default::default(),
                    body: body.to_string(),
                }),
                Some(Reply::Fail(kind)) => Err(TransportError::new(*kind, "scripted failure")),
                None => Err(TransportError::connection_failed("no route")),
            }
        }
    }

    fn quick_config() -> Config {
        Config {
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_multiplier: 1.0,
                jitter: false,
            },
            ..Default::default()
        }
    }

    fn harvester(pages: Pages) -> (Harvester, Arc<Pages>) {
        let pages = Arc::new(pages);
        let transport: Arc<dyn Transport> = pages.clone();
        (Harvester::with_transport(transport, quick_config()), pages)
    }

    #[tokio::test]
    async fn convert_one_parses_a_page() {
        let url = "https://medium.com/@a/title-1";
        let (harvester, _) = harvester(Pages::default().with(url, Reply::Page(200, ARTICLE)));

        let parsed = harvester.convert_one(url).await;
        assert_eq!(parsed.title(), Some("Title"));
        assert!(parsed.markdown().unwrap().contains("[Reference](https://medium.com/@a/title-1)"));
    }

    #[tokio::test]
    async fn convert_one_reports_status() {
        let url = "https://medium.com/@a/gone";
        let (harvester, _) = harvester(Pages::default().with(url, Reply::Page(404, "nope")));

        assert_eq!(harvester.convert_one(url).await.reason(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn convert_one_rejects_foreign_urls_without_fetching() {
        let (harvester, pages) = harvester(Pages::default());

        for url in ["http://medium.com/@a/x", "https://evil.example/x", "not a url"] {
            let parsed = harvester.convert_one(url).await;
            assert_eq!(parsed.reason(), Some(format!("unsafe URL: {}", url).as_str()));
            assert_eq!(pages.calls(url), 0);
        }
    }

    #[tokio::test]
    async fn convert_one_retries_transient_failures() {
        let url = "https://medium.com/@a/slow";
        let (harvester, pages) =
            harvester(Pages::default().with(url, Reply::Fail(TransportErrorKind::Timeout)));

        let parsed = harvester.convert_one(url).await;
        assert!(!parsed.is_success());
        assert!(parsed.reason().unwrap().contains("scripted failure"));
        assert_eq!(pages.calls(url), 2);
    }

    #[tokio::test]
    async fn forbidden_is_not_retried() {
        let url = "https://medium.com/@a/blocked";
        let (harvester, pages) =
            harvester(Pages::default().with(url, Reply::Fail(TransportErrorKind::Forbidden)));

        assert!(!harvester.convert_one(url).await.is_success());
        assert_eq!(pages.calls(url), 1);
    }

    #[tokio::test]
    async fn batch_convert_isolates_failures() {
        let ok = "https://medium.com/@a/ok";
        let empty = "https://medium.com/@a/empty";
        let missing = "https://medium.com/@a/missing";
        let (harvester, _) = harvester(
            Pages::default()
                .with(ok, Reply::Page(200, ARTICLE))
                .with(empty, Reply::Page(200, "<html><body></body></html>"))
                .with(missing, Reply::Page(404, "")),
        );

        let urls = vec![
            ok.to_string(),
            empty.to_string(),
            missing.to_string(),
            "ftp://medium.com/x".to_string(),
        ];
        let mut progress = Vec::new();
        let result = harvester
            .batch_convert(urls, Some(2), CancellationToken::new(), |p| progress.push(p))
            .await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 3);
        assert_eq!(result.parse_failed, 2, "NO_ARTICLE and HTTP 404");
        assert_eq!(progress.len(), 4);
        assert_eq!(result.items[0].value().unwrap().title(), Some("Title"));
        assert!(matches!(
            result.items[1].error(),
            Some(BatchItemError::Conversion { reason }) if reason == convert::NO_ARTICLE
        ));
        assert!(matches!(
            result.items[2].error(),
            Some(BatchItemError::Conversion { reason }) if reason == "HTTP 404"
        ));
        assert!(matches!(result.items[3].error(), Some(BatchItemError::UnsafeUrl(_))));
    }

    #[tokio::test]
    async fn batch_fetch_returns_raw_responses() {
        let ok = "https://medium.com/@a/ok";
        let missing = "https://medium.com/@a/missing";
        let blocked = "https://medium.com/@a/blocked";
        let (harvester, pages) = harvester(
            Pages::default()
                .with(ok, Reply::Page(200, "<p>not an article</p>"))
                .with(missing, Reply::Page(404, "gone"))
                .with(blocked, Reply::Fail(TransportErrorKind::Forbidden)),
        );

        let urls = vec![
            ok.to_string(),
            missing.to_string(),
            blocked.to_string(),
            "https://evil.example/x".to_string(),
        ];
        let mut progress = Vec::new();
        let result = harvester
            .batch_fetch(urls, Some(2), CancellationToken::new(), |p| progress.push(p))
            .await;

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(result.parse_failed, 0);
        assert_eq!(progress.len(), 4);

        let page = result.items[0].value().unwrap();
        assert_eq!((page.status, page.body.as_str()), (200, "<p>not an article</p>"));
        assert_eq!(result.items[1].value().unwrap().status, 404);
        assert!(matches!(
            result.items[2].error(),
            Some(BatchItemError::Transport(e)) if e.kind == TransportErrorKind::Forbidden
        ));
        assert!(matches!(result.items[3].error(), Some(BatchItemError::UnsafeUrl(_))));
        assert_eq!(pages.calls(blocked), 1);
        assert_eq!(pages.calls("https://evil.example/x"), 0);
    }

    #[tokio::test]
    async fn batch_convert_honours_cancellation() {
        let (harvester, pages) = harvester(Pages::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let urls = vec!["https://medium.com/@a/1".to_string(); 3];
        let result = harvester.batch_convert(urls, None, cancel, |_| {}).await;

        assert!(result.cancelled);
        assert_eq!(result.skipped, 3);
        assert_eq!(pages.calls("https://medium.com/@a/1"), 0);
    }

    #[tokio::test]
    async fn new_opens_the_cache_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.database_path = dir.path().join("nested").join("cache.db");

        let harvester = Harvester::new(config).await.unwrap();
        assert!(harvester.cache().is_some());
        assert!(dir.path().join("nested").join("cache.db").exists());
    }

    #[tokio::test]
    async fn new_without_cache() {
        let mut config = Config::default();
        config.cache.enabled = false;

        let harvester = Harvester::new(config).await.unwrap();
        assert!(harvester.cache().is_none());
    }

    #[tokio::test]
    async fn new_rejects_invalid_config() {
        let mut config = Config::default();
        config.cache.enabled = false;
        config.transport.kind = TransportKind::Managed;

        let err = Harvester::new(config).await.err().unwrap();
        assert!(matches!(err, crate::Error::Config { key: Some(ref key), .. } if key == "transport.api_key"));
    }

    #[tokio::test]
    async fn relaxed_policy_allows_local_hosts() {
        let url = "http://127.0.0.1:9/post";
        let pages = Arc::new(Pages::default().with(url, Reply::Page(200, ARTICLE)));
        let mut config = quick_config();
        config.url_policy = UrlPolicy {
            require_https: false,
            allowed_host_suffixes: vec!["127.0.0.1".to_string()],
        };
        let harvester = Harvester::with_transport(pages.clone(), config);

        assert!(harvester.convert_one(url).await.is_success());
        assert_eq!(pages.calls(url), 1);
    }
}
