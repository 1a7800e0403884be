//! Configuration types for medium-harvest

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// Top-level library configuration
///
/// Every section has sensible defaults, so `Config::default()` gives a direct
/// transport with an on-disk cache at `./cache.db`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which transport to use and how to reach the network
    #[serde(default)]
    pub transport: TransportConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy applied above the transport
    #[serde(default)]
    pub retry: RetryConfig,

    /// Tag archive discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Batch conversion settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Which article URLs may be fetched
    #[serde(default)]
    pub url_policy: UrlPolicy,
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.transport.resolved_kind() == TransportKind::Managed
            && self
                .transport
                .api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
        {
            return Err(crate::Error::config(
                "managed transport requires an api_key",
                "transport.api_key",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::config(
                "max_attempts must be at least 1",
                "retry.max_attempts",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(crate::Error::config(
                "backoff_multiplier must be >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.discovery.page_size == 0 {
            return Err(crate::Error::config(
                "page_size must be greater than zero",
                "discovery.page_size",
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(crate::Error::config(
                "concurrency must be greater than zero",
                "batch.concurrency",
            ));
        }
        for proxy in &self.transport.proxies {
            if url::Url::parse(proxy).is_err() {
                return Err(crate::Error::config(
                    format!("invalid proxy URL: {}", proxy),
                    "transport.proxies",
                ));
            }
        }
        Ok(())
    }
}

/// Transport variant selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Managed when an api key is configured, direct otherwise (default)
    #[default]
    Auto,
    /// Plain HTTP from the local network identity, optionally via proxies
    Direct,
    /// Remote scraping service
    Managed,
}

/// Transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport variant (default: auto)
    #[serde(default)]
    pub kind: TransportKind,

    /// Credential for the managed scraping service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Ask the managed service for headless rendering
    #[serde(default)]
    pub advanced: bool,

    /// Managed service endpoint
    #[serde(default = "default_managed_endpoint")]
    pub endpoint: String,

    /// Proxy URLs for the direct transport; one is picked at random per request
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Extra headers merged over the browser defaults of the direct transport
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,

    /// Default request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl TransportConfig {
    /// Resolve `Auto` to a concrete variant
    pub fn resolved_kind(&self) -> TransportKind {
        match self.kind {
            TransportKind::Auto => {
                if self
                    .api_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty())
                {
                    TransportKind::Managed
                } else {
                    TransportKind::Direct
                }
            }
            other => other,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Auto,
            api_key: None,
            advanced: false,
            endpoint: default_managed_endpoint(),
            proxies: vec![],
            extra_headers: BTreeMap::new(),
            timeout: default_timeout(),
        }
    }
}

/// Response cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Wrap the transport in the caching decorator (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SQLite database path (default: "./cache.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Entry lifetime in seconds (None = never expires)
    #[serde(default, with = "optional_duration_serde")]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: default_database_path(),
            ttl: None,
        }
    }
}

/// Retry configuration for transient transport failures
///
/// `max_attempts` counts every attempt, including the first one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds (default: 500)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay, in milliseconds (default: 30000)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Tag archive discovery configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Platform origin hosting the GraphQL endpoint (default: "https://medium.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Items requested per archive page (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
        }
    }
}

/// Batch conversion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum in-flight fetches (default: 10)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Allow-list applied to article URLs before they are fetched
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UrlPolicy {
    /// Only https URLs are fetched (default: true)
    #[serde(default = "default_true")]
    pub require_https: bool,

    /// Accepted host suffixes (default: ["medium.com"])
    #[serde(default = "default_allowed_hosts")]
    pub allowed_host_suffixes: Vec<String>,
}

impl UrlPolicy {
    /// Whether `url` may be fetched
    pub fn permits(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        if self.require_https && parsed.scheme() != "https" {
            return false;
        }
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowed_host_suffixes.iter().any(|suffix| {
            host == suffix
                || host
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            require_https: true,
            allowed_host_suffixes: default_allowed_hosts(),
        }
    }
}

fn default_managed_endpoint() -> String {
    "https://scraper-api.decodo.com/v2/scrape".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./cache.db")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_base_url() -> String {
    "https://medium.com".to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    10
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["medium.com".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Retry delays are sub-second, so they round-trip as milliseconds
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.transport.kind, TransportKind::Auto);
        assert_eq!(config.transport.timeout, Duration::from_secs(30));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.database_path, PathBuf::from("./cache.db"));
        assert_eq!(config.cache.ttl, None);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.discovery.page_size, 50);
        assert_eq!(config.batch.concurrency, 10);
        config.validate().expect("defaults must validate");
    }

    #[test]
    fn auto_kind_resolves_by_credential() {
        let mut transport = TransportConfig::default();
        assert_eq!(transport.resolved_kind(), TransportKind::Direct);

        transport.api_key = Some("   ".to_string());
        assert_eq!(
            transport.resolved_kind(),
            TransportKind::Direct,
            "a blank key must not select the managed transport"
        );

        transport.api_key = Some("secret".to_string());
        assert_eq!(transport.resolved_kind(), TransportKind::Managed);

        transport.kind = TransportKind::Direct;
        assert_eq!(transport.resolved_kind(), TransportKind::Direct);
    }

    #[test]
    fn managed_without_key_is_rejected() {
        let config = Config {
            transport: TransportConfig {
                kind: TransportKind::Managed,
                ..TransportConfig::default()
            },
            ..Config::default()
        };

        match config.validate() {
            Err(crate::Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("transport.api_key"))
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = Config {
            retry: RetryConfig {
                max_attempts: 0,
                ..RetryConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_proxy_url_is_rejected() {
        let config = Config {
            transport: TransportConfig {
                proxies: vec!["not a url".to_string()],
                ..TransportConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_delays_round_trip_as_millis() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };

        let json = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(json["initial_delay"], 250);
        assert_eq!(json["max_delay"], 5000);

        let restored: RetryConfig = serde_json::from_value(json).expect("deserialize failed");
        assert_eq!(restored.initial_delay, Duration::from_millis(250));
        assert_eq!(restored.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn cache_ttl_serializes_as_optional_seconds() {
        let config = CacheConfig {
            ttl: Some(Duration::from_secs(3600)),
            ..CacheConfig::default()
        };
        let json = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(json["ttl"], 3600);

        let restored: CacheConfig =
            serde_json::from_str(r#"{"ttl": null}"#).expect("deserialize failed");
        assert_eq!(restored.ttl, None);
    }

    #[test]
    fn duration_serde_rejects_string_instead_of_integer() {
        let result = serde_json::from_str::<TransportConfig>(r#"{"timeout": "thirty"}"#);
        assert!(
            result.is_err(),
            "string value for a Duration field must produce a serde error"
        );
    }

    #[test]
    fn url_policy_accepts_platform_hosts_only() {
        let policy = UrlPolicy::default();

        assert!(policy.permits("https://medium.com/@someone/a-post-123"));
        assert!(policy.permits("https://blog.medium.com/a-post"));
        assert!(!policy.permits("http://medium.com/a-post"), "plain http");
        assert!(!policy.permits("https://example.com/a-post"));
        assert!(!policy.permits("https://notmedium.com/a-post"), "lookalike host");
        assert!(!policy.permits("file:///etc/passwd"));
        assert!(!policy.permits("not a url"));
    }

    #[test]
    fn url_policy_can_be_relaxed_for_local_hosts() {
        let policy = UrlPolicy {
            require_https: false,
            allowed_host_suffixes: vec!["127.0.0.1".to_string()],
        };
        assert!(policy.permits("http://127.0.0.1:8080/post"));
        assert!(!policy.permits("ftp://127.0.0.1/post"));
    }
}
