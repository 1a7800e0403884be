//! # medium-harvest
//!
//! Library core for discovering Medium articles by tag and converting them to
//! Markdown.
//!
//! ## Design Philosophy
//!
//! medium-harvest is designed to be:
//! - **Library-first** - No CLI or UI, outer layers embed the crate
//! - **Pluggable** - Every network exchange goes through one [`Transport`] trait
//! - **Polite at scale** - Bounded concurrency, retries with backoff, a durable response cache
//! - **Failure-isolated** - One bad page never sinks a batch
//!
//! ## Quick Start
//!
//! ```no_run
//! use medium_harvest::{Config, Harvester};
//! use medium_harvest::discovery::{DateWindow, DiscoveryQuery};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let harvester = Harvester::new(Config::default()).await?;
//!
//!     let window = DateWindow::from_dates("2024-01-01", "2024-02-29")?;
//!     let articles = harvester
//!         .discover(&DiscoveryQuery::new("rust", window))
//!         .await?;
//!
//!     let urls = articles.iter().map(|a| a.url.clone()).collect();
//!     let result = harvester
//!         .batch_convert(urls, Some(8), CancellationToken::new(), |progress| {
//!             println!("{}/{}", progress.completed, progress.total);
//!         })
//!         .await;
//!
//!     for outcome in &result.items {
//!         if let Some(article) = outcome.value() {
//!             println!("{}", article.title().unwrap_or_default());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bounded-concurrency batch runner
pub mod batch;
/// Configuration types
pub mod config;
/// HTML to Markdown conversion
pub mod convert;
/// Response cache persistence
pub mod db;
/// Tag archive discovery
pub mod discovery;
/// Error types
pub mod error;
/// Library facade
pub mod harvester;
/// Retry logic with exponential backoff
pub mod retry;
/// HTTP transports
pub mod transport;
/// Core types
pub mod types;

// Re-export commonly used types
pub use batch::{BatchOptions, BatchProgress, BatchResult, ItemOutcome};
pub use config::Config;
pub use convert::{convert, normalize_title};
pub use db::CacheStore;
pub use error::{BatchItemError, DiscoveryError, Error, Result, TransportError, TransportErrorKind};
pub use harvester::Harvester;
pub use transport::Transport;
pub use types::{ArticleRef, Author, ParsedArticle, PostId, Request, Response};
