//! Tag archive discovery
//!
//! Walks a tag's monthly archive from the newest month to the oldest, one
//! cursor page at a time, and returns every post published inside the
//! requested window exactly once.
//!
//! Pages are fetched strictly in sequence. A month is abandoned as soon as a
//! page adds nothing new, has reached dates older than the window, or the feed
//! reports no further page, so a feed that keeps replaying the same cursor
//! cannot stall the walk.

use crate::config::{DiscoveryConfig, RetryConfig};
use crate::error::DiscoveryError;
use crate::retry::with_retry;
use crate::transport::Transport;
use crate::types::{ArticleRef, PostId, Request};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

mod graphql;


use graphql::ArchivePage;

/// Path of the GraphQL endpoint below the platform origin
const GRAPHQL_PATH: &str = "/_/graphql";

/// A calendar month
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    /// Year (>= 1)
    pub year: i32,
    /// Month (1..=12)
    pub month: u32,
}

impl YearMonth {
    /// Create a month, validating its range
    pub fn new(year: i32, month: u32) -> Result<Self, DiscoveryError> {
        if !(1..=12).contains(&month) {
            return Err(DiscoveryError::InvalidRange(format!(
                "month {} is outside 1..=12",
                month
            )));
        }
        if year < 1 {
            return Err(DiscoveryError::InvalidRange(format!(
                "year {} is before year 1",
                year
            )));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month before this one
    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// First day of the month
    pub fn first_day(self) -> Result<NaiveDate, DiscoveryError> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or_else(|| DiscoveryError::InvalidRange(format!("no such month: {}", self)))
    }

    /// Last day of the month
    pub fn last_day(self) -> Result<NaiveDate, DiscoveryError> {
        let next_first = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next_first
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| DiscoveryError::InvalidRange(format!("no such month: {}", self)))
    }

    /// Months covering `[from, to]`, newest first
    pub fn descending(from: NaiveDate, to: NaiveDate) -> Vec<YearMonth> {
        let oldest = Self::of(from);
        let mut current = Self::of(to);
        let mut months = Vec::new();
        while current >= oldest {
            months.push(current);
            current = current.previous();
        }
        months
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The publication window to collect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateWindow {
    /// One calendar month
    Month {
        /// Year
        year: i32,
        /// Month (1..=12)
        month: u32,
    },
    /// Inclusive date range
    Range {
        /// First day included
        from: NaiveDate,
        /// Last day included
        to: NaiveDate,
    },
}

impl DateWindow {
    /// Build a range from two date strings accepted by [`parse_date`]
    pub fn from_dates(from: &str, to: &str) -> Result<Self, DiscoveryError> {
        Ok(DateWindow::Range {
            from: parse_date(from)?,
            to: parse_date(to)?,
        })
    }

    /// Inclusive bounds of the window
    pub fn bounds(&self) -> Result<(NaiveDate, NaiveDate), DiscoveryError> {
        match *self {
            DateWindow::Month { year, month } => {
                let ym = YearMonth::new(year, month)?;
                Ok((ym.first_day()?, ym.last_day()?))
            }
            DateWindow::Range { from, to } => {
                if from > to {
                    return Err(DiscoveryError::InvalidRange(format!(
                        "start {} is after end {}",
                        from, to
                    )));
                }
                if from.year() < 1 {
                    return Err(DiscoveryError::InvalidRange(format!(
                        "year {} is before year 1",
                        from.year()
                    )));
                }
                Ok((from, to))
            }
        }
    }
}

/// Parse `YYYY-MM-DD`, or `today` / `now` for the current UTC date
pub fn parse_date(input: &str) -> Result<NaiveDate, DiscoveryError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("today") || trimmed.eq_ignore_ascii_case("now") {
        return Ok(Utc::now().date_naive());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| DiscoveryError::InvalidDate(input.to_string()))
}

/// What to discover
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    /// Tag slug, e.g. `rust`
    pub tag: String,
    /// Publication window
    pub window: DateWindow,
    /// Items per archive page (None = configured default)
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl DiscoveryQuery {
    /// Query a tag over a window with the default page size
    pub fn new(tag: impl Into<String>, window: DateWindow) -> Self {
        Self {
            tag: tag.into(),
            window,
            page_size: None,
        }
    }

    /// Override the page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// Position within one month's archive feed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Opaque `after` token; empty for the first page
    pub after: String,
    /// Month being walked
    pub month: YearMonth,
    /// Items requested per page
    pub page_size: usize,
}

impl PaginationCursor {
    /// First page of a month
    pub fn start(month: YearMonth, page_size: usize) -> Self {
        Self {
            after: String::new(),
            month,
            page_size,
        }
    }

    /// Same month, next page
    pub fn advance(&self, after: String) -> Self {
        Self {
            after,
            month: self.month,
            page_size: self.page_size,
        }
    }
}

/// Discovers posts in a tag archive through a [`Transport`]
pub struct Explorer {
    transport: Arc<dyn Transport>,
    config: DiscoveryConfig,
    retry: RetryConfig,
}

impl Explorer {
    /// Create an explorer
    pub fn new(transport: Arc<dyn Transport>, config: DiscoveryConfig, retry: RetryConfig) -> Self {
        Self {
            transport,
            config,
            retry,
        }
    }

    /// Collect every post of `query.tag` published inside the window
    ///
    /// Results are unique by post id and sorted newest first.
    pub async fn discover(&self, query: &DiscoveryQuery) -> Result<Vec<ArticleRef>, DiscoveryError> {
        let tag = query.tag.trim();
        if tag.is_empty() {
            return Err(DiscoveryError::EmptyTag);
        }
        let page_size = query.page_size.unwrap_or(self.config.page_size);
        if page_size == 0 {
            return Err(DiscoveryError::InvalidPageSize);
        }
        let (from, to) = query.window.bounds()?;

        let mut seen: HashSet<PostId> = HashSet::new();
        let mut kept: Vec<ArticleRef> = Vec::new();
        let mut pages = 0usize;

        for month in YearMonth::descending(from, to) {
            let mut cursor = PaginationCursor::start(month, page_size);

            loop {
                let page = self.fetch_page(tag, &cursor).await?;
                pages += 1;

                let mut new_ids = 0usize;
                let mut oldest: Option<NaiveDate> = None;

                for node in page.nodes {
                    let published_at = node.published_at;
                    if let Some(at) = published_at {
                        let date = at.date_naive();
                        oldest = Some(oldest.map_or(date, |o| o.min(date)));
                    }

                    let post_id = PostId::new(node.id);
                    if !seen.insert(post_id.clone()) {
                        continue;
                    }
                    new_ids += 1;

                    let Some(published_at) = published_at else {
                        continue;
                    };
                    let published = published_at.date_naive();
                    if published < from || published > to {
                        continue;
                    }

                    let url = node
                        .url
                        .unwrap_or_else(|| format!("{}/p/{}", self.base_url(), post_id));
                    kept.push(ArticleRef {
                        post_id,
                        title: node.title,
                        author: node.author,
                        published_at,
                        published,
                        tag: tag.to_string(),
                        url,
                    });
                }

                tracing::debug!(
                    tag,
                    month = %month,
                    after = %cursor.after,
                    new_ids,
                    has_next_page = page.has_next_page,
                    "Archive page processed"
                );

                let next = page
                    .end_cursor
                    .filter(|c| !c.is_empty() && *c != cursor.after);
                let keep_going = new_ids > 0
                    && oldest.is_none_or(|o| o >= from)
                    && page.has_next_page;

                match next {
                    Some(after) if keep_going => cursor = cursor.advance(after),
                    _ => break,
                }
            }
        }

        kept.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        tracing::info!(
            tag,
            from = %from,
            to = %to,
            pages,
            found = kept.len(),
            "Discovery complete"
        );
        Ok(kept)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn fetch_page(
        &self,
        tag: &str,
        cursor: &PaginationCursor,
    ) -> Result<ArchivePage, DiscoveryError> {
        let request = Request::post_json(
            format!("{}{}", self.base_url(), GRAPHQL_PATH),
            graphql::tag_archive_operation(tag, cursor),
        );
        let request = &request;
        let transport = &self.transport;

        with_retry(&self.retry, || async move {
            let response = transport.fetch(request).await?;
            if !response.is_ok() {
                return Err(DiscoveryError::UnexpectedStatus(response.status));
            }
            graphql::decode_page(&response.body)
        })
        .await
    }
}
