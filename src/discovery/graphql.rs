//! Tag archive GraphQL request and response shapes.

use super::PaginationCursor;
use crate::error::DiscoveryError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

pub(crate) const OPERATION_NAME: &str = "TagArchiveFeedQuery";

pub(crate) const TAG_ARCHIVE_QUERY: &str = r#"
query TagArchiveFeedQuery($tagSlug: String!, $timeRange: TagPostsTimeRange!, $sortOrder: TagPostsSortOrder!, $first: Int!, $after: String) {
  tagFromSlug(tagSlug: $tagSlug) {
    id
    sortedFeed: posts(
      timeRange: $timeRange
      sortOrder: $sortOrder
      first: $first
      after: $after
    ) {
      edges { cursor node { id title creator { name id } firstPublishedAt mediumUrl } }
      pageInfo { hasNextPage endCursor }
      __typename
    }
    __typename
  }
}
"#;

/// Request body for one archive page: a single-operation batch
pub(crate) fn tag_archive_operation(tag: &str, cursor: &PaginationCursor) -> Value {
    json!([{
        "operationName": OPERATION_NAME,
        "query": TAG_ARCHIVE_QUERY,
        "variables": {
            "after": cursor.after,
            "first": cursor.page_size,
            "sortOrder": "NEWEST",
            "tagSlug": tag,
            "timeRange": {
                "inMonth": {"month": cursor.month.month, "year": cursor.month.year},
                "kind": "IN_MONTH",
            },
        },
    }])
}

#[derive(Debug, Deserialize)]
struct Edge {
    cursor: Option<String>,
    node: Node,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    creator: Option<Creator>,
    #[serde(default)]
    first_published_at: Option<f64>,
    #[serde(default)]
    medium_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Creator {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

/// One post as listed in the archive
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArchiveNode {
    pub id: String,
    pub title: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

/// Decoded archive page
#[derive(Debug, Default)]
pub(crate) struct ArchivePage {
    pub nodes: Vec<ArchiveNode>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Decode an archive response body
///
/// A missing tag or feed decodes as an empty page. Edges that don't match the
/// expected shape are skipped.
pub(crate) fn decode_page(body: &str) -> Result<ArchivePage, DiscoveryError> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| DiscoveryError::MalformedPage(format!("response is not JSON: {}", e)))?;

    let Some(operations) = document.as_array() else {
        return Err(DiscoveryError::MalformedPage(
            "expected a JSON array of operation results".to_string(),
        ));
    };

    let Some(feed) = operations
        .first()
        .and_then(|op| op.get("data"))
        .and_then(|data| data.get("tagFromSlug"))
        .and_then(|tag| tag.get("sortedFeed"))
        .filter(|feed| !feed.is_null())
    else {
        return Ok(ArchivePage::default());
    };

    let mut nodes = Vec::new();
    let mut last_edge_cursor = None;
    let edges = feed
        .get("edges")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for raw in edges {
        let edge: Edge = match serde_json::from_value(raw.clone()) {
            Ok(edge) => edge,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed archive edge");
                continue;
            }
        };
        if edge.cursor.is_some() {
            last_edge_cursor = edge.cursor.clone();
        }
        nodes.push(edge.node.into());
    }

    let page_info: PageInfo = feed
        .get("pageInfo")
        .cloned()
        .and_then(|info| serde_json::from_value(info).ok())
        .unwrap_or_default();

    Ok(ArchivePage {
        nodes,
        has_next_page: page_info.has_next_page,
        end_cursor: page_info.end_cursor.or(last_edge_cursor),
    })
}

impl From<Node> for ArchiveNode {
    fn from(node: Node) -> Self {
        let published_at = node
            .first_published_at
            .filter(|ms| *ms > 0.0)
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64));

        ArchiveNode {
            id: node.id,
            title: node.title.unwrap_or_default(),
            author: node.creator.and_then(|c| c.name).unwrap_or_default(),
            published_at,
            url: node.medium_url.filter(|u| !u.is_empty()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::YearMonth;

    #[test]
    fn operation_carries_month_window_and_cursor() {
        let cursor = PaginationCursor {
            after: "c1".to_string(),
            month: YearMonth::new(2024, 3).unwrap(),
            page_size: 25,
        };
        let op = tag_archive_operation("rust", &cursor);

        assert_eq!(op[0]["operationName"], OPERATION_NAME);
        let vars = &op[0]["variables"];
        assert_eq!(vars["after"], "c1");
        assert_eq!(vars["first"], 25);
        assert_eq!(vars["sortOrder"], "NEWEST");
        assert_eq!(vars["tagSlug"], "rust");
        assert_eq!(vars["timeRange"]["kind"], "IN_MONTH");
        assert_eq!(vars["timeRange"]["inMonth"]["month"], 3);
        assert_eq!(vars["timeRange"]["inMonth"]["year"], 2024);
    }

    #[test]
    fn decodes_edges_and_page_info() {
        let body = r#"[{"data":{"tagFromSlug":{"id":"t","sortedFeed":{
            "edges":[
                {"cursor":"a","node":{"id":"p1","title":"One","creator":{"name":"Ann","id":"u1"},"firstPublishedAt":1709294400000,"mediumUrl":"https://medium.com/@ann/one-p1"}},
                {"cursor":"b","node":{"title":"no id"}},
                {"cursor":"c","node":{"id":"p2","title":null,"creator":null,"firstPublishedAt":null,"mediumUrl":""}}
            ],
            "pageInfo":{"hasNextPage":true,"endCursor":"end"}}}}}]"#;

        let page = decode_page(body).unwrap();
        assert_eq!(page.nodes.len(), 2);
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("end"));

        let first = &page.nodes[0];
        assert_eq!(first.id, "p1");
        assert_eq!(first.author, "Ann");
        assert_eq!(
            first.published_at.unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );

        let second = &page.nodes[1];
        assert_eq!(second.title, "");
        assert_eq!(second.published_at, None);
        assert_eq!(second.url, None);
    }

    #[test]
    fn falls_back_to_last_edge_cursor() {
        let body = r#"[{"data":{"tagFromSlug":{"sortedFeed":{
            "edges":[{"cursor":"x1","node":{"id":"p1"}},{"cursor":"x2","node":{"id":"p2"}}]}}}}]"#;
        let page = decode_page(body).unwrap();
        assert_eq!(page.end_cursor.as_deref(), Some("x2"));
        assert!(!page.has_next_page);
    }

    #[test]
    fn unknown_tag_is_an_empty_page() {
        let page = decode_page(r#"[{"data":{"tagFromSlug":null}}]"#).unwrap();
        assert!(page.nodes.is_empty());
        assert!(!page.has_next_page);

        let page = decode_page("[]").unwrap();
        assert!(page.nodes.is_empty());
    }

    #[test]
    fn non_json_and_non_array_bodies_are_malformed() {
        assert!(matches!(
            decode_page("<html>blocked</html>"),
            Err(DiscoveryError::MalformedPage(_))
        ));
        assert!(matches!(
            decode_page(r#"{"data":{}}"#),
            Err(DiscoveryError::MalformedPage(_))
        ));
    }
}
