//! Author extraction.

use super::links::canonicalize_href;
use super::{select_all, select_first, text_of};
use crate::types::Author;
use scraper::ElementRef;
use serde_json::Value;

#[derive(Default)]
struct Candidate {
    name: Option<String>,
    url: Option<String>,
}

impl Candidate {
    fn complete(&self) -> bool {
        self.name.is_some() && self.url.is_some()
    }

    fn offer_name(&mut self, name: Option<&str>) {
        if self.name.is_none() {
            self.name = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
        }
    }

    fn offer_url(&mut self, url: Option<&str>) {
        if self.url.is_none() {
            self.url = url
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string);
        }
    }
}

/// Find the article's author
///
/// Structured data is tried first, then the author meta tags, then the byline
/// markup. Returns `None` when no name is found.
pub(crate) fn extract<'a>(root: ElementRef<'a>, article: ElementRef<'a>) -> Option<Author> {
    let mut found = Candidate::default();

    from_json_ld(root, &mut found);

    if found.name.is_none() {
        let meta = select_first(root, r#"meta[name="author"]"#)
            .or_else(|| select_first(root, r#"meta[property="author"]"#));
        found.offer_name(meta.and_then(|m| m.value().attr("content")));
    }

    if !found.complete()
        && let Some(byline) = select_first(root, r#"[data-testid="authorName"]"#)
    {
        let text = text_of(byline);
        if !text.is_empty() {
            found.offer_name(Some(text.as_str()));
            found.offer_url(byline.value().attr("href"));
        }
    }

    if !found.complete() {
        let in_header = select_first(article, "header").and_then(profile_anchor);
        if let Some(anchor) = in_header.or_else(|| profile_anchor(root)) {
            found.offer_name(Some(text_of(anchor).as_str()));
            found.offer_url(anchor.value().attr("href"));
        }
    }

    let name = found.name?;
    Some(Author {
        name,
        profile_url: found.url.map(|u| canonicalize_href(&u)),
    })
}

/// First profile link with visible text
fn profile_anchor(scope: ElementRef<'_>) -> Option<ElementRef<'_>> {
    select_all(scope, r#"a[href^="/@"]"#)
        .into_iter()
        .find(|a| !text_of(*a).is_empty())
}

fn from_json_ld(root: ElementRef<'_>, found: &mut Candidate) {
    for script in select_all(root, r#"script[type="application/ld+json"]"#) {
        let text: String = script.text().collect();
        let Ok(document) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };

        let entries = match document {
            Value::Array(entries) => entries,
            other => vec![other],
        };

        for entry in &entries {
            let author = match entry.get("author") {
                Some(Value::Array(list)) => list.first(),
                other => other,
            };
            match author {
                Some(Value::Object(person)) => {
                    found.offer_name(person.get("name").and_then(Value::as_str));
                    found.offer_url(person.get("url").and_then(Value::as_str));
                }
                Some(Value::String(name)) => found.offer_name(Some(name.as_str())),
                _ => {}
            }
            if found.complete() {
                return;
            }
        }
    }
}
