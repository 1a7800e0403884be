//! HTML to Markdown conversion for article pages
//!
//! [`convert`] turns one fetched article page into a [`ParsedArticle`]. The
//! page is parsed with [`scraper`], which tolerates malformed markup, and the
//! `<article>` subtree is walked once into Markdown. Platform chrome (author
//! avatars, follow and clap buttons, read-time badges, sign-in prompts) is
//! skipped during the walk, and the lead image is hoisted under the title
//! followed by a link back to the source page.
//!
//! Conversion never fails with an error: pages that cannot be converted
//! produce [`ParsedArticle::Failed`] with a reason. The output for a given
//! input is byte-for-byte deterministic.

use crate::types::ParsedArticle;
use scraper::{ElementRef, Html, Selector};

mod author;
mod images;
mod links;
mod postprocess;
mod walker;


pub use links::canonicalize_href;

/// Reason reported when the page has no `<article>` element
pub const NO_ARTICLE: &str = "no article body found";

/// Reason reported when neither a title meta tag nor an `h1` is present
pub const TITLE_MISSING: &str = "title missing";

/// Convert an article page to Markdown
///
/// `source_url` is linked from the reference line emitted under the title.
///
/// # Examples
///
/// ```
/// use medium_harvest::convert::convert;
///
/// let html = "<html><body><article><h1>Hello</h1><p>World</p></article></body></html>";
/// let parsed = convert(html, "https://medium.com/@a/hello-1");
/// assert_eq!(parsed.title(), Some("Hello"));
/// assert!(parsed.markdown().unwrap().contains("World"));
/// ```
pub fn convert(html: &str, source_url: &str) -> ParsedArticle {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let Some(article) = select_first(root, "article") else {
        return ParsedArticle::failed(NO_ARTICLE);
    };

    let h1 = select_first(article, "h1");
    let title = select_first(root, r#"meta[name="title"]"#)
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .or_else(|| h1.map(text_of).filter(|text| !text.is_empty()));

    let Some(title) = title else {
        return ParsedArticle::failed(TITLE_MISSING);
    };

    let author = author::extract(root, article);
    let lead_figure = select_first(root, "figure.paragraph-image");

    let raw = walker::Walker::new(article, source_url, h1, lead_figure).render();
    let markdown = postprocess::clean(&raw);

    tracing::debug!(
        url = source_url,
        title = %title,
        markdown_len = markdown.len(),
        "Article converted"
    );

    ParsedArticle::Parsed {
        title,
        markdown,
        author,
    }
}

/// Make a title safe to use as a file name
///
/// Drops everything except word characters, whitespace and `-`, then turns
/// each whitespace run into a single `-`.
///
/// ```
/// use medium_harvest::convert::normalize_title;
///
/// assert_eq!(normalize_title("  Rust: Fast & Safe!  "), "Rust-Fast-Safe");
/// ```
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_space = false;

    for c in title.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
                in_space = true;
            }
        } else if c.is_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// First element under `scope` matching `css`
pub(crate) fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

/// Every element under `scope` matching `css`
pub(crate) fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// First descendant element named `name` that satisfies `filter`
pub(crate) fn find_descendant<'a>(
    el: ElementRef<'a>,
    name: &str,
    filter: impl Fn(ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|d| d.value().name() == name && filter(*d))
}

/// Text content with whitespace runs collapsed and ends trimmed
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    let text: String = el.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
