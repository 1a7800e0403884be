//! Depth-preserving Markdown renderer over the article subtree.

use super::{images, links, postprocess};
use scraper::node::Node;
use scraper::ElementRef;
use std::cell::Cell;

/// `data-testid` values of byline images; the enclosing link goes with them
const BYLINE_IMAGE_IDS: &[&str] = &["authorPhoto", "publicationPhoto"];
/// `data-testid` values dropped on their own
const STANDALONE_NOISE_IDS: &[&str] = &["authorName", "headerClapButton"];
/// `data-testid` values whose nearest `div` is dropped
const DIV_NOISE_IDS: &[&str] = &["publicationName"];
/// `data-testid` values whose nearest `span` is dropped
const SPAN_NOISE_IDS: &[&str] = &["storyReadTime", "storyPublishDate"];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "button", "svg", "template"];
const BLOCK_CONTAINERS: &[&str] = &[
    "div", "section", "header", "footer", "main", "article", "aside", "nav", "figcaption", "table",
    "tr",
];
/// Elements that keep an otherwise textless paragraph alive
const EMBEDDED_CONTENT: &[&str] = &["img", "picture", "figure", "iframe", "br", "video"];

pub(crate) struct Walker<'a> {
    article: ElementRef<'a>,
    source_url: &'a str,
    h1: Option<ElementRef<'a>>,
    lead_figure: Option<ElementRef<'a>>,
    /// Page chrome found up front, skipped wherever the walk meets it
    noise: Vec<ElementRef<'a>>,
    reference_placed: Cell<bool>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(
        article: ElementRef<'a>,
        source_url: &'a str,
        h1: Option<ElementRef<'a>>,
        lead_figure: Option<ElementRef<'a>>,
    ) -> Self {
        Self {
            article,
            source_url,
            h1,
            lead_figure,
            noise: collect_noise(article),
            reference_placed: Cell::new(false),
        }
    }

    pub(crate) fn render(&self) -> String {
        let body = self.children(self.article, 0);
        let body = body.trim_matches(|c: char| c == '\n' || c == ' ');

        if self.reference_placed.get() {
            body.to_string()
        } else {
            format!("{}\n\n{}", self.reference(), body)
        }
    }

    fn reference(&self) -> String {
        format!("[Reference]({})", self.source_url)
    }

    fn children(&self, el: ElementRef<'a>, depth: usize) -> String {
        let mut out = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => push_text(&mut out, text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        out.push_str(&self.element(child, depth));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn element(&self, el: ElementRef<'a>, depth: usize) -> String {
        if self.is_noise(el) {
            return String::new();
        }
        let hoisted = self.h1.is_some() && same(self.lead_figure, el);
        if hoisted {
            return String::new();
        }

        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.heading(el, name, depth),
            "p" => block(&self.children(el, depth)),
            "em" | "i" => wrap_inline(&self.children(el, depth), "*"),
            "strong" | "b" => wrap_inline(&self.children(el, depth), "**"),
            "code" => {
                let code: String = el.text().collect();
                if code.is_empty() {
                    String::new()
                } else {
                    format!("`{}`", code)
                }
            }
            "pre" => format!("\n\n```\n{}\n```\n\n", pre_text(el).trim_matches('\n')),
            "br" => "\n".to_string(),
            "ul" => self.list(el, depth, false),
            "ol" => self.list(el, depth, true),
            "blockquote" => self.blockquote(el, depth),
            "hr" => "\n\n---\n\n".to_string(),
            "a" => self.link(el, depth),
            "figure" => {
                let mut out = block(&images::figure(el));
                if same(self.lead_figure, el) {
                    out.push_str(&block(&self.reference()));
                    self.reference_placed.set(true);
                }
                out
            }
            "picture" => images::picture(el),
            "img" => images::img(el),
            "iframe" => format!("\n\n{}\n\n", el.html()),
            _ if BLOCK_CONTAINERS.contains(&name) => block(&self.children(el, depth)),
            _ => self.children(el, depth),
        }
    }

    fn heading(&self, el: ElementRef<'a>, name: &str, depth: usize) -> String {
        let level = name[1..].parse::<usize>().unwrap_or(1);
        let text = single_line(&self.children(el, depth));
        let mut out = if text.is_empty() {
            String::new()
        } else {
            format!("\n\n{} {}\n\n", "#".repeat(level), text)
        };

        if same(self.h1, el) {
            if let Some(figure) = self.lead_figure {
                out.push_str(&block(&images::figure(figure)));
            }
            out.push_str(&block(&self.reference()));
            self.reference_placed.set(true);
        }
        out
    }

    fn list(&self, el: ElementRef<'a>, depth: usize, ordered: bool) -> String {
        let mut number = if ordered {
            el.value()
                .attr("start")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
        } else {
            1
        };

        let mut items = Vec::new();
        for item in el.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" || self.is_noise(item) {
                continue;
            }
            let marker = if ordered {
                format!("{}. ", number)
            } else {
                "- ".to_string()
            };
            number += 1;

            let content = self.children(item, depth + 1);
            let indent = " ".repeat(marker.len());
            let mut rendered = marker;
            let mut first = true;
            let mut in_code = false;
            for line in content.trim().lines() {
                if postprocess::fence_indent(line).is_some() {
                    in_code = !in_code;
                } else if line.trim().is_empty() {
                    // blank lines only survive inside code blocks
                    if in_code {
                        rendered.push('\n');
                    }
                    continue;
                }
                if !first {
                    rendered.push('\n');
                    rendered.push_str(&indent);
                }
                rendered.push_str(line);
                first = false;
            }
            items.push(rendered);
        }

        if items.is_empty() {
            return String::new();
        }
        let body = items.join("\n");
        if depth > 0 {
            format!("\n{}\n", body)
        } else {
            format!("\n\n{}\n\n", body)
        }
    }

    fn blockquote(&self, el: ElementRef<'a>, depth: usize) -> String {
        let inner = squeeze_blank_lines(self.children(el, depth).trim());
        if inner.is_empty() {
            return String::new();
        }
        let quoted: Vec<String> = inner
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    ">".to_string()
                } else {
                    format!("> {}", line)
                }
            })
            .collect();
        format!("\n\n{}\n\n", quoted.join("\n"))
    }

    fn link(&self, el: ElementRef<'a>, depth: usize) -> String {
        let text = self.children(el, depth);
        let text = text.trim();

        let Some(href) = el
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
        else {
            return text.to_string();
        };

        let href = links::canonicalize_href(href);
        match el.value().attr("title").filter(|t| !t.is_empty()) {
            Some(title) => format!("[{}]({} \"{}\")", text, href, title),
            None => format!("[{}]({})", text, href),
        }
    }

    fn is_noise(&self, el: ElementRef<'a>) -> bool {
        let value = el.value();
        let name = value.name();

        if SKIPPED_TAGS.contains(&name) {
            return true;
        }
        if name == "p" {
            let text = text_content(el);
            let text = text.trim();
            if text == "·" {
                return true;
            }
            if text.is_empty()
                && !el
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .any(|d| EMBEDDED_CONTENT.contains(&d.value().name()))
            {
                return true;
            }
        }
        self.noise.iter().any(|n| n.id() == el.id())
    }
}

/// Locate page chrome inside the article before walking it
fn collect_noise(article: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut noise = Vec::new();

    for el in article.descendants().skip(1).filter_map(ElementRef::wrap) {
        let value = el.value();

        if value.name() == "a" && value.attr("href").is_some_and(|h| h.contains("/m/signin")) {
            noise.push(el);
            continue;
        }

        let Some(testid) = value.attr("data-testid") else {
            continue;
        };

        let owner = if BYLINE_IMAGE_IDS.contains(&testid) && value.name() == "img" {
            nearest_ancestor(article, el, "a").unwrap_or(el)
        } else if DIV_NOISE_IDS.contains(&testid) {
            nearest_ancestor(article, el, "div").unwrap_or(el)
        } else if SPAN_NOISE_IDS.contains(&testid) {
            nearest_ancestor(article, el, "span").unwrap_or(el)
        } else if STANDALONE_NOISE_IDS.contains(&testid) {
            el
        } else {
            continue;
        };
        noise.push(owner);
    }
    noise
}

/// Closest ancestor named `name` strictly inside `article`
fn nearest_ancestor<'a>(
    article: ElementRef<'a>,
    el: ElementRef<'a>,
    name: &str,
) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|a| a.id() != article.id())
        .find(|a| a.value().name() == name)
}

fn same(candidate: Option<ElementRef<'_>>, el: ElementRef<'_>) -> bool {
    candidate.is_some_and(|c| c.id() == el.id())
}

fn text_content(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Append text with whitespace runs collapsed to one space
fn push_text(out: &mut String, text: &str) {
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with([' ', '\n']) {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    if pending_space && !out.is_empty() && !out.ends_with([' ', '\n']) {
        out.push(' ');
    }
}

/// Verbatim text of a code block, `<br>` as newlines
fn pre_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn block(inner: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n\n{}\n\n", trimmed)
    }
}

fn wrap_inline(inner: &str, mark: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let leading = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trailing = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{}{}{}{}{}", leading, mark, trimmed, mark, trailing)
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most one blank line between non-blank lines
fn squeeze_blank_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && out.last().is_some_and(|l| l.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}
