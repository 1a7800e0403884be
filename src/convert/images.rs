//! Image source selection for figures, pictures and bare images.

use super::{find_descendant, text_of};
use scraper::ElementRef;

/// Pick the highest-resolution candidate of a `srcset`
///
/// The candidate with the largest `w` (or `x`) descriptor wins; with no
/// descriptors at all the last candidate is used.
pub(crate) fn best_srcset_candidate(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    let mut last: Option<&str> = None;

    for candidate in srcset.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let mut parts = candidate.split_whitespace();
        let Some(url) = parts.next() else {
            continue;
        };
        last = Some(url);

        let descriptor = parts.next().and_then(|d| {
            d.strip_suffix('w')
                .or_else(|| d.strip_suffix('x'))
                .and_then(|n| n.parse::<f64>().ok())
        });
        if let Some(size) = descriptor
            && best.is_none_or(|(current, _)| size >= current)
        {
            best = Some((size, url));
        }
    }

    best.map(|(_, url)| url).or(last).map(str::to_string)
}

fn has_srcset(el: ElementRef<'_>) -> bool {
    el.value().attr("srcset").is_some_and(|s| !s.trim().is_empty())
}

/// `src` of an image, else the best of its `srcset`
fn img_source(img: ElementRef<'_>) -> Option<String> {
    img.value()
        .attr("src")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| img.value().attr("srcset").and_then(best_srcset_candidate))
}

/// `<figure>`: `![caption](src)`, or the bold caption when there is no image
pub(crate) fn figure(el: ElementRef<'_>) -> String {
    let src = find_descendant(el, "source", has_srcset)
        .and_then(|s| s.value().attr("srcset"))
        .and_then(best_srcset_candidate)
        .or_else(|| find_descendant(el, "img", |_| true).and_then(img_source));

    let caption = find_descendant(el, "figcaption", |_| true)
        .map(text_of)
        .unwrap_or_default();

    match src {
        Some(src) => format!("![{}]({})", caption, src),
        None if !caption.is_empty() => format!("**{}**", caption),
        None => String::new(),
    }
}

/// `<picture>` outside a figure
pub(crate) fn picture(el: ElementRef<'_>) -> String {
    let img = find_descendant(el, "img", |_| true);

    let src = el
        .value()
        .attr("srcset")
        .and_then(best_srcset_candidate)
        .or_else(|| {
            find_descendant(el, "source", has_srcset)
                .and_then(|s| s.value().attr("srcset"))
                .and_then(best_srcset_candidate)
        })
        .or_else(|| img.and_then(img_source));

    let alt = img
        .and_then(|i| i.value().attr("alt"))
        .unwrap_or_default();

    match src {
        Some(src) => format!("![{}]({})", alt, src),
        None => String::new(),
    }
}

/// Bare `<img>`
pub(crate) fn img(el: ElementRef<'_>) -> String {
    match img_source(el) {
        Some(src) => format!("![{}]({})", el.value().attr("alt").unwrap_or_default(), src),
        None => String::new(),
    }
}
