//! Link canonicalization.

use url::Url;

const PLATFORM_ORIGIN: &str = "https://medium.com";
const PLATFORM_HOST: &str = "medium.com";

/// Resolve a root-relative href against the platform origin
pub(crate) fn absolutize(href: &str) -> String {
    if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("{}{}", PLATFORM_ORIGIN, href)
    } else {
        href.to_string()
    }
}

fn is_platform_host(host: &str) -> bool {
    host == PLATFORM_HOST || host.ends_with(".medium.com")
}

fn is_tracking_param(name: &str) -> bool {
    name == "source" || name.starts_with("utm_")
}

/// Canonical form of an href found in an article
///
/// Root-relative links are made absolute on the platform origin. Links to the
/// platform (or one of its subdomains) lose `source` and `utm_*` query
/// parameters. Every other link is returned unchanged.
///
/// ```
/// use medium_harvest::convert::canonicalize_href;
///
/// assert_eq!(
///     canonicalize_href("/@ann/post-1?source=collection_home"),
///     "https://medium.com/@ann/post-1"
/// );
/// assert_eq!(
///     canonicalize_href("https://example.org/?utm_source=x"),
///     "https://example.org/?utm_source=x"
/// );
/// ```
pub fn canonicalize_href(href: &str) -> String {
    let absolute = absolutize(href);
    let Ok(mut url) = Url::parse(&absolute) else {
        return absolute;
    };
    if !url.host_str().is_some_and(is_platform_host) {
        return absolute;
    }

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| !is_tracking_param(k)).collect();
    if kept.len() == pairs.len() {
        return absolute;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url.to_string()
}
