//! Link discovery in rendered HTML

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::trace;

use crate::crawler::url_normalizer::{NormalizedUrl, normalize};

/// Elements whose target is followed regardless of type
const NAVIGATION_LINKS: &str = "a[href], area[href]";

/// Embedded resources, followed only when they point at a PDF
const RESOURCE_LINKS: &[(&str, &str)] = &[
    ("link[href]", "href"),
    ("iframe[src]", "src"),
    ("embed[src]", "src"),
    ("object[data]", "data"),
];

/// Collect the links on a page, resolved against `page_url`.
///
/// Results are canonical, de-duplicated and in document order, anchors
/// first. Hrefs that don't resolve to an http(s) URL are dropped silently.
pub fn extract_links(html: &str, page_url: &NormalizedUrl) -> Vec<NormalizedUrl> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |raw: &str, pdf_only: bool| match normalize(raw, Some(page_url)) {
        Ok(url) => {
            if pdf_only && !url.is_pdf() {
                return;
            }
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
        Err(e) => trace!(href = raw, error = %e, "Dropping link"),
    };

    if let Ok(selector) = Selector::parse(NAVIGATION_LINKS) {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                push(href, false);
            }
        }
    }

    for (css, attr) in RESOURCE_LINKS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(target) = element.value().attr(attr) {
                push(target, true);
            }
        }
    }

    links
}
