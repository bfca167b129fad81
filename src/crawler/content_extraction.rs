//! Content extraction functionality for the crawler module
//!
//! Rendered HTML is reduced to the visible text a reader would see. Markup,
//! scripts and styles are dropped, as is anything matching the configured
//! exclude selectors. Block-level elements become paragraph breaks so the
//! chunker has natural places to split.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::warn;

use crate::crawler::PageMetadata;
use crate::crawler::url_normalizer::NormalizedUrl;

/// Elements that never contribute visible text
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "head", "img", "link", "meta", "iframe",
    "object", "embed", "canvas",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th",
    "thead", "tr", "ul",
];

fn compile_selectors(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|css| match Selector::parse(css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Failed to parse selector '{}': {}", css, e);
                None
            }
        })
        .collect()
}

fn collect_text(element: ElementRef<'_>, excluded: &[Selector], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child.value().name();
                if SKIPPED_TAGS.contains(&name) || excluded.iter().any(|s| s.matches(&child)) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push_str("\n\n");
                }
                collect_text(child, excluded, out);
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of spaces inside lines and runs of blank lines between them
pub(crate) fn tidy_whitespace(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut pending_break = 0usize;

    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_break += 1;
            continue;
        }
        if !text.is_empty() {
            text.push_str(if pending_break > 0 { "\n\n" } else { "\n" });
        }
        text.push_str(&line);
        pending_break = 0;
    }

    text
}

/// Convert HTML to plain visible text
///
/// # Arguments
///
/// * `html` - The HTML to convert
/// * `exclude_selectors` - CSS selectors for elements to leave out
pub fn html_to_text(html: &str, exclude_selectors: &[String]) -> String {
    let document = Html::parse_document(html);
    let excluded = compile_selectors(exclude_selectors);

    let mut raw = String::with_capacity(html.len() / 2);
    collect_text(document.root_element(), &excluded, &mut raw);
    tidy_whitespace(&raw)
}

/// Extract metadata from a page
///
/// # Arguments
///
/// * `url` - The URL the page was served from
/// * `html` - The HTML of the page
pub fn extract_metadata(url: &NormalizedUrl, html: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    let first_text = |css: &str| -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .next()
            .map(|element| element.text().collect::<String>())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
    };
    let first_attr = |css: &str, attr: &str| -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        document
            .select(&selector)
            .filter_map(|element| element.value().attr(attr))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    };

    let title = first_text("title").or_else(|| first_text("h1"));
    let description = first_attr("meta[name='description']", "content")
        .or_else(|| first_attr("meta[property='og:description']", "content"));
    let language = first_attr("html[lang]", "lang");

    PageMetadata {
        title,
        description,
        language,
        domain: url.host().unwrap_or_default().to_string(),
    }
}
