//! # Website Crawler Module
//!
//! Breadth-first crawl of a single host, starting from a seed URL. This is the
//! first stage of the pipeline: it produces the documents that the processor
//! chunks and indexes.
//!
//! ## Key Components
//!
//! - `NormalizedUrl`, `normalize`, `is_in_domain`: canonical URLs and the domain boundary
//! - `Fetcher`: plain HTTP probing plus a pluggable `Renderer` for HTML
//! - `ChromeRenderer` / `HttpRenderer`: headless browser and plain GET rendering,
//!   chosen from the config by `ConfiguredRenderer`
//! - `extract_links`, `html_to_text`, `pdf::extract_text`: pure extraction steps
//! - `crawl_website`: the frontier loop that ties them together
//! - `storage`: the per-scrape page archive on disk
//!
//! ## Failure model
//!
//! Per-page problems (dead links, render timeouts, unreadable PDFs) are
//! recorded on the job and never stop the crawl. The only crawl-level error is
//! a seed URL that can't be normalized.

mod config;
mod content_extraction;
mod error;
mod fetcher;
mod link_extraction;
mod orchestrator;
pub mod pdf;
mod renderer;
pub mod storage;
mod url_normalizer;

// Re-export important types and functions
pub use config::{CrawlerConfig, CrawlerConfigBuilder, DEFAULT_SKIPPED_EXTENSIONS};
pub use content_extraction::{extract_metadata, html_to_text};
pub use error::CrawlError;
pub use fetcher::{FetchResult, Fetcher};
pub use link_extraction::extract_links;
pub use orchestrator::{CrawlJob, CrawlState, crawl_website};
pub use renderer::{ChromeRenderer, ConfiguredRenderer, HttpRenderer, RenderedPage, Renderer};
pub use url_normalizer::{NormalizedUrl, is_in_domain, normalize};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of resource a document was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Html,
    Pdf,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Html => "html",
            DocumentKind::Pdf => "pdf",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "html" => Some(DocumentKind::Html),
            "pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }
}

/// Represents a crawled document with its extracted text and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    /// Canonical URL the text came from
    pub url: String,

    /// HTML page or PDF document
    pub kind: DocumentKind,

    /// Extracted plain text
    pub content: String,

    /// Metadata extracted from the page
    pub metadata: PageMetadata,

    /// Link distance from the seed
    pub depth: u32,
}

/// Metadata for a crawled page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Title of the page
    pub title: Option<String>,

    /// Description of the page
    pub description: Option<String>,

    /// Declared document language
    pub language: Option<String>,

    /// Host of the page
    pub domain: String,
}

/// Why a page ended up in the failure log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// Network error, timeout, non-2xx status or browser error
    Fetch(String),
    /// Fetched fine but no text could be extracted
    Extraction(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Fetch(reason) => write!(f, "fetch failed: {}", reason),
            FailureReason::Extraction(reason) => write!(f, "extraction failed: {}", reason),
        }
    }
}

/// A page that could not be turned into a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// A URL skipped because its content isn't text we handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPage {
    pub url: String,
    pub content_type: String,
}

/// Progress notifications emitted while a crawl runs
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// A document was extracted
    Document { url: String, kind: DocumentKind },
    /// A page failed and was recorded
    Failed { url: String, reason: FailureReason },
    /// A URL was skipped as unsupported
    Skipped { url: String, content_type: String },
    /// New URLs joined the frontier
    Discovered { count: usize, frontier: usize },
    /// The frontier loop stopped
    Finished { documents: usize, failures: usize },
}

/// Durable summary of a finished crawl, saved next to its index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub scrape_id: String,
    pub seed_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub visited_count: usize,
    pub document_count: usize,
    pub failures: Vec<PageFailure>,
    pub skipped: Vec<SkippedPage>,
    /// Off-domain links seen but never fetched
    pub external_links: Vec<String>,
    /// Number of chunks in the built index, if it was built
    pub chunk_count: Option<usize>,
}

impl CrawlReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_names() {
        for kind in [DocumentKind::Html, DocumentKind::Pdf] {
            assert_eq!(DocumentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DocumentKind::parse("docx"), None);
    }

    #[test]
    fn test_failure_reason_json() {
        let failure = PageFailure {
            url: "https://example.com/broken".to_string(),
            reason: FailureReason::Fetch("HTTP status 500".to_string()),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["reason"]["kind"], "fetch");
        assert_eq!(json["reason"]["message"], "HTTP status 500");
        assert_eq!(
            failure.reason.to_string(),
            "fetch failed: HTTP status 500"
        );
    }
}
