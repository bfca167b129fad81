//! Error types for the siteqa crate

use thiserror::Error;

/// Result type for siteqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for siteqa operations
///
/// Only job-level conditions surface here. Per-page fetch and extraction
/// failures are absorbed into a crawl's failure log instead.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The seed URL could not be normalized into a crawlable URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// A crawl finished without producing a single indexable chunk
    #[error("Crawl {scrape_id} produced no indexable content")]
    EmptyCrawl {
        /// Scrape that came up empty
        scrape_id: String,
    },

    /// No index has been built for the requested scrape
    #[error("No index found for scrape {0}")]
    IndexNotFound(String),

    /// No archived pages exist for the requested scrape
    #[error("No archived pages found for scrape {0}")]
    ScrapeNotFound(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Content processing error
    #[error("Process error: {0}")]
    Process(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Search error
    #[error("Search error: {0}")]
    Search(String),

    /// Page archive error
    #[error("Storage error: {0}")]
    Storage(String),
}
