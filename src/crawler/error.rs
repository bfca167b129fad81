//! Error types for the crawler module

use std::time::Duration;

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A URL could not be turned into a crawlable http(s) URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The raw input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("HTTP status {status} for {url}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Browser automation error
    #[error("Browser error: {0}")]
    Browser(String),

    /// Rendering did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Text could not be extracted from a fetched document
    #[error("Extraction failed: {0}")]
    Extraction(String),
}

impl CrawlError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for CrawlError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        CrawlError::Browser(err.to_string())
    }
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::InvalidUrl { url, reason } => CrateError::InvalidUrl { url, reason },
            CrawlError::Http(e) => CrateError::Http(e),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
