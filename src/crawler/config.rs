//! # Crawler Configuration Module
//!
//! Controls for a single crawl job: how far it may go, how it fetches pages,
//! and which parts of a page count as content. Built with a builder so callers
//! only spell out what differs from the defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Extensions that are never worth fetching for text
pub const DEFAULT_SKIPPED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "mp4", "mov", "avi", "wmv", "flv", "mkv",
    "mp3", "wav", "ogg", "webm", "ico", "zip", "rar", "tar", "gz", "doc", "docx", "ppt", "xls",
];

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Maximum number of URLs to fetch in one job
    pub max_pages: usize,

    /// Maximum link distance from the seed, unbounded when `None`
    pub max_depth: Option<u32>,

    /// Wall-clock budget for the whole job, unbounded when `None`
    pub max_duration: Option<Duration>,

    /// Number of frontier URLs fetched at once
    pub concurrency: usize,

    /// Upper bound on a browser render, navigation and readiness included
    pub render_timeout: Duration,

    /// Extra pause after the page reports ready, for late script output
    pub settle_delay: Duration,

    /// Timeout for plain HTTP requests
    pub request_timeout: Duration,

    /// User agent to use for requests
    pub user_agent: String,

    /// Render HTML pages in a headless browser instead of a plain GET
    pub render_js: bool,

    /// Explicit Chrome/Chromium binary, otherwise the browser is auto-detected
    pub chrome_executable: Option<PathBuf>,

    /// CSS selectors for elements to leave out of extracted text
    pub exclude_selectors: Vec<String>,

    /// Path extensions classified as unsupported without a request
    pub skipped_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_depth: None,
            max_duration: None,
            concurrency: 1,
            render_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("siteqa-crawler/{}", env!("CARGO_PKG_VERSION")),
            render_js: true,
            chrome_executable: None,
            exclude_selectors: vec!["aside".to_string(), "form".to_string()],
            skipped_extensions: DEFAULT_SKIPPED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the maximum number of pages to fetch
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    /// Set the maximum link depth
    pub fn max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the wall-clock budget for the job
    pub fn max_duration(mut self, max_duration: Option<Duration>) -> Self {
        self.config.max_duration = max_duration;
        self
    }

    /// Set how many URLs are fetched at once (at least one)
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    pub fn render_timeout(mut self, render_timeout: Duration) -> Self {
        self.config.render_timeout = render_timeout;
        self
    }

    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.config.settle_delay = settle_delay;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout;
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Toggle browser rendering of HTML pages
    pub fn render_js(mut self, render_js: bool) -> Self {
        self.config.render_js = render_js;
        self
    }

    pub fn chrome_executable(mut self, path: Option<PathBuf>) -> Self {
        self.config.chrome_executable = path;
        self
    }

    /// Set the CSS selectors for elements to exclude
    pub fn exclude_selectors(mut self, exclude_selectors: Vec<String>) -> Self {
        self.config.exclude_selectors = exclude_selectors;
        self
    }

    /// Replace the list of skipped extensions (without leading dots)
    pub fn skipped_extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.skipped_extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Whether a URL with this path extension should be skipped outright
    pub fn skips_extension(&self, extension: &str) -> bool {
        self.skipped_extensions
            .iter()
            .any(|skipped| skipped.eq_ignore_ascii_case(extension))
    }
}
