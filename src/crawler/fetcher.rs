//! Content fetching and classification
//!
//! [`Fetcher::fetch`] never fails outright. Whatever happens to a URL ends up
//! as one of the [`FetchResult`] variants and the orchestrator decides what
//! to record.

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument, warn};

use crate::crawler::config::CrawlerConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::renderer::Renderer;
use crate::crawler::url_normalizer::{NormalizedUrl, normalize};

/// Outcome of fetching one URL
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Rendered HTML and the URL it was finally served from
    HtmlPage {
        html: String,
        final_url: NormalizedUrl,
    },
    /// Raw PDF bytes
    PdfDocument { bytes: Vec<u8> },
    /// Not HTML or PDF; skipped, not an error
    Unsupported { content_type: String },
    /// Network error, timeout, bad status or render failure
    Failed { reason: String },
}

impl FetchResult {
    fn failed(err: CrawlError) -> Self {
        FetchResult::Failed {
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ContentKind {
    Html,
    Pdf,
    /// No usable content-type, so let the renderer have a go
    Unknown,
    Other(String),
}

fn classify(content_type: Option<&str>) -> ContentKind {
    let Some(raw) = content_type else {
        return ContentKind::Unknown;
    };
    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "" => ContentKind::Unknown,
        "text/html" | "application/xhtml+xml" => ContentKind::Html,
        "application/pdf" | "application/x-pdf" => ContentKind::Pdf,
        _ => ContentKind::Other(mime),
    }
}

/// Fetches URLs with a plain HTTP client and hands HTML to a [`Renderer`]
pub struct Fetcher<R: Renderer> {
    client: reqwest::Client,
    renderer: R,
    config: CrawlerConfig,
}

impl<R: Renderer> Fetcher<R> {
    pub fn new(config: &CrawlerConfig, renderer: R) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            renderer,
            config: config.clone(),
        })
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Retrieve and classify `url`.
    ///
    /// Known media extensions are skipped without touching the network and a
    /// `.pdf` path is downloaded directly. Everything else gets a HEAD request
    /// first so that only HTML (or unknown) content pays for a render.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        if let Some(ext) = url.extension() {
            if self.config.skips_extension(&ext) {
                debug!(extension = %ext, "Skipping by extension");
                return FetchResult::Unsupported {
                    content_type: format!("file extension .{}", ext),
                };
            }
        }

        if url.is_pdf() {
            return self.download_pdf(url).await;
        }

        let kind = match self.content_kind(url).await {
            Ok(kind) => kind,
            Err(e) => return FetchResult::failed(e),
        };
        debug!(?kind, "Resolved content type");

        match kind {
            ContentKind::Html | ContentKind::Unknown => self.render(url).await,
            ContentKind::Pdf => self.download_pdf(url).await,
            ContentKind::Other(content_type) => FetchResult::Unsupported { content_type },
        }
    }

    /// HEAD the URL and classify its content type.
    /// Servers that refuse HEAD are treated as unknown rather than failed;
    /// both renderers reject error statuses on the GET that follows.
    async fn content_kind(&self, url: &NormalizedUrl) -> Result<ContentKind, CrawlError> {
        let response = self.client.head(url.as_str()).send().await?;
        let status = response.status();

        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
            return Ok(ContentKind::Unknown);
        }
        if !status.is_success() {
            return Err(CrawlError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        Ok(classify(content_type))
    }

    async fn render(&self, url: &NormalizedUrl) -> FetchResult {
        match self.renderer.render(url).await {
            Ok(page) => {
                let final_url = normalize(&page.final_url, Some(url)).unwrap_or_else(|e| {
                    warn!(error = %e, "Unusable final URL, keeping requested URL");
                    url.clone()
                });
                FetchResult::HtmlPage {
                    html: page.html,
                    final_url,
                }
            }
            Err(e) => FetchResult::failed(e),
        }
    }

    async fn download_pdf(&self, url: &NormalizedUrl) -> FetchResult {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => return FetchResult::failed(e.into()),
        };
        let status = response.status();
        if !status.is_success() {
            return FetchResult::failed(CrawlError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        match response.bytes().await {
            Ok(bytes) => FetchResult::PdfDocument {
                bytes: bytes.to_vec(),
            },
            Err(e) => FetchResult::failed(e.into()),
        }
    }
}
