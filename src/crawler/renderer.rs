//! Page rendering backends
//!
//! The fetcher hands HTML-looking URLs to a [`Renderer`]. Two are provided:
//! [`ChromeRenderer`] drives a headless Chrome over CDP so script-built pages
//! come back fully rendered, and [`HttpRenderer`] does a plain GET for sites
//! that don't need it (and for tests).

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::{FutureExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::crawler::config::CrawlerConfig;
use crate::crawler::error::CrawlError;
use crate::crawler::url_normalizer::NormalizedUrl;

/// HTML captured after rendering, plus where the browser actually ended up
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects and script navigation
    pub final_url: String,
}

/// Turns a URL into rendered HTML
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        url: &NormalizedUrl,
    ) -> impl Future<Output = Result<RenderedPage, CrawlError>> + Send;

    /// Release any process-level resources held by the renderer
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Renderer that returns the server's HTML as-is
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Renderer for HttpRenderer {
    async fn render(&self, url: &NormalizedUrl) -> Result<RenderedPage, CrawlError> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let final_url = response.url().to_string();
        let html = response.text().await?;
        Ok(RenderedPage { html, final_url })
    }
}

const READY_STATE_SCRIPT: &str = r#"
    (function() {
        return {
            readyState: document.readyState,
            bodyExists: document.body !== null
        };
    })()
"#;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct BrowserSettings {
    executable: Option<PathBuf>,
    user_agent: String,
    render_timeout: Duration,
    settle_delay: Duration,
    request_timeout: Duration,
}

struct BrowserSession {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn close(self) {
        self.handler.abort();
        match Arc::try_unwrap(self.browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    debug!(error = %e, "Browser close failed");
                }
                if let Err(e) = browser.wait().await {
                    debug!(error = %e, "Waiting for browser exit failed");
                }
            }
            // Tabs still in flight hold a reference; the process is killed
            // when the last one is dropped.
            Err(_) => debug!("Browser still in use, leaving it to drop"),
        }
    }
}

/// Headless Chrome renderer.
///
/// The browser is launched on first use and shared by every render. Each
/// render opens its own tab and closes it whether or not rendering worked.
/// When a tab can't be opened the browser is assumed dead and relaunched once.
/// A main document answered with a 4xx or 5xx status is a `Status` error.
pub struct ChromeRenderer {
    settings: BrowserSettings,
    session: Mutex<Option<BrowserSession>>,
}

impl ChromeRenderer {
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            settings: BrowserSettings {
                executable: config.chrome_executable.clone(),
                user_agent: config.user_agent.clone(),
                render_timeout: config.render_timeout,
                settle_delay: config.settle_delay,
                request_timeout: config.request_timeout,
            },
            session: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<BrowserSession, CrawlError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.settings.request_timeout)
            .window_size(1366, 900)
            .arg(format!("--user-agent={}", self.settings.user_agent))
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg("--no-first-run");
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(CrawlError::Browser)?;

        info!("Launching headless browser");
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!(error = %e, "Browser handler event error");
                }
            }
            debug!("Browser handler finished");
        });

        Ok(BrowserSession {
            browser: Arc::new(browser),
            handler,
        })
    }

    async fn browser(&self) -> Result<Arc<Browser>, CrawlError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.browser.clone());
        }
        let session = self.launch().await?;
        let browser = session.browser.clone();
        *guard = Some(session);
        Ok(browser)
    }

    /// Replace `stale` with a fresh browser unless another render already did
    async fn relaunch(&self, stale: &Arc<Browser>) -> Result<Arc<Browser>, CrawlError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if !Arc::ptr_eq(&session.browser, stale) {
                return Ok(session.browser.clone());
            }
        }
        if let Some(old) = guard.take() {
            old.close().await;
        }
        let session = self.launch().await?;
        let browser = session.browser.clone();
        *guard = Some(session);
        Ok(browser)
    }

    async fn open_tab(&self) -> Result<Page, CrawlError> {
        let browser = self.browser().await?;
        match browser.new_page("about:blank").await {
            Ok(page) => Ok(page),
            Err(e) => {
                warn!(error = %e, "Could not open tab, relaunching browser");
                let browser = self.relaunch(&browser).await?;
                Ok(browser.new_page("about:blank").await?)
            }
        }
    }

    async fn capture(&self, page: &Page, url: &NormalizedUrl) -> Result<RenderedPage, CrawlError> {
        let started = Instant::now();
        let timeout = self.settings.render_timeout;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;

        tokio::time::timeout(timeout, page.goto(url.as_str()))
            .await
            .map_err(|_| CrawlError::Timeout(timeout))??;

        let remaining = timeout.saturating_sub(started.elapsed());
        wait_until_ready(page, remaining).await;
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let html = page.content().await?;
        let final_url = page.url().await?.unwrap_or_else(|| url.to_string());
        let status = document_status(&mut responses, &final_url);
        check_document_status(status, &final_url)?;
        Ok(RenderedPage { html, final_url })
    }
}

/// HTTP status of the main document among the responses seen so far
fn document_status(
    responses: &mut EventStream<EventResponseReceived>,
    final_url: &str,
) -> Option<i64> {
    let mut status = None;
    while let Some(Some(event)) = responses.next().now_or_never() {
        if event.r#type == ResourceType::Document && event.response.url == final_url {
            status = Some(event.response.status);
        }
    }
    status
}

/// Error pages are failures, same as with a plain GET.
/// A missing status (served from cache, script navigation) passes.
fn check_document_status(status: Option<i64>, url: &str) -> Result<(), CrawlError> {
    match status {
        Some(code) if code >= 400 => Err(CrawlError::Status {
            status: u16::try_from(code).unwrap_or(u16::MAX),
            url: url.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Poll `document.readyState` until the page is complete or `max_wait` runs out.
/// Running out is not an error; whatever has rendered by then is captured.
async fn wait_until_ready(page: &Page, max_wait: Duration) {
    let started = Instant::now();
    loop {
        if started.elapsed() >= max_wait {
            debug!(?max_wait, "Page not ready in time, capturing as-is");
            return;
        }
        match page.evaluate(READY_STATE_SCRIPT).await {
            Ok(result) => {
                if let Ok(value) = result.into_value::<serde_json::Value>() {
                    let complete = value.get("readyState").and_then(|v| v.as_str()) == Some("complete");
                    let has_body = value
                        .get("bodyExists")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    if complete && has_body {
                        trace!(elapsed = ?started.elapsed(), "Page ready");
                        return;
                    }
                }
            }
            Err(e) => trace!(error = %e, "readyState check failed"),
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

impl Renderer for ChromeRenderer {
    #[instrument(skip(self), fields(url = %url))]
    async fn render(&self, url: &NormalizedUrl) -> Result<RenderedPage, CrawlError> {
        let page = self.open_tab().await?;
        let result = self.capture(&page, url).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close tab");
        }
        result
    }

    async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            info!("Shutting down headless browser");
            session.close().await;
        }
    }
}

/// The renderer picked by [`CrawlerConfig::render_js`]
pub enum ConfiguredRenderer {
    Chrome(ChromeRenderer),
    Http(HttpRenderer),
}

impl ConfiguredRenderer {
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        if config.render_js {
            Ok(Self::Chrome(ChromeRenderer::new(config)))
        } else {
            Ok(Self::Http(HttpRenderer::new(config)?))
        }
    }
}

impl Renderer for ConfiguredRenderer {
    async fn render(&self, url: &NormalizedUrl) -> Result<RenderedPage, CrawlError> {
        match self {
            Self::Chrome(renderer) => renderer.render(url).await,
            Self::Http(renderer) => renderer.render(url).await,
        }
    }

    async fn shutdown(&self) {
        match self {
            Self::Chrome(renderer) => renderer.shutdown().await,
            Self::Http(renderer) => renderer.shutdown().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_renderer_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _page = server
            .mock("GET", "/new")
            .with_header("content-type", "text/html")
            .with_body("<html><body>moved</body></html>")
            .create_async()
            .await;

        let renderer = HttpRenderer::new(&CrawlerConfig::default()).unwrap();
        let url = NormalizedUrl::parse(&format!("{}/old", server.url())).unwrap();
        let page = renderer.render(&url).await.unwrap();

        assert!(page.html.contains("moved"));
        assert!(page.final_url.ends_with("/new"));
    }

    #[test]
    fn test_document_status_check() {
        assert!(check_document_status(Some(200), "https://example.com/").is_ok());
        assert!(check_document_status(Some(304), "https://example.com/").is_ok());
        assert!(check_document_status(None, "https://example.com/").is_ok());

        let err = check_document_status(Some(404), "https://example.com/gone").unwrap_err();
        assert!(matches!(
            err,
            CrawlError::Status { status: 404, ref url } if url == "https://example.com/gone"
        ));
        assert!(matches!(
            check_document_status(Some(503), "https://example.com/"),
            Err(CrawlError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn test_configured_renderer_follows_render_js() {
        let plain = CrawlerConfig::builder().render_js(false).build();
        assert!(matches!(
            ConfiguredRenderer::from_config(&plain).unwrap(),
            ConfiguredRenderer::Http(_)
        ));
        let browser = CrawlerConfig::builder().render_js(true).build();
        assert!(matches!(
            ConfiguredRenderer::from_config(&browser).unwrap(),
            ConfiguredRenderer::Chrome(_)
        ));
    }

    #[tokio::test]
    async fn test_configured_renderer_renders_over_http() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_header("content-type", "text/html")
            .with_body("<html><body>plain</body></html>")
            .create_async()
            .await;

        let config = CrawlerConfig::builder().render_js(false).build();
        let renderer = ConfiguredRenderer::from_config(&config).unwrap();
        let url = NormalizedUrl::parse(&server.url()).unwrap();
        let page = renderer.render(&url).await.unwrap();
        renderer.shutdown().await;

        assert!(page.html.contains("plain"));
    }

    #[tokio::test]
    async fn test_http_renderer_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let renderer = HttpRenderer::new(&CrawlerConfig::default()).unwrap();
        let url = NormalizedUrl::parse(&format!("{}/gone", server.url())).unwrap();
        let result = renderer.render(&url).await;

        assert!(matches!(result, Err(CrawlError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_chrome_shutdown_without_launch_is_noop() {
        let renderer = ChromeRenderer::new(&CrawlerConfig::default());
        renderer.shutdown().await;
        assert!(renderer.session.lock().await.is_none());
    }
}
