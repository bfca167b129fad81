//! The crawl frontier loop
//!
//! A [`CrawlJob`] owns everything about one crawl: the FIFO frontier, the
//! visited set and the accumulated documents and failures. URLs are marked
//! visited when they are enqueued, so a link seen on many pages is fetched at
//! most once and the frontier never holds duplicates.
//!
//! A redirect can land on a page that has its own place in the frontier.
//! Every URL whose content the job has taken in is remembered, so the same
//! page is never extracted twice and a queued redirect target is dropped
//! instead of fetched.
//!
//! Fetches for a batch run concurrently, but the job is only touched between
//! batches, so no job state is shared across an await.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::crawler::config::CrawlerConfig;
use crate::crawler::content_extraction::{extract_metadata, html_to_text};
use crate::crawler::error::CrawlError;
use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::link_extraction::extract_links;
use crate::crawler::pdf;
use crate::crawler::renderer::Renderer;
use crate::crawler::url_normalizer::{NormalizedUrl, is_in_domain};
use crate::crawler::{
    CrawlEvent, CrawlReport, CrawledPage, DocumentKind, FailureReason, PageFailure, PageMetadata,
    SkippedPage,
};

/// Lifecycle of a crawl job. There is no failed state: page failures are
/// recorded and the job always completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Running,
    /// Frontier exhausted or a limit was hit; nothing new will be fetched
    Draining,
    Completed,
}

#[derive(Debug, Clone)]
struct QueuedUrl {
    url: NormalizedUrl,
    depth: u32,
}

/// One crawl, from seed to completion
#[derive(Debug)]
pub struct CrawlJob {
    id: String,
    seed: NormalizedUrl,
    frontier: VecDeque<QueuedUrl>,
    visited: HashSet<NormalizedUrl>,
    /// URLs fetched or reached through a redirect
    absorbed: HashSet<NormalizedUrl>,
    fetched: usize,
    documents: Vec<CrawledPage>,
    failures: Vec<PageFailure>,
    skipped: Vec<SkippedPage>,
    external_links: BTreeSet<String>,
    state: CrawlState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    /// Start a job with the seed already queued and visited
    pub fn new(id: impl Into<String>, seed: NormalizedUrl) -> Self {
        let mut job = Self {
            id: id.into(),
            seed: seed.clone(),
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            absorbed: HashSet::new(),
            fetched: 0,
            documents: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            external_links: BTreeSet::new(),
            state: CrawlState::Running,
            started_at: Utc::now(),
            finished_at: None,
        };
        job.enqueue(seed, 0);
        job
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seed(&self) -> &NormalizedUrl {
        &self.seed
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Every URL ever enqueued, fetched or not
    pub fn visited(&self) -> &HashSet<NormalizedUrl> {
        &self.visited
    }

    /// Number of URLs actually handed to the fetcher
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn documents(&self) -> &[CrawledPage] {
        &self.documents
    }

    pub fn failures(&self) -> &[PageFailure] {
        &self.failures
    }

    pub fn skipped(&self) -> &[SkippedPage] {
        &self.skipped
    }

    pub fn external_links(&self) -> impl Iterator<Item = &str> {
        self.external_links.iter().map(String::as_str)
    }

    /// Hand over the documents, consuming the job
    pub fn into_documents(self) -> Vec<CrawledPage> {
        self.documents
    }

    /// Summarize the job for the archive
    pub fn report(&self) -> CrawlReport {
        CrawlReport {
            scrape_id: self.id.clone(),
            seed_url: self.seed.to_string(),
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(Utc::now),
            visited_count: self.visited.len(),
            document_count: self.documents.len(),
            failures: self.failures.clone(),
            skipped: self.skipped.clone(),
            external_links: self.external_links.iter().cloned().collect(),
            chunk_count: None,
        }
    }

    /// Check-and-mark in one step. Returns whether the URL was new.
    fn enqueue(&mut self, url: NormalizedUrl, depth: u32) -> bool {
        if !self.visited.insert(url.clone()) {
            return false;
        }
        self.frontier.push_back(QueuedUrl { url, depth });
        true
    }

    /// Decide whether the loop may keep dequeuing
    fn check_limits(&mut self, config: &CrawlerConfig, started: Instant) {
        if self.state != CrawlState::Running {
            return;
        }
        if self.frontier.is_empty() {
            debug!("Frontier empty");
            self.state = CrawlState::Draining;
        } else if self.fetched >= config.max_pages {
            info!(max_pages = config.max_pages, "Page limit reached");
            self.state = CrawlState::Draining;
        } else if config
            .max_duration
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            info!(max_duration = ?config.max_duration, "Time limit reached");
            self.state = CrawlState::Draining;
        }
    }

    fn next_batch(&mut self, config: &CrawlerConfig) -> Vec<QueuedUrl> {
        let budget = config
            .concurrency
            .max(1)
            .min(config.max_pages.saturating_sub(self.fetched));
        let mut batch = Vec::with_capacity(budget);
        while batch.len() < budget {
            let Some(queued) = self.frontier.pop_front() else {
                break;
            };
            if !self.absorbed.insert(queued.url.clone()) {
                debug!(url = %queued.url, "Already extracted through a redirect");
                continue;
            }
            batch.push(queued);
        }
        self.fetched += batch.len();
        batch
    }

    fn complete(&mut self) {
        self.state = CrawlState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Fold one fetch outcome into the job, returning the event to report
    fn absorb(
        &mut self,
        queued: QueuedUrl,
        result: FetchResult,
        config: &CrawlerConfig,
    ) -> Vec<CrawlEvent> {
        let QueuedUrl { url, depth } = queued;
        match result {
            FetchResult::HtmlPage { html, final_url } => {
                self.absorb_html(url, final_url, depth, &html, config)
            }
            FetchResult::PdfDocument { bytes } => match pdf::extract_text(&bytes) {
                Ok(content) => {
                    let metadata = PageMetadata {
                        title: pdf_title(&url),
                        domain: url.host().unwrap_or_default().to_string(),
                        ..PageMetadata::default()
                    };
                    self.push_document(url, DocumentKind::Pdf, content, metadata, depth)
                }
                Err(e) => self.push_failure(url, FailureReason::Extraction(e.to_string())),
            },
            FetchResult::Unsupported { content_type } => {
                debug!(%url, %content_type, "Skipping unsupported content");
                let event = CrawlEvent::Skipped {
                    url: url.to_string(),
                    content_type: content_type.clone(),
                };
                self.skipped.push(SkippedPage {
                    url: url.to_string(),
                    content_type,
                });
                vec![event]
            }
            FetchResult::Failed { reason } => self.push_failure(url, FailureReason::Fetch(reason)),
        }
    }

    fn absorb_html(
        &mut self,
        url: NormalizedUrl,
        final_url: NormalizedUrl,
        depth: u32,
        html: &str,
        config: &CrawlerConfig,
    ) -> Vec<CrawlEvent> {
        if final_url != url {
            if !is_in_domain(&final_url, &self.seed) {
                warn!(%url, %final_url, "Redirected off-domain, skipping");
                self.external_links.insert(final_url.to_string());
                let content_type = format!("redirect to {}", final_url);
                self.skipped.push(SkippedPage {
                    url: url.to_string(),
                    content_type: content_type.clone(),
                });
                return vec![CrawlEvent::Skipped {
                    url: url.to_string(),
                    content_type,
                }];
            }
            // The redirect target is the same page; never fetch it separately.
            self.visited.insert(final_url.clone());
            if !self.absorbed.insert(final_url.clone()) {
                debug!(%url, %final_url, "Redirect target already extracted");
                let content_type = format!("duplicate of {}", final_url);
                self.skipped.push(SkippedPage {
                    url: url.to_string(),
                    content_type: content_type.clone(),
                });
                return vec![CrawlEvent::Skipped {
                    url: url.to_string(),
                    content_type,
                }];
            }
        }

        let mut events = Vec::new();
        let follow = config.max_depth.is_none_or(|max| depth < max);
        let mut discovered = 0;
        for link in extract_links(html, &final_url) {
            if !is_in_domain(&link, &self.seed) {
                self.external_links.insert(link.to_string());
            } else if follow && self.enqueue(link, depth + 1) {
                discovered += 1;
            }
        }
        if discovered > 0 {
            events.push(CrawlEvent::Discovered {
                count: discovered,
                frontier: self.frontier.len(),
            });
        }

        let content = html_to_text(html, &config.exclude_selectors);
        let metadata = extract_metadata(&final_url, html);
        events.extend(self.push_document(final_url, DocumentKind::Html, content, metadata, depth));
        events
    }

    fn push_document(
        &mut self,
        url: NormalizedUrl,
        kind: DocumentKind,
        content: String,
        metadata: PageMetadata,
        depth: u32,
    ) -> Vec<CrawlEvent> {
        debug!(%url, chars = content.len(), "Extracted document");
        self.documents.push(CrawledPage {
            url: url.to_string(),
            kind,
            content,
            metadata,
            depth,
        });
        vec![CrawlEvent::Document {
            url: url.to_string(),
            kind,
        }]
    }

    fn push_failure(&mut self, url: NormalizedUrl, reason: FailureReason) -> Vec<CrawlEvent> {
        warn!(%url, %reason, "Page failed");
        self.failures.push(PageFailure {
            url: url.to_string(),
            reason: reason.clone(),
        });
        vec![CrawlEvent::Failed {
            url: url.to_string(),
            reason,
        }]
    }
}

/// File name without extension, used as a PDF's title
fn pdf_title(url: &NormalizedUrl) -> Option<String> {
    let name = url.as_url().path_segments()?.next_back()?;
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    (!stem.is_empty()).then(|| stem.replace(['-', '_'], " "))
}

async fn emit(events: &Option<mpsc::Sender<CrawlEvent>>, event: CrawlEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching
        let _ = tx.send(event).await;
    }
}

/// Crawl every in-domain page reachable from `seed`.
///
/// # Arguments
///
/// * `seed` - The URL to start from; defines the domain scope
/// * `scrape_id` - Identifier for the job
/// * `fetcher` - Fetcher (and renderer) to use for every URL
/// * `config` - Limits and extraction settings
/// * `events` - Optional channel for progress events
///
/// # Returns
///
/// The completed job. Fails only when the seed is not a valid http(s) URL.
#[instrument(skip(fetcher, config, events), fields(seed = %seed))]
pub async fn crawl_website<R: Renderer>(
    seed: &str,
    scrape_id: &str,
    fetcher: &Fetcher<R>,
    config: &CrawlerConfig,
    events: Option<mpsc::Sender<CrawlEvent>>,
) -> Result<CrawlJob, CrawlError> {
    let seed = NormalizedUrl::parse(seed)?;
    let started = Instant::now();
    let mut job = CrawlJob::new(scrape_id, seed);
    info!(scrape_id, seed = %job.seed, "Starting crawl");

    loop {
        job.check_limits(config, started);
        if job.state != CrawlState::Running {
            break;
        }

        let batch = job.next_batch(config);
        let results = future::join_all(batch.iter().map(|queued| {
            fetcher
                .fetch(&queued.url)
                .instrument(info_span!("page", url = %queued.url, depth = queued.depth))
        }))
        .await;

        for (queued, result) in batch.into_iter().zip(results) {
            for event in job.absorb(queued, result, config) {
                emit(&events, event).await;
            }
        }
    }

    job.complete();
    info!(
        documents = job.documents.len(),
        failures = job.failures.len(),
        skipped = job.skipped.len(),
        visited = job.visited.len(),
        "Crawl completed"
    );
    emit(
        &events,
        CrawlEvent::Finished {
            documents: job.documents.len(),
            failures: job.failures.len(),
        },
    )
    .await;

    Ok(job)
}
