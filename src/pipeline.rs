//! # Pipeline
//!
//! The entry points the CLI drives. A `Pipeline` owns the model client, the
//! stage configurations and the page archive, and wires the stages together:
//!
//! - `start_crawl`: crawl a seed, archive its pages and report, build its index
//! - `rebuild_index`: rebuild an existing scrape's index from its archived pages
//! - `retrieve` / `answer`: query one scrape's index
//! - `list_scrapes`: what is in the archive
//!
//! Every scrape is addressed by the id `start_crawl` hands back.

use rig::{completion::CompletionModel, embeddings::EmbeddingModel};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::crawler::storage::{ScrapeListing, Storage, StorageConfig};
use crate::crawler::{
    ConfiguredRenderer, CrawlEvent, CrawledPage, CrawlerConfig, Fetcher, Renderer, crawl_website,
};
use crate::error::{Error, Result};
use crate::index::{DbError, IndexHandle, ScrapeIndex};
use crate::model::Client;
use crate::processor::{ProcessorConfig, build_index};
use crate::search::{
    SearchResult, SuggestedAction, generate_answer_with_rag, prepare_rag_context, retrieve,
    suggest_actions,
};

/// Configuration for every stage of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub crawler: CrawlerConfig,
    pub processor: ProcessorConfig,
    pub storage: StorageConfig,

    /// Sampling temperature for answers
    pub answer_temperature: f64,

    /// Number of chunks retrieved as context for an answer
    pub retrieval_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            processor: ProcessorConfig::default(),
            storage: StorageConfig::default(),
            answer_temperature: 0.7,
            retrieval_limit: 4,
        }
    }
}

/// What a finished `start_crawl` produced
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeSummary {
    pub scrape_id: String,
    pub document_count: usize,
    pub failure_count: usize,
    pub chunk_count: usize,
}

/// An answer with the material it was drawn from
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub actions: Vec<SuggestedAction>,

    /// Distinct source URLs of the context chunks, best match first
    pub sources: Vec<String>,
}

/// The crawl, index and query pipeline
pub struct Pipeline<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    client: Client<C, E>,
    config: PipelineConfig,
    storage: Storage,
}

impl<C, E> Pipeline<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(client: Client<C, E>, config: PipelineConfig) -> Self {
        let storage = Storage::with_config(config.storage.clone());
        Self {
            client,
            config,
            storage,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// A fetcher using this pipeline's crawler settings
    pub fn fetcher<R: Renderer>(&self, renderer: R) -> Result<Fetcher<R>> {
        Ok(Fetcher::new(&self.config.crawler, renderer)?)
    }

    /// A fetcher rendering through Chrome or plain HTTP, as `render_js` says
    pub fn configured_fetcher(&self) -> Result<Fetcher<ConfiguredRenderer>> {
        let renderer = ConfiguredRenderer::from_config(&self.config.crawler)?;
        self.fetcher(renderer)
    }

    /// Crawl `seed`, archive what was found and build the scrape's index.
    ///
    /// The pages and crawl report are saved before indexing, so a crawl that
    /// turns up nothing indexable still leaves its report behind when
    /// `Error::EmptyCrawl` is returned.
    #[instrument(skip(self, fetcher, events))]
    pub async fn start_crawl<R: Renderer>(
        &self,
        fetcher: &Fetcher<R>,
        seed: &str,
        events: Option<mpsc::Sender<CrawlEvent>>,
    ) -> Result<ScrapeSummary> {
        let scrape_id = uuid::Uuid::new_v4().to_string();
        let job = crawl_website(seed, &scrape_id, fetcher, &self.config.crawler, events).await?;

        let mut report = job.report();
        let documents = job.into_documents();
        self.storage.store_pages(&scrape_id, &documents).await?;
        self.storage.store_report(&report).await?;

        let handle = match self.index_documents(&scrape_id, &documents).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(scrape_id, error = %e, "Index build failed");
                return Err(e);
            }
        };

        report.chunk_count = Some(handle.chunk_count);
        self.storage.store_report(&report).await?;
        info!(scrape_id, chunks = handle.chunk_count, "Scrape ready");

        Ok(ScrapeSummary {
            scrape_id,
            document_count: report.document_count,
            failure_count: report.failure_count(),
            chunk_count: handle.chunk_count,
        })
    }

    /// Rebuild a scrape's index from its archived pages, replacing the old one
    #[instrument(skip(self))]
    pub async fn rebuild_index(&self, scrape_id: &str) -> Result<IndexHandle> {
        let documents = self.storage.load_pages(scrape_id).await?;
        info!(documents = documents.len(), "Loaded archived pages");
        let handle = self.index_documents(scrape_id, &documents).await?;

        match self.storage.load_report(scrape_id).await {
            Ok(mut report) => {
                report.chunk_count = Some(handle.chunk_count);
                self.storage.store_report(&report).await?;
            }
            Err(e) => warn!(scrape_id, error = %e, "No crawl report to update"),
        }
        Ok(handle)
    }

    async fn index_documents(
        &self,
        scrape_id: &str,
        documents: &[CrawledPage],
    ) -> Result<IndexHandle> {
        let index_path = self.storage.index_path(scrape_id)?;
        let handle = build_index(
            scrape_id,
            documents,
            &self.client,
            &index_path,
            &self.config.processor,
        )
        .await?;
        Ok(handle)
    }

    async fn open_index(&self, scrape_id: &str) -> Result<ScrapeIndex> {
        let path = self.storage.index_path(scrape_id)?;
        ScrapeIndex::open(&path).await.map_err(|e| match e {
            DbError::NotFound(_) => Error::IndexNotFound(scrape_id.to_string()),
            other => other.into(),
        })
    }

    /// The `k` chunks of a scrape most similar to `query`
    #[instrument(skip(self))]
    pub async fn retrieve(&self, scrape_id: &str, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let index = self.open_index(scrape_id).await?;
        Ok(retrieve(&self.client, &index, query, k).await?)
    }

    /// Answer a question from a scrape's content
    #[instrument(skip(self))]
    pub async fn answer(&self, scrape_id: &str, question: &str) -> Result<Answer> {
        let results = self
            .retrieve(scrape_id, question, self.config.retrieval_limit)
            .await?;
        let context = prepare_rag_context(&results);
        let answer = generate_answer_with_rag(
            self.client.completion(),
            question,
            &context,
            self.config.answer_temperature,
        )
        .await?;

        let mut sources: Vec<String> = Vec::new();
        for result in &results {
            if !sources.contains(&result.source_url) {
                sources.push(result.source_url.clone());
            }
        }

        Ok(Answer {
            actions: suggest_actions(question, &answer),
            answer,
            sources,
        })
    }

    /// Every scrape in the archive, sorted by id
    pub async fn list_scrapes(&self) -> Result<Vec<ScrapeListing>> {
        Ok(self.storage.list_scrapes().await?)
    }
}
