//! # siteqa - Website Question Answering with RAG for Rust
//!
//! This crate crawls a single website into a per-scrape vector index and
//! answers questions over it with a large language model. Each crawl is
//! addressed by a scrape id; its archived pages, crawl report and index live
//! together on disk.
//!
//! ## Features
//!
//! - Breadth-first, domain-scoped crawling with cycle avoidance
//! - Headless Chrome rendering for script-built pages
//! - Text extraction from HTML and linked PDF documents
//! - Overlapping text chunking and rate-limited embedding
//! - Vector indexing with LibSQL
//! - Retrieval-augmented answers with suggested follow-up actions
//!
//! ## Example
//!
//! ```rust,no_run
//! use rig::providers::gemini;
//! use siteqa::crawler::Renderer;
//! use siteqa::model::{Client, ModelConfig};
//! use siteqa::pipeline::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gemini_client = gemini::Client::new("your-api-key");
//!     let client = Client::new_gemini(gemini_client, &ModelConfig::default());
//!     let pipeline = Pipeline::new(client, PipelineConfig::default());
//!
//!     let fetcher = pipeline.configured_fetcher()?;
//!     let summary = pipeline.start_crawl(&fetcher, "https://example.com", None).await?;
//!     fetcher.renderer().shutdown().await;
//!
//!     let answer = pipeline
//!         .answer(&summary.scrape_id, "What does this company sell?")
//!         .await?;
//!     println!("{}", answer.answer);
//!     Ok(())
//! }
//! ```

mod error;
pub mod model;

// RAG feature modules
pub mod crawler;
pub mod index;
pub mod pipeline;
pub mod processor;
pub mod search;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::crawler::{CrawlEvent, CrawlerConfig, CrawledPage};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::pipeline::{Answer, Pipeline, PipelineConfig, ScrapeSummary};
}
