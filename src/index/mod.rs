//! Index manager module for RAG
//!
//! Each scrape gets its own vector index file. The index is the only thing
//! that outlives a crawl job: chunks are written once by the store builder
//! and read back by retrieval, always addressed by scrape id.

mod database;
pub mod error;
mod schema;

pub use database::{ScrapeIndex, vector_to_blob};
pub use error::DbError;

use serde::Serialize;
use std::path::PathBuf;

/// A chunk ready to be written, with its embedding
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// URL of the page the chunk came from
    pub source_url: String,

    /// Position of the chunk within its document
    pub chunk_index: usize,

    /// Character offset of the chunk within its document
    pub start_offset: usize,

    /// Text of the chunk
    pub text: String,

    /// Embedding of the chunk
    pub embedding: Vec<f32>,
}

/// A chunk returned by a similarity query
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub source_url: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub text: String,

    /// Cosine similarity to the query, 1.0 being identical
    pub score: f32,
}

/// Where a finished index lives and what is in it
#[derive(Debug, Clone, Serialize)]
pub struct IndexHandle {
    pub scrape_id: String,
    pub path: PathBuf,
    pub chunk_count: usize,
    pub dimensions: usize,
}
