//! Error types for the processor module

use crate::error::Error as CrateError;
use crate::index::DbError;
use rig::embeddings::EmbeddingError;
use thiserror::Error;

/// Error type for processor operations
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Every document was empty, so there is nothing to index
    #[error("Crawl {scrape_id} produced no indexable chunks")]
    EmptyCrawl { scrape_id: String },

    /// Embedding model error
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Embedding generation error
    #[error("Embedding generation error: {0}")]
    EmbeddingGeneration(String),

    /// Chunking error
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Error during semaphore acquisition
    #[error("Semaphore acquisition error: {0}")]
    Semaphore(String),

    /// Vector index error
    #[error("Index error: {0}")]
    Database(#[from] DbError),

    /// Filesystem error while swapping the index into place
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for CrateError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::EmptyCrawl { scrape_id } => CrateError::EmptyCrawl { scrape_id },
            ProcessError::Database(e) => e.into(),
            ProcessError::Io(e) => CrateError::Io(e),
            _ => CrateError::Process(err.to_string()),
        }
    }
}

impl From<tokio::sync::AcquireError> for ProcessError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        Self::Semaphore(format!("Failed to acquire semaphore: {}", err))
    }
}
