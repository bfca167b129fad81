//! # Search Error Types Module
//!
//! Errors raised while retrieving chunks or generating an answer.

use thiserror::Error;

use crate::error::Error as CrateError;
use crate::index::DbError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// The scrape has no built index
    #[error("No index found for scrape {0}")]
    IndexNotFound(String),

    /// Error occurred during database operations
    #[error("Database error: {0}")]
    Database(DbError),

    /// Error occurred during embedding generation
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The chat model failed to answer
    #[error("Completion error: {0}")]
    Completion(String),

    /// Invalid search parameters
    #[error("Invalid search parameters: {0}")]
    InvalidParameters(String),
}

impl From<DbError> for SearchError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(location) => SearchError::IndexNotFound(location),
            other => SearchError::Database(other),
        }
    }
}

impl From<rig::embeddings::EmbeddingError> for SearchError {
    fn from(err: rig::embeddings::EmbeddingError) -> Self {
        SearchError::Embedding(err.to_string())
    }
}

impl From<rig::completion::CompletionError> for SearchError {
    fn from(err: rig::completion::CompletionError) -> Self {
        SearchError::Completion(err.to_string())
    }
}

impl From<SearchError> for CrateError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::IndexNotFound(scrape_id) => CrateError::IndexNotFound(scrape_id),
            SearchError::Database(e) => e.into(),
            other => CrateError::Search(other.to_string()),
        }
    }
}
