//! # Database Error Types Module
//!
//! Errors raised by the per-scrape vector index.

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// No index file exists at the expected location
    #[error("Index not found: {0}")]
    NotFound(String),

    /// SQL query error
    #[error("SQL query error: {0}")]
    Query(String),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Data error
    #[error("Data error: {0}")]
    Data(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl From<DbError> for CrateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(location) => CrateError::IndexNotFound(location),
            other => CrateError::Database(other.to_string()),
        }
    }
}
