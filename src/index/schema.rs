//! # Database Schema Module
//!
//! One database file per scrape, with two tables:
//!
//! 1. `index_meta` - key/value facts about the index (scrape id, dimensions)
//! 2. `chunks` - chunk text and its embedding, unique per `(source_url, chunk_index)`
//!
//! The embedding column is a fixed-width `F32_BLOB`, so the dimension count
//! is fixed when the index is created.

use crate::index::error::DbError;
use libsql::{Connection, params};
use tracing::warn;

/// Initialize the database schema for embeddings of `dimensions` floats
pub async fn initialize_schema(conn: &Connection, dimensions: usize) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index_meta table: {}", e)))?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scrape_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding F32_BLOB({}) NOT NULL,
                UNIQUE (source_url, chunk_index)
            )",
            dimensions
        ),
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create chunks table: {}", e)))?;

    // Create index on source_url for faster lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chunks_source_url ON chunks(source_url)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on chunks: {}", e)))?;

    // Retrieval scans with vector_distance_cos, so the ANN index is optional
    if let Err(e) = conn
        .execute(
            "CREATE INDEX IF NOT EXISTS chunks_vector_idx ON chunks (libsql_vector_idx(embedding, 'metric=cosine'))",
            params![],
        )
        .await
    {
        warn!(error = %e, "Failed to create vector index");
    }

    Ok(())
}
