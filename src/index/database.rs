//! Database operations for the index module

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Row, params};
use tracing::{debug, instrument};

use crate::index::error::DbError;
use crate::index::schema;
use crate::index::{IndexedChunk, ScoredChunk};

const META_SCRAPE_ID: &str = "scrape_id";
const META_DIMENSIONS: &str = "dimensions";
const META_CREATED_AT: &str = "created_at";

/// Little-endian f32 bytes, the layout of an `F32_BLOB` column
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// The vector index of one scrape, backed by a single libsql file
pub struct ScrapeIndex {
    conn: Connection,
    // Keeps the database alive for as long as the connection is used
    _db: libsql::Database,
    scrape_id: String,
    dimensions: usize,
}

async fn connect(path: &Path) -> Result<(libsql::Database, Connection), DbError> {
    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;
    let conn = db
        .connect()
        .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;
    Ok((db, conn))
}

impl ScrapeIndex {
    /// Create an empty index at `path`, replacing any file already there
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn create(path: &Path, scrape_id: &str, dimensions: usize) -> Result<Self, DbError> {
        if dimensions == 0 {
            return Err(DbError::Data("embedding dimensions must be positive".to_string()));
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Replaced existing index file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DbError::Connection(format!("Failed to clear {}: {}", path.display(), e))),
        }

        let (db, conn) = connect(path).await?;
        schema::initialize_schema(&conn, dimensions).await?;

        for (key, value) in [
            (META_SCRAPE_ID, scrape_id.to_string()),
            (META_DIMENSIONS, dimensions.to_string()),
            (META_CREATED_AT, Utc::now().to_rfc3339()),
        ] {
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to write index metadata: {}", e)))?;
        }

        Ok(Self {
            _db: db,
            conn,
            scrape_id: scrape_id.to_string(),
            dimensions,
        })
    }

    /// Open an index that was built earlier
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(DbError::NotFound(path.display().to_string()));
        }

        let (db, conn) = connect(path).await?;
        let scrape_id = read_meta(&conn, META_SCRAPE_ID).await?;
        let dimensions = read_meta(&conn, META_DIMENSIONS)
            .await?
            .parse::<usize>()
            .map_err(|e| DbError::Data(format!("Invalid dimensions in index metadata: {}", e)))?;

        Ok(Self {
            _db: db,
            conn,
            scrape_id,
            dimensions,
        })
    }

    pub fn scrape_id(&self) -> &str {
        &self.scrape_id
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), DbError> {
        if vector.len() != self.dimensions {
            return Err(DbError::Data(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }

    /// Insert chunks, replacing any with the same `(source_url, chunk_index)`
    pub async fn upsert_batch(&self, chunks: &[IndexedChunk]) -> Result<usize, DbError> {
        for chunk in chunks {
            self.check_dimensions(&chunk.embedding)?;
        }

        // Start a transaction
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to start transaction: {}", e)))?;

        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (scrape_id, source_url, chunk_index, start_offset, text, embedding)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(source_url, chunk_index) DO UPDATE SET
                 scrape_id = excluded.scrape_id,
                 start_offset = excluded.start_offset,
                 text = excluded.text,
                 embedding = excluded.embedding",
                params![
                    self.scrape_id.clone(),
                    chunk.source_url.clone(),
                    chunk.chunk_index as i64,
                    chunk.start_offset as i64,
                    chunk.text.clone(),
                    libsql::Value::Blob(vector_to_blob(&chunk.embedding)),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to upsert chunk: {}", e)))?;
        }

        // Commit the transaction
        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(format!("Failed to commit transaction: {}", e)))?;

        debug!(chunks = chunks.len(), "Upserted chunks");
        Ok(chunks.len())
    }

    /// The `k` chunks closest to `vector` by cosine distance, best first
    #[instrument(skip(self, vector), fields(scrape_id = %self.scrape_id))]
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, DbError> {
        self.check_dimensions(vector)?;

        let mut rows = self
            .conn
            .query(
                "SELECT source_url, chunk_index, start_offset, text,
                        vector_distance_cos(embedding, ?) AS distance
                 FROM chunks
                 ORDER BY distance ASC, id ASC
                 LIMIT ?",
                params![libsql::Value::Blob(vector_to_blob(vector)), k as i64],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to query chunks: {}", e)))?;

        let mut results = Vec::new();
        // In libsql 0.6.0, next() is async and returns Result<Option<Row>>
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to read row: {}", e)))?
        {
            results.push(row_to_scored(&row)?);
        }
        Ok(results)
    }

    pub async fn chunk_count(&self) -> Result<usize, DbError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM chunks", params![])
            .await
            .map_err(|e| DbError::Query(format!("Failed to count chunks: {}", e)))?;
        let row = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to count chunks: {}", e)))?
            .ok_or_else(|| DbError::Data("COUNT returned no rows".to_string()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get count: {}", e)))?;
        Ok(count as usize)
    }
}

async fn read_meta(conn: &Connection, key: &str) -> Result<String, DbError> {
    let mut rows = conn
        .query("SELECT value FROM index_meta WHERE key = ?", params![key])
        .await
        .map_err(|e| DbError::Query(format!("Failed to read index metadata: {}", e)))?;
    match rows.next().await {
        Ok(Some(row)) => row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get {}: {}", key, e))),
        Ok(None) => Err(DbError::Data(format!("Index metadata is missing {}", key))),
        Err(e) => Err(DbError::Data(format!("Failed to read index metadata: {}", e))),
    }
}

fn row_to_scored(row: &Row) -> Result<ScoredChunk, DbError> {
    let chunk_index: i64 = row
        .get(1)
        .map_err(|e| DbError::Data(format!("Failed to get chunk_index: {}", e)))?;
    let start_offset: i64 = row
        .get(2)
        .map_err(|e| DbError::Data(format!("Failed to get start_offset: {}", e)))?;
    let distance: f64 = row
        .get(4)
        .map_err(|e| DbError::Data(format!("Failed to get distance: {}", e)))?;

    Ok(ScoredChunk {
        source_url: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get source_url: {}", e)))?,
        chunk_index: chunk_index as usize,
        start_offset: start_offset as usize,
        text: row
            .get(3)
            .map_err(|e| DbError::Data(format!("Failed to get text: {}", e)))?,
        score: (1.0 - distance) as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn chunk(url: &str, index: usize, text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            source_url: url.to_string(),
            chunk_index: index,
            start_offset: index * 10,
            text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_blob_conversion() {
        let vector = vec![1.0, -2.5, 3.25];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[4..8], (-2.5f32).to_le_bytes().as_slice());
    }

    #[tokio::test]
    async fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");

        let index = ScrapeIndex::create(&path, "scrape-1", 3).await.unwrap();
        index
            .upsert_batch(&[chunk("https://example.com/", 0, "hello", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        drop(index);

        let reopened = ScrapeIndex::open(&path).await.unwrap();
        assert_eq!(reopened.scrape_id(), "scrape-1");
        assert_eq!(reopened.dimensions(), 3);
        assert_eq!(reopened.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_missing() {
        let dir = tempdir().unwrap();
        let result = ScrapeIndex::open(&dir.path().join("nothing.db")).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_ranks_by_cosine() {
        let dir = tempdir().unwrap();
        let index = ScrapeIndex::create(&dir.path().join("index.db"), "s", 3)
            .await
            .unwrap();
        index
            .upsert_batch(&[
                chunk("https://example.com/a", 0, "east", vec![1.0, 0.0, 0.0]),
                chunk("https://example.com/b", 0, "north", vec![0.0, 1.0, 0.0]),
                chunk("https://example.com/c", 0, "north-east", vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        let results = index.query(&[0.0, 1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "north");
        assert_eq!(results[1].text, "north-east");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!(results[0].score >= results[1].score);

        let all = index.query(&[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].source_url, "https://example.com/a");
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_chunk() {
        let dir = tempdir().unwrap();
        let index = ScrapeIndex::create(&dir.path().join("index.db"), "s", 2)
            .await
            .unwrap();
        index
            .upsert_batch(&[chunk("https://example.com/", 0, "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert_batch(&[
                chunk("https://example.com/", 0, "new", vec![0.0, 1.0]),
                chunk("https://example.com/", 1, "second", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.chunk_count().await.unwrap(), 2);
        let results = index.query(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].text, "new");
        assert!(results[0].score > 0.99);

        let texts: Vec<String> = index
            .query(&[1.0, 0.0], 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert!(!texts.contains(&"old".to_string()));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let index = ScrapeIndex::create(&dir.path().join("index.db"), "s", 2)
            .await
            .unwrap();

        let err = index
            .upsert_batch(&[chunk("https://example.com/", 0, "bad", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Data(_)));
        assert!(matches!(index.query(&[1.0], 1).await, Err(DbError::Data(_))));
        assert!(ScrapeIndex::create(&dir.path().join("zero.db"), "s", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_create_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");

        let first = ScrapeIndex::create(&path, "first", 2).await.unwrap();
        first
            .upsert_batch(&[chunk("https://example.com/", 0, "x", vec![1.0, 0.0])])
            .await
            .unwrap();
        drop(first);

        let second = ScrapeIndex::create(&path, "second", 4).await.unwrap();
        assert_eq!(second.chunk_count().await.unwrap(), 0);
        assert_eq!(second.dimensions(), 4);
    }
}
