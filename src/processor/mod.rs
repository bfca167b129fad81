//! Content processor module for RAG
//!
//! The store builder: turns a crawl's documents into chunks, embeds them and
//! writes the scrape's vector index.
//!
//! The index is built into a temporary file next to its final location and
//! renamed into place once complete, so a failed build never leaves a
//! half-written index behind and a rebuild replaces the old one atomically.

mod chunking;
mod config;
mod error;

pub use chunking::{TextChunk, chunk_text};
pub use config::{ChunkOptions, ProcessorConfig, ProcessorConfigBuilder};
pub use error::ProcessError;

use crate::crawler::CrawledPage;
use crate::index::{IndexHandle, IndexedChunk, ScrapeIndex};
use crate::model::Client;
use futures::future;
use rig::{completion::CompletionModel, embeddings::EmbeddingModel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// A chunk of one document, identified within its scrape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedChunk {
    pub scrape_id: String,

    /// The source URL of the chunk
    pub source_url: String,

    /// Position of the chunk within its document
    pub chunk_index: usize,

    /// Character offset of the chunk within its document
    pub start_offset: usize,

    pub text: String,
}

/// Chunk every non-empty document of a scrape
pub fn chunk_documents(
    scrape_id: &str,
    documents: &[CrawledPage],
    options: &ChunkOptions,
) -> Result<Vec<ExtractedChunk>, ProcessError> {
    let mut chunks = Vec::new();
    for document in documents {
        if document.content.trim().is_empty() {
            debug!(url = %document.url, "Dropping empty document");
            continue;
        }
        for chunk in chunk_text(&document.content, options)? {
            chunks.push(ExtractedChunk {
                scrape_id: scrape_id.to_string(),
                source_url: document.url.clone(),
                chunk_index: chunk.position,
                start_offset: chunk.start_offset,
                text: chunk.text,
            });
        }
    }
    Ok(chunks)
}

/// Embed `texts` in batches, at most `config.concurrency` requests at a time.
/// Vectors come back in input order.
async fn embed_all<E>(
    model: &E,
    texts: &[String],
    config: &ProcessorConfig,
) -> Result<Vec<Vec<f32>>, ProcessError>
where
    E: EmbeddingModel,
{
    let batch_size = config.embedding_batch_size.clamp(1, E::MAX_DOCUMENTS.max(1));
    let semaphore = Semaphore::new(config.concurrency.max(1));
    let semaphore = &semaphore;

    let batches = texts.chunks(batch_size).map(|batch| async move {
        let _permit = semaphore.acquire().await?;
        let embeddings = model.embed_texts(batch.to_vec()).await?;
        if embeddings.len() != batch.len() {
            return Err(ProcessError::EmbeddingGeneration(format!(
                "requested {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }
        Ok::<_, ProcessError>(
            embeddings
                .into_iter()
                .map(|e| e.vec.into_iter().map(|v| v as f32).collect::<Vec<f32>>())
                .collect::<Vec<_>>(),
        )
    });

    let mut vectors = Vec::with_capacity(texts.len());
    for result in future::join_all(batches).await {
        vectors.extend(result?);
    }
    Ok(vectors)
}

fn temporary_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    index_path.with_file_name(name)
}

/// Build the vector index for a scrape
///
/// # Arguments
///
/// * `scrape_id` - The scrape the documents belong to
/// * `documents` - Extracted documents, in crawl order
/// * `client` - Model client whose embedding model is used
/// * `index_path` - Final location of the index file
/// * `config` - The processor configuration
///
/// # Returns
///
/// A handle to the finished index, or `EmptyCrawl` when nothing was indexable
#[instrument(skip(documents, client, index_path, config), fields(documents = documents.len()))]
pub async fn build_index<C, E>(
    scrape_id: &str,
    documents: &[CrawledPage],
    client: &Client<C, E>,
    index_path: &Path,
    config: &ProcessorConfig,
) -> Result<IndexHandle, ProcessError>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    let chunks = chunk_documents(scrape_id, documents, &config.chunk_options)?;
    if chunks.is_empty() {
        warn!(scrape_id, "No indexable content");
        return Err(ProcessError::EmptyCrawl {
            scrape_id: scrape_id.to_string(),
        });
    }
    info!(chunks = chunks.len(), "Created chunks");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_all(client.embedding(), &texts, config).await?;
    let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
    if dimensions == 0 {
        return Err(ProcessError::EmbeddingGeneration(
            "embedding model returned empty vectors".to_string(),
        ));
    }

    if let Some(parent) = index_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = temporary_path(index_path);
    let index = ScrapeIndex::create(&tmp_path, scrape_id, dimensions).await?;

    let records: Vec<IndexedChunk> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, embedding)| IndexedChunk {
            source_url: chunk.source_url,
            chunk_index: chunk.chunk_index,
            start_offset: chunk.start_offset,
            text: chunk.text,
            embedding,
        })
        .collect();
    for batch in records.chunks(256) {
        if let Err(e) = index.upsert_batch(batch).await {
            drop(index);
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
    }
    let chunk_count = index.chunk_count().await?;
    drop(index);

    tokio::fs::rename(&tmp_path, index_path).await?;
    info!(chunk_count, dimensions, path = %index_path.display(), "Index built");

    Ok(IndexHandle {
        scrape_id: scrape_id.to_string(),
        path: index_path.to_path_buf(),
        chunk_count,
        dimensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{DocumentKind, PageMetadata};
    use crate::model::mock_model::{MockCompletionModel, MockEmbeddingModel};
    use tempfile::tempdir;

    fn document(url: &str, content: &str) -> CrawledPage {
        CrawledPage {
            url: url.to_string(),
            kind: DocumentKind::Html,
            content: content.to_string(),
            metadata: PageMetadata::default(),
            depth: 0,
        }
    }

    fn client(embedding: MockEmbeddingModel) -> Client<MockCompletionModel, MockEmbeddingModel> {
        Client::new(MockCompletionModel::new(), embedding)
    }

    #[test]
    fn test_chunk_documents_drops_empty() {
        let documents = vec![
            document("https://example.com/", "Welcome to the site."),
            document("https://example.com/blank", "  \n "),
            document("https://example.com/about", &"About us. ".repeat(150)),
        ];
        let chunks = chunk_documents("s", &documents, &ChunkOptions::default()).unwrap();

        assert!(chunks.iter().all(|c| c.source_url != "https://example.com/blank"));
        assert_eq!(chunks[0].source_url, "https://example.com/");
        assert_eq!(chunks[0].chunk_index, 0);
        let about: Vec<_> = chunks
            .iter()
            .filter(|c| c.source_url.ends_with("/about"))
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(about, (0..about.len()).collect::<Vec<_>>());
        assert!(about.len() >= 2);
        assert!(chunks.iter().all(|c| c.scrape_id == "s"));
    }

    #[test]
    fn test_temporary_path() {
        assert_eq!(
            temporary_path(Path::new("/data/abc/index.db")),
            Path::new("/data/abc/index.db.tmp")
        );
    }

    #[tokio::test]
    async fn test_build_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scrape").join("index.db");
        let documents = vec![
            document("https://example.com/", "Widgets are great. Buy widgets today."),
            document("https://example.com/pricing", "Our pricing plans start at ten dollars."),
        ];
        let embedding = MockEmbeddingModel::new();
        let config = ProcessorConfig::builder().embedding_batch_size(1).build();

        let handle = build_index("scrape", &documents, &client(embedding.clone()), &path, &config)
            .await
            .unwrap();

        assert_eq!(handle.chunk_count, 2);
        assert_eq!(handle.dimensions, MockEmbeddingModel::DEFAULT_DIMS);
        assert_eq!(handle.path, path);
        assert_eq!(embedding.calls(), 2);
        assert!(path.exists());
        assert!(!temporary_path(&path).exists());

        let index = ScrapeIndex::open(&path).await.unwrap();
        assert_eq!(index.scrape_id(), "scrape");
        assert_eq!(index.chunk_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");
        let config = ProcessorConfig::default();
        let client = client(MockEmbeddingModel::new());

        build_index(
            "s",
            &[document("https://example.com/a", "first"), document("https://example.com/b", "second")],
            &client,
            &path,
            &config,
        )
        .await
        .unwrap();
        let handle = build_index("s", &[document("https://example.com/c", "third")], &client, &path, &config)
            .await
            .unwrap();

        assert_eq!(handle.chunk_count, 1);
        let index = ScrapeIndex::open(&path).await.unwrap();
        let results = index
            .query(&vec![1.0; MockEmbeddingModel::DEFAULT_DIMS], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_url, "https://example.com/c");
    }

    #[tokio::test]
    async fn test_empty_crawl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");
        let result = build_index(
            "empty",
            &[document("https://example.com/", "   ")],
            &client(MockEmbeddingModel::new()),
            &path,
            &ProcessorConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(ProcessError::EmptyCrawl { ref scrape_id }) if scrape_id == "empty"));
        assert!(!path.exists());

        let err: crate::Error = ProcessError::EmptyCrawl {
            scrape_id: "empty".to_string(),
        }
        .into();
        assert!(matches!(err, crate::Error::EmptyCrawl { .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_no_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");
        let result = build_index(
            "s",
            &[document("https://example.com/", "some text")],
            &client(MockEmbeddingModel::failing()),
            &path,
            &ProcessorConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(ProcessError::Embedding(_))));
        assert!(!path.exists());
    }
}
