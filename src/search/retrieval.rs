//! Retrieval and answer generation

use rig::completion::{AssistantContent, CompletionModel};
use rig::embeddings::EmbeddingModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::error::SearchError;
use crate::index::ScrapeIndex;
use crate::model::Client;

/// System prompt for answering from retrieved context
pub const ANSWER_PREAMBLE: &str = "You are an AI assistant tasked with answering questions based ONLY on the provided context. \
If the answer is not explicitly available in the context, state that you don't have enough information. \
Do not make up information.";

/// A retrieved chunk, most similar first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// URL of the source page
    pub source_url: String,

    /// Position of the chunk within its page
    pub chunk_index: usize,

    /// Text content of the chunk
    pub text: String,

    /// Cosine similarity to the query
    pub score: f32,
}

/// Embed `query` and return the `k` most similar chunks of the index
#[instrument(skip(client, index), fields(scrape_id = index.scrape_id()))]
pub async fn retrieve<C, E>(
    client: &Client<C, E>,
    index: &ScrapeIndex,
    query: &str,
    k: usize,
) -> Result<Vec<SearchResult>, SearchError>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    if k == 0 {
        return Err(SearchError::InvalidParameters(
            "k must be at least 1".to_string(),
        ));
    }
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::InvalidParameters(
            "query text is empty".to_string(),
        ));
    }

    let embedding = client
        .embedding()
        .embed_texts(vec![query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::Embedding("no embedding returned for query".to_string()))?;
    let vector: Vec<f32> = embedding.vec.iter().map(|v| *v as f32).collect();

    let results: Vec<SearchResult> = index
        .query(&vector, k)
        .await?
        .into_iter()
        .map(|chunk| SearchResult {
            source_url: chunk.source_url,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            score: chunk.score,
        })
        .collect();
    debug!(results = results.len(), "Retrieved chunks");
    Ok(results)
}

/// Join retrieved chunks into one context block
pub fn prepare_rag_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the chat model to answer `query` from `context` alone
#[instrument(skip(model, context), fields(context_chars = context.len()))]
pub async fn generate_answer_with_rag<M>(
    model: &M,
    query: &str,
    context: &str,
    temperature: f64,
) -> Result<String, SearchError>
where
    M: CompletionModel,
{
    let prompt = format!("Context: {}\n\nQuestion: {}", context, query);
    let response = model
        .completion_request(prompt.as_str())
        .preamble(ANSWER_PREAMBLE.to_string())
        .temperature(temperature)
        .send()
        .await?;

    let answer = response
        .choice
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text(text) => Some(text.text.clone()),
            other => {
                warn!(content = ?other, "Ignoring non-text response content");
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(answer.trim().to_string())
}
