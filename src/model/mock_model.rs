//! # Mock Models for Testing
//!
//! Offline stand-ins for the completion and embedding collaborators.
//!
//! `MockCompletionModel` returns a canned response and remembers the preamble
//! and temperature it was last called with. `MockEmbeddingModel` hashes words
//! into a small bag-of-words vector, so texts sharing vocabulary land close
//! together and retrieval can be tested without a real model.

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
    one_or_many::OneOrMany,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// What the last completion request asked for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedRequest {
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
}

/// A mock completion model for testing purposes.
/// It returns a predefined response when `completion` is called.
#[derive(Debug, Clone)]
pub struct MockCompletionModel {
    response: Arc<Mutex<Option<OneOrMany<AssistantContent>>>>,
    last_request: Arc<Mutex<Option<RecordedRequest>>>,
}

impl MockCompletionModel {
    /// Creates a new mock model that will return a default empty success response.
    pub fn new() -> Self {
        Self {
            response: Arc::new(Mutex::new(None)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the response that the mock model should return.
    pub async fn set_response(&self, response: OneOrMany<AssistantContent>) {
        let mut guard = self.response.lock().await;
        *guard = Some(response);
    }

    /// Helper to create a simple text response.
    pub async fn set_text_response(&self, text: &str) {
        let response = OneOrMany::one(AssistantContent::text(text));
        self.set_response(response).await;
    }

    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.last_request.lock().await.clone()
    }
}

impl Default for MockCompletionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        *self.last_request.lock().await = Some(RecordedRequest {
            preamble: completion_request.preamble.clone(),
            temperature: completion_request.temperature,
        });

        let response = {
            let guard = self.response.lock().await;
            guard.clone()
        };
        Ok(CompletionResponse {
            choice: response.unwrap_or_else(|| OneOrMany::one(AssistantContent::text(""))),
            raw_response: "".to_string(),
        })
    }
}

/// Deterministic hashed bag-of-words embeddings
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    ndims: usize,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingModel {
    pub const DEFAULT_DIMS: usize = 64;

    pub fn new() -> Self {
        Self::with_ndims(Self::DEFAULT_DIMS)
    }

    pub fn with_ndims(ndims: usize) -> Self {
        Self {
            ndims: ndims.max(1),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A model whose every request fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Number of `embed_texts` requests served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Embed a single text
    pub fn vector(&self, text: &str) -> Vec<f64> {
        let mut vec = vec![0.0; self.ndims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.ndims as u64) as usize;
            vec[bucket] += 1.0;
        }

        let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            // Cosine distance is undefined for the zero vector
            vec[0] = 1.0;
        } else {
            vec.iter_mut().for_each(|v| *v /= norm);
        }
        vec
    }
}

impl Default for MockEmbeddingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbeddingModel {
    const MAX_DOCUMENTS: usize = 64;

    fn ndims(&self) -> usize {
        self.ndims
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::ProviderError(
                "mock embedding failure".to_string(),
            ));
        }
        Ok(texts
            .into_iter()
            .map(|document| Embedding {
                vec: self.vector(&document),
                document,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_vectors_are_deterministic_and_normalized() {
        let model = MockEmbeddingModel::new();
        let a = model.vector("Widgets are great");
        assert_eq!(a, model.vector("widgets ARE great!"));
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(model.vector("").len(), MockEmbeddingModel::DEFAULT_DIMS);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let model = MockEmbeddingModel::new();
        let query = model.vector("pricing plans");
        let near = model.vector("our pricing plans start at ten dollars");
        let far = model.vector("the history of the company founders");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[tokio::test]
    async fn test_embed_texts() {
        let model = MockEmbeddingModel::with_ndims(8);
        let embeddings = model
            .embed_texts(vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[1].document, "two");
        assert_eq!(embeddings[0].vec.len(), 8);
        assert_eq!(model.calls(), 1);

        assert!(MockEmbeddingModel::failing()
            .embed_texts(vec!["x".to_string()])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_completion_records_request() {
        let model = MockCompletionModel::new();
        model.set_text_response("hi").await;
        model
            .completion_request("question")
            .preamble("be brief".to_string())
            .temperature(0.3)
            .send()
            .await
            .unwrap();

        let recorded = model.last_request().await.unwrap();
        assert_eq!(recorded.preamble.as_deref(), Some("be brief"));
        assert_eq!(recorded.temperature, Some(0.3));
    }
}
