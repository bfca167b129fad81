//! Rate-limited wrappers around rig models
//!
//! Each wrapper waits on its governor limiter before delegating, so every
//! call site gets throttling for free.

use std::sync::Arc;

use governor::DefaultDirectRateLimiter;
use rig::{
    completion::{self, CompletionError, CompletionModel, CompletionRequest, CompletionResponse},
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
};
use tracing::{Instrument, debug_span, info_span};

/// Raw provider response, carried through the completion wrapper
pub struct RateLimitResponse<T> {
    #[allow(dead_code)]
    response: T,
}

#[derive(Clone)]
pub struct RateLimitedCompletionModel<M: CompletionModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedCompletionModel<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: CompletionModel> CompletionModel for RateLimitedCompletionModel<M> {
    type Response = RateLimitResponse<M::Response>;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<completion::CompletionResponse<Self::Response>, CompletionError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        let response = self
            .model
            .completion(completion_request)
            .instrument(info_span!("completion"))
            .await?;
        Ok(CompletionResponse {
            choice: response.choice,
            raw_response: RateLimitResponse {
                response: response.raw_response,
            },
        })
    }
}

#[derive(Clone)]
pub struct RateLimitedEmbeddingModel<M: EmbeddingModel> {
    model: M,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<M> RateLimitedEmbeddingModel<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M, limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            model,
            limiter: Arc::new(limiter),
        }
    }
}

impl<M: EmbeddingModel> EmbeddingModel for RateLimitedEmbeddingModel<M> {
    const MAX_DOCUMENTS: usize = M::MAX_DOCUMENTS;

    fn ndims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.limiter.until_ready().instrument(debug_span!("limiter")).await;
        self.model
            .embed_texts(texts)
            .instrument(info_span!("embed_texts"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock_model::{MockCompletionModel, MockEmbeddingModel};
    use governor::{Quota, RateLimiter};
    use rig::completion::AssistantContent;
    use std::num::NonZeroU32;

    fn limiter() -> DefaultDirectRateLimiter {
        RateLimiter::direct(Quota::per_minute(NonZeroU32::MIN))
    }

    #[tokio::test]
    async fn test_embedding_passthrough() {
        let model = RateLimitedEmbeddingModel::new(MockEmbeddingModel::new(), limiter());
        assert_eq!(model.ndims(), MockEmbeddingModel::new().ndims());

        let embeddings = model
            .embed_texts(vec!["widgets".to_string()])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].document, "widgets");
    }

    #[tokio::test]
    async fn test_completion_passthrough() {
        let mock = MockCompletionModel::new();
        mock.set_text_response("limited").await;
        let model = RateLimitedCompletionModel::new(mock, limiter());

        let response = model
            .completion_request("hello")
            .send()
            .await
            .unwrap();
        let text = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<String>();
        assert_eq!(text, "limited");
    }
}
