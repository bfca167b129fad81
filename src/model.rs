//! # LLM Client Module
//!
//! The two model collaborators the pipeline needs, bundled into one client:
//! an embedding model for chunks and queries, and a completion model for
//! answering. Both are rate limited so a large crawl can't exhaust the
//! provider quota.
//!
//! ## Key Components
//!
//! - `Client`: A unified client that wraps both completion and embedding models
//! - `ModelConfig` / `RateLimits`: model names and per-minute quotas
//! - `RateLimitedCompletionModel` / `RateLimitedEmbeddingModel`: governor-backed wrappers
//! - `mock_model`: deterministic offline models for tests

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rig::{completion::CompletionModel, embeddings::EmbeddingModel, providers::gemini};

pub mod mock_model;
pub mod rate_limit;

pub use rate_limit::{RateLimitResponse, RateLimitedCompletionModel, RateLimitedEmbeddingModel};

/// Requests per minute allowed for each model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub completions_per_minute: u32,
    pub embeddings_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            completions_per_minute: 2000,
            embeddings_per_minute: 1000,
        }
    }
}

impl RateLimits {
    /// Quotas for the provider's free tier
    pub fn free_tier() -> Self {
        Self {
            completions_per_minute: 30,
            embeddings_per_minute: 1000,
        }
    }
}

/// Which provider models to use and how hard to drive them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub completion_model: String,
    pub embedding_model: String,
    pub rate_limits: RateLimits,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            completion_model: "gemini-2.0-flash".to_string(),
            embedding_model: gemini::embedding::EMBEDDING_004.to_string(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl ModelConfig {
    pub fn free_tier() -> Self {
        Self {
            completion_model: "gemini-2.0-flash-lite".to_string(),
            rate_limits: RateLimits::free_tier(),
            ..Self::default()
        }
    }
}

fn per_minute(requests: u32) -> DefaultDirectRateLimiter {
    let quota = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(quota))
}

#[derive(Debug, Clone)]
pub struct Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    completion_model: C,
    embedding_model: E,
}

impl
    Client<
        RateLimitedCompletionModel<gemini::completion::CompletionModel>,
        RateLimitedEmbeddingModel<gemini::embedding::EmbeddingModel>,
    >
{
    /// Gemini models behind the configured rate limits
    pub fn new_gemini(gemini_client: gemini::Client, config: &ModelConfig) -> Self {
        let completion_model = RateLimitedCompletionModel::new(
            gemini_client.completion_model(&config.completion_model),
            per_minute(config.rate_limits.completions_per_minute),
        );
        let embedding_model = RateLimitedEmbeddingModel::new(
            gemini_client.embedding_model(&config.embedding_model),
            per_minute(config.rate_limits.embeddings_per_minute),
        );
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn new_gemini_free(gemini_client: gemini::Client) -> Self {
        Self::new_gemini(gemini_client, &ModelConfig::free_tier())
    }
}

impl<C, E> Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    /// Wrap arbitrary models, e.g. the mocks in tests
    pub fn new(completion_model: C, embedding_model: E) -> Self {
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }

    pub fn embedding(&self) -> &E {
        &self.embedding_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config() {
        let standard = ModelConfig::default();
        let free = ModelConfig::free_tier();
        assert_eq!(standard.embedding_model, free.embedding_model);
        assert!(free.rate_limits.completions_per_minute < standard.rate_limits.completions_per_minute);
    }

    #[test]
    fn test_zero_quota_still_admits_requests() {
        let limiter = per_minute(0);
        assert!(limiter.check().is_ok());
    }
}
