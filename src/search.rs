//! # Semantic Search Module for RAG
//!
//! The retrieval half of the pipeline. A query is embedded with the same
//! embedding model that built the index, the scrape's index returns its
//! nearest chunks, and those chunks become the context the chat model answers
//! from.
//!
//! ## Search Process
//!
//! 1. Convert the user query to an embedding vector
//! 2. Rank the scrape's chunks by cosine similarity
//! 3. Join the top chunks into a context block
//! 4. Ask the chat model to answer from that context alone
//! 5. Offer follow-up actions matched from the question and answer

mod actions;
mod error;
mod retrieval;

pub use actions::{SuggestedAction, suggest_actions};
pub use error::SearchError;
pub use retrieval::{
    ANSWER_PREAMBLE, SearchResult, generate_answer_with_rag, prepare_rag_context, retrieve,
};
