//! Embedding providers.
//!
//! Turn shelf summaries and search queries into fixed-length vectors.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
