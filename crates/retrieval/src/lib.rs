//! Bookshelf retrieval for Shelf.
//!
//! Keeps one embedding record per shelf entry in SQLite and retrieves
//! answer context for a user's question: recency lookups for "what did I
//! read last" questions, multi-query vector search with reranking for
//! everything else.

pub mod embeddings;
pub mod indexer;
pub mod rag;
pub mod rules;
pub mod shelf;
pub mod store;
pub mod summary;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use indexer::{EmbeddingIndexer, IndexOutcome, ReindexStats};
pub use rag::{
    Answer, BookAssistant, ContextEntry, ContextRetriever, MultiQuerySearch, RankedCandidate,
    Reranker, RetrievalPlan, RetrievalPlanner, RetrievedContext,
};
pub use rules::QueryRules;
pub use shelf::{EntryUpdate, Shelf, ShelfObserver};
pub use store::{CatalogStore, EmbeddingStore, SqliteStore};
pub use summary::{compose_summary, content_hash};
pub use types::{
    Book, Candidate, EmbeddingRecord, NewBook, ReadingStatus, SearchFilters, ShelfEntry,
    ShelfStats, UserBook, UserId,
};
