//! Retrieval-augmented answering.
//!
//! - `planner`: recency short-circuit or semantic search
//! - `search`: question rewriting and multi-query vector search
//! - `rerank`: relevance scoring of merged candidates
//! - `retriever`: the pipeline under one deadline
//! - `ask`: answer generation over the retrieved context

pub mod ask;
pub mod planner;
pub mod rerank;
pub mod retriever;
pub mod search;

pub use ask::{Answer, BookAssistant};
pub use planner::{RetrievalPlan, RetrievalPlanner};
pub use rerank::{RankedCandidate, Reranker};
pub use retriever::{ContextEntry, ContextRetriever, RetrievedContext};
pub use search::MultiQuerySearch;
