//! Context retrieval orchestration.
//!
//! Plans the question, then either reads the most recent records directly
//! or runs multi-query search followed by reranking. The whole retrieval
//! runs under one deadline.

use super::planner::{RetrievalPlan, RetrievalPlanner};
use super::rerank::{RankedCandidate, Reranker};
use super::search::MultiQuerySearch;
use crate::embeddings::EmbeddingProvider;
use crate::rules::QueryRules;
use crate::store::EmbeddingStore;
use crate::types::{EmbeddingRecord, UserId};
use serde::Serialize;
use shelf_core::config::RetrievalSettings;
use shelf_core::{AppError, AppResult};
use shelf_llm::LlmClient;
use shelf_prompt::PromptSet;
use std::sync::Arc;
use std::time::Duration;

/// One record chosen for the answer context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub record_id: i64,
    pub user_book_id: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

impl From<EmbeddingRecord> for ContextEntry {
    fn from(record: EmbeddingRecord) -> Self {
        Self {
            record_id: record.id,
            user_book_id: record.user_book_id,
            content: record.content,
            distance: None,
            score: None,
        }
    }
}

impl From<RankedCandidate> for ContextEntry {
    fn from(ranked: RankedCandidate) -> Self {
        Self {
            distance: Some(ranked.candidate.distance),
            score: ranked.score,
            ..Self::from(ranked.candidate.record)
        }
    }
}

/// Result of a retrieval: the chosen plan and the ranked entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub plan: RetrievalPlan,
    pub entries: Vec<ContextEntry>,
}

impl RetrievedContext {
    /// Entry texts joined by blank lines; empty when nothing matched.
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entry point of the retrieval pipeline.
pub struct ContextRetriever {
    planner: RetrievalPlanner,
    search: MultiQuerySearch,
    reranker: Reranker,
    store: Arc<dyn EmbeddingStore>,
    top_k: usize,
    deadline: Duration,
}

impl ContextRetriever {
    /// Assemble the pipeline from injected clients.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        prompts: &PromptSet,
        rules: QueryRules,
        settings: &RetrievalSettings,
    ) -> Self {
        let model = model.into();

        let search = MultiQuerySearch::new(
            Arc::clone(&llm),
            model.clone(),
            embedder,
            Arc::clone(&store),
            prompts.rewrite.clone(),
        )
        .with_fan_out(settings.fan_out)
        .with_over_retrieve(settings.over_retrieve);

        let reranker = Reranker::new(llm, model, prompts.rerank.clone())
            .with_ceiling(settings.rerank_ceiling)
            .with_concurrency(settings.rerank_concurrency);

        Self {
            planner: RetrievalPlanner::new(rules),
            search,
            reranker,
            store,
            top_k: settings.top_k.max(1),
            deadline: Duration::from_millis(settings.deadline_ms),
        }
    }

    /// Retrieve context for a user's question.
    ///
    /// # Errors
    /// - [`AppError::InvalidQuestion`] for an empty question
    /// - [`AppError::RetrievalUnavailable`] when every search variant fails
    ///   or the deadline passes
    pub async fn retrieve(&self, user_id: UserId, question: &str) -> AppResult<RetrievedContext> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidQuestion(
                "Question cannot be empty".to_string(),
            ));
        }

        match tokio::time::timeout(self.deadline, self.run(user_id, question)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Retrieval exceeded {:?} deadline", self.deadline);
                Err(AppError::RetrievalUnavailable(format!(
                    "Retrieval did not finish within {} ms",
                    self.deadline.as_millis()
                )))
            }
        }
    }

    async fn run(&self, user_id: UserId, question: &str) -> AppResult<RetrievedContext> {
        let plan = self.planner.plan(question);
        tracing::info!("Retrieval plan for user {}: {:?}", user_id, plan);

        let entries: Vec<ContextEntry> = match plan {
            RetrievalPlan::Recency { status } => self
                .store
                .recent(user_id, status, self.top_k)?
                .into_iter()
                .map(ContextEntry::from)
                .collect(),

            RetrievalPlan::Semantic { ref filters } => {
                let candidates = self.search.search(user_id, question, filters).await?;
                if candidates.is_empty() {
                    Vec::new()
                } else {
                    self.reranker
                        .rerank(question, candidates, self.top_k)
                        .await
                        .into_iter()
                        .map(ContextEntry::from)
                        .collect()
                }
            }
        };

        tracing::info!("Retrieved {} context entries", entries.len());
        Ok(RetrievedContext { plan, entries })
    }
}
