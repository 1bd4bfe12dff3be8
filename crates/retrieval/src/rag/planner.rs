//! Retrieval planning: recency short-circuit or semantic search.

use crate::rules::QueryRules;
use crate::types::{ReadingStatus, SearchFilters};
use serde::Serialize;

/// Status assumed by a recency question that names none.
pub const DEFAULT_RECENCY_STATUS: ReadingStatus = ReadingStatus::Read;

/// How context is gathered for a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum RetrievalPlan {
    /// Most recently updated records with this status; no vector search.
    Recency { status: ReadingStatus },

    /// Multi-query vector search over the filtered records.
    Semantic { filters: SearchFilters },
}

/// Classifies questions with a [`QueryRules`] table.
#[derive(Debug, Clone, Default)]
pub struct RetrievalPlanner {
    rules: QueryRules,
}

impl RetrievalPlanner {
    pub fn new(rules: QueryRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &QueryRules {
        &self.rules
    }

    /// Choose the retrieval path for a question.
    pub fn plan(&self, question: &str) -> RetrievalPlan {
        let status = self.rules.match_status(question);

        if self.rules.is_recency(question) {
            return RetrievalPlan::Recency {
                status: status.unwrap_or(DEFAULT_RECENCY_STATUS),
            };
        }

        let mut filters = SearchFilters::new();
        if let Some(status) = status {
            filters = filters.with_status(status);
        }
        if let Some(genre) = self.rules.match_genre(question) {
            let aliases = self.rules.genre_aliases(&genre);
            filters = filters.with_genre(genre).with_genre_aliases(aliases);
        }

        RetrievalPlan::Semantic { filters }
    }
}
