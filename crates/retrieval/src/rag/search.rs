//! Multi-query vector search.
//!
//! The question is rewritten into a few keyword-dense variants, each variant
//! runs its own nearest-neighbour search over the user's filtered records,
//! and the per-variant lists are merged in variant order with duplicates
//! removed.

use crate::embeddings::EmbeddingProvider;
use crate::store::EmbeddingStore;
use crate::types::{Candidate, SearchFilters, UserId};
use shelf_core::{AppError, AppResult};
use shelf_llm::{LlmClient, LlmRequest};
use shelf_prompt::{build_prompt, PromptDefinition};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const REWRITE_TEMPERATURE: f32 = 0.3;
const REWRITE_MAX_TOKENS: u32 = 200;

/// Rewrites questions and fans them out over the embedding store.
pub struct MultiQuerySearch {
    llm: Arc<dyn LlmClient>,
    model: String,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    prompt: PromptDefinition,
    fan_out: usize,
    over_retrieve: usize,
}

impl MultiQuerySearch {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EmbeddingStore>,
        prompt: PromptDefinition,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            embedder,
            store,
            prompt,
            fan_out: 3,
            over_retrieve: 12,
        }
    }

    /// Maximum number of variants searched.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Nearest neighbours fetched per variant.
    pub fn with_over_retrieve(mut self, over_retrieve: usize) -> Self {
        self.over_retrieve = over_retrieve.max(1);
        self
    }

    /// Search the user's records for a question.
    ///
    /// Returns deduplicated candidates in variant order. An empty base set
    /// returns immediately without calling the language model.
    pub async fn search(
        &self,
        user_id: UserId,
        question: &str,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Candidate>> {
        let base = self.store.count_candidates(user_id, filters)?;
        if base == 0 {
            tracing::info!(
                "No records match filters [{}], skipping search",
                filters.describe()
            );
            return Ok(Vec::new());
        }

        let variants = self.rewrite(question, filters).await;
        tracing::debug!("Searching {} variants: {:?}", variants.len(), variants);

        let searches = variants
            .iter()
            .map(|variant| self.search_variant(user_id, variant, filters));
        let results = futures::future::join_all(searches).await;

        let mut lists = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(candidates) => lists.push(candidates),
                Err(e) => {
                    tracing::warn!("Variant '{}' failed: {}", variant, e);
                    failures.push(e);
                }
            }
        }

        if lists.is_empty() {
            let reason = failures
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no variants".to_string());
            return Err(AppError::RetrievalUnavailable(format!(
                "All {} search variants failed: {}",
                variants.len(),
                reason
            )));
        }

        let merged = dedupe(lists);
        tracing::info!(
            "Multi-query search: {} variants, {} unique candidates (base set {})",
            variants.len(),
            merged.len(),
            base
        );
        Ok(merged)
    }

    /// Rewrite the question into search variants.
    ///
    /// Never fails: a model error or an empty reply falls back to the
    /// original question as the only variant.
    pub async fn rewrite(&self, question: &str, filters: &SearchFilters) -> Vec<String> {
        match self.request_variants(question, filters).await {
            Ok(variants) if !variants.is_empty() => variants,
            Ok(_) => {
                tracing::warn!("Rewrite returned no variants, using the original question");
                vec![question.to_string()]
            }
            Err(e) => {
                tracing::warn!("Rewrite failed, using the original question: {}", e);
                vec![question.to_string()]
            }
        }
    }

    async fn request_variants(
        &self,
        question: &str,
        filters: &SearchFilters,
    ) -> AppResult<Vec<String>> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("count".to_string(), self.fan_out.to_string());
        variables.insert("filters".to_string(), filters.describe());

        let built = build_prompt(&self.prompt, variables)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(REWRITE_TEMPERATURE)
            .with_max_tokens(REWRITE_MAX_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self.llm.complete(&request).await?;
        Ok(parse_variants(&response.content, self.fan_out))
    }

    async fn search_variant(
        &self,
        user_id: UserId,
        variant: &str,
        filters: &SearchFilters,
    ) -> AppResult<Vec<Candidate>> {
        let vector = self.embedder.embed(variant).await?;
        self.store
            .nearest(user_id, filters, &vector, self.over_retrieve)
    }
}

/// Split model output into at most `limit` distinct query lines.
pub fn parse_variants(output: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();

    output
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(limit)
        .collect()
}

fn clean_line(line: &str) -> String {
    let mut text = line.trim();

    // Bullets: "-", "*", "•"
    text = text.trim_start_matches(['-', '*', '\u{2022}']).trim_start();

    // Numbering: "1.", "2)", "3 -"
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &text[digits..];
        if let Some(stripped) = rest
            .strip_prefix('.')
            .or_else(|| rest.strip_prefix(')'))
            .or_else(|| rest.strip_prefix(" -"))
        {
            text = stripped.trim_start();
        }
    }

    text.trim_matches(['"', '\'', '`', '\u{201c}', '\u{201d}'])
        .trim()
        .to_string()
}

/// Concatenate lists in order, keeping the first occurrence of each record.
pub fn dedupe(lists: Vec<Vec<Candidate>>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Candidate> = lists.into_iter().flatten().collect();
    merged.retain(|candidate| seen.insert(candidate.record.id));
    merged
}
