//! Relevance reranking with the language model as judge.

use crate::types::Candidate;
use futures::StreamExt;
use serde::Serialize;
use shelf_core::AppResult;
use shelf_llm::{LlmClient, LlmRequest};
use shelf_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// Highest relevance score a candidate can receive.
pub const MAX_SCORE: u8 = 10;

const RERANK_MAX_TOKENS: u32 = 8;

/// A candidate with its relevance score, in ranked order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// `None` when reranking was skipped
    pub score: Option<u8>,
}

/// Scores candidates against the original question and keeps the best.
pub struct Reranker {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    ceiling: usize,
    concurrency: usize,
}

impl Reranker {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
            ceiling: 12,
            concurrency: 6,
        }
    }

    /// Above this many candidates scoring is skipped.
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Concurrent scoring calls.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Rank candidates and keep the top `top_k`.
    ///
    /// Equal scores keep their incoming order. When there are more candidates
    /// than the ceiling they are ordered by vector distance instead.
    pub async fn rerank(
        &self,
        question: &str,
        candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<RankedCandidate> {
        if candidates.len() > self.ceiling {
            tracing::info!(
                "{} candidates exceed rerank ceiling {}, ordering by distance",
                candidates.len(),
                self.ceiling
            );
            return rank_by_distance(candidates, top_k);
        }

        let scores: Vec<u8> = futures::stream::iter(
            candidates
                .iter()
                .map(|candidate| self.score(question, candidate)),
        )
        .buffered(self.concurrency)
        .collect()
        .await;

        tracing::debug!("Rerank scores: {:?}", scores);

        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| RankedCandidate {
                candidate,
                score: Some(score),
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked.truncate(top_k);
        ranked
    }

    async fn score(&self, question: &str, candidate: &Candidate) -> u8 {
        match self.request_score(question, candidate).await {
            Ok(reply) => parse_score(&reply).unwrap_or_else(|| {
                tracing::debug!(
                    "Unusable score '{}' for record {}",
                    reply.trim(),
                    candidate.record.id
                );
                0
            }),
            Err(e) => {
                tracing::warn!("Scoring record {} failed: {}", candidate.record.id, e);
                0
            }
        }
    }

    async fn request_score(&self, question: &str, candidate: &Candidate) -> AppResult<String> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("candidate".to_string(), candidate.record.content.clone());

        let built = build_prompt(&self.prompt, variables)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(0.0)
            .with_max_tokens(RERANK_MAX_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        Ok(self.llm.complete(&request).await?.content)
    }
}

/// Stable sort by ascending distance, keep the top `top_k`.
pub fn rank_by_distance(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<RankedCandidate> {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates
        .into_iter()
        .take(top_k)
        .map(|candidate| RankedCandidate {
            candidate,
            score: None,
        })
        .collect()
}

/// Score in `0..=10` read from a model reply.
///
/// A line holding only an integer wins. Otherwise the last integer counts,
/// skipping range bounds ("0-10"), denominators ("/10", "out of 10") and
/// negative numbers. "8", "Score: 8", "8/10" and "Relevance (0-10): 7" all
/// parse; "-2", "42" and "high" give `None`.
pub fn parse_score(reply: &str) -> Option<u8> {
    let standalone = reply
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .last();

    let value = match standalone {
        Some(value) => value,
        None => score_numbers(reply).pop()?,
    };

    u8::try_from(value).ok().filter(|score| *score <= MAX_SCORE)
}

/// Integers in the reply that can be a score, in order of appearance.
fn score_numbers(reply: &str) -> Vec<u64> {
    let bytes = reply.as_bytes();
    let mut numbers = Vec::new();
    let mut end = 0;

    while end < bytes.len() {
        if !bytes[end].is_ascii_digit() {
            end += 1;
            continue;
        }

        let start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }

        let before = &reply[..start];
        let after = &reply[end..];

        // A leading dash marks a negative number or the end of a range
        let follows_dash = before.ends_with('-');
        let range_start = after.starts_with('-')
            && after[1..].starts_with(|c: char| c.is_ascii_digit());
        let lead = before.trim_end().to_lowercase();
        let denominator = lead.ends_with('/') || lead.ends_with("out of");

        if follows_dash || range_start || denominator {
            continue;
        }
        if let Ok(value) = reply[start..end].parse::<u64>() {
            numbers.push(value);
        }
    }

    numbers
}
