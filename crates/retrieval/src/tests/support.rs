//! Test doubles shared by the pipeline scenarios.

use crate::embeddings::providers::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::indexer::EmbeddingIndexer;
use crate::store::{CatalogStore, EmbeddingStore, SqliteStore};
use crate::types::{
    Candidate, EmbeddingRecord, EmbeddingUpsert, NewBook, ReadingStatus, SearchFilters,
    ShelfEntry, UserBook, UserId,
};
use chrono::{DateTime, TimeZone, Utc};
use shelf_core::{AppError, AppResult};
use shelf_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage, ModelInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSIONS: usize = 64;

/// Which pipeline stage a request belongs to, read from the prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rewrite,
    Rerank,
    Answer,
}

fn stage_of(request: &LlmRequest) -> Stage {
    if request.prompt.contains("Shelf entry:") {
        Stage::Rerank
    } else if request.prompt.contains("search queries") {
        Stage::Rewrite
    } else {
        Stage::Answer
    }
}

/// Language model with canned replies per stage.
pub struct ScriptedLlm {
    /// `None` makes the rewrite call fail
    rewrite: Option<String>,
    /// Score reply chosen by the first needle found in the candidate text
    scores: Vec<(String, String)>,
    answer: String,
    rewrite_delay: Option<Duration>,
    calls: Mutex<Vec<Stage>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            rewrite: Some(String::new()),
            scores: Vec::new(),
            answer: "You finished Dune most recently.".to_string(),
            rewrite_delay: None,
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rewrite(mut self, reply: &str) -> Self {
        self.rewrite = Some(reply.to_string());
        self
    }

    pub fn with_failing_rewrite(mut self) -> Self {
        self.rewrite = None;
        self
    }

    pub fn with_rewrite_delay(mut self, delay: Duration) -> Self {
        self.rewrite_delay = Some(delay);
        self
    }

    pub fn with_score(mut self, needle: &str, reply: &str) -> Self {
        self.scores.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == stage)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    async fn reply(&self, request: &LlmRequest) -> AppResult<String> {
        let stage = stage_of(request);
        self.calls.lock().unwrap().push(stage);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        match stage {
            Stage::Rewrite => {
                if let Some(delay) = self.rewrite_delay {
                    tokio::time::sleep(delay).await;
                }
                self.rewrite
                    .clone()
                    .ok_or_else(|| AppError::Llm("rewrite model unavailable".to_string()))
            }
            Stage::Rerank => Ok(self
                .scores
                .iter()
                .find(|(needle, _)| request.prompt.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| "0".to_string())),
            Stage::Answer => Ok(self.answer.clone()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.reply(request).await?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.reply(request).await?;
        let chunks: Vec<AppResult<LlmStreamChunk>> = content
            .split_inclusive(' ')
            .map(|piece| {
                Ok(LlmStreamChunk {
                    content: piece.to_string(),
                    model: request.model.clone(),
                    done: false,
                    usage: None,
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}

/// Mock embeddings that count calls.
#[derive(Debug)]
pub struct CountingEmbedder {
    inner: MockProvider,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: MockProvider::new(DIMENSIONS),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// Embedding service that is always down.
#[derive(Debug)]
pub struct FailingEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Err(AppError::Embedding("connection refused".to_string()))
    }
}

/// Mock embeddings that fail for one exact text.
#[derive(Debug)]
pub struct RefusingEmbedder {
    inner: MockProvider,
    refused: String,
}

impl RefusingEmbedder {
    pub fn new(refused: &str) -> Self {
        Self {
            inner: MockProvider::new(DIMENSIONS),
            refused: refused.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for RefusingEmbedder {
    fn provider_name(&self) -> &str {
        "refusing"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| *t == self.refused) {
            return Err(AppError::Embedding(format!("refused '{}'", self.refused)));
        }
        self.inner.embed_batch(texts).await
    }
}

/// SQLite store that counts vector and recency reads.
pub struct CountingStore {
    pub inner: SqliteStore,
    nearest_calls: AtomicUsize,
    recent_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            nearest_calls: AtomicUsize::new(0),
            recent_calls: AtomicUsize::new(0),
        }
    }

    pub fn nearest_calls(&self) -> usize {
        self.nearest_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingStore for CountingStore {
    fn upsert(&self, record: &EmbeddingUpsert) -> AppResult<EmbeddingRecord> {
        self.inner.upsert(record)
    }

    fn content_hash(&self, user_book_id: i64) -> AppResult<Option<String>> {
        self.inner.content_hash(user_book_id)
    }

    fn recent(
        &self,
        user_id: UserId,
        status: ReadingStatus,
        limit: usize,
    ) -> AppResult<Vec<EmbeddingRecord>> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.recent(user_id, status, limit)
    }

    fn count_candidates(&self, user_id: UserId, filters: &SearchFilters) -> AppResult<usize> {
        self.inner.count_candidates(user_id, filters)
    }

    fn nearest(
        &self,
        user_id: UserId,
        filters: &SearchFilters,
        query: &[f32],
        limit: usize,
    ) -> AppResult<Vec<Candidate>> {
        self.nearest_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.nearest(user_id, filters, query, limit)
    }

    fn delete(&self, user_book_id: i64) -> AppResult<bool> {
        self.inner.delete(user_book_id)
    }

    fn count(&self, user_id: Option<UserId>) -> AppResult<usize> {
        self.inner.count(user_id)
    }
}

/// Shelf fixture: catalog and embeddings in one counting store.
pub struct Library {
    pub store: Arc<CountingStore>,
    pub embedder: Arc<CountingEmbedder>,
}

impl Library {
    pub fn new() -> Self {
        Self {
            store: Arc::new(CountingStore::new()),
            embedder: Arc::new(CountingEmbedder::new()),
        }
    }

    pub fn indexer(&self) -> EmbeddingIndexer {
        EmbeddingIndexer::new(self.embedder.clone(), self.store.clone())
    }

    /// Shelve a new book for `user_id` and embed the entry.
    pub async fn shelve(
        &self,
        user_id: UserId,
        title: &str,
        genre: &str,
        status: ReadingStatus,
        notes: &str,
        updated_at: DateTime<Utc>,
    ) -> ShelfEntry {
        let book = self
            .store
            .inner
            .insert_book(&NewBook {
                title: title.to_string(),
                author: "Test Author".to_string(),
                genre: genre.to_string(),
                publication_year: Some(2001),
                description: String::new(),
            })
            .unwrap();
        let user_book = self
            .store
            .inner
            .insert_entry(&UserBook {
                id: 0,
                user_id,
                book_id: book.id,
                status,
                rating: None,
                notes: notes.to_string(),
                updated_at,
            })
            .unwrap();

        let entry = ShelfEntry { user_book, book };
        self.indexer().upsert(&entry).await.unwrap();
        entry
    }
}

/// Noon UTC on a day of 2024.
pub fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap()
}
