//! Embedding upsert for shelf entries.
//!
//! Each shelf entry owns at most one embedding record. Saving an entry
//! recomposes its summary; the embedding is recomputed only when the
//! summary text changed.

use crate::embeddings::EmbeddingProvider;
use crate::shelf::ShelfObserver;
use crate::store::{CatalogStore, EmbeddingStore};
use crate::summary::{compose_summary, content_hash};
use crate::types::{EmbeddingUpsert, ShelfEntry, UserId};
use serde::Serialize;
use shelf_core::AppResult;
use std::sync::Arc;
use std::time::Instant;

/// What an upsert did to the record of a shelf entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Totals of a reindex run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexStats {
    pub entries: u32,
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub duration_secs: f64,
}

impl ReindexStats {
    fn record(&mut self, outcome: AppResult<IndexOutcome>) {
        self.entries += 1;
        match outcome {
            Ok(IndexOutcome::Created) => self.created += 1,
            Ok(IndexOutcome::Updated) => self.updated += 1,
            Ok(IndexOutcome::Unchanged) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Keeps the embedding store in step with the shelf.
pub struct EmbeddingIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    force: bool,
}

impl EmbeddingIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            embedder,
            store,
            force: false,
        }
    }

    /// Re-embed even when the stored hash matches.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Create or refresh the embedding record of a shelf entry.
    pub async fn upsert(&self, entry: &ShelfEntry) -> AppResult<IndexOutcome> {
        let user_book = &entry.user_book;
        let content = compose_summary(entry);
        let hash = content_hash(&content);

        let existing = self.store.content_hash(user_book.id)?;
        if !self.force && existing.as_deref() == Some(hash.as_str()) {
            tracing::debug!("Entry {} unchanged, skipping embedding", user_book.id);
            return Ok(IndexOutcome::Unchanged);
        }

        let embedding = self.embedder.embed(&content).await?;
        self.store.upsert(&EmbeddingUpsert {
            user_book_id: user_book.id,
            user_id: user_book.user_id,
            content,
            content_hash: hash,
            embedding,
            updated_at: user_book.updated_at,
        })?;

        let outcome = if existing.is_some() {
            IndexOutcome::Updated
        } else {
            IndexOutcome::Created
        };
        tracing::debug!("Entry {} embedding {:?}", user_book.id, outcome);
        Ok(outcome)
    }

    /// Upsert every shelf entry of one user.
    pub async fn reindex_user(
        &self,
        catalog: &dyn CatalogStore,
        user_id: UserId,
    ) -> AppResult<ReindexStats> {
        let start = Instant::now();
        let mut stats = ReindexStats::default();

        self.reindex_entries(catalog, user_id, &mut stats).await?;

        stats.duration_secs = start.elapsed().as_secs_f64();
        log_stats(&stats);
        Ok(stats)
    }

    /// Upsert every shelf entry of every user.
    pub async fn reindex_all(&self, catalog: &dyn CatalogStore) -> AppResult<ReindexStats> {
        let start = Instant::now();
        let mut stats = ReindexStats::default();

        for user_id in catalog.list_users()? {
            self.reindex_entries(catalog, user_id, &mut stats).await?;
        }

        stats.duration_secs = start.elapsed().as_secs_f64();
        log_stats(&stats);
        Ok(stats)
    }

    async fn reindex_entries(
        &self,
        catalog: &dyn CatalogStore,
        user_id: UserId,
        stats: &mut ReindexStats,
    ) -> AppResult<()> {
        let entries = catalog.list_entries(user_id, None)?;
        tracing::info!("Reindexing {} entries of user {}", entries.len(), user_id);

        for entry in &entries {
            let outcome = self.upsert(entry).await;
            if let Err(e) = &outcome {
                tracing::warn!("Embedding entry {} failed: {}", entry.user_book.id, e);
            }
            stats.record(outcome);
        }
        Ok(())
    }
}

fn log_stats(stats: &ReindexStats) {
    tracing::info!(
        "Reindex completed: {} entries ({} created, {} updated, {} unchanged, {} failed) in {:.2}s",
        stats.entries,
        stats.created,
        stats.updated,
        stats.unchanged,
        stats.failed,
        stats.duration_secs
    );
}

#[async_trait::async_trait]
impl ShelfObserver for EmbeddingIndexer {
    async fn entry_saved(&self, entry: &ShelfEntry) {
        if let Err(e) = self.upsert(entry).await {
            tracing::error!(
                "Failed to embed shelf entry {} of user {}: {}",
                entry.user_book.id,
                entry.user_book.user_id,
                e
            );
        }
    }

    async fn entry_removed(&self, user_id: UserId, user_book_id: i64) {
        // The store cascade usually got there first.
        if let Err(e) = self.store.delete(user_book_id) {
            tracing::error!(
                "Failed to delete embedding of entry {} (user {}): {}",
                user_book_id,
                user_id,
                e
            );
        }
    }
}
