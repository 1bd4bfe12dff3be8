//! Reindex command handler.
//!
//! Re-embeds shelf entries whose summary changed. `--force` re-embeds
//! everything, e.g. after switching the embedding model.

use super::print_json;
use crate::services::Services;
use clap::Args;
use shelf_core::{config::AppConfig, AppResult};
use shelf_retrieval::UserId;

/// Rebuild embedding records from the shelf
#[derive(Args, Debug)]
pub struct ReindexCommand {
    /// Only this user's entries (default: every user)
    #[arg(short, long)]
    pub user: Option<UserId>,

    /// Re-embed entries even when their summary is unchanged
    #[arg(long)]
    pub force: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReindexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing reindex command");

        let services = Services::open(config)?;
        let indexer = services.indexer().with_force(self.force);

        let stats = match self.user {
            Some(user_id) => indexer.reindex_user(&*services.store, user_id).await?,
            None => indexer.reindex_all(&*services.store).await?,
        };

        if self.json {
            return print_json(&stats);
        }

        println!(
            "Reindexed {} entries ({} created, {} updated, {} unchanged, {} failed) in {:.2}s",
            stats.entries,
            stats.created,
            stats.updated,
            stats.unchanged,
            stats.failed,
            stats.duration_secs
        );
        Ok(())
    }
}
