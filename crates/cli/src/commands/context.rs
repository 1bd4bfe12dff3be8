//! Context command handler.
//!
//! Runs retrieval only and prints what the answer would be grounded on.

use super::print_json;
use crate::services::Services;
use clap::Args;
use shelf_core::{config::AppConfig, AppResult};
use shelf_retrieval::{RetrievalPlan, UserId};

/// Show the shelf context retrieved for a question
#[derive(Args, Debug)]
pub struct ContextCommand {
    /// The question to retrieve context for
    pub question: String,

    /// User whose shelf is searched
    #[arg(short, long, env = "SHELF_USER", default_value = "1")]
    pub user: UserId,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ContextCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing context command");

        let services = Services::open(config)?;
        let context = services
            .retriever()?
            .retrieve(self.user, &self.question)
            .await?;

        if self.json {
            return print_json(&context);
        }

        match &context.plan {
            RetrievalPlan::Recency { status } => {
                println!("Plan: most recent entries ({})", status.label())
            }
            RetrievalPlan::Semantic { filters } if filters.has_filters() => {
                println!("Plan: semantic search ({})", filters.describe())
            }
            RetrievalPlan::Semantic { .. } => println!("Plan: semantic search"),
        }

        if context.is_empty() {
            println!("No shelf entries matched.");
            return Ok(());
        }

        for (i, entry) in context.entries.iter().enumerate() {
            let mut detail = Vec::new();
            if let Some(score) = entry.score {
                detail.push(format!("score {}", score));
            }
            if let Some(distance) = entry.distance {
                detail.push(format!("distance {:.3}", distance));
            }

            if detail.is_empty() {
                println!("{}. {}", i + 1, entry.content);
            } else {
                println!("{}. [{}] {}", i + 1, detail.join(", "), entry.content);
            }
        }

        Ok(())
    }
}
