//! Command handlers for the Shelf CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod book;
pub mod context;
pub mod models;
pub mod prompts;
pub mod reindex;
pub mod shelf;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use book::BookCommand;
pub use context::ContextCommand;
pub use models::ModelsCommand;
pub use prompts::PromptsCommand;
pub use reindex::ReindexCommand;
pub use shelf::ShelfCommand;

use serde::Serialize;
use shelf_core::{AppError, AppResult};

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
