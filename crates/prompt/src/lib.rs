//! Prompt system for Shelf.
//!
//! YAML prompt definitions rendered with Handlebars. Built-in prompts ship
//! with the binary and can be overridden per workspace.

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::build_prompt;
pub use loader::{
    list_prompts, load_builtin, load_prompt, prompts_dir, ANSWER_PROMPT_ID, RERANK_PROMPT_ID,
    REWRITE_PROMPT_ID,
};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptBehavior, PromptDefinition, PromptInputSpec,
    PromptOrigin, PromptOutputSpec,
};

use shelf_core::AppResult;
use std::path::Path;

/// The three prompts the retrieval pipeline depends on.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub rewrite: PromptDefinition,
    pub rerank: PromptDefinition,
    pub answer: PromptDefinition,
}

impl PromptSet {
    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            rewrite: load_builtin(REWRITE_PROMPT_ID)?,
            rerank: load_builtin(RERANK_PROMPT_ID)?,
            answer: load_builtin(ANSWER_PROMPT_ID)?,
        })
    }

    /// Built-in prompts with workspace overrides applied.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        Ok(Self {
            rewrite: load_prompt(workspace_path, REWRITE_PROMPT_ID)?,
            rerank: load_prompt(workspace_path, RERANK_PROMPT_ID)?,
            answer: load_prompt(workspace_path, ANSWER_PROMPT_ID)?,
        })
    }
}
