//! Prompts command handler.

use super::print_json;
use clap::Args;
use shelf_core::{config::AppConfig, AppResult};
use shelf_prompt::{list_prompts, load_prompt, prompts_dir, PromptOrigin};

/// List prompt templates and where they come from
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Print the template of this prompt id
    #[arg(long)]
    pub show: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if let Some(ref id) = self.show {
            let prompt = load_prompt(&config.workspace, id)?;
            if self.json {
                return print_json(&prompt);
            }
            if let Some(ref system) = prompt.system {
                println!("# system\n{}", system.trim_end());
            }
            println!("# template\n{}", prompt.template.trim_end());
            return Ok(());
        }

        let prompts = list_prompts(&config.workspace)?;
        if self.json {
            let output: Vec<_> = prompts
                .iter()
                .map(|(id, origin)| serde_json::json!({ "id": id, "origin": origin }))
                .collect();
            return print_json(&output);
        }

        for (id, origin) in &prompts {
            let origin = match origin {
                PromptOrigin::Builtin => "built-in".to_string(),
                PromptOrigin::Workspace => format!("{}", prompts_dir(&config.workspace).display()),
            };
            println!("{:<16} {}", id, origin);
        }
        Ok(())
    }
}
