//! Ask command handler.
//!
//! Answers a question about the user's shelf with retrieved context.

use crate::services::Services;
use clap::Args;
use futures::StreamExt;
use shelf_core::{config::AppConfig, AppError, AppResult};
use shelf_retrieval::{RetrievedContext, UserId};
use std::io::Write;
use std::path::PathBuf;

/// Ask a question about your bookshelf
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// User whose shelf is searched
    #[arg(short, long, env = "SHELF_USER", default_value = "1")]
    pub user: UserId,

    /// Disable streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Print the retrieved context after the answer
    #[arg(long)]
    pub show_context: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let services = Services::open(config)?;
        let assistant = services.assistant()?;

        // JSON output needs the complete answer
        if self.no_stream || self.json {
            let answer = assistant.ask(self.user, &question).await?;

            if self.json {
                let output = serde_json::json!({
                    "answer": answer.answer,
                    "model": answer.model,
                    "provider": config.provider,
                    "user": self.user,
                    "context": answer.context,
                });
                let json = serde_json::to_string_pretty(&output)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                println!("{}", json);
            } else {
                println!("{}", answer.answer);
                self.print_context(&answer.context);
            }
            return Ok(());
        }

        tracing::info!("Starting streaming answer");
        let (context, mut stream) = assistant.stream_ask(self.user, &question).await?;

        let mut stdout = std::io::stdout();
        while let Some(result) = stream.next().await {
            let chunk = result?;

            if !chunk.content.is_empty() {
                print!("{}", chunk.content);
                stdout.flush().ok();
            }

            if chunk.done {
                if let Some(usage) = chunk.usage {
                    tracing::debug!(
                        "Token usage - Prompt: {}, Completion: {}, Total: {}",
                        usage.prompt_tokens,
                        usage.completion_tokens,
                        usage.total_tokens
                    );
                }
                break;
            }
        }
        println!();

        self.print_context(&context);
        Ok(())
    }

    fn print_context(&self, context: &RetrievedContext) {
        if !self.show_context {
            return;
        }

        println!();
        println!("Context ({} entries):", context.entries.len());
        for entry in &context.entries {
            println!("- {}", entry.content);
        }
    }

    /// Get the question from the argument or the file.
    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(q), _) => q.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read question file {:?}: {}", path, e))
            })?,
            (None, None) => {
                return Err(AppError::InvalidQuestion("No question provided".to_string()))
            }
        };

        Ok(question.trim().to_string())
    }
}
