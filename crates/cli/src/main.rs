//! Shelf CLI
//!
//! Main entry point for the shelf command-line tool.
//! Keeps a personal bookshelf and answers questions about it with
//! retrieval-augmented generation.

mod commands;
mod services;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, BookCommand, ContextCommand, ModelsCommand, PromptsCommand, ReindexCommand,
    ShelfCommand,
};
use shelf_core::{config::AppConfig, logging, AppResult};
use shelf_llm::ProviderType;
use std::path::PathBuf;

/// Shelf - a book companion that knows your reading history
#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(about = "A book companion that knows your reading history", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "SHELF_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (gemini, ollama)
    #[arg(short, long, global = true, env = "SHELF_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "SHELF_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a question about your bookshelf
    Ask(AskCommand),

    /// Show the shelf context retrieved for a question
    Context(ContextCommand),

    /// Book catalog management
    Book(BookCommand),

    /// Shelf management (add, update, remove, list entries)
    Shelf(ShelfCommand),

    /// Rebuild embedding records from the shelf
    Reindex(ReindexCommand),

    /// List the models the active provider exposes
    Models(ModelsCommand),

    /// List prompt templates
    Prompts(PromptsCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Context(_) => "context",
            Commands::Book(_) => "book",
            Commands::Shelf(_) => "shelf",
            Commands::Reindex(_) => "reindex",
            Commands::Models(_) => "models",
            Commands::Prompts(_) => "prompts",
        }
    }
}

/// Switching provider without naming a model picks that provider's default.
fn resolve_model(provider: Option<&str>, model: Option<String>) -> Option<String> {
    model.or_else(|| {
        provider
            .and_then(ProviderType::parse)
            .map(|provider| provider.default_model().to_string())
    })
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from environment
    let config = AppConfig::load()?;

    let model = resolve_model(cli.provider.as_deref(), cli.model);

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Shelf CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);
    tracing::debug!(
        "Embeddings: {} {} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    config.ensure_shelf_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Context(cmd) => cmd.execute(&config).await,
        Commands::Book(cmd) => cmd.execute(&config).await,
        Commands::Shelf(cmd) => cmd.execute(&config).await,
        Commands::Reindex(cmd) => cmd.execute(&config).await,
        Commands::Models(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
