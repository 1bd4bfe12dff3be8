//! Models command handler.

use super::print_json;
use clap::Args;
use shelf_core::{config::AppConfig, AppError, AppResult};
use shelf_llm::create_client;

/// List the models the active provider exposes
#[derive(Args, Debug)]
pub struct ModelsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ModelsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Listing models for provider {}", config.provider);

        let endpoint = config.resolve_endpoint(&config.provider);
        let api_key = config.resolve_api_key(&config.provider);
        let client = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())
            .map_err(AppError::Config)?;

        let models = client.list_models().await?;

        if self.json {
            return print_json(&models);
        }

        for model in &models {
            let marker = if model.name == config.model { "*" } else { " " };
            match model.description {
                Some(ref description) => println!("{} {}  {}", marker, model.name, description),
                None => println!("{} {}", marker, model.name),
            }
        }
        Ok(())
    }
}
