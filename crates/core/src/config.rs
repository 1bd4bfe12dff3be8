//! Configuration management for Shelf.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.shelf/config.yaml)
//!
//! The configuration is workspace-centric, with the database, prompt
//! overrides and query rules stored in `.shelf/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the factories know how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["gemini", "ollama"];

/// Providers usable for embeddings (adds the offline hashing provider).
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 3] = ["gemini", "ollama", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .shelf/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// LLM provider used for rewriting, reranking and answering
    pub provider: String,

    /// Default model identifier for the active provider
    pub model: String,

    /// API key override for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding settings
    pub embedding: EmbeddingSettings,

    /// Retrieval pipeline tuning
    pub retrieval: RetrievalSettings,

    /// Answer generation tuning
    pub answer: AnswerSettings,

    /// SQLite database location (relative paths resolve against the workspace)
    pub database_path: Option<PathBuf>,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider")]
    pub active_embedding_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Gemini {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Completion model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::Gemini { model, .. } | Self::Ollama { model, .. } => model,
        }
    }

    /// Embedding model configured for this provider, if any.
    pub fn embedding_model(&self) -> Option<&str> {
        match self {
            Self::Gemini {
                embedding_model, ..
            }
            | Self::Ollama {
                embedding_model, ..
            } => embedding_model.as_deref(),
        }
    }

    /// Custom endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Gemini { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Provider name: "gemini", "ollama" or "mock"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimensions() -> usize {
    768
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Retrieval pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Maximum number of rewritten query variants
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Nearest neighbours fetched per variant
    #[serde(default = "default_over_retrieve")]
    pub over_retrieve: usize,

    /// Records kept for the final context
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Above this many candidates reranking is skipped
    #[serde(default = "default_rerank_ceiling")]
    pub rerank_ceiling: usize,

    /// Concurrent rerank calls
    #[serde(default = "default_rerank_concurrency")]
    pub rerank_concurrency: usize,

    /// Overall retrieval deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Optional query rules file (recency phrases, status and genre keywords)
    #[serde(default)]
    pub rules_file: Option<PathBuf>,
}

fn default_fan_out() -> usize {
    3
}

fn default_over_retrieve() -> usize {
    12
}

fn default_top_k() -> usize {
    4
}

fn default_rerank_ceiling() -> usize {
    12
}

fn default_rerank_concurrency() -> usize {
    6
}

fn default_deadline_ms() -> u64 {
    8_000
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            over_retrieve: default_over_retrieve(),
            top_k: default_top_k(),
            rerank_ceiling: default_rerank_ceiling(),
            rerank_concurrency: default_rerank_concurrency(),
            deadline_ms: default_deadline_ms(),
            rules_file: None,
        }
    }
}

/// Answer generation tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.6
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    450
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalSettings>,
    answer: Option<AnswerSettings>,
    database: Option<DatabaseConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
            answer: AnswerSettings::default(),
            database_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `SHELF_WORKSPACE`: Override workspace path
    /// - `SHELF_CONFIG`: Path to config file
    /// - `SHELF_PROVIDER`: LLM provider
    /// - `SHELF_MODEL`: Model identifier
    /// - `SHELF_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use shelf_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("SHELF_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("SHELF_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.shelf_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("SHELF_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("SHELF_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("SHELF_API_KEY").ok();
        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        let has_embedding_section = config_file.embedding.is_some();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        if let Some(answer) = config_file.answer {
            result.answer = answer;
        }

        if let Some(path) = config_file.database.and_then(|db| db.path) {
            result.database_path = Some(PathBuf::from(path));
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            // An embedding section wins; otherwise follow the active embedding provider
            if !has_embedding_section {
                result.embedding.provider = llm.active_embedding_provider.clone();
                if let Some(model) = llm
                    .providers
                    .get(&llm.active_embedding_provider)
                    .and_then(|p| p.embedding_model())
                {
                    result.embedding.model = model.to_string();
                }
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .shelf directory.
    pub fn shelf_dir(&self) -> PathBuf {
        self.workspace.join(".shelf")
    }

    /// Ensure the .shelf directory exists.
    pub fn ensure_shelf_dir(&self) -> AppResult<()> {
        let shelf_dir = self.shelf_dir();
        if !shelf_dir.exists() {
            std::fs::create_dir_all(&shelf_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .shelf directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        match self.database_path {
            Some(ref path) if path.is_absolute() => path.clone(),
            Some(ref path) => self.workspace.join(path),
            None => self.shelf_dir().join("shelf.sqlite"),
        }
    }

    /// Resolved query rules path, if one is configured or present in `.shelf/`.
    pub fn rules_path(&self) -> Option<PathBuf> {
        match self.retrieval.rules_file {
            Some(ref path) if path.is_absolute() => Some(path.clone()),
            Some(ref path) => Some(self.workspace.join(path)),
            None => {
                let default = self.shelf_dir().join("rules.yaml");
                default.exists().then_some(default)
            }
        }
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve the endpoint configured for a provider.
    pub fn resolve_endpoint(&self, provider: &str) -> Option<String> {
        self.get_provider_config(provider)
            .and_then(|pc| pc.endpoint().map(str::to_string))
    }

    /// Resolve API key from the explicit override or the provider's env var.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let env_var = match self.get_provider_config(provider) {
            Some(ProviderConfig::Gemini { api_key_env, .. }) => Some(api_key_env),
            Some(ProviderConfig::Ollama { .. }) => None,
            None if provider == "gemini" => Some("GOOGLE_API_KEY".to_string()),
            None => None,
        };

        env_var.and_then(|var| std::env::var(var).ok())
    }

    /// Validate configuration for the active providers.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        let r = &self.retrieval;
        if r.fan_out == 0 || r.over_retrieve == 0 || r.top_k == 0 || r.rerank_concurrency == 0 {
            return Err(AppError::Config(
                "Retrieval fanOut, overRetrieve, topK and rerankConcurrency must be positive"
                    .to_string(),
            ));
        }

        for provider in [self.provider.as_str(), self.embedding.provider.as_str()] {
            if provider == "gemini" && self.resolve_api_key(provider).is_none() {
                let env_var = match self.get_provider_config(provider) {
                    Some(ProviderConfig::Gemini { api_key_env, .. }) => api_key_env,
                    _ => "GOOGLE_API_KEY".to_string(),
                };
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    env_var
                )));
            }
        }

        Ok(())
    }
}
