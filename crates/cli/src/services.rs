//! Shared clients for command handlers.
//!
//! Opens the database and builds the model and embedding clients once per
//! invocation; commands borrow what they need.

use shelf_core::{config::AppConfig, AppError, AppResult};
use shelf_llm::{create_client, LlmClient};
use shelf_prompt::PromptSet;
use shelf_retrieval::{
    create_provider, BookAssistant, ContextRetriever, EmbeddingIndexer, EmbeddingProvider,
    QueryRules, Shelf, SqliteStore,
};
use std::sync::Arc;

pub struct Services {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl Services {
    /// Validate the configuration and build every client.
    pub fn open(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let db_path = config.database_path();
        tracing::debug!("Opening database {:?}", db_path);
        let store = Arc::new(SqliteStore::open(&db_path)?);

        let endpoint = config.resolve_endpoint(&config.provider);
        let api_key = config.resolve_api_key(&config.provider);
        let llm = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())
            .map_err(AppError::Config)?;

        let embedding_provider = config.embedding.provider.as_str();
        let embedder = create_provider(
            &config.embedding,
            config.resolve_endpoint(embedding_provider).as_deref(),
            config.resolve_api_key(embedding_provider).as_deref(),
        )?;

        Ok(Self {
            config: config.clone(),
            store,
            llm,
            embedder,
        })
    }

    pub fn indexer(&self) -> EmbeddingIndexer {
        EmbeddingIndexer::new(self.embedder.clone(), self.store.clone())
    }

    /// Shelf service that re-embeds entries on every save.
    pub fn shelf(&self) -> Shelf {
        Shelf::new(self.store.clone()).with_observer(Arc::new(self.indexer()))
    }

    pub fn retriever(&self) -> AppResult<ContextRetriever> {
        let prompts = PromptSet::load(&self.config.workspace)?;
        self.build_retriever(&prompts)
    }

    pub fn assistant(&self) -> AppResult<BookAssistant> {
        let prompts = PromptSet::load(&self.config.workspace)?;
        let retriever = self.build_retriever(&prompts)?;

        Ok(BookAssistant::new(
            retriever,
            self.llm.clone(),
            self.config.model.clone(),
            prompts.answer,
            self.config.answer.clone(),
        ))
    }

    fn build_retriever(&self, prompts: &PromptSet) -> AppResult<ContextRetriever> {
        let rules_path = self.config.rules_path();
        if let Some(ref path) = rules_path {
            tracing::debug!("Loading query rules from {:?}", path);
        }
        let rules = QueryRules::load_or_default(rules_path.as_deref())?;

        Ok(ContextRetriever::new(
            self.llm.clone(),
            self.config.model.clone(),
            self.embedder.clone(),
            self.store.clone(),
            prompts,
            rules,
            &self.config.retrieval,
        ))
    }
}
