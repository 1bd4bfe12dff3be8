//! Answer generation over retrieved shelf context.

use super::retriever::{ContextRetriever, RetrievedContext};
use crate::types::UserId;
use serde::Serialize;
use shelf_core::config::AnswerSettings;
use shelf_core::AppResult;
use shelf_llm::{LlmClient, LlmRequest, LlmStream};
use shelf_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// A complete answer with the context it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub model: String,
    pub context: RetrievedContext,
}

/// Book companion that answers questions about a user's shelf.
pub struct BookAssistant {
    retriever: ContextRetriever,
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    settings: AnswerSettings,
}

impl BookAssistant {
    pub fn new(
        retriever: ContextRetriever,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompt: PromptDefinition,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            retriever,
            llm,
            model: model.into(),
            prompt,
            settings,
        }
    }

    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    /// Retrieve context and generate the full answer.
    pub async fn ask(&self, user_id: UserId, question: &str) -> AppResult<Answer> {
        let context = self.retriever.retrieve(user_id, question).await?;
        let request = self.build_request(question, &context)?;

        tracing::debug!("Generating answer with {}", self.model);
        let response = self.llm.complete(&request).await?;

        Ok(Answer {
            answer: response.content.trim().to_string(),
            model: response.model,
            context,
        })
    }

    /// Retrieve context and stream the answer as it is generated.
    pub async fn stream_ask(
        &self,
        user_id: UserId,
        question: &str,
    ) -> AppResult<(RetrievedContext, LlmStream)> {
        let context = self.retriever.retrieve(user_id, question).await?;
        let request = self.build_request(question, &context)?.with_streaming();

        tracing::debug!("Streaming answer with {}", self.model);
        let stream = self.llm.stream(&request).await?;
        Ok((context, stream))
    }

    fn build_request(&self, question: &str, context: &RetrievedContext) -> AppResult<LlmRequest> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.trim().to_string());
        variables.insert("context".to_string(), context.text());

        let built = build_prompt(&self.prompt, variables)?;

        let mut request = LlmRequest::new(built.user, &self.model)
            .with_temperature(self.settings.temperature)
            .with_top_p(self.settings.top_p)
            .with_max_tokens(self.settings.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        Ok(request)
    }
}
