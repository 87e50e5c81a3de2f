pub mod response;

use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

/// Persona for every extraction and classification call.
pub const EXTRACTOR_PERSONA: &str = "You are an assistant that extracts specific information from web page content and formats it as a JSON object.";

/// Persona for the ordinance summary calls.
pub const SUMMARIZER_PERSONA: &str =
    "You are an assistant that summarizes local ordinance data from a collection of sources.";

/// Chat completion with a system role and a user role, returning the raw text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenAiModel {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        debug!("{} usage: {:?}", self.model, response.usage);

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No content in {} response", self.model))
    }
}
