#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use async_openai::{
    Client as OpenAIClient,
    config::OpenAIConfig,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use futures::{FutureExt, future::BoxFuture};

use super::provider::{ProviderClient, ProviderError, request_error};

/// Any OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    /// async-openai client bound to the endpoint and key
    client: OpenAIClient<OpenAIConfig>,
    /// Model identifier
    model:  String,
}

impl OpenAiClient {
    /// Creates a client for `model` at `api_base`.
    pub fn new(api_base: &str, api_key: &str, model: impl Into<String>) -> Self {
        let client = OpenAIClient::with_config(
            OpenAIConfig::new()
                .with_api_base(api_base)
                .with_api_key(api_key),
        );
        Self {
            client,
            model: model.into(),
        }
    }

    /// Sends the prompt as a single user message.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| request_error(self.name(), e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .build()
            .map_err(|e| request_error(self.name(), e))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| request_error(self.name(), e))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.name().to_string(),
            })
    }
}

impl ProviderClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn submit<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        self.complete(prompt).boxed()
    }
}
