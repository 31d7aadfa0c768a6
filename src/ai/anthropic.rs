#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use futures::{FutureExt, future::BoxFuture};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::{ProviderClient, ProviderError, request_error, status_error};

/// Messages API endpoint.
const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Response shape of the Messages API; only text blocks matter here.
#[derive(Deserialize)]
struct MessagesResponse {
    /// Content blocks
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// One content block.
#[derive(Deserialize)]
struct ContentBlock {
    /// Text, for `text` blocks
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Claude over the Messages API.
pub struct AnthropicClient {
    /// Shared HTTP client
    http:       Client,
    /// API key
    api_key:    String,
    /// Model identifier
    model:      String,
    /// Token cap for the reply
    max_tokens: u32,
}

impl AnthropicClient {
    /// Creates a client for `model`.
    pub fn new(
        http: Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    /// Sends the request and extracts the text.
    async fn create_message(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(ANTHROPIC_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(self.name(), status, text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| request_error(self.name(), e))?;
        let text: String = parsed.content.into_iter().filter_map(|b| b.text).collect();

        if text.is_empty() {
            Err(ProviderError::EmptyResponse {
                provider: self.name().to_string(),
            })
        } else {
            Ok(text)
        }
    }
}

impl ProviderClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn submit<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        self.create_message(prompt).boxed()
    }
}
