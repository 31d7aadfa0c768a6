#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use futures::{FutureExt, future::BoxFuture};
use reqwest::Client;
use serde_json::{Value, json};

use super::provider::{ProviderClient, ProviderError, request_error, status_error};

/// Base URL of the Generative Language API.
const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Safety categories that are switched off; student code routinely trips
/// them for no reason.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Google Gemini over the REST `generateContent` endpoint.
pub struct GeminiClient {
    /// Shared HTTP client
    http:    Client,
    /// API key
    api_key: String,
    /// Model identifier
    model:   String,
}

impl GeminiClient {
    /// Creates a client for `model`.
    pub fn new(http: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Sends the request and extracts the text.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "safetySettings": SAFETY_CATEGORIES
                .iter()
                .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
                .collect::<Vec<_>>(),
            "generationConfig": { "responseMimeType": "application/json" },
        });

        let response = self
            .http
            .post(format!("{GEMINI_ENDPOINT}/{}:generateContent", self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| request_error(self.name(), e))?;
        if !status.is_success() {
            return Err(status_error(self.name(), status, text));
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| request_error(self.name(), e))?;
        Ok(extract_text(&value).unwrap_or_else(|| blocked_payload(&value)))
    }
}

/// Joins the text parts of the first candidate.
fn extract_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// A blocked prompt still produces a gradeable payload, so the student gets a
/// zero with the reason instead of a crash.
fn blocked_payload(value: &Value) -> String {
    let reason = value
        .get("promptFeedback")
        .map(Value::to_string)
        .unwrap_or_else(|| "no candidates returned".to_string());
    json!({
        "score": 0,
        "feedback": format!("AI Error: Response blocked. Reason: {reason}"),
        "suggestions": [],
        "confidence": 0.0,
    })
    .to_string()
}

impl ProviderClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn submit<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>> {
        self.generate(prompt).boxed()
    }
}
