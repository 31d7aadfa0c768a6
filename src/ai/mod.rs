#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Anthropic Messages API client
pub mod anthropic;
/// Google Gemini client
pub mod gemini;
/// Prompts, response parsing and the grading assistant
pub mod grading;
/// OpenAI-compatible chat completions client
pub mod openai;
/// The provider trait and its error type
pub mod provider;
/// Ordered fallback across providers
pub mod router;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use grading::{
    AssessmentRequest,
    Assessor,
    GradingAssistant,
    GradingResult,
    MISSING_REPO_FEEDBACK,
    PromptFactory,
    ResponseParser,
};
pub use openai::OpenAiClient;
pub use provider::{ProviderClient, ProviderError};
pub use router::{
    Classification,
    ProviderFallbackRouter,
    QUOTA_SIGNATURES,
    QuotaSignatureClassifier,
    ResponseClassifier,
    exhausted_payload,
};

use itertools::Itertools;

use crate::config::{AiSettings, ConfigError, ProviderKind, ProviderSettings};

/// Builds a client for one provider. Returns `None` when it has no API key.
fn build_client(
    settings: &ProviderSettings,
    ai: &AiSettings,
    http: &reqwest::Client,
) -> Option<Box<dyn ProviderClient>> {
    let key = settings.api_key()?;
    let client: Box<dyn ProviderClient> = match settings.kind() {
        ProviderKind::Gemini => Box::new(GeminiClient::new(http.clone(), key, settings.model())),
        ProviderKind::Anthropic => Box::new(AnthropicClient::new(
            http.clone(),
            key,
            settings.model(),
            ai.max_tokens(),
        )),
        ProviderKind::OpenAi => {
            Box::new(OpenAiClient::new(ai.openai_endpoint(), key, settings.model()))
        }
    };
    Some(client)
}

/// Builds the provider chain from settings, keeping the configured order and
/// skipping providers without a key.
pub fn build_router(
    settings: &AiSettings,
    http: reqwest::Client,
) -> Result<ProviderFallbackRouter, ConfigError> {
    let providers: Vec<_> = settings
        .providers()
        .iter()
        .filter_map(|p| build_client(p, settings, &http))
        .collect();

    if providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }

    tracing::info!("AI providers: {}", providers.iter().map(|p| p.name()).join(" -> "));
    Ok(ProviderFallbackRouter::new(providers))
}
