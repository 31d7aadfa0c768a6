#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use super::provider::ProviderClient;

/// Substrings that mark a response body as a quota or rate-limit refusal
/// rather than real content. Matched case-insensitively.
pub const QUOTA_SIGNATURES: [&str; 4] = ["429", "quota", "rate limit", "exceeded"];

/// Sentinel for "no provider has succeeded yet".
const NO_PROVIDER: usize = usize::MAX;

/// How the router should treat a response that arrived without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Genuine content; return it.
    Ok,
    /// A refusal dressed up as a response; try the next provider.
    SoftFailure(String),
}

/// Decides whether a response body is usable.
pub trait ResponseClassifier: Send + Sync {
    /// Classifies `text`.
    fn classify(&self, text: &str) -> Classification;
}

impl<F> ResponseClassifier for F
where
    F: Fn(&str) -> Classification + Send + Sync,
{
    fn classify(&self, text: &str) -> Classification {
        self(text)
    }
}

/// The default classifier: looks for any of [`QUOTA_SIGNATURES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaSignatureClassifier;

impl ResponseClassifier for QuotaSignatureClassifier {
    fn classify(&self, text: &str) -> Classification {
        let lowered = text.to_lowercase();
        match QUOTA_SIGNATURES.iter().find(|sig| lowered.contains(*sig)) {
            Some(sig) => Classification::SoftFailure(format!("response mentions `{sig}`")),
            None => Classification::Ok,
        }
    }
}

/// Sends prompts to an ordered list of providers, falling through to the next
/// one whenever a provider errors or answers with a quota refusal.
pub struct ProviderFallbackRouter {
    /// Providers in preference order
    providers:  Vec<Box<dyn ProviderClient>>,
    /// Decides whether a response is usable
    classifier: Box<dyn ResponseClassifier>,
    /// Index of the provider that most recently succeeded; only used to log
    /// provider switches
    current:    AtomicUsize,
}

impl ProviderFallbackRouter {
    /// Creates a router over `providers` using [`QuotaSignatureClassifier`].
    pub fn new(providers: Vec<Box<dyn ProviderClient>>) -> Self {
        Self {
            providers,
            classifier: Box::new(QuotaSignatureClassifier),
            current: AtomicUsize::new(NO_PROVIDER),
        }
    }

    /// Replaces the response classifier.
    pub fn with_classifier(mut self, classifier: impl ResponseClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Whether any provider is configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Index of the provider that most recently answered, if any.
    pub fn current_index(&self) -> Option<usize> {
        match self.current.load(Ordering::Relaxed) {
            NO_PROVIDER => None,
            idx => Some(idx),
        }
    }

    /// Name of the provider that most recently answered, if any.
    pub fn current_provider(&self) -> Option<&str> {
        self.current_index()
            .and_then(|idx| self.providers.get(idx))
            .map(|p| p.name())
    }

    /// Sends `prompt` to each provider in order and returns the first usable
    /// response. Every call starts again from the first provider.
    ///
    /// This never fails: when every provider errors or refuses, the result is
    /// a JSON grading payload with a zero score and zero confidence that
    /// names the last error.
    pub async fn route(&self, prompt: &str) -> String {
        let mut last_error = String::from("no AI providers configured");

        for (idx, provider) in self.providers.iter().enumerate() {
            match provider.submit(prompt).await {
                Err(e) => {
                    tracing::warn!("{} failed, trying next provider: {e}", provider.name());
                    last_error = e.to_string();
                }
                Ok(text) => match self.classifier.classify(&text) {
                    Classification::SoftFailure(reason) => {
                        tracing::warn!(
                            "Quota limit hit for {} ({reason}), trying next provider",
                            provider.name()
                        );
                        last_error = format!("{}: {}", provider.name(), text.trim());
                    }
                    Classification::Ok => {
                        let previous = self.current.swap(idx, Ordering::Relaxed);
                        if previous != idx {
                            tracing::info!("Switched to {}", provider.name());
                        }
                        return text;
                    }
                },
            }
        }

        tracing::error!("All AI providers failed; last error: {last_error}");
        exhausted_payload(&last_error)
    }
}

/// The payload returned when no provider produced a usable response.
pub fn exhausted_payload(last_error: &str) -> String {
    json!({
        "score": 0,
        "feedback": format!("All AI providers failed. Last error: {last_error}"),
        "suggestions": [],
        "confidence": 0.0,
    })
    .to_string()
}
