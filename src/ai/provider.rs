#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use futures::future::BoxFuture;

/// Ways a provider call can fail outright.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// The provider answered with HTTP 429 or an equivalent quota error.
    #[error("{provider} is rate limited (HTTP {status})")]
    RateLimited {
        /// Provider name
        provider: String,
        /// Status code returned
        status:   u16,
    },
    /// The provider answered with a non-success status.
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        /// Provider name
        provider: String,
        /// Status code returned
        status:   u16,
        /// Response body, for diagnostics
        body:     String,
    },
    /// The request never produced a response.
    #[error("request to {provider} failed: {message}")]
    Request {
        /// Provider name
        provider: String,
        /// Transport or client error text
        message:  String,
    },
    /// The response parsed, but had no text in it.
    #[error("{provider} returned no text")]
    EmptyResponse {
        /// Provider name
        provider: String,
    },
}

/// One AI backend. Implementations send a single prompt and return the raw
/// response text; interpreting it is somebody else's job.
pub trait ProviderClient: Send + Sync {
    /// Short name used in logs, e.g. `gemini`.
    fn name(&self) -> &str;

    /// Sends `prompt` and returns the model's text.
    fn submit<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ProviderError>>;
}

/// Maps a non-success HTTP status to a [`ProviderError`].
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: String) -> ProviderError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited {
            provider: provider.to_string(),
            status:   status.as_u16(),
        }
    } else {
        ProviderError::Status {
            provider: provider.to_string(),
            status:   status.as_u16(),
            body,
        }
    }
}

/// Maps a transport error to a [`ProviderError`].
pub(crate) fn request_error(provider: &str, err: impl std::fmt::Display) -> ProviderError {
    ProviderError::Request {
        provider: provider.to_string(),
        message:  err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn status_mapping() {
        let limited = status_error("gemini", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(matches!(limited, ProviderError::RateLimited { status: 429, .. }));

        let failed = status_error("claude", StatusCode::BAD_GATEWAY, "upstream".to_string());
        match failed {
            ProviderError::Status { provider, status, body } => {
                assert_eq!(provider, "claude");
                assert_eq!(status, 502);
                assert_eq!(body, "upstream");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
