//! LLM integration.
//!
//! Supports:
//! - **Gemini**: `generateContent` REST API
//! - **Anthropic**: Messages API
//! - **OpenAI**: Chat Completions API
//!
//! Each backend is a thin `reqwest` client that maps HTTP failures onto
//! `LlmError`, keeping insufficient-credit responses distinguishable from
//! every other failure so the pitch writer can degrade and retry.

mod anthropic;
mod gemini;
mod openai;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::LlmError;

/// Per-request timeout for generation calls.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Override for the provider's API root (used by tests and proxies).
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Gemini => Arc::new(GeminiProvider::new(config)?),
        LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(config)?),
        LlmBackend::OpenAi => Arc::new(OpenAiProvider::new(config)?),
    };
    tracing::info!(backend = ?config.backend, model = %config.model, "LLM provider ready");
    Ok(provider)
}

pub(crate) fn http_client(provider: &str) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    let reason = if err.is_timeout() {
        format!("timed out after {}s", REQUEST_TIMEOUT.as_secs())
    } else {
        err.to_string()
    };
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason,
    }
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success HTTP status onto `LlmError`.
///
/// `credits_exhausted` is the backend's own reading of the body; HTTP 402
/// always counts as exhaustion.
pub(crate) fn classify_http_error(
    provider: &str,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
    credits_exhausted: bool,
) -> LlmError {
    let provider = provider.to_string();
    let snippet: String = body.chars().take(200).collect();

    if credits_exhausted || status == StatusCode::PAYMENT_REQUIRED {
        return LlmError::InsufficientCredits {
            provider,
            reason: snippet,
        };
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed { provider },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider,
            retry_after,
        },
        _ => LlmError::RequestFailed {
            provider,
            reason: format!("HTTP {}: {}", status.as_u16(), snippet),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backend_parses_aliases() {
        assert_eq!("Gemini".parse::<LlmBackend>(), Ok(LlmBackend::Gemini));
        assert_eq!("claude".parse::<LlmBackend>(), Ok(LlmBackend::Anthropic));
        assert_eq!(" openai ".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert!("mistral".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn payment_required_is_credit_exhaustion() {
        let err = classify_http_error("x", StatusCode::PAYMENT_REQUIRED, "pay up", None, false);
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn backend_hint_overrides_status() {
        let err = classify_http_error("x", StatusCode::BAD_REQUEST, "low balance", None, true);
        assert!(err.is_resource_exhausted());
    }

    #[test]
    fn auth_and_rate_limit_are_not_exhaustion() {
        let auth = classify_http_error("x", StatusCode::UNAUTHORIZED, "", None, false);
        assert!(matches!(auth, LlmError::AuthFailed { .. }));

        let limited = classify_http_error(
            "x",
            StatusCode::TOO_MANY_REQUESTS,
            "",
            Some(Duration::from_secs(7)),
            false,
        );
        match limited {
            LlmError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_status_truncates_body() {
        let body = "x".repeat(500);
        let err = classify_http_error("x", StatusCode::INTERNAL_SERVER_ERROR, &body, None, false);
        match err {
            LlmError::RequestFailed { reason, .. } => {
                assert!(reason.starts_with("HTTP 500: "));
                assert_eq!(reason.len(), "HTTP 500: ".len() + 200);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn retry_after_header_parsed_as_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }
}
