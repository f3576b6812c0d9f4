//! Error types for drip-outreach.

use std::path::PathBuf;
use std::time::Duration;

/// Start-up failure: anything that stops a run from being wired together.
///
/// Failures during a run are reported through `RunOutcome`, not this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// The account cannot pay for a request of this size.
    #[error("Provider {provider} reports insufficient credits: {reason}")]
    InsufficientCredits { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether this is the resource-exhaustion class that a smaller request may get past.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::InsufficientCredits { .. })
    }
}

/// Pitch generation errors, after the degraded-retry policy has run.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("Unrecoverable provider error: {0}")]
    Unrecoverable(#[source] LlmError),

    #[error("Provider still out of credits after {attempts} attempts (last budget {last_max_tokens} tokens)")]
    BudgetExhausted { attempts: u32, last_max_tokens: u32 },
}

/// Outbound delivery errors, reported verbatim from the transport.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("SMTP authentication failed: {0}")]
    AuthFailed(String),

    #[error("Recipient {recipient} rejected: {reason}")]
    RecipientRejected { recipient: String, reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Could not reach mail server: {0}")]
    Connection(String),

    #[error("Message rejected by mail server: {0}")]
    Rejected(String),
}

/// Lead store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unexpected columns: expected [{expected}], found [{found}]")]
    Schema { expected: String, found: String },

    #[error("Malformed record at row {row}: {reason}")]
    Malformed { row: usize, reason: String },

    #[error("Failed to persist {}: {reason}", path.display())]
    PersistFailure { path: PathBuf, reason: String },

    #[error("No record at index {index}")]
    UnknownRecord { index: usize },

    #[error("Store {} is locked by another run", path.display())]
    Locked { path: PathBuf },
}

/// Remote sync errors. Never fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
