//! Error types for inbox-triage.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mail provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Mail provider rejected credentials")]
    AuthFailed,

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error("Failed to build outgoing message: {0}")]
    Compose(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline-related errors.
///
/// Every variant is fatal for the message being processed and never for the
/// batch: the processor turns it into a failed outcome and moves on.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The reasoning call itself failed (transport, auth, bad payload).
    #[error("Decision failed: {0}")]
    Decision(#[from] LlmError),

    /// The model named an action outside the registry or sent arguments
    /// that cannot be turned into parameters.
    #[error("Malformed decision for action '{action}': {reason}")]
    MalformedDecision { action: String, reason: String },

    #[error("Action {action} failed: {reason}")]
    Execution { action: String, reason: String },

    #[error("Thread summary failed: {0}")]
    Summary(LlmError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
