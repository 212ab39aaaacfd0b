//! Error types for the finance assistant orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Fatal / Surfaced Errors
    // =============================

    /// Missing or empty required credential. The only error `process`
    /// surfaces to its caller; everything else degrades to apology text.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The completion service refused the call for quota reasons. Turned
    /// into a distinct user-facing message at the top of `process`.
    #[error("Rate limited by completion service: {0}")]
    RateLimited(String),

    // =============================
    // Recoverable Pipeline Errors
    // =============================

    /// The completion service could not be reached or answered with a
    /// server-side failure.
    #[error("Completion service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The completion service answered, but with nothing usable.
    #[error("Empty completion response: {0}")]
    EmptyCompletion(String),

    /// A voice capability (transcription or speech) failed.
    #[error("Voice service error: {0}")]
    VoiceError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Whether this error must stop processing entirely instead of being
    /// absorbed into a degraded answer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestrationError::Configuration(_))
    }
}
