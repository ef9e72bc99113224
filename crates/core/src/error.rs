//! Error types for Docent.

use thiserror::Error;

/// Result type alias using Docent's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Docent.
///
/// Every member has a defined degraded behavior somewhere in the pipeline;
/// none of them is allowed to take the process down.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Safety
    // =========================================================================
    #[error("Input rejected by safety gate: {reason}")]
    InputRejected {
        reason: String,
        categories: Vec<String>,
    },

    // =========================================================================
    // Retrieval
    // =========================================================================
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    // =========================================================================
    // Generation
    // =========================================================================
    #[error("All generation tiers exhausted")]
    GenerationExhausted,

    // =========================================================================
    // Synthesis
    // =========================================================================
    #[error("Synthesis failed for sentence {sequence}")]
    SynthesisSentenceFailed { sequence: u64 },

    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Config load failed: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Transport / lifecycle
    // =========================================================================
    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Generic
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an input-rejected error.
    pub fn input_rejected(reason: impl Into<String>, categories: Vec<String>) -> Self {
        Self::InputRejected {
            reason: reason.into(),
            categories,
        }
    }

    /// Create a retrieval-unavailable error.
    pub fn retrieval_unavailable(msg: impl Into<String>) -> Self {
        Self::RetrievalUnavailable(msg.into())
    }

    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error represents client-side cancellation rather than a
    /// pipeline failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::ClientDisconnected)
    }
}
