//! Error types for the MindThread domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum; the top-level [`Error`]
//! wraps them and maps every variant onto an [`ErrorKind`] for metrics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all MindThread operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory engine errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Speech errors ---
    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Input validation ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Request pipeline ---
    #[error("Processing error: {0}")]
    Processing(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error is counted under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(_) | Self::Speech(_) => ErrorKind::Network,
            Self::Memory(_) => ErrorKind::Memory,
            Self::Capability(_) => ErrorKind::Capability,
            Self::Config { .. } => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Processing(_) | Self::Serialization(_) => ErrorKind::Processing,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error taxonomy used for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Capability,
    Memory,
    Processing,
    Network,
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Capability => "capability",
            Self::Memory => "memory",
            Self::Processing => "processing",
            Self::Network => "network",
            Self::Validation => "validation",
        };
        f.write_str(s)
    }
}

// --- Boundary errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory engine not initialized")]
    NotInitialized,

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Clustering failed: {0}")]
    ClusteringFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability already registered: {0}")]
    Duplicate(String),

    #[error("Invalid capability arguments: {0}")]
    InvalidArguments(String),

    #[error("Capability '{id}' failed: {reason}")]
    Failed { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("Speech engine not configured")]
    NotConfigured,

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn errors_map_to_kinds() {
        assert_eq!(
            Error::Provider(ProviderError::Network("down".into())).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            Error::Speech(SpeechError::NotConfigured).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            Error::Memory(MemoryError::Storage("disk".into())).kind(),
            ErrorKind::Memory
        );
        assert_eq!(Error::config("bad").kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::Validation("empty".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::Capability(CapabilityError::Duplicate("x".into())).kind(),
            ErrorKind::Capability
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Configuration).unwrap();
        assert_eq!(json, "\"configuration\"");
        assert_eq!(ErrorKind::Network.to_string(), "network");
    }
}
