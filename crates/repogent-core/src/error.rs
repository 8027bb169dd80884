//! Unified error types for Repogent

use thiserror::Error;

/// Unified error type for queue, context and orchestration operations
#[derive(Error, Debug)]
pub enum RepogentError {
    // Message errors
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Missing required fields in message data: {0:?}")]
    MissingFields(Vec<String>),

    // Storage errors
    #[error("Invalid context path - directory traversal detected: {0}")]
    PathTraversal(String),

    #[error("Context data too large: {size} bytes (max {max})")]
    ContextTooLarge { size: usize, max: usize },

    // Validation errors
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl RepogentError {
    /// True for errors raised by boundary validation rather than storage
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMessage(_)
                | Self::PayloadTooLarge { .. }
                | Self::MissingFields(_)
                | Self::InvalidIdentifier(_)
        )
    }
}

/// Result type alias using RepogentError
pub type Result<T> = std::result::Result<T, RepogentError>;
