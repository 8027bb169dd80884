//! Collaborator error types
//!
//! Timeouts, transport failures, HTTP status errors and malformed bodies
//! are kept apart so each caller can log and degrade per case.

use std::time::Duration;
use thiserror::Error;

/// Repository (GitHub REST) failures
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed JSON response: {0}")]
    MalformedJson(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("missing GitHub credentials: {0}")]
    MissingCredentials(String),
}

impl ApiError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::MalformedJson(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// LLM completion failures
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("completion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedJson(String),

    /// The response parsed but carried no message content
    #[error("completion returned no content")]
    NoContent,

    #[error("no API key found in ${0}")]
    MissingApiKey(String),
}

impl LlmError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::MalformedJson(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
