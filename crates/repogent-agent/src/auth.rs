//! Credentials from the job environment
//!
//! - LLM key: the variable named by `models.api_key_env` (default `GROQ_API_KEY`)
//! - GitHub: `GITHUB_TOKEN` plus `GITHUB_REPOSITORY` in `owner/name` form

use repogent_core::RepoId;
use std::env;

use crate::error::{ApiError, LlmError};

pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const GITHUB_REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";

/// Token and validated repository for GitHub calls
#[derive(Debug, Clone)]
pub struct GitHubCredentials {
    pub token: String,
    pub repo: RepoId,
}

/// Read the LLM API key from `env_var`
pub fn llm_api_key(env_var: &str) -> Result<String, LlmError> {
    match env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!("Using LLM key from {}", env_var);
            Ok(key)
        }
        _ => Err(LlmError::MissingApiKey(env_var.to_string())),
    }
}

/// Read GitHub credentials, validating the repository identifier
pub fn github_credentials() -> Result<GitHubCredentials, ApiError> {
    let token = env::var(GITHUB_TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::MissingCredentials(format!("{} is not set", GITHUB_TOKEN_ENV)))?;

    let raw_repo = env::var(GITHUB_REPOSITORY_ENV).map_err(|_| {
        ApiError::MissingCredentials(format!("{} is not set", GITHUB_REPOSITORY_ENV))
    })?;
    let repo = RepoId::parse(&raw_repo).map_err(|e| ApiError::InvalidIdentifier(e.to_string()))?;

    Ok(GitHubCredentials { token, repo })
}
