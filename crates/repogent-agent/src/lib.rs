//! # repogent-agent
//!
//! External collaborators for Repogent agents.
//!
//! - [`LlmClient`] / [`GroqClient`]: one stateless chat completion per call
//! - [`RepositoryApi`] / [`GitHubClient`]: the GitHub REST calls the agents make
//!
//! Neither collaborator can fail an agent run on its own. Repository calls
//! degrade to empty results; completion errors are typed so callers can tell
//! an empty answer from no answer.

mod auth;
mod error;
mod github;
mod llm;

pub use auth::{github_credentials, llm_api_key, GitHubCredentials, GITHUB_REPOSITORY_ENV, GITHUB_TOKEN_ENV};
pub use error::{ApiError, LlmError};
pub use github::{
    parse_commit_author, parse_jobs, related_pull_request, CommitAuthor, GitHubClient,
    RepositoryApi, ReviewComment, ReviewRequest,
};
pub use llm::{parse_completion, CompletionRequest, GroqClient, LlmClient};
