//! GitHub REST collaborator
//!
//! Every [`RepositoryApi`] call degrades instead of failing: the error is
//! logged per kind and the caller gets `None`, an empty list, an empty
//! string or `false`.

use async_trait::async_trait;
use regex::Regex;
use repogent_core::{positive_id_from_json, HttpConfig, RepoId};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

use crate::auth::{self, GitHubCredentials};
use crate::error::ApiError;

const ACCEPT: &str = "application/vnd.github+json";

/// Author of a commit as GitHub reports it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitAuthor {
    pub login: Option<String>,
    pub email: Option<String>,
}

/// Inline comment on a pull request review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: u64,
    pub body: String,
}

/// Pull request review submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRequest {
    pub commit_id: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<ReviewComment>,
}

impl ReviewRequest {
    /// A plain `COMMENT` review
    pub fn comment(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            event: "COMMENT".to_string(),
            body: None,
            comments: Vec::new(),
        }
    }
}

/// Repository operations used by the agents
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    async fn get_run(&self, run_id: u64) -> Option<Value>;
    async fn get_jobs(&self, run_id: u64) -> Vec<Value>;
    async fn get_job_logs(&self, job_id: u64) -> String;
    async fn get_commit_author(&self, sha: &str) -> Option<CommitAuthor>;
    async fn post_comment(&self, issue_number: u64, body: &str) -> bool;
    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> bool;
    async fn post_review(&self, pr_number: u64, review: &ReviewRequest) -> bool;
}

/// GitHub REST client bound to one repository
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    repo: RepoId,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(credentials: GitHubCredentials, config: &HttpConfig) -> Result<Self, ApiError> {
        let timeout = config.timeout();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.github_api_url.trim_end_matches('/').to_string(),
            token: credentials.token,
            repo: credentials.repo,
            timeout,
        })
    }

    /// Client from `GITHUB_TOKEN` and `GITHUB_REPOSITORY`
    pub fn from_env(config: &HttpConfig) -> Result<Self, ApiError> {
        Self::new(auth::github_credentials()?, config)
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_url,
            self.repo.owner(),
            self.repo.name(),
            path
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_text(&self, path: &str) -> Result<String, ApiError> {
        let response = self.send(self.http.get(self.repo_url(path))).await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let text = self.get_text(path).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::MalformedJson(e.to_string()))
    }

    async fn post_json<T: Serialize + ?Sized + Sync>(&self, path: &str, body: &T) -> Result<(), ApiError> {
        self.send(self.http.post(self.repo_url(path)).json(body)).await?;
        Ok(())
    }

    pub async fn try_get_run(&self, run_id: u64) -> Result<Value, ApiError> {
        let run_id = require_positive(run_id, "run id")?;
        self.get_json(&format!("actions/runs/{}", run_id)).await
    }

    pub async fn try_get_jobs(&self, run_id: u64) -> Result<Vec<Value>, ApiError> {
        let run_id = require_positive(run_id, "run id")?;
        let value = self.get_json(&format!("actions/runs/{}/jobs", run_id)).await?;
        parse_jobs(&value)
    }

    pub async fn try_get_job_logs(&self, job_id: u64) -> Result<String, ApiError> {
        let job_id = require_positive(job_id, "job id")?;
        self.get_text(&format!("actions/jobs/{}/logs", job_id)).await
    }

    pub async fn try_get_commit_author(&self, sha: &str) -> Result<CommitAuthor, ApiError> {
        if !is_commit_sha(sha) {
            return Err(ApiError::InvalidIdentifier(format!("commit sha {:?}", sha)));
        }
        let value = self.get_json(&format!("commits/{}", sha)).await?;
        Ok(parse_commit_author(&value))
    }

    pub async fn try_post_comment(&self, issue_number: u64, body: &str) -> Result<(), ApiError> {
        let issue_number = require_positive(issue_number, "issue number")?;
        self.post_json(
            &format!("issues/{}/comments", issue_number),
            &json!({ "body": body }),
        )
        .await
    }

    pub async fn try_add_labels(&self, issue_number: u64, labels: &[String]) -> Result<(), ApiError> {
        let issue_number = require_positive(issue_number, "issue number")?;
        self.post_json(
            &format!("issues/{}/labels", issue_number),
            &json!({ "labels": labels }),
        )
        .await
    }

    pub async fn try_post_review(&self, pr_number: u64, review: &ReviewRequest) -> Result<(), ApiError> {
        let pr_number = require_positive(pr_number, "PR number")?;
        self.post_json(&format!("pulls/{}/reviews", pr_number), review)
            .await
    }
}

#[async_trait]
impl RepositoryApi for GitHubClient {
    async fn get_run(&self, run_id: u64) -> Option<Value> {
        degrade("get workflow run", self.try_get_run(run_id).await).ok()
    }

    async fn get_jobs(&self, run_id: u64) -> Vec<Value> {
        degrade("get workflow jobs", self.try_get_jobs(run_id).await).unwrap_or_default()
    }

    async fn get_job_logs(&self, job_id: u64) -> String {
        degrade("get job logs", self.try_get_job_logs(job_id).await).unwrap_or_default()
    }

    async fn get_commit_author(&self, sha: &str) -> Option<CommitAuthor> {
        degrade("get commit author", self.try_get_commit_author(sha).await).ok()
    }

    async fn post_comment(&self, issue_number: u64, body: &str) -> bool {
        degrade("post comment", self.try_post_comment(issue_number, body).await).is_ok()
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> bool {
        degrade("add labels", self.try_add_labels(issue_number, labels).await).is_ok()
    }

    async fn post_review(&self, pr_number: u64, review: &ReviewRequest) -> bool {
        degrade("post review", self.try_post_review(pr_number, review).await).is_ok()
    }
}

/// Log a failed call by kind, passing the result through
fn degrade<T>(operation: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        match e {
            ApiError::Timeout(limit) => {
                tracing::error!("Timeout trying to {} (>{}s)", operation, limit.as_secs())
            }
            ApiError::Transport(reason) => tracing::error!("Failed to {}: {}", operation, reason),
            ApiError::Status { status, .. } => {
                tracing::error!("Failed to {}: HTTP {}", operation, status)
            }
            ApiError::MalformedJson(reason) => {
                tracing::error!("Failed to parse {} response: {}", operation, reason)
            }
            ApiError::InvalidIdentifier(_) | ApiError::MissingCredentials(_) => {
                tracing::warn!("Skipping {}: {}", operation, e)
            }
        }
    }
    result
}

fn require_positive(id: u64, what: &str) -> Result<u64, ApiError> {
    if id == 0 {
        return Err(ApiError::InvalidIdentifier(format!("{} must be positive", what)));
    }
    Ok(id)
}

fn is_commit_sha(sha: &str) -> bool {
    static SHA: OnceLock<Regex> = OnceLock::new();
    SHA.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{7,40}$").expect("static regex"))
        .is_match(sha)
}

/// `jobs` array of a jobs listing; absent means none
pub fn parse_jobs(value: &Value) -> Result<Vec<Value>, ApiError> {
    let listing = value
        .as_object()
        .ok_or_else(|| ApiError::MalformedJson("jobs listing is not an object".to_string()))?;
    match listing.get("jobs") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(jobs)) => Ok(jobs.clone()),
        Some(_) => Err(ApiError::MalformedJson("jobs is not an array".to_string())),
    }
}

/// Login from `author.login`, email from `commit.author.email`
pub fn parse_commit_author(value: &Value) -> CommitAuthor {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
    CommitAuthor {
        login: text(value.pointer("/author/login")),
        email: text(value.pointer("/commit/author/email")),
    }
}

/// Pull request number associated with a workflow run
///
/// Prefers `pull_requests[0].number`, then a `pull/<n>` or `pulls/<n>`
/// segment in `head_branch`.
pub fn related_pull_request(run: &Value) -> Option<u64> {
    if let Some(number) = run
        .pointer("/pull_requests/0/number")
        .and_then(positive_id_from_json)
    {
        return Some(number);
    }

    static PR_REF: OnceLock<Regex> = OnceLock::new();
    let pattern = PR_REF.get_or_init(|| Regex::new(r"pulls?/(\d+)").expect("static regex"));

    let branch = run.get("head_branch").and_then(Value::as_str)?;
    pattern
        .captures(branch)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .filter(|n| *n > 0)
}
