//! Configuration management for Repogent
//!
//! This module provides repository-level settings: where the durable
//! queue and context store live, their resource ceilings, routing, HTTP
//! behaviour for collaborators, and model selection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{RepogentError, Result};

/// Repository-level Repogent configuration
///
/// Loaded from `.repogent/config.toml` in the repo root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepogentConfig {
    /// Locations of the durable stores
    #[serde(default)]
    pub storage: StorageConfig,

    /// Size and count ceilings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Event routing
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Model selection
    #[serde(default)]
    pub models: ModelConfig,
}

/// Storage locations, relative to the repository root unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

/// Resource ceilings for the durable stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum serialized payload per message
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Maximum pending messages before eviction
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    /// Maximum serialized context record
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,

    /// Maximum number of context files before eviction
    #[serde(default = "default_max_context_files")]
    pub max_context_files: usize,

    /// Records removed per context eviction pass
    #[serde(default = "default_context_eviction_batch")]
    pub context_eviction_batch: usize,

    /// Sanitized context ids are cut to this many characters
    #[serde(default = "default_max_context_id_len")]
    pub max_context_id_len: usize,

    /// Temp files older than this are treated as crash leftovers
    #[serde(default = "default_orphan_temp_max_age_secs")]
    pub orphan_temp_max_age_secs: u64,
}

/// Event routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Mention token that sends a comment to the community assistant
    #[serde(default = "default_mention")]
    pub mention: String,
}

/// Outbound HTTP configuration for collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub default: String,

    #[serde(default)]
    pub pr_review: Option<String>,

    #[serde(default)]
    pub issue_triage: Option<String>,

    #[serde(default)]
    pub community_qa: Option<String>,

    #[serde(default)]
    pub comment_response: Option<String>,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

// Default value providers
fn default_root() -> PathBuf {
    PathBuf::from(".repogent")
}

fn default_max_payload_bytes() -> usize {
    512 * 1024
}

fn default_max_queue_depth() -> usize {
    100
}

fn default_max_context_bytes() -> usize {
    1024 * 1024
}

fn default_max_context_files() -> usize {
    1000
}

fn default_context_eviction_batch() -> usize {
    100
}

fn default_max_context_id_len() -> usize {
    100
}

fn default_orphan_temp_max_age_secs() -> u64 {
    3600
}

fn default_mention() -> String {
    "@repogent".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Repogent/1.0".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

impl RepogentConfig {
    /// Load configuration from `.repogent/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".repogent/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RepogentError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.repogent/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<PathBuf> {
        let config_dir = repo_root.join(".repogent");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| RepogentError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject limits that would make the stores unusable
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.max_queue_depth == 0 {
            return Err(RepogentError::Config("max_queue_depth must be positive".into()));
        }
        if limits.max_context_files == 0 || limits.context_eviction_batch == 0 {
            return Err(RepogentError::Config(
                "max_context_files and context_eviction_batch must be positive".into(),
            ));
        }
        if limits.max_context_id_len == 0 {
            return Err(RepogentError::Config("max_context_id_len must be positive".into()));
        }
        if self.routing.mention.trim().is_empty() {
            return Err(RepogentError::Config("routing.mention cannot be empty".into()));
        }
        Ok(())
    }

    /// Storage root resolved against the repository root
    pub fn storage_root(&self, repo_root: &Path) -> PathBuf {
        if self.storage.root.is_absolute() {
            self.storage.root.clone()
        } else {
            repo_root.join(&self.storage.root)
        }
    }

    pub fn queue_dir(&self, repo_root: &Path) -> PathBuf {
        self.storage_root(repo_root).join("queue")
    }

    pub fn context_dir(&self, repo_root: &Path) -> PathBuf {
        self.storage_root(repo_root).join("context")
    }

    pub fn log_dir(&self, repo_root: &Path) -> PathBuf {
        self.storage_root(repo_root).join("logs")
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ModelConfig {
    /// Model for a task: `pr_review`, `issue_triage`, `community_qa` or
    /// `comment_response`. Unknown tasks get the PR review model.
    pub fn model_for_task(&self, task: &str) -> &str {
        let configured = match task {
            "issue_triage" => &self.issue_triage,
            "community_qa" => &self.community_qa,
            "comment_response" => &self.comment_response,
            _ => &self.pr_review,
        };
        configured.as_deref().unwrap_or(&self.default)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_queue_depth: default_max_queue_depth(),
            max_context_bytes: default_max_context_bytes(),
            max_context_files: default_max_context_files(),
            context_eviction_batch: default_context_eviction_batch(),
            max_context_id_len: default_max_context_id_len(),
            orphan_temp_max_age_secs: default_orphan_temp_max_age_secs(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mention: default_mention(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            github_api_url: default_github_api_url(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            pr_review: None,
            issue_triage: None,
            community_qa: None,
            comment_response: None,
            api_key_env: default_api_key_env(),
            api_url: default_api_url(),
        }
    }
}
