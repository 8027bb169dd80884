//! Input validation for environment-provided identifiers
//!
//! Issue, PR and run numbers and the repository slug come from the CI
//! environment or from event payloads. They MUST be validated before they
//! are used as storage keys or interpolated into API URLs.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::{RepogentError, Result};

fn repo_part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"))
}

/// Validate a decimal string as a positive integer (issue, PR, run or job id)
pub fn validate_positive_id(input: &str, context: &str) -> Result<u64> {
    if input.is_empty() {
        return Err(RepogentError::InvalidIdentifier(format!(
            "{} cannot be empty",
            context
        )));
    }
    if !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(RepogentError::InvalidIdentifier(format!(
            "{} must be a positive integer, got '{}'",
            context, input
        )));
    }
    match input.parse::<u64>() {
        Ok(0) => Err(RepogentError::InvalidIdentifier(format!(
            "{} must be positive, got 0",
            context
        ))),
        Ok(n) => Ok(n),
        Err(_) => Err(RepogentError::InvalidIdentifier(format!(
            "{} is out of range: '{}'",
            context, input
        ))),
    }
}

/// Accept only a JSON positive integer; strings, floats and booleans are rejected
pub fn positive_id_from_json(value: &Value) -> Option<u64> {
    value.as_u64().filter(|n| *n > 0)
}

/// Repository identifier in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Validate `owner/name`
    pub fn parse(input: &str) -> Result<Self> {
        let (owner, name) = input.split_once('/').ok_or_else(|| {
            RepogentError::InvalidIdentifier(format!(
                "repository must be in owner/name form, got '{}'",
                input
            ))
        })?;

        for part in [owner, name] {
            if part == "." || part == ".." || !repo_part_pattern().is_match(part) {
                return Err(RepogentError::InvalidIdentifier(format!(
                    "repository contains unsafe characters: '{}'. Only alphanumeric, '_', '-', '.' are allowed.",
                    input
                )));
            }
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoId {
    type Err = RepogentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
