//! Durable context shared across agent runs
//!
//! One JSON record per sanitized context id:
//!
//! ```json
//! {"id": "pr_42", "data": {...}, "updated_at": "..."}
//! ```
//!
//! Context is advisory. A record that cannot be read is reported as absent
//! rather than failing the caller.

use chrono::Utc;
use repogent_core::{LimitsConfig, RepogentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument, warn};

use crate::durable::{self, RECORD_EXTENSION};

/// Key prefix for pull request context
const PR_CONTEXT_PREFIX: &str = "pr_";

/// A stored context document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub data: Value,
    pub updated_at: String,
}

/// How an entity context save treated the previous record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityWrite {
    /// No usable prior record
    Created,
    /// New keys merged into the prior mapping
    Merged,
    /// Prior record held non-mapping data and was overwritten
    ReplacedMalformed,
}

/// File-backed context store
pub struct ContextStore {
    dir: PathBuf,
    max_files: usize,
    max_record_bytes: usize,
    eviction_batch: usize,
    max_id_len: usize,
}

impl ContextStore {
    /// Open (creating if needed) a store with default limits
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_limits(dir, &LimitsConfig::default())
    }

    /// Open (creating if needed) a store with configured limits
    pub fn with_limits(dir: impl AsRef<Path>, limits: &LimitsConfig) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let dir = fs::canonicalize(dir.as_ref())?;
        Ok(Self {
            dir,
            max_files: limits.max_context_files.max(1),
            max_record_bytes: limits.max_context_bytes,
            eviction_batch: limits.context_eviction_batch.max(1),
            max_id_len: limits.max_context_id_len.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Strip traversal sequences and separators and cap the length
    ///
    /// A safety transform only; distinct exotic ids may collide.
    pub fn sanitize(&self, context_id: &str) -> String {
        sanitize_context_id(context_id, self.max_id_len)
    }

    /// Record path for a sanitized id, checked to sit directly inside the store
    ///
    /// The check is structural and never resolves symlinks.
    fn contained_path(&self, safe_id: &str) -> Result<PathBuf> {
        if safe_id.is_empty() {
            return Err(RepogentError::InvalidIdentifier(
                "context id is empty after sanitization".to_string(),
            ));
        }

        let path = self.dir.join(format!("{}.{}", safe_id, RECORD_EXTENSION));
        let relative = path
            .strip_prefix(&self.dir)
            .map_err(|_| RepogentError::PathTraversal(safe_id.to_string()))?;

        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(path),
            _ => Err(RepogentError::PathTraversal(safe_id.to_string())),
        }
    }

    /// Save `data` under `context_id`, replacing any previous record
    #[instrument(skip(self, data))]
    pub fn save(&self, context_id: &str, data: &Map<String, Value>) -> Result<ContextRecord> {
        let safe_id = self.sanitize(context_id);
        let path = self.contained_path(&safe_id)?;

        let record = ContextRecord {
            id: safe_id,
            data: Value::Object(data.clone()),
            updated_at: Utc::now().to_rfc3339(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        if bytes.len() > self.max_record_bytes {
            return Err(RepogentError::ContextTooLarge {
                size: bytes.len(),
                max: self.max_record_bytes,
            });
        }

        self.enforce_capacity()?;
        durable::write_atomic(&self.dir, &path, &bytes)?;

        debug!(id = %record.id, bytes = bytes.len(), "Context saved");
        Ok(record)
    }

    /// Load the record for `context_id`; unreadable or corrupt records are absent
    #[instrument(skip(self))]
    pub fn load(&self, context_id: &str) -> Option<ContextRecord> {
        let safe_id = self.sanitize(context_id);
        let path = match self.contained_path(&safe_id) {
            Ok(path) => path,
            Err(e) => {
                warn!("Invalid context path rejected: {} ({})", context_id, e);
                return None;
            }
        };

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                warn!("Refusing to read context through symlink: {}", path.display());
                return None;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to load context {}: {}", context_id, e);
                return None;
            }
        }

        let parsed = fs::read(&path)
            .map_err(RepogentError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<ContextRecord>(&bytes)?));
        match parsed {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Failed to load context {}: {}", context_id, e);
                None
            }
        }
    }

    /// Context for a pull request
    pub fn get_pr_context(&self, pr_number: u64) -> Option<ContextRecord> {
        if pr_number == 0 {
            warn!("Invalid PR number: {}", pr_number);
            return None;
        }
        self.load(&pr_context_id(pr_number))
    }

    /// Merge `data` into a pull request's context
    ///
    /// Top-level keys overwrite, except that when both the stored and the new
    /// value are mappings their keys are unioned one level deep.
    #[instrument(skip(self, data))]
    pub fn save_pr_context(&self, pr_number: u64, data: &Map<String, Value>) -> Result<EntityWrite> {
        if pr_number == 0 {
            return Err(RepogentError::InvalidIdentifier(
                "PR number must be positive".to_string(),
            ));
        }
        let context_id = pr_context_id(pr_number);

        let (to_write, outcome) = match self.load(&context_id) {
            Some(ContextRecord {
                data: Value::Object(existing),
                ..
            }) => (merge_entity_data(&existing, data), EntityWrite::Merged),
            Some(_) => {
                warn!("Malformed existing context for PR {}, resetting", pr_number);
                (data.clone(), EntityWrite::ReplacedMalformed)
            }
            None => (data.clone(), EntityWrite::Created),
        };

        self.save(&context_id, &to_write)?;
        Ok(outcome)
    }

    /// Ids of all stored records, sorted
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = durable::list_records(&self.dir)?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Number of stored records
    pub fn len(&self) -> Result<usize> {
        Ok(durable::list_records(&self.dir)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove temp files left behind by interrupted saves
    pub fn purge_orphaned_temp_files(&self, max_age: Duration) -> Result<usize> {
        durable::purge_orphans(&self.dir, max_age)
    }

    /// Delete the oldest records in one batch once the store is at capacity
    fn enforce_capacity(&self) -> Result<()> {
        let records = durable::list_records(&self.dir)?;
        if records.len() < self.max_files {
            return Ok(());
        }

        let mut aged: Vec<(SystemTime, PathBuf)> = records
            .into_iter()
            .filter_map(|p| durable::modified(&p).map(|m| (m, p)))
            .collect();
        aged.sort();

        let mut removed = 0;
        for (_, path) in aged.into_iter().take(self.eviction_batch) {
            match durable::remove_record(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Error deleting {}: {}", path.display(), e),
            }
        }

        info!(removed, "Context store at capacity, evicted oldest records");
        Ok(())
    }
}

/// Context id for a pull request
pub fn pr_context_id(pr_number: u64) -> String {
    format!("{}{}", PR_CONTEXT_PREFIX, pr_number)
}

/// Remove `..`, map separators and NUL to `_`, keep at most `max_len` chars
pub fn sanitize_context_id(context_id: &str, max_len: usize) -> String {
    context_id
        .replace("..", "")
        .replace(['/', '\\', '\0'], "_")
        .chars()
        .take(max_len)
        .collect()
}

/// One-level merge of entity data
///
/// Nested mappings present on both sides are unioned with the new keys
/// winning; lists and scalars are replaced outright.
pub fn merge_entity_data(existing: &Map<String, Value>, update: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = existing.clone();
    for (key, value) in update {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(current)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    current.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}
