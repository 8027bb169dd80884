//! Append-only audit trail of agent decisions
//!
//! One JSONL file per UTC day, `decisions_YYYYMMDD.jsonl`. The core never
//! reads these back.

use chrono::{NaiveDate, Utc};
use repogent_core::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Serialize)]
struct DecisionEntry<'a> {
    timestamp: String,
    agent: &'a str,
    decision: &'a Map<String, Value>,
}

/// Writer for the daily decision logs
#[derive(Debug, Clone)]
pub struct DecisionLog {
    dir: PathBuf,
}

impl DecisionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for a given day
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("decisions_{}.jsonl", date.format("%Y%m%d")))
    }

    /// Append one decision to today's file and return its path
    #[instrument(skip(self, decision))]
    pub fn append(&self, agent: &str, decision: &Map<String, Value>) -> Result<PathBuf> {
        let now = Utc::now();
        let path = self.path_for(now.date_naive());

        let entry = DecisionEntry {
            timestamp: now.to_rfc3339(),
            agent,
            decision,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        debug!(path = %path.display(), "Decision logged");
        Ok(path)
    }
}
