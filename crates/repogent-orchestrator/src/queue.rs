//! Durable priority mailbox shared by all agent processes
//!
//! Each pending message is one JSON file in a single queue directory,
//! filtered by `receiver` at read time. There is no lock file: writes are
//! published by atomic rename and removals tolerate losing a race to
//! another process.
//!
//! Dequeue and eviction order both use the key
//! `(priority class, modification time, file name)`. The file name is the
//! deterministic tie-break when filesystem timestamps are too coarse to
//! separate two entries.

use repogent_core::{LimitsConfig, PriorityClass, Result};
use serde_json::Value;
use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, instrument, warn};

use crate::durable::{self, RECORD_EXTENSION};
use crate::message::Message;

/// Longest file stem derived from a message id
const MAX_FILE_STEM_LEN: usize = 200;

/// Bytes kept from the end of an over-long id
const STEM_TAIL_LEN: usize = 48;

/// A valid entry with its ordering key
struct Candidate {
    priority: PriorityClass,
    modified: SystemTime,
    name: String,
    path: PathBuf,
    message: Message,
}

impl Candidate {
    fn key(&self) -> (PriorityClass, SystemTime, &str) {
        (self.priority, self.modified, &self.name)
    }
}

/// Outcome of reading one entry file
enum EntryRead {
    /// Removed by another process between listing and reading
    Gone,
    Corrupt(String),
    Record(Value),
}

/// File-backed message queue
pub struct MessageQueue {
    dir: PathBuf,
    max_depth: usize,
    max_payload_bytes: usize,
}

impl MessageQueue {
    /// Open (creating if needed) a queue with default limits
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_limits(dir, &LimitsConfig::default())
    }

    /// Open (creating if needed) a queue with configured limits
    pub fn with_limits(dir: impl Into<PathBuf>, limits: &LimitsConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_depth: limits.max_queue_depth.max(1),
            max_payload_bytes: limits.max_payload_bytes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Path of the durable entry for a message id
    pub fn entry_path(&self, message_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem_for(message_id), RECORD_EXTENSION))
    }

    /// Number of pending entries across all receivers
    pub fn depth(&self) -> Result<usize> {
        Ok(durable::list_records(&self.dir)?.len())
    }

    /// Add a message, evicting one entry first if the queue is full
    #[instrument(skip(self, message), fields(id = %message.id(), receiver = %message.receiver()))]
    pub fn enqueue(&self, message: &Message) -> Result<PathBuf> {
        let existing = durable::list_records(&self.dir)?;
        if existing.len() >= self.max_depth {
            warn!(
                "Queue full ({} messages), dropping lowest priority message",
                existing.len()
            );
            self.evict_one(&existing)?;
        }

        let path = self.entry_path(message.id());
        let bytes = serde_json::to_vec_pretty(&message.to_durable_form())?;
        durable::write_atomic(&self.dir, &path, &bytes)?;

        debug!(
            "Message queued: {} -> {} ({})",
            message.sender(),
            message.receiver(),
            message.message_type()
        );
        Ok(path)
    }

    /// Remove the least urgent, oldest entry; corrupt entries go first
    fn evict_one(&self, entries: &[PathBuf]) -> Result<Option<PathBuf>> {
        let mut victim: Option<Candidate> = None;

        for path in entries {
            let candidate = match self.read_entry(path) {
                EntryRead::Gone => continue,
                EntryRead::Corrupt(reason) => {
                    debug!(path = %path.display(), %reason, "Evicting unreadable entry");
                    return self.drop_entry(path).map(|_| Some(path.clone()));
                }
                EntryRead::Record(record) => match self.candidate(path, &record) {
                    Some(Ok(candidate)) => candidate,
                    Some(Err(reason)) => {
                        debug!(path = %path.display(), %reason, "Evicting invalid entry");
                        return self.drop_entry(path).map(|_| Some(path.clone()));
                    }
                    None => continue,
                },
            };

            let replace = match &victim {
                None => true,
                Some(current) => eviction_key(&candidate) < eviction_key(current),
            };
            if replace {
                victim = Some(candidate);
            }
        }

        match victim {
            Some(candidate) => {
                warn!("Dropping message: {}", candidate.name);
                self.drop_entry(&candidate.path)?;
                Ok(Some(candidate.path))
            }
            None => Ok(None),
        }
    }

    /// Take the most urgent, oldest message addressed to `receiver`
    ///
    /// Unparsable entries met during the scan are deleted.
    #[instrument(skip(self))]
    pub fn dequeue(&self, receiver: &str) -> Result<Option<Message>> {
        match self.select_next(receiver)? {
            Some(chosen) => self.claim(chosen).map(Some),
            None => Ok(None),
        }
    }

    /// Scan for the next entry for `receiver`, discarding corrupt ones
    fn select_next(&self, receiver: &str) -> Result<Option<Candidate>> {
        let mut candidates = Vec::new();

        for path in durable::list_records(&self.dir)? {
            match self.read_entry(&path) {
                EntryRead::Gone => continue,
                EntryRead::Corrupt(reason) => {
                    warn!("Error reading message {}: {}", path.display(), reason);
                    self.discard_corrupt(&path);
                }
                EntryRead::Record(record) if !record.is_object() => {
                    warn!("Error reading message {}: not a JSON object", path.display());
                    self.discard_corrupt(&path);
                }
                EntryRead::Record(record) => {
                    if record.get("receiver").and_then(Value::as_str) != Some(receiver) {
                        continue;
                    }
                    match self.candidate(&path, &record) {
                        Some(Ok(candidate)) => candidates.push(candidate),
                        Some(Err(reason)) => {
                            warn!("Error reading message {}: {}", path.display(), reason);
                            self.discard_corrupt(&path);
                        }
                        None => continue,
                    }
                }
            }
        }

        Ok(candidates.into_iter().min_by(|a, b| a.key().cmp(&b.key())))
    }

    /// Remove the chosen entry; losing the unlink race still yields the message
    fn claim(&self, chosen: Candidate) -> Result<Message> {
        self.drop_entry(&chosen.path)?;
        Ok(chosen.message)
    }

    /// Dequeue until the receiver's mailbox is empty
    pub fn drain(&self, receiver: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        while let Some(message) = self.dequeue(receiver)? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// All valid entries in dequeue order, optionally for one receiver
    ///
    /// Read-only: corrupt entries are skipped, not removed.
    pub fn peek_all(&self, receiver: Option<&str>) -> Result<Vec<Message>> {
        let mut candidates = Vec::new();

        for path in durable::list_records(&self.dir)? {
            let EntryRead::Record(record) = self.read_entry(&path) else {
                continue;
            };
            if let Some(receiver) = receiver {
                if record.get("receiver").and_then(Value::as_str) != Some(receiver) {
                    continue;
                }
            }
            if let Some(Ok(candidate)) = self.candidate(&path, &record) {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(candidates.into_iter().map(|c| c.message).collect())
    }

    /// Remove temp files left by writers that crashed before renaming
    pub fn purge_orphaned_temp_files(&self, max_age: Duration) -> Result<usize> {
        durable::purge_orphans(&self.dir, max_age)
    }

    fn read_entry(&self, path: &Path) -> EntryRead {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(record) => EntryRead::Record(record),
                Err(e) => EntryRead::Corrupt(e.to_string()),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => EntryRead::Gone,
            Err(e) => EntryRead::Corrupt(e.to_string()),
        }
    }

    /// `None` if the file vanished, `Some(Err)` if the record is not a valid message
    fn candidate(&self, path: &Path, record: &Value) -> Option<std::result::Result<Candidate, String>> {
        let message = match Message::from_durable_form_with_limit(record, self.max_payload_bytes) {
            Ok(message) => message,
            Err(e) => return Some(Err(e.to_string())),
        };
        let modified = durable::modified(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(Ok(Candidate {
            priority: message.priority(),
            modified,
            name,
            path: path.to_path_buf(),
            message,
        }))
    }

    fn drop_entry(&self, path: &Path) -> Result<()> {
        if !durable::remove_record(path)? {
            warn!("Message file already removed: {}", path.display());
        }
        Ok(())
    }

    fn discard_corrupt(&self, path: &Path) {
        match durable::remove_record(path) {
            Ok(true) => warn!("Removed corrupted message file: {}", path.display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove corrupted message file {}: {}", path.display(), e),
        }
    }
}

/// Least urgent first, then oldest, then file name
fn eviction_key(c: &Candidate) -> (Reverse<PriorityClass>, SystemTime, &str) {
    (Reverse(c.priority), c.modified, &c.name)
}

/// File-system safe stem for a message id
///
/// Long ids keep their head and their last `STEM_TAIL_LEN` bytes, so the
/// timestamp and random suffix that make an id unique always survive.
fn file_stem_for(message_id: &str) -> String {
    let mut stem: String = message_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem = stem.replace("..", "__");
    if stem.starts_with('.') {
        stem.replace_range(..1, "_");
    }
    if stem.len() > MAX_FILE_STEM_LEN {
        // ASCII only after sanitizing, so byte offsets are char boundaries
        let head = &stem[..MAX_FILE_STEM_LEN - STEM_TAIL_LEN - 1];
        let tail = &stem[stem.len() - STEM_TAIL_LEN..];
        stem = format!("{}_{}", head, tail);
    }
    if stem.is_empty() {
        stem.push('_');
    }
    stem
}
