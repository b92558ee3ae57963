//! Bounded log of replayed readings
//!
//! Keeps the most recent records in a fixed-capacity ring (oldest dropped
//! first) and mirrors it to a JSON array file that downstream consumers poll.

use crate::models::ReplayRecord;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Records retained by default
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// File the replay runner writes to by default
pub const DEFAULT_LOG_FILE: &str = "sensor_data.json";

pub struct ReadingLog {
    records: VecDeque<ReplayRecord>,
    capacity: usize,
    path: Option<PathBuf>,
    dirty: bool,
}

impl ReadingLog {
    /// In-memory log holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
            path: None,
            dirty: false,
        }
    }

    /// Log backed by a JSON file; existing records are loaded, and an
    /// unreadable file is replaced on the next flush
    pub fn with_persistence(path: PathBuf, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        if path.exists() {
            match load_records(&path) {
                Ok(records) => {
                    for record in records {
                        log.push_record(record);
                    }
                    log.dirty = false;
                    info!(path = %path.display(), entries = log.len(), "Loaded reading log");
                }
                Err(e) => warn!(error = %e, "Failed to load reading log, starting fresh"),
            }
        }
        log.path = Some(path);
        log
    }

    pub fn push(&mut self, record: ReplayRecord) {
        self.push_record(record);
        self.dirty = true;
    }

    fn push_record(&mut self, record: ReplayRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records oldest first
    pub fn records(&self) -> impl Iterator<Item = &ReplayRecord> {
        self.records.iter()
    }

    /// Up to `limit` most recent records, newest first
    pub fn latest(&self, limit: usize) -> Vec<&ReplayRecord> {
        self.records.iter().rev().take(limit).collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty = true;
    }

    /// Write the log to its file if it changed since the last flush
    pub fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.take_pending()? {
            pending.write()?;
        }
        Ok(())
    }

    /// Snapshot the records for writing elsewhere, such as a blocking task.
    /// Returns `None` when nothing changed or the log is memory-only.
    pub fn take_pending(&mut self) -> Result<Option<PendingWrite>> {
        if !self.dirty {
            return Ok(None);
        }
        let pending = match self.path {
            Some(ref path) => Some(PendingWrite {
                path: path.clone(),
                json: serde_json::to_vec_pretty(&self.records)
                    .context("Failed to serialize readings")?,
                entries: self.records.len(),
            }),
            None => None,
        };
        self.dirty = false;
        Ok(pending)
    }
}

/// Serialized log contents waiting to be written to disk
pub struct PendingWrite {
    path: PathBuf,
    json: Vec<u8>,
    entries: usize,
}

impl PendingWrite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the log file atomically. Blocks on file I/O.
    pub fn write(self) -> Result<()> {
        let path = &self.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&self.json).context("Failed to write reading log")?;
        file.sync_all().context("Failed to sync reading log")?;

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        debug!(path = %path.display(), entries = self.entries, "Reading log flushed");
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<Vec<ReplayRecord>> {
    let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&data).context("Failed to parse reading log")
}
