//! Human-readable hash ledger.
//!
//! An append-only audit trail of every file the pipeline has hashed, kept in
//! the results directory:
//!
//! ```text
//! File: reports/q3.pdf
//! Hash: 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! ----------------------------------------------------------------------------------------------------
//! ```
//!
//! Entries are only rewritten when a file is retracted (duplicate deletion,
//! delete-entries) or the index is purged. The ledger is also how known files
//! survive a restart: [`HashLedger::records`] seeds the change tracker.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::FileRecord;

const RULE_WIDTH: usize = 100;
const FILE_PREFIX: &str = "File: ";
const HASH_PREFIX: &str = "Hash: ";

pub struct HashLedger {
    path: PathBuf,
    // Serialises writers from the watcher and the query loop.
    lock: Mutex<()>,
}

impl HashLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry for `record`. Nothing is written when the latest entry
    /// for the same path already carries the same hash, so re-admitting a
    /// file after a restart does not grow the ledger. Returns whether an
    /// entry was written.
    pub fn append(&self, record: &FileRecord) -> Result<bool> {
        let _guard = self.lock.lock();
        let latest = self
            .read_entries()?
            .into_iter()
            .rev()
            .find(|(p, _)| *p == record.path);
        if latest.is_some_and(|(_, hash)| hash == record.content_hash) {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger: {}", self.path.display()))?;
        write!(file, "{}", format_entry(&record.path, &record.content_hash))?;
        Ok(true)
    }

    /// Drop every entry for `file_path`. Returns whether anything was removed.
    pub fn remove(&self, file_path: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let entries = self.read_entries()?;
        let kept: Vec<&(String, String)> = entries.iter().filter(|(p, _)| p != file_path).collect();
        if kept.len() == entries.len() {
            return Ok(false);
        }
        let body: String = kept.iter().map(|(p, h)| format_entry(p, h)).collect();
        fs::write(&self.path, body)
            .with_context(|| format!("Failed to rewrite ledger: {}", self.path.display()))?;
        Ok(true)
    }

    /// All `(path, hash)` pairs in file order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let _guard = self.lock.lock();
        self.read_entries()
    }

    /// Latest entry per path, as tracker records.
    pub fn records(&self) -> Result<Vec<FileRecord>> {
        let mut latest: std::collections::BTreeMap<String, String> = Default::default();
        for (path, hash) in self.entries()? {
            latest.insert(path, hash);
        }
        Ok(latest
            .into_iter()
            .map(|(path, hash)| FileRecord::new(path, hash))
            .collect())
    }

    pub fn truncate(&self) -> Result<()> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            fs::write(&self.path, "")?;
        }
        Ok(())
    }

    fn read_entries(&self) -> Result<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;
        Ok(parse_entries(&content))
    }
}

fn format_entry(path: &str, hash: &str) -> String {
    format!(
        "{FILE_PREFIX}{path}\n{HASH_PREFIX}{hash}\n{}\n",
        "-".repeat(RULE_WIDTH)
    )
}

fn parse_entries(content: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut pending: Option<String> = None;
    for line in content.lines() {
        let line = line.trim_end();
        if let Some(path) = line.strip_prefix(FILE_PREFIX) {
            pending = Some(path.to_string());
        } else if let Some(hash) = line.strip_prefix(HASH_PREFIX) {
            if let Some(path) = pending.take() {
                entries.push((path, hash.trim().to_string()));
            }
        }
    }
    entries
}
