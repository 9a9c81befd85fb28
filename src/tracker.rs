//! Known-file bookkeeping and duplicate classification.
//!
//! [`ChangeTracker`] owns the `path → FileRecord` map shared by the watcher
//! thread and the startup indexer. All state sits behind one mutex, and
//! every check-then-register sequence for a file happens inside a single
//! lock hold ([`ChangeTracker::admit`]), so two observers of the same file
//! can never both treat it as new.
//!
//! Classification is pure detection. What to do with a duplicate is decided
//! by the caller (see [`DuplicateResolver`](crate::ingest::DuplicateResolver)).

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use crate::models::{Candidate, ChangeSet, FileRecord};

/// Result of [`ChangeTracker::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The file is new and is now registered. `replaced` holds the previous
    /// record when the same path was known with different content.
    Admitted {
        record: FileRecord,
        replaced: Option<FileRecord>,
    },
    /// Same path, same content: nothing to do.
    AlreadyKnown,
    /// Same content already registered under another path.
    Duplicate { existing: String },
}

#[derive(Debug, Default)]
pub struct ChangeTracker {
    known: Mutex<HashMap<String, FileRecord>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tracker with previously recorded files.
    pub fn restore<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = FileRecord>,
    {
        let mut known = self.known.lock();
        let before = known.len();
        for record in records {
            known.insert(record.path.clone(), record);
        }
        known.len() - before
    }

    /// Classify a batch against the known files and against itself.
    ///
    /// Order matters inside the batch: the first file with a given digest
    /// is `new`, later ones are `duplicate_in_batch`. Nothing is registered.
    pub fn classify(&self, batch: &[Candidate]) -> ChangeSet {
        let known = self.known.lock();
        let existing_by_hash = index_by_hash(&known);

        let mut change_set = ChangeSet::default();
        let mut first_in_batch: HashMap<&str, &str> = HashMap::new();

        for candidate in batch {
            let hash = candidate.content_hash.as_str();

            if known
                .get(&candidate.path)
                .is_some_and(|r| r.content_hash == hash)
            {
                change_set.unchanged.push(candidate.path.clone());
            } else if let Some(existing) = existing_by_hash.get(hash) {
                change_set
                    .duplicate_of_existing
                    .insert(candidate.path.clone(), (*existing).to_string());
            } else if let Some(first) = first_in_batch.get(hash) {
                change_set
                    .duplicate_in_batch
                    .insert(candidate.path.clone(), (*first).to_string());
            } else {
                first_in_batch.insert(hash, candidate.path.as_str());
                change_set
                    .new
                    .push(FileRecord::new(&candidate.path, &candidate.content_hash));
            }
        }

        change_set
    }

    /// Check a single file and register it if it is new, in one critical
    /// section.
    pub fn admit(&self, candidate: &Candidate) -> Admission {
        let mut known = self.known.lock();

        if let Some(record) = known.get(&candidate.path) {
            if record.content_hash == candidate.content_hash {
                return Admission::AlreadyKnown;
            }
        }

        if let Some(existing) = first_path_with_hash(&known, &candidate.content_hash, &candidate.path)
        {
            return Admission::Duplicate { existing };
        }

        let record = FileRecord::new(&candidate.path, &candidate.content_hash);
        let replaced = known.insert(candidate.path.clone(), record.clone());
        Admission::Admitted { record, replaced }
    }

    /// Insert a record. Returns `false` when the same path and digest were
    /// already registered.
    pub fn register(&self, record: FileRecord) -> bool {
        let mut known = self.known.lock();
        match known.get(&record.path) {
            Some(existing) if existing.content_hash == record.content_hash => false,
            _ => {
                known.insert(record.path.clone(), record);
                true
            }
        }
    }

    /// Remove every record carrying `content_hash`.
    pub fn unregister(&self, content_hash: &str) -> Vec<FileRecord> {
        let mut known = self.known.lock();
        let paths: Vec<String> = known
            .values()
            .filter(|r| r.content_hash == content_hash)
            .map(|r| r.path.clone())
            .collect();
        let mut removed: Vec<FileRecord> =
            paths.iter().filter_map(|p| known.remove(p)).collect();
        removed.sort_by(|a, b| a.path.cmp(&b.path));
        removed
    }

    pub fn forget(&self, path: &str) -> Option<FileRecord> {
        self.known.lock().remove(path)
    }

    pub fn clear(&self) {
        self.known.lock().clear();
    }

    pub fn get(&self, path: &str) -> Option<FileRecord> {
        self.known.lock().get(path).cloned()
    }

    pub fn path_for_hash(&self, content_hash: &str) -> Option<String> {
        first_path_with_hash(&self.known.lock(), content_hash, "")
    }

    /// Snapshot of all records, sorted by path.
    pub fn records(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.known.lock().values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Paths sharing a digest with at least one other path.
    pub fn aliases(&self) -> BTreeMap<String, Vec<String>> {
        let known = self.known.lock();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in known.values() {
            groups
                .entry(record.content_hash.clone())
                .or_default()
                .push(record.path.clone());
        }
        groups.retain(|_, paths| paths.len() > 1);
        for paths in groups.values_mut() {
            paths.sort();
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.known.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.lock().is_empty()
    }
}

/// Lowest path per digest, so the reported match target is deterministic.
fn index_by_hash(known: &HashMap<String, FileRecord>) -> HashMap<&str, &str> {
    let mut by_hash: HashMap<&str, &str> = HashMap::new();
    for record in known.values() {
        by_hash
            .entry(record.content_hash.as_str())
            .and_modify(|p| {
                if record.path.as_str() < *p {
                    *p = record.path.as_str();
                }
            })
            .or_insert(record.path.as_str());
    }
    by_hash
}

fn first_path_with_hash(
    known: &HashMap<String, FileRecord>,
    content_hash: &str,
    exclude_path: &str,
) -> Option<String> {
    known
        .values()
        .filter(|r| r.content_hash == content_hash && r.path != exclude_path)
        .map(|r| r.path.as_str())
        .min()
        .map(str::to_string)
}
