//! Indexing pipeline orchestration.
//!
//! [`Indexer`] coordinates the flow for every file:
//!
//! ```text
//! hash → admit (tracker) → ledger → load → chunk → upsert
//! ```
//!
//! It is shared by the startup bulk pass ([`Indexer::bulk_index`]) and the
//! watcher thread ([`Indexer::index_file`]). Detection never decides what
//! happens to duplicates: that is a [`DuplicateResolver`], either the
//! configured [`PolicyResolver`] or an interactive one supplied by the CLI.
//!
//! A failing file never aborts a batch. When the vector store is
//! unavailable the file's admission is rolled back so a later pass can
//! index it again.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::chunk;
use crate::config::{Config, DuplicatePolicy};
use crate::error::{IndexError, LoadError};
use crate::hasher;
use crate::index::VectorIndex;
use crate::ledger::HashLedger;
use crate::loader;
use crate::models::{Candidate, ChunkMetadata, FileRecord};
use crate::store::MetadataFilter;
use crate::tracker::{Admission, ChangeTracker};
use crate::{debug_event, log_event};

/// What happened to one file offered to [`Indexer::index_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed { chunks: usize },
    /// Same content is already indexed under `existing`.
    Duplicate { existing: String },
    /// Same path and same content as before.
    AlreadyKnown,
    /// Registered as seen, but no loader handles the extension.
    Unsupported,
    /// The file could not be hashed or its text could not be extracted.
    Unreadable,
    /// Loaded fine, but no text to index.
    Empty,
}

/// Decision for one duplicate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Leave the file alone and do not index it.
    Skip,
    /// Record the file as an alias of the original. Nothing is re-indexed.
    KeepAlias,
    /// Delete the duplicate from disk.
    DeleteFile,
}

/// Decides what happens to a file whose content is already known.
pub trait DuplicateResolver: Send + Sync {
    fn resolve(&self, duplicate: &str, existing: &str) -> Resolution;
}

/// Resolver driven by `[duplicates] policy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyResolver(pub DuplicatePolicy);

impl DuplicateResolver for PolicyResolver {
    fn resolve(&self, _duplicate: &str, _existing: &str) -> Resolution {
        match self.0 {
            DuplicatePolicy::Skip => Resolution::Skip,
            DuplicatePolicy::Allow => Resolution::KeepAlias,
            DuplicatePolicy::Delete => Resolution::DeleteFile,
        }
    }
}

/// Summary of a [`Indexer::bulk_index`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub discovered: usize,
    /// Path → chunks written.
    pub indexed: BTreeMap<String, usize>,
    pub unchanged: Vec<String>,
    /// Duplicate path → original path.
    pub duplicates: BTreeMap<String, String>,
    pub aliased: Vec<String>,
    pub deleted: Vec<String>,
    pub unsupported: Vec<String>,
    pub empty: Vec<String>,
    pub unreadable: Vec<String>,
    /// Path → reason, for files the vector store rejected.
    pub failed: BTreeMap<String, String>,
}

impl BulkReport {
    pub fn chunks(&self) -> usize {
        self.indexed.values().sum()
    }
}

/// Chunking and discovery settings of an [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub recursive: bool,
    pub exclude_globs: Vec<String>,
    pub policy: DuplicatePolicy,
}

impl IndexerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            recursive: config.documents.recursive,
            exclude_globs: config.documents.exclude_globs.clone(),
            policy: config.duplicates.policy,
        }
    }
}

pub struct Indexer {
    root: PathBuf,
    tracker: Arc<ChangeTracker>,
    index: Arc<VectorIndex>,
    ledger: HashLedger,
    options: IndexerOptions,
    excludes: GlobSet,
}

impl Indexer {
    /// `root` is created if missing so the watcher has something to watch.
    pub fn new(
        root: impl AsRef<Path>,
        tracker: Arc<ChangeTracker>,
        index: Arc<VectorIndex>,
        ledger: HashLedger,
        options: IndexerOptions,
    ) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create documents dir: {}", root.display()))?;
        let root = root.canonicalize()?;
        let excludes = build_globset(&options.exclude_globs)?;
        Ok(Self {
            root,
            tracker,
            index,
            ledger,
            options,
            excludes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.options.policy
    }

    pub fn recursive(&self) -> bool {
        self.options.recursive
    }

    /// Files under the documents root, sorted. Hidden and excluded files are
    /// skipped; unsupported extensions are kept (they are recorded as seen).
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut walker = WalkDir::new(&self.root);
        if !self.options.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        {
            let entry = entry?;
            if entry.file_type().is_file() && self.is_candidate(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Whether a path under the root should be indexed at all.
    pub fn is_candidate(&self, path: &Path) -> bool {
        if is_hidden(path) {
            return false;
        }
        let key = self.relative_key(path);
        if self.excludes.is_match(&key) {
            return false;
        }
        self.options.recursive || !key.contains('/')
    }

    /// Tracker key of `path`: relative to the root, `/`-separated.
    pub fn relative_key(&self, path: &Path) -> String {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => self.canonical_relative(path).unwrap_or_else(|| {
                path.file_name().map(PathBuf::from).unwrap_or_default()
            }),
        };
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Relative path via the canonical parent directory; the file itself
    /// may already be gone.
    fn canonical_relative(&self, path: &Path) -> Option<PathBuf> {
        let parent = path.parent()?.canonicalize().ok()?;
        let full = parent.join(path.file_name()?);
        full.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    pub fn absolute_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Index every file under the root once.
    ///
    /// New files are indexed first, then every duplicate is handed to
    /// `resolver`, so an alias is only recorded once its original is in.
    pub fn bulk_index(&self, resolver: &dyn DuplicateResolver) -> Result<BulkReport> {
        let files = self.discover()?;
        let mut report = BulkReport {
            discovered: files.len(),
            ..BulkReport::default()
        };

        let mut batch = Vec::with_capacity(files.len());
        for path in &files {
            let key = self.relative_key(path);
            match hasher::hash_file(path) {
                Ok(hash) => batch.push(Candidate::new(key, hash)),
                Err(e) => {
                    tracing::warn!("[indexer] unreadable: {}", e);
                    report.unreadable.push(key);
                }
            }
        }

        let change_set = self.tracker.classify(&batch);
        log_event!(
            "indexer",
            "classified",
            "{} new, {} duplicate, {} unchanged",
            change_set.new.len(),
            change_set.duplicate_count(),
            change_set.unchanged.len()
        );
        report.unchanged = change_set.unchanged.clone();
        report.unreadable.extend(change_set.unreadable.iter().cloned());

        for record in &change_set.new {
            let path = self.absolute_path(&record.path);
            match self.index_file(&path) {
                Ok(FileOutcome::Indexed { chunks }) => {
                    report.indexed.insert(record.path.clone(), chunks);
                }
                Ok(FileOutcome::Duplicate { existing }) => {
                    report.duplicates.insert(record.path.clone(), existing);
                }
                Ok(FileOutcome::AlreadyKnown) => report.unchanged.push(record.path.clone()),
                Ok(FileOutcome::Unsupported) => report.unsupported.push(record.path.clone()),
                Ok(FileOutcome::Unreadable) => report.unreadable.push(record.path.clone()),
                Ok(FileOutcome::Empty) => report.empty.push(record.path.clone()),
                Err(e) => {
                    report.failed.insert(record.path.clone(), e.to_string());
                }
            }
        }

        let duplicates: Vec<(String, String)> = change_set
            .duplicate_of_existing
            .into_iter()
            .chain(change_set.duplicate_in_batch)
            .collect();
        for (duplicate, existing) in duplicates {
            let hash = batch
                .iter()
                .find(|c| c.path == duplicate)
                .map(|c| c.content_hash.clone())
                .unwrap_or_default();
            match self.resolve_duplicate(&duplicate, &hash, &existing, resolver) {
                Resolution::KeepAlias => report.aliased.push(duplicate.clone()),
                Resolution::DeleteFile => report.deleted.push(duplicate.clone()),
                Resolution::Skip => {}
            }
            report.duplicates.insert(duplicate, existing);
        }

        log_event!(
            "indexer",
            "bulk index complete",
            "{} files, {} indexed ({} chunks), {} duplicates, {} failed",
            report.discovered,
            report.indexed.len(),
            report.chunks(),
            report.duplicates.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Index a single file. The check-and-register step runs in one tracker
    /// critical section, so concurrent callers cannot index a file twice.
    pub fn index_file(&self, path: &Path) -> Result<FileOutcome, IndexError> {
        self.index_file_with(path, || {})
    }

    /// [`index_file`](Self::index_file), calling `on_admitted` once the file
    /// has been registered and loading starts.
    pub fn index_file_with(
        &self,
        path: &Path,
        on_admitted: impl FnOnce(),
    ) -> Result<FileOutcome, IndexError> {
        let key = self.relative_key(path);
        let hash = match hasher::hash_file(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!("[indexer] unreadable: {}", e);
                return Ok(FileOutcome::Unreadable);
            }
        };

        let (record, replaced) = match self.tracker.admit(&Candidate::new(&key, &hash)) {
            Admission::AlreadyKnown => {
                debug_event!("indexer", "already known", "{}", key);
                return Ok(FileOutcome::AlreadyKnown);
            }
            Admission::Duplicate { existing } => {
                log_event!("indexer", "duplicate", "{} has the same content as {}", key, existing);
                return Ok(FileOutcome::Duplicate { existing });
            }
            Admission::Admitted { record, replaced } => (record, replaced),
        };
        self.append_ledger(&record);
        on_admitted();

        match self.load_and_upsert(path, &record, replaced.as_ref()) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.roll_back(&record, replaced);
                Err(e)
            }
        }
    }

    /// Load, chunk and upsert the admitted file. The chunks of a replaced
    /// version are deleted only once the new content is in, so a failed
    /// upsert leaves the previous version searchable.
    fn load_and_upsert(
        &self,
        path: &Path,
        record: &FileRecord,
        replaced: Option<&FileRecord>,
    ) -> Result<FileOutcome, IndexError> {
        let outcome = self.load_and_write(path, record)?;
        if let Some(old) = replaced {
            self.delete_replaced(old);
        }
        Ok(outcome)
    }

    fn load_and_write(&self, path: &Path, record: &FileRecord) -> Result<FileOutcome, IndexError> {
        let source = ChunkMetadata {
            doc_id: record.content_hash.clone(),
            filename: record.path.clone(),
            filetype: loader::normalized_extension(path),
            upload_time: record.first_seen.to_rfc3339(),
            start_offset: 0,
            unit: 0,
        };
        let units = match loader::load(path, &source) {
            Ok(units) => units,
            Err(LoadError::UnsupportedFormat { extension, .. }) => {
                log_event!("indexer", "unsupported", "{} (.{})", record.path, extension);
                return Ok(FileOutcome::Unsupported);
            }
            Err(e) => {
                tracing::warn!("[indexer] load failed: {}", e);
                return Ok(FileOutcome::Unreadable);
            }
        };

        let chunks = chunk::split(&units, self.options.chunk_size, self.options.overlap);
        if chunks.is_empty() {
            log_event!("indexer", "empty", "{} has no text to index", record.path);
            return Ok(FileOutcome::Empty);
        }

        let ids = self.index.upsert(&chunks)?;
        log_event!("indexer", "indexed", "{} ({} chunks)", record.path, ids.len());
        Ok(FileOutcome::Indexed { chunks: ids.len() })
    }

    /// Remove the chunks of a path's previous content unless another path
    /// still carries it.
    fn delete_replaced(&self, old: &FileRecord) {
        if self.tracker.path_for_hash(&old.content_hash).is_some() {
            return;
        }
        if let Err(e) = self.index.delete(&MetadataFilter::doc_id(&old.content_hash)) {
            tracing::warn!(
                "[indexer] stale chunks of {} ({}) not deleted: {}",
                old.path,
                old.content_hash,
                e
            );
        }
    }

    fn roll_back(&self, record: &FileRecord, replaced: Option<FileRecord>) {
        self.tracker.forget(&record.path);
        if let Err(e) = self.ledger.remove(&record.path) {
            tracing::warn!("[indexer] ledger rollback failed for {}: {}", record.path, e);
        }
        if let Some(old) = replaced {
            self.append_ledger(&old);
            self.tracker.register(old);
        }
        log_event!("indexer", "rolled back", "{}", record.path);
    }

    fn append_ledger(&self, record: &FileRecord) {
        if let Err(e) = self.ledger.append(record) {
            tracing::warn!("[indexer] ledger append failed for {}: {}", record.path, e);
        }
    }

    /// Apply `resolver` to a detected duplicate and carry out its decision.
    pub fn resolve_duplicate(
        &self,
        duplicate: &str,
        content_hash: &str,
        existing: &str,
        resolver: &dyn DuplicateResolver,
    ) -> Resolution {
        let resolution = resolver.resolve(duplicate, existing);
        match resolution {
            Resolution::Skip => {
                log_event!("indexer", "duplicate skipped", "{} (same as {})", duplicate, existing);
            }
            Resolution::KeepAlias => {
                let record = FileRecord::new(duplicate, content_hash);
                self.append_ledger(&record);
                self.tracker.register(record);
                log_event!("indexer", "duplicate kept", "{} aliases {}", duplicate, existing);
            }
            Resolution::DeleteFile => {
                if let Err(e) = self.remove_duplicate(duplicate) {
                    tracing::warn!("[indexer] could not delete {}: {:#}", duplicate, e);
                }
            }
        }
        resolution
    }

    /// Delete-entries: remove every chunk of `doc_id` and forget the files
    /// that carried it. Returns the number of chunks removed.
    pub fn retract(&self, doc_id: &str) -> Result<usize, IndexError> {
        let removed = self.index.delete(&MetadataFilter::doc_id(doc_id))?;
        for record in self.tracker.unregister(doc_id) {
            if let Err(e) = self.ledger.remove(&record.path) {
                tracing::warn!("[indexer] ledger update failed for {}: {}", record.path, e);
            }
        }
        log_event!("indexer", "retracted", "{} ({} chunks)", doc_id, removed);
        Ok(removed)
    }

    /// Retract by filename. Unknown to the tracker, the filename is matched
    /// against chunk metadata directly. `None` when nothing matched.
    pub fn retract_file(&self, filename: &str) -> Result<Option<usize>, IndexError> {
        if let Some(record) = self.tracker.get(filename) {
            return self.retract(&record.content_hash).map(Some);
        }
        let removed = self.index.delete(&MetadataFilter::filename(filename))?;
        Ok((removed > 0).then_some(removed))
    }

    /// Remove a duplicate file from disk along with its ledger entry.
    pub fn remove_duplicate(&self, key: &str) -> Result<()> {
        let path = self.absolute_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to delete {}", path.display()))
            }
        }
        self.ledger.remove(key)?;
        self.tracker.forget(key);
        log_event!("indexer", "duplicate deleted", "{}", key);
        Ok(())
    }

    /// Drop the collection and forget every known file.
    pub fn purge(&self) -> Result<()> {
        self.index.drop_collection()?;
        self.tracker.clear();
        self.ledger.truncate()?;
        log_event!("indexer", "purged");
        Ok(())
    }

    /// Seed the tracker from the ledger. Only records whose content is still
    /// in the index are restored, so an empty store re-indexes everything.
    pub fn restore_from_ledger(&self) -> Result<usize> {
        let indexed: std::collections::HashSet<String> = self
            .index
            .list_documents()?
            .into_iter()
            .map(|d| d.doc_id)
            .collect();
        let records: Vec<FileRecord> = self
            .ledger
            .records()?
            .into_iter()
            .filter(|r| indexed.contains(&r.content_hash))
            .collect();
        let restored = self.tracker.restore(records);
        log_event!("indexer", "restored", "{} known files from {}", restored, self.ledger.path().display());
        Ok(restored)
    }

    /// Delete every document file under the root. The index is untouched.
    pub fn clear_documents(&self) -> Result<usize> {
        let files = self.discover()?;
        for path in &files {
            fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        log_event!("indexer", "cleared", "{} files from {}", files.len(), self.root.display());
        Ok(files.len())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
