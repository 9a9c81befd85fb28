#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use ragwatch::config::DuplicatePolicy;
use ragwatch::embedding::HashingProvider;
use ragwatch::index::VectorIndex;
use ragwatch::ingest::{Indexer, IndexerOptions};
use ragwatch::ledger::HashLedger;
use ragwatch::models::{ChunkMetadata, RetrievedChunk};
use ragwatch::store::{InMemoryStore, MetadataFilter, StoreEntry, VectorStore};
use ragwatch::tracker::ChangeTracker;
use tempfile::TempDir;

/// In-memory store whose writes can be made to fail, for all files or for
/// one filename.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing: Mutex<Option<Failing>>,
}

enum Failing {
    All,
    File(String),
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_all_writes(&self) {
        *self.failing.lock() = Some(Failing::All);
    }

    pub fn fail_writes_for(&self, filename: &str) {
        *self.failing.lock() = Some(Failing::File(filename.to_string()));
    }

    pub fn heal(&self) {
        *self.failing.lock() = None;
    }

    fn rejects(&self, entries: &[StoreEntry]) -> bool {
        match &*self.failing.lock() {
            None => false,
            Some(Failing::All) => true,
            Some(Failing::File(name)) => entries.iter().any(|e| e.metadata.filename == *name),
        }
    }
}

impl VectorStore for FlakyStore {
    fn create_collection(&self, c: &str) -> Result<()> {
        self.inner.create_collection(c)
    }
    fn has_collection(&self, c: &str) -> Result<bool> {
        self.inner.has_collection(c)
    }
    fn add_texts(&self, c: &str, entries: &[StoreEntry]) -> Result<()> {
        if self.rejects(entries) {
            bail!("connection reset by peer");
        }
        self.inner.add_texts(c, entries)
    }
    fn similarity_search(&self, c: &str, v: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        self.inner.similarity_search(c, v, k)
    }
    fn delete(&self, c: &str, f: &MetadataFilter) -> Result<usize> {
        self.inner.delete(c, f)
    }
    fn refresh(&self, c: &str) -> Result<()> {
        self.inner.refresh(c)
    }
    fn drop_collection(&self, c: &str) -> Result<bool> {
        self.inner.drop_collection(c)
    }
    fn count(&self, c: &str) -> Result<usize> {
        self.inner.count(c)
    }
    fn list_metadata(&self, c: &str) -> Result<Vec<ChunkMetadata>> {
        self.inner.list_metadata(c)
    }
}

/// Indexer over `<tmp>/data` with the ledger in `<tmp>/results`.
pub fn indexer(tmp: &TempDir, store: Arc<dyn VectorStore>, policy: DuplicatePolicy) -> Indexer {
    let index = Arc::new(VectorIndex::new(
        store,
        Arc::new(HashingProvider::default()),
        "DataCollection",
    ));
    Indexer::new(
        tmp.path().join("data"),
        Arc::new(ChangeTracker::new()),
        index,
        HashLedger::new(tmp.path().join("results/hash_values.txt")),
        IndexerOptions {
            chunk_size: 600,
            overlap: 200,
            recursive: false,
            exclude_globs: Vec::new(),
            policy,
        },
    )
    .unwrap()
}

pub fn memory_indexer(tmp: &TempDir, policy: DuplicatePolicy) -> Indexer {
    indexer(tmp, Arc::new(InMemoryStore::new()), policy)
}
