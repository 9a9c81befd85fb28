//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the boundary to the external vector
//! database: named collections of embedded chunks with similarity search
//! and metadata-filtered deletion. Two backends are provided:
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | [`InMemoryStore`] | [`memory`] | none, for tests and throwaway sessions |
//! | [`SqliteStore`] | [`sqlite`] | SQLite file via `sqlx` |
//!
//! Implementations must be `Send + Sync`: the watcher thread and the query
//! loop share one store. Operations on a collection that does not exist
//! fail; [`VectorIndex`](crate::index::VectorIndex) recreates it first.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::config::StoreConfig;
use crate::models::{ChunkMetadata, RetrievedChunk};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// One embedded chunk as written to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

/// Metadata field a [`MetadataFilter`] can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    DocId,
    Filename,
    Filetype,
}

impl MetadataField {
    pub fn name(self) -> &'static str {
        match self {
            MetadataField::DocId => "doc_id",
            MetadataField::Filename => "filename",
            MetadataField::Filetype => "filetype",
        }
    }

    pub fn value_of(self, metadata: &ChunkMetadata) -> &str {
        match self {
            MetadataField::DocId => &metadata.doc_id,
            MetadataField::Filename => &metadata.filename,
            MetadataField::Filetype => &metadata.filetype,
        }
    }
}

/// The `field in [values]` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: MetadataField,
    pub values: Vec<String>,
}

impl MetadataFilter {
    pub fn new(field: MetadataField, values: Vec<String>) -> Self {
        Self { field, values }
    }

    pub fn doc_id(id: impl Into<String>) -> Self {
        Self::new(MetadataField::DocId, vec![id.into()])
    }

    pub fn filename(name: impl Into<String>) -> Self {
        Self::new(MetadataField::Filename, vec![name.into()])
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let value = self.field.value_of(metadata);
        self.values.iter().any(|v| v == value)
    }

    /// Render as `field in ["a", "b"]`.
    pub fn to_expression(&self) -> String {
        let values: Vec<String> = self.values.iter().map(|v| format!("{v:?}")).collect();
        format!("{} in [{}]", self.field.name(), values.join(", "))
    }
}

impl fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_expression())
    }
}

/// Abstract vector database.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](VectorStore::create_collection) | Create if absent (idempotent) |
/// | [`add_texts`](VectorStore::add_texts) | Insert or replace entries by id |
/// | [`similarity_search`](VectorStore::similarity_search) | Top-k by cosine similarity |
/// | [`delete`](VectorStore::delete) | Remove entries matching a filter |
/// | [`refresh`](VectorStore::refresh) | Make prior writes visible to search |
/// | [`drop_collection`](VectorStore::drop_collection) | Remove the collection and its entries |
pub trait VectorStore: Send + Sync {
    fn create_collection(&self, collection: &str) -> Result<()>;

    fn has_collection(&self, collection: &str) -> Result<bool>;

    /// Insert entries. An existing id is replaced in place and keeps its
    /// insertion position.
    fn add_texts(&self, collection: &str, entries: &[StoreEntry]) -> Result<()>;

    /// At most `k` entries by descending similarity. Equal scores keep
    /// insertion order.
    fn similarity_search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Remove every entry matching `filter`. Returns the number removed.
    fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<usize>;

    fn refresh(&self, collection: &str) -> Result<()>;

    /// Returns whether the collection existed.
    fn drop_collection(&self, collection: &str) -> Result<bool>;

    fn count(&self, collection: &str) -> Result<usize>;

    /// Metadata of every entry, in insertion order.
    fn list_metadata(&self, collection: &str) -> Result<Vec<ChunkMetadata>>;
}

/// Open the backend named in `[store]`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.path)?)),
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn metadata(doc_id: &str, filename: &str) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: doc_id.into(),
            filename: filename.into(),
            filetype: "txt".into(),
            upload_time: "2024-01-01T00:00:00+00:00".into(),
            start_offset: 0,
            unit: 0,
        }
    }

    pub(crate) fn entry(id: &str, doc_id: &str, filename: &str, vector: Vec<f32>) -> StoreEntry {
        StoreEntry {
            id: id.into(),
            text: format!("text of {id}"),
            metadata: metadata(doc_id, filename),
            vector,
        }
    }

    /// Behaviour every backend must share.
    pub(crate) fn exercise_store(store: &dyn VectorStore) {
        assert!(!store.has_collection("c").unwrap());
        assert!(store.count("c").is_err());
        store.create_collection("c").unwrap();
        store.create_collection("c").unwrap();
        assert!(store.has_collection("c").unwrap());

        store
            .add_texts(
                "c",
                &[
                    entry("1", "d1", "a.txt", vec![1.0, 0.0]),
                    entry("2", "d1", "a.txt", vec![0.0, 1.0]),
                    entry("3", "d2", "b.txt", vec![1.0, 0.0]),
                ],
            )
            .unwrap();
        assert_eq!(store.count("c").unwrap(), 3);

        let hits = store.similarity_search("c", &[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        let top = store.similarity_search("c", &[1.0, 0.0], 1).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].chunk.metadata.filename, "a.txt");

        // Replacing an id keeps its position.
        store
            .add_texts("c", &[entry("1", "d1", "a.txt", vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(store.count("c").unwrap(), 3);
        let order: Vec<String> = store
            .list_metadata("c")
            .unwrap()
            .into_iter()
            .map(|m| m.doc_id)
            .collect();
        assert_eq!(order, vec!["d1", "d1", "d2"]);

        assert_eq!(store.delete("c", &MetadataFilter::doc_id("d1")).unwrap(), 2);
        store.refresh("c").unwrap();
        assert_eq!(store.count("c").unwrap(), 1);
        let hits = store.similarity_search("c", &[0.0, 1.0], 10).unwrap();
        assert!(hits.iter().all(|h| h.chunk.metadata.doc_id != "d1"));
        assert_eq!(store.delete("c", &MetadataFilter::doc_id("d1")).unwrap(), 0);

        assert!(store.drop_collection("c").unwrap());
        assert!(!store.drop_collection("c").unwrap());
        assert!(!store.has_collection("c").unwrap());
        assert!(store.similarity_search("c", &[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn filter_matches_any_value() {
        let filter = MetadataFilter::new(
            MetadataField::Filename,
            vec!["a.txt".into(), "b.txt".into()],
        );
        assert!(filter.matches(&metadata("x", "b.txt")));
        assert!(!filter.matches(&metadata("x", "c.txt")));
    }

    #[test]
    fn filter_expression() {
        let filter = MetadataFilter::new(MetadataField::DocId, vec!["abc".into(), "def".into()]);
        assert_eq!(filter.to_expression(), r#"doc_id in ["abc", "def"]"#);
        assert_eq!(MetadataFilter::filename("a.txt").to_string(), r#"filename in ["a.txt"]"#);
    }

    #[test]
    fn open_memory_backend() {
        let config = StoreConfig {
            backend: "memory".into(),
            ..StoreConfig::default()
        };
        let store = open(&config).unwrap();
        store.create_collection("x").unwrap();
        assert_eq!(store.count("x").unwrap(), 0);
    }
}
