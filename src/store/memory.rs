//! In-memory [`VectorStore`] implementation.
//!
//! Collections are `Vec`s in insertion order behind a single `RwLock`.
//! Similarity search is brute-force cosine similarity over all entries;
//! writes are visible immediately, so [`refresh`](VectorStore::refresh) is a
//! no-op.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkMetadata, RetrievedChunk};

use super::{MetadataFilter, StoreEntry, VectorStore};

/// In-memory store for tests and sessions that need no persistence.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<StoreEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(collection: &str) -> anyhow::Error {
    anyhow!("collection '{}' does not exist", collection)
}

impl VectorStore for InMemoryStore {
    fn create_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    fn has_collection(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().contains_key(collection))
    }

    fn add_texts(&self, collection: &str, entries: &[StoreEntry]) -> Result<()> {
        let mut collections = self.collections.write();
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        for entry in entries {
            match stored.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => stored.push(entry.clone()),
            }
        }
        Ok(())
    }

    fn similarity_search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let collections = self.collections.read();
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        let mut scored: Vec<(f32, &StoreEntry)> = stored
            .iter()
            .map(|e| (cosine_similarity(vector, &e.vector), e))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| RetrievedChunk {
                chunk: Chunk {
                    id: e.id.clone(),
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                },
                score,
            })
            .collect())
    }

    fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<usize> {
        let mut collections = self.collections.write();
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let before = stored.len();
        stored.retain(|e| !filter.matches(&e.metadata));
        Ok(before - stored.len())
    }

    fn refresh(&self, collection: &str) -> Result<()> {
        if self.has_collection(collection)? {
            Ok(())
        } else {
            Err(missing(collection))
        }
    }

    fn drop_collection(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.write().remove(collection).is_some())
    }

    fn count(&self, collection: &str) -> Result<usize> {
        self.collections
            .read()
            .get(collection)
            .map(Vec::len)
            .ok_or_else(|| missing(collection))
    }

    fn list_metadata(&self, collection: &str) -> Result<Vec<ChunkMetadata>> {
        let collections = self.collections.read();
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(stored.iter().map(|e| e.metadata.clone()).collect())
    }
}
