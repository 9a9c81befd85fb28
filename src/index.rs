//! Vector index adapter.
//!
//! [`VectorIndex`] binds a [`VectorStore`], an [`EmbeddingProvider`] and a
//! collection name into the four operations the pipeline needs: `upsert`,
//! `delete`, `query` and `drop_collection`.
//!
//! Every operation first makes sure the collection exists, so a dropped
//! collection is recreated by the next call. Store and embedding failures
//! are logged with the operation name and surfaced as
//! [`IndexError::StoreUnavailable`].

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::IndexError;
use crate::models::{Chunk, IndexedDocument, RetrievedChunk};
use crate::store::{MetadataFilter, StoreEntry, VectorStore};
use crate::{debug_event, log_event};

pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
}

impl VectorIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Embed and write `chunks`. Returns their ids in input order.
    pub fn upsert(&self, chunks: &[Chunk]) -> Result<Vec<String>, IndexError> {
        if chunks.is_empty() {
            tracing::warn!("[index] upsert: no chunks to index");
            return Ok(Vec::new());
        }
        self.ensure_collection("upsert")?;

        let files = describe_files(chunks);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .map_err(|e| failure("upsert", &files, e))?;
        if vectors.len() != chunks.len() {
            return Err(failure(
                "upsert",
                &files,
                format!("{} vectors for {} chunks", vectors.len(), chunks.len()),
            ));
        }

        let entries: Vec<StoreEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoreEntry {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                vector,
            })
            .collect();
        self.store
            .add_texts(&self.collection, &entries)
            .map_err(|e| failure("upsert", &files, e))?;

        debug_event!("index", "upserted", "{} chunks ({})", entries.len(), files);
        Ok(entries.into_iter().map(|e| e.id).collect())
    }

    /// Top `k` chunks for `text` by descending similarity; ties keep
    /// insertion order.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.ensure_collection("query")?;

        let vector = self
            .embedder
            .embed_query(text)
            .map_err(|e| failure("query", "query embedding", e))?;
        let hits = self
            .store
            .similarity_search(&self.collection, &vector, k)
            .map_err(|e| failure("query", &format!("k={k}"), e))?;
        debug_event!("index", "query", "{} hits (k={})", hits.len(), k);
        Ok(hits)
    }

    /// Remove every chunk matching `filter` and refresh the collection so
    /// the next query cannot see them. Returns the number removed.
    pub fn delete(&self, filter: &MetadataFilter) -> Result<usize, IndexError> {
        self.ensure_collection("delete")?;
        let expression = filter.to_expression();
        let removed = self
            .store
            .delete(&self.collection, filter)
            .map_err(|e| failure("delete", &expression, e))?;
        self.store
            .refresh(&self.collection)
            .map_err(|e| failure("refresh", &expression, e))?;
        log_event!("index", "deleted", "{} chunks where {}", removed, expression);
        Ok(removed)
    }

    /// Drop the collection. The next operation recreates it empty.
    pub fn drop_collection(&self) -> Result<(), IndexError> {
        let existed = self
            .store
            .drop_collection(&self.collection)
            .map_err(|e| failure("drop", &self.collection, e))?;
        log_event!(
            "index",
            "dropped",
            "{}{}",
            self.collection,
            if existed { "" } else { " (did not exist)" }
        );
        Ok(())
    }

    pub fn count(&self) -> Result<usize, IndexError> {
        self.ensure_collection("count")?;
        self.store
            .count(&self.collection)
            .map_err(|e| failure("count", &self.collection, e))
    }

    /// One entry per distinct `doc_id`, in first-insertion order.
    pub fn list_documents(&self) -> Result<Vec<IndexedDocument>, IndexError> {
        self.ensure_collection("list")?;
        let metadata = self
            .store
            .list_metadata(&self.collection)
            .map_err(|e| failure("list", &self.collection, e))?;

        let mut docs: Vec<IndexedDocument> = Vec::new();
        for m in metadata {
            match docs.iter_mut().find(|d| d.doc_id == m.doc_id) {
                Some(doc) => doc.chunks += 1,
                None => docs.push(IndexedDocument {
                    doc_id: m.doc_id,
                    filename: m.filename,
                    filetype: m.filetype,
                    upload_time: m.upload_time,
                    chunks: 1,
                }),
            }
        }
        Ok(docs)
    }

    fn ensure_collection(&self, operation: &'static str) -> Result<(), IndexError> {
        let exists = self
            .store
            .has_collection(&self.collection)
            .map_err(|e| failure(operation, &self.collection, e))?;
        if !exists {
            self.store
                .create_collection(&self.collection)
                .map_err(|e| failure(operation, &self.collection, e))?;
            log_event!("index", "created collection", "{}", self.collection);
        }
        Ok(())
    }
}

fn describe_files(chunks: &[Chunk]) -> String {
    let mut names: Vec<&str> = chunks.iter().map(|c| c.metadata.filename.as_str()).collect();
    names.dedup();
    names.join(", ")
}

fn failure(operation: &'static str, detail: &str, err: impl std::fmt::Display) -> IndexError {
    tracing::error!("[index] {} failed ({}): {}", operation, detail, err);
    IndexError::store(operation, err)
}
