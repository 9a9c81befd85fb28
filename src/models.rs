//! Core data models shared by the indexing pipeline.
//!
//! These types flow from the loader through the chunker into the vector
//! index, and back out of it as retrieval results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lower-case hex SHA-256 digest of a file's bytes.
pub type ContentHash = String;

/// A file the change tracker knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the documents directory. Unique key.
    pub path: String,
    pub content_hash: ContentHash,
    pub first_seen: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            first_seen: Utc::now(),
        }
    }
}

/// A file offered to the tracker for classification: its key and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub content_hash: ContentHash,
}

impl Candidate {
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// Classification of one batch of candidate files.
///
/// Transient: produced by [`ChangeTracker::classify`](crate::tracker::ChangeTracker::classify)
/// and consumed by the caller's duplicate resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new: Vec<FileRecord>,
    /// Later file → already indexed file with the same content.
    pub duplicate_of_existing: BTreeMap<String, String>,
    /// Later file → first file in the same batch with the same content.
    pub duplicate_in_batch: BTreeMap<String, String>,
    /// Same path and same content as an already known record.
    pub unchanged: Vec<String>,
    /// Files whose digest could not be computed.
    pub unreadable: Vec<String>,
}

impl ChangeSet {
    pub fn duplicate_count(&self) -> usize {
        self.duplicate_of_existing.len() + self.duplicate_in_batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
            && self.duplicate_of_existing.is_empty()
            && self.duplicate_in_batch.is_empty()
            && self.unchanged.is_empty()
            && self.unreadable.is_empty()
    }
}

/// Metadata copied onto every chunk of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Content hash of the originating file.
    pub doc_id: String,
    pub filename: String,
    pub filetype: String,
    /// RFC 3339 timestamp of when the file was indexed.
    pub upload_time: String,
    /// Character offset of the chunk within its text unit.
    pub start_offset: usize,
    /// Loader unit (CSV row, ...) the chunk was cut from.
    pub unit: usize,
}

/// A raw text unit produced by the document loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub text: String,
    /// Metadata of the unit; `start_offset` is filled in by the chunker.
    pub metadata: ChunkMetadata,
}

/// A bounded-length slice of a text unit: the unit stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// One document in the index, aggregated over its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedDocument {
    pub doc_id: String,
    pub filename: String,
    pub filetype: String,
    pub upload_time: String,
    pub chunks: usize,
}
