//! # ragwatch
//!
//! Incremental document indexing and retrieval for a local RAG assistant.
//!
//! ragwatch watches a documents directory, fingerprints every file by
//! content, and indexes only content it has not seen before. Files are
//! loaded by format, split into overlapping chunks, embedded and written to
//! a vector store; questions are answered from the most similar chunks.
//! Identical content under a second name is detected and handed to a
//! duplicate policy instead of being indexed twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Watcher   │──▶│   Indexer    │──▶│ Loader+Chunker│──▶│ VectorIndex  │
//! │  (notify)  │   │ hash + admit │   │  txt/pdf/...  │   │ embed+store  │
//! └────────────┘   └──────┬───────┘   └───────────────┘   └──────┬───────┘
//!                         │                                      │
//!                  ┌──────┴───────┐                        ┌─────┴──────┐
//!                  │ ChangeTracker│                        │QueryPipeline│
//!                  │ + HashLedger │                        │ (CLI loop) │
//!                  └──────────────┘                        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragwatch index                 # index the documents directory once
//! ragwatch query "what changed?" # ask a single question
//! ragwatch run                   # watch the directory and answer interactively
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`hasher`] | Content fingerprints |
//! | [`tracker`] | Known-file registry and duplicate detection |
//! | [`ledger`] | Persistent hash ledger |
//! | [`loader`] | Per-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends (memory, SQLite) |
//! | [`index`] | Vector index adapter |
//! | [`ingest`] | Indexing pipeline and duplicate resolution |
//! | [`watcher`] | Directory watcher |
//! | [`query`] | Retrieval and answer generation |
//! | [`app`] | Pipeline wiring from config |

pub mod app;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hasher;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod loader;
pub mod logging;
pub mod models;
pub mod query;
pub mod store;
pub mod tracker;
pub mod watcher;
