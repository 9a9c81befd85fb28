//! Wiring of the pipeline from a [`Config`].
//!
//! [`App::open`] builds the vector store, embedder, index, tracker, ledger
//! and indexer, and seeds the tracker from the ledger. The CLI commands and
//! the interactive session all start here.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::ingest::{Indexer, IndexerOptions};
use crate::ledger::HashLedger;
use crate::log_event;
use crate::query::{create_generator, Generator, QueryPipeline};
use crate::store;
use crate::tracker::ChangeTracker;
use crate::watcher::Watcher;

pub struct App {
    pub config: Config,
    pub index: Arc<VectorIndex>,
    pub indexer: Arc<Indexer>,
    pub pipeline: QueryPipeline,
}

impl App {
    pub fn open(config: Config) -> Result<Self> {
        let store = store::open(&config.store)?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let index = Arc::new(VectorIndex::new(
            store,
            embedder,
            config.store.collection.clone(),
        ));
        let indexer = Arc::new(Indexer::new(
            &config.documents.dir,
            Arc::new(ChangeTracker::new()),
            Arc::clone(&index),
            HashLedger::new(config.results.ledger_path()),
            IndexerOptions::from_config(&config),
        )?);
        indexer.restore_from_ledger()?;
        let pipeline = QueryPipeline::new(Arc::clone(&index), config.retrieval.k);

        log_event!(
            "app",
            "opened",
            "{} backend, collection {}, embedder {}",
            config.store.backend,
            index.collection(),
            index.embedder().model_name()
        );
        Ok(Self {
            config,
            index,
            indexer,
            pipeline,
        })
    }

    /// Watcher over the documents directory with the configured settle time.
    pub fn watcher(&self) -> Watcher {
        Watcher::new(
            Arc::clone(&self.indexer),
            self.indexer.root().to_path_buf(),
            self.indexer.recursive(),
            Duration::from_millis(self.config.documents.settle_ms),
        )
    }

    pub fn generator(&self) -> Result<Box<dyn Generator>> {
        create_generator(&self.config.llm)
    }
}
