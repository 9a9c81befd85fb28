//! Directory watcher for incremental indexing.
//!
//! [`Watcher`] observes the documents directory on a dedicated thread and
//! runs the [`Indexer`] synchronously for every file that appears, either
//! created in place or renamed into the directory. Other events are
//! ignored.
//!
//! Per file the watcher moves through
//!
//! ```text
//! Idle → Detected → Classifying → Indexing → Idle
//! ```
//!
//! and duplicates return from `Classifying` straight to `Idle`. Before a
//! file is hashed its size must stay unchanged for the settle interval, so
//! half-written files are not fingerprinted.
//!
//! Every per-file failure is logged and the watcher keeps listening. Each
//! processed file bumps the [`CompletionSignal`], which is what callers and
//! tests wait on.

use anyhow::{Context, Result};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::ingest::{DuplicateResolver, FileOutcome, Indexer, PolicyResolver};
use crate::{debug_event, log_event};

/// Upper bound on size checks while waiting for a file to settle.
const MAX_SETTLE_ATTEMPTS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Detected,
    Classifying,
    Indexing,
}

/// Counter of processed files with blocking waits, like a resettable event.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    completed: Mutex<usize>,
    cond: Condvar,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        *self.completed.lock() += 1;
        self.cond.notify_all();
    }

    pub fn completed(&self) -> usize {
        *self.completed.lock()
    }

    pub fn reset(&self) {
        *self.completed.lock() = 0;
    }

    /// Block until at least `count` completions or `timeout`. Returns
    /// whether the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.completed.lock();
        while *completed < count {
            if self.cond.wait_until(&mut completed, deadline).timed_out() {
                return *completed >= count;
            }
        }
        true
    }
}

pub struct Watcher {
    indexer: Arc<Indexer>,
    root: PathBuf,
    recursive: bool,
    settle: Duration,
    resolver: Arc<dyn DuplicateResolver>,
    state: Arc<Mutex<WatchState>>,
    signal: Arc<CompletionSignal>,
}

impl Watcher {
    pub fn new(
        indexer: Arc<Indexer>,
        root: impl Into<PathBuf>,
        recursive: bool,
        settle: Duration,
    ) -> Self {
        let resolver = Arc::new(PolicyResolver(indexer.policy()));
        Self {
            indexer,
            root: root.into(),
            recursive,
            settle,
            resolver,
            state: Arc::new(Mutex::new(WatchState::Idle)),
            signal: Arc::new(CompletionSignal::new()),
        }
    }

    /// Replace the policy-driven duplicate resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn DuplicateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn signal(&self) -> Arc<CompletionSignal> {
        Arc::clone(&self.signal)
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// Start watching on a new thread. The directory watch is registered
    /// before this returns, so files created afterwards are not missed.
    pub fn spawn(self) -> Result<WatcherHandle> {
        let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
        let (shutdown_tx, shutdown_rx) = unbounded::<()>();

        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;
        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        fs_watcher
            .watch(&self.root, mode)
            .with_context(|| format!("Failed to watch {}", self.root.display()))?;
        log_event!("watcher", "started", "{}", self.root.display());

        let state = Arc::clone(&self.state);
        let signal = Arc::clone(&self.signal);
        let thread = std::thread::Builder::new()
            .name("ragwatch-watcher".into())
            .spawn(move || {
                // Keep the OS watch alive for the life of the loop.
                let _fs_watcher = fs_watcher;
                self.run(event_rx, shutdown_rx);
            })?;

        Ok(WatcherHandle {
            shutdown: shutdown_tx,
            thread: Some(thread),
            state,
            signal,
        })
    }

    fn run(&self, events: Receiver<notify::Result<Event>>, shutdown: Receiver<()>) {
        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => tracing::warn!("[watcher] watch error: {}", e),
                    Err(_) => break,
                },
            }
        }
        self.set_state(WatchState::Idle);
        log_event!("watcher", "stopped");
    }

    fn handle_event(&self, event: Event) {
        let paths: Vec<PathBuf> = match event.kind {
            EventKind::Create(_) => event.paths,
            // For a two-sided rename the destination comes last.
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.into_iter().last().into_iter().collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event.paths,
            _ => return,
        };

        for path in paths {
            if path.is_dir() || !self.indexer.is_candidate(&path) {
                continue;
            }
            self.handle_file(&path);
            self.signal.notify();
        }
    }

    /// Run one file through the pipeline. Returns what happened, or `None`
    /// when the file vanished or the pipeline failed.
    pub fn handle_file(&self, path: &Path) -> Option<FileOutcome> {
        let key = self.indexer.relative_key(path);
        self.set_state(WatchState::Detected);
        log_event!("watcher", "detected", "{}", key);

        if !wait_until_stable(path, self.settle) {
            log_event!("watcher", "vanished", "{}", key);
            self.set_state(WatchState::Idle);
            return None;
        }

        self.set_state(WatchState::Classifying);
        let result = self
            .indexer
            .index_file_with(path, || self.set_state(WatchState::Indexing));

        let outcome = match result {
            Ok(FileOutcome::Duplicate { existing }) => {
                let hash = self
                    .indexer
                    .tracker()
                    .get(&existing)
                    .map(|r| r.content_hash)
                    .unwrap_or_default();
                self.indexer
                    .resolve_duplicate(&key, &hash, &existing, self.resolver.as_ref());
                Some(FileOutcome::Duplicate { existing })
            }
            Ok(outcome) => {
                debug_event!("watcher", "processed", "{} → {:?}", key, outcome);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("[watcher] failed to index {}: {}", key, e);
                None
            }
        };
        self.set_state(WatchState::Idle);
        outcome
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock() = state;
    }
}

/// Wait until the file size is unchanged across one settle interval.
/// Returns `false` if the file disappears.
fn wait_until_stable(path: &Path, settle: Duration) -> bool {
    let size = |p: &Path| std::fs::metadata(p).ok().map(|m| m.len());
    let Some(mut last) = size(path) else {
        return false;
    };
    if settle.is_zero() {
        return true;
    }
    for _ in 0..MAX_SETTLE_ATTEMPTS {
        std::thread::sleep(settle);
        match size(path) {
            None => return false,
            Some(now) if now == last => return true,
            Some(now) => last = now,
        }
    }
    true
}

/// Owner of a running watcher thread. Dropping it stops the watcher.
pub struct WatcherHandle {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
    state: Arc<Mutex<WatchState>>,
    signal: Arc<CompletionSignal>,
}

impl WatcherHandle {
    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    pub fn signal(&self) -> &Arc<CompletionSignal> {
        &self.signal
    }

    /// Stop listening and wait for the current file to finish.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.shutdown.send(());
            if thread.join().is_err() {
                tracing::error!("[watcher] thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::embedding::HashingProvider;
    use crate::index::VectorIndex;
    use crate::ingest::IndexerOptions;
    use crate::ledger::HashLedger;
    use crate::store::InMemoryStore;
    use crate::tracker::ChangeTracker;
    use tempfile::TempDir;

    fn indexer(dir: &TempDir) -> Arc<Indexer> {
        let index = Arc::new(VectorIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingProvider::default()),
            "DataCollection",
        ));
        Arc::new(
            Indexer::new(
                dir.path().join("data"),
                Arc::new(ChangeTracker::new()),
                index,
                HashLedger::new(dir.path().join("results/hash_values.txt")),
                IndexerOptions {
                    chunk_size: 600,
                    overlap: 200,
                    recursive: false,
                    exclude_globs: Vec::new(),
                    policy: DuplicatePolicy::Skip,
                },
            )
            .unwrap(),
        )
    }

    #[test]
    fn signal_wait_times_out_and_succeeds() {
        let signal = Arc::new(CompletionSignal::new());
        assert!(!signal.wait_for(1, Duration::from_millis(20)));
        let s = Arc::clone(&signal);
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            s.notify();
            s.notify();
        });
        assert!(signal.wait_for(2, Duration::from_secs(5)));
        t.join().unwrap();
        assert_eq!(signal.completed(), 2);
        signal.reset();
        assert_eq!(signal.completed(), 0);
    }

    #[test]
    fn handle_file_walks_states_and_indexes() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer(&dir);
        let watcher = Watcher::new(
            Arc::clone(&indexer),
            indexer.root().to_path_buf(),
            false,
            Duration::ZERO,
        );
        let path = indexer.root().join("a.txt");
        std::fs::write(&path, "fresh content").unwrap();

        assert_eq!(
            watcher.handle_file(&path),
            Some(FileOutcome::Indexed { chunks: 1 })
        );
        assert_eq!(watcher.state(), WatchState::Idle);

        let copy = indexer.root().join("a_copy.txt");
        std::fs::write(&copy, "fresh content").unwrap();
        assert_eq!(
            watcher.handle_file(&copy),
            Some(FileOutcome::Duplicate {
                existing: "a.txt".into()
            })
        );
        assert_eq!(indexer.index().count().unwrap(), 1);
    }

    #[test]
    fn vanished_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer(&dir);
        let watcher = Watcher::new(
            Arc::clone(&indexer),
            indexer.root().to_path_buf(),
            false,
            Duration::from_millis(5),
        );
        assert_eq!(watcher.handle_file(&indexer.root().join("gone.txt")), None);
        assert!(indexer.tracker().is_empty());
    }

    #[test]
    fn stable_file_settles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "done").unwrap();
        assert!(wait_until_stable(&path, Duration::from_millis(5)));
        assert!(!wait_until_stable(&dir.path().join("none"), Duration::from_millis(5)));
    }

    #[test]
    fn stop_joins_thread() {
        let dir = TempDir::new().unwrap();
        let indexer = indexer(&dir);
        let handle = Watcher::new(
            Arc::clone(&indexer),
            indexer.root().to_path_buf(),
            false,
            Duration::from_millis(10),
        )
        .spawn()
        .unwrap();
        assert_eq!(handle.state(), WatchState::Idle);
        handle.stop();
    }
}
