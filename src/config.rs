//! TOML configuration.
//!
//! Every section has defaults so a missing file or a partial file still
//! yields a usable [`Config`]. [`load_config`] validates the values the
//! pipeline relies on (chunk geometry, retrieval `k`, provider names).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// How long a new file's size must stay unchanged before it is hashed.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            recursive: false,
            exclude_globs: Vec::new(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_settle_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_results_dir")]
    pub dir: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: default_results_dir(),
        }
    }
}

impl ResultsConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join("hash_values.txt")
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./results")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    600
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `memory` or `sqlite`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./results/vectors.sqlite")
}
fn default_collection() -> String {
    "DataCollection".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashing`, `ollama`, or `local` (fastembed feature).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled` or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Log the duplicate and leave it out of the index.
    #[default]
    Skip,
    /// Record the duplicate as an alias of the existing file.
    Allow,
    /// Remove the later file from the documents directory.
    Delete,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DuplicatesConfig {
    #[serde(default)]
    pub policy: DuplicatePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.k == 0 {
        bail!("retrieval.k must be >= 1");
    }

    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }
    match config.store.backend.as_str() {
        "memory" | "sqlite" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "hashing" | "local" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'ollama'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" => {}
        "ollama" => {
            if config.llm.model.is_none() {
                bail!("llm.model must be specified when provider is 'ollama'");
            }
        }
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    Ok(())
}
