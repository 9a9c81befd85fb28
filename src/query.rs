//! Question answering over the vector index.
//!
//! [`QueryPipeline`] retrieves the `k` most similar chunks for a question,
//! assembles them into a prompt and hands the prompt to a [`Generator`].
//! Retrieval never mutates shared state, so queries run concurrently with
//! the watcher.
//!
//! Generators:
//! - [`OllamaGenerator`]: `POST {url}/api/generate` with `stream: false`.
//! - [`ContextOnlyGenerator`]: returns the retrieved context itself, for
//!   sessions without a configured LLM.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::LlmConfig;
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::models::RetrievedChunk;
use crate::{debug_event, log_event};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const CONTEXT_HEADER: &str = "Context:\n";
const QUESTION_HEADER: &str = "\n\nQuestion: ";
const NO_CONTEXT: &str = "(no indexed documents matched)";

/// Produces an answer from an assembled prompt.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Result of [`QueryPipeline::answer`].
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: Vec<RetrievedChunk>,
    pub elapsed: Duration,
}

impl Answer {
    /// Distinct source filenames in retrieval order.
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for rc in &self.context {
            let name = rc.chunk.metadata.filename.as_str();
            if !sources.contains(&name) {
                sources.push(name);
            }
        }
        sources
    }
}

pub struct QueryPipeline {
    index: Arc<VectorIndex>,
    k: usize,
}

impl QueryPipeline {
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn answer_context(&self, question: &str) -> Result<Vec<RetrievedChunk>, IndexError> {
        self.index.query(question, self.k)
    }

    pub fn build_prompt(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let context = if chunks.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            chunks
                .iter()
                .map(|rc| format!("[{}]\n{}", rc.chunk.metadata.filename, rc.chunk.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        format!(
            "Answer the question using only the context below. \
             If the context does not contain the answer, say so.\n\n\
             {CONTEXT_HEADER}{context}{QUESTION_HEADER}{}",
            question.trim()
        )
    }

    pub fn answer(&self, question: &str, generator: &dyn Generator) -> Result<Answer> {
        let started = Instant::now();
        let context = self.answer_context(question)?;
        debug_event!("query", "retrieved", "{} chunks for {:?}", context.len(), question);
        let prompt = self.build_prompt(question, &context);
        let text = generator.generate(&prompt)?;
        let elapsed = started.elapsed();
        log_event!("query", "answered", "{:.2}s", elapsed.as_secs_f64());
        Ok(Answer {
            text,
            context,
            elapsed,
        })
    }
}

/// Echoes the context section of the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextOnlyGenerator;

impl Generator for ContextOnlyGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split_once(CONTEXT_HEADER)
            .and_then(|(_, rest)| rest.rsplit_once(QUESTION_HEADER))
            .map(|(context, _)| context.trim().to_string());
        Ok(context.unwrap_or_else(|| prompt.to_string()))
    }
}

pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl OllamaGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama generator"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        let json: serde_json::Value = response.json()?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|r| r.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

/// Create the generator for the `[llm]` section.
pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(ContextOnlyGenerator)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk;
    use crate::embedding::HashingProvider;
    use crate::models::{ChunkMetadata, TextUnit};
    use crate::store::InMemoryStore;

    struct Recording(parking_lot::Mutex<Vec<String>>);

    impl Generator for Recording {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.0.lock().push(prompt.to_string());
            Ok("forty-two".into())
        }
    }

    fn pipeline(k: usize) -> QueryPipeline {
        let index = Arc::new(VectorIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingProvider::default()),
            "DataCollection",
        ));
        for (name, text) in [
            ("rust.txt", "Rust has ownership and borrowing rules."),
            ("tea.txt", "Green tea is brewed at eighty degrees."),
        ] {
            let unit = TextUnit {
                text: text.into(),
                metadata: ChunkMetadata {
                    doc_id: format!("hash-{name}"),
                    filename: name.into(),
                    filetype: "txt".into(),
                    upload_time: "2026-01-01T00:00:00+00:00".into(),
                    start_offset: 0,
                    unit: 0,
                },
            };
            index.upsert(&chunk::split(&[unit], 600, 200)).unwrap();
        }
        QueryPipeline::new(index, k)
    }

    #[test]
    fn context_ranks_matching_document_first() {
        let pipeline = pipeline(1);
        let context = pipeline.answer_context("how is green tea brewed").unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].chunk.metadata.filename, "tea.txt");
    }

    #[test]
    fn prompt_contains_context_and_question() {
        let pipeline = pipeline(2);
        let context = pipeline.answer_context("ownership").unwrap();
        let prompt = pipeline.build_prompt("What about ownership?", &context);
        assert!(prompt.contains("[rust.txt]"));
        assert!(prompt.ends_with("Question: What about ownership?"));
        assert!(pipeline.build_prompt("q", &[]).contains(NO_CONTEXT));
    }

    #[test]
    fn answer_passes_prompt_to_generator() {
        let pipeline = pipeline(2);
        let generator = Recording(parking_lot::Mutex::new(Vec::new()));
        let answer = pipeline.answer("borrowing rules", &generator).unwrap();
        assert_eq!(answer.text, "forty-two");
        assert_eq!(answer.context.len(), 2);
        assert_eq!(answer.sources()[0], "rust.txt");
        assert_eq!(generator.0.lock().len(), 1);
    }

    #[test]
    fn context_only_generator_echoes_context() {
        let pipeline = pipeline(1);
        let answer = pipeline.answer("green tea", &ContextOnlyGenerator).unwrap();
        assert_eq!(
            answer.text,
            "[tea.txt]\nGreen tea is brewed at eighty degrees."
        );
    }

    #[test]
    fn zero_k_is_rejected() {
        let pipeline = pipeline(0);
        assert!(matches!(
            pipeline.answer_context("anything"),
            Err(IndexError::InvalidK)
        ));
    }

    #[test]
    fn parses_generate_response() {
        let json = serde_json::json!({"response": " Paris.\n", "done": true});
        assert_eq!(parse_generate_response(&json).unwrap(), "Paris.");
        assert!(parse_generate_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn disabled_llm_uses_context_only() {
        let generator = create_generator(&LlmConfig::default()).unwrap();
        let out = generator
            .generate("x\n\nContext:\nabc\n\nQuestion: q")
            .unwrap();
        assert_eq!(out, "abc");
    }
}
