//! # ragwatch CLI
//!
//! ## Usage
//!
//! ```bash
//! ragwatch --config ./ragwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragwatch run` | Index, then watch the documents directory and answer questions |
//! | `ragwatch index` | Index the documents directory once |
//! | `ragwatch query "<q>"` | Answer one question from the index |
//! | `ragwatch list` | List indexed documents |
//! | `ragwatch delete <file\|doc_id>` | Remove a document's chunks from the index |
//! | `ragwatch purge` | Drop the collection and forget every known file |
//! | `ragwatch ledger` | Print the hash ledger |
//! | `ragwatch completions <shell>` | Print shell completions |
//!
//! Inside `run`, each input line is either a command (`exit`, `info`,
//! `list`, `delete <file>`, `purge`, `clear`) or a question.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use ragwatch::app::App;
use ragwatch::config;
use ragwatch::ingest::{BulkReport, DuplicateResolver, PolicyResolver, Resolution};
use ragwatch::logging;
use ragwatch::query::{Answer, Generator, QueryPipeline};
use ragwatch::watcher::WatcherHandle;

/// ragwatch: incremental document indexing and retrieval for a local RAG
/// assistant.
#[derive(Parser)]
#[command(name = "ragwatch", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "./ragwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the documents directory, then watch it and answer questions.
    Run {
        /// Ask what to do with each duplicate found by the startup pass.
        #[arg(long)]
        interactive: bool,
    },

    /// Index the documents directory once and exit.
    Index {
        /// Ask what to do with each duplicate instead of applying the policy.
        #[arg(long)]
        interactive: bool,
    },

    /// Answer a single question.
    Query {
        question: String,

        /// Number of chunks to retrieve. Defaults to `[retrieval].k`.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// List indexed documents.
    List,

    /// Remove a document from the index by filename or doc id.
    Delete { target: String },

    /// Drop the collection and forget every known file.
    Purge,

    /// Print the hash ledger.
    Ledger,

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Asks on stdin what to do with each duplicate.
struct PromptResolver;

impl DuplicateResolver for PromptResolver {
    fn resolve(&self, duplicate: &str, existing: &str) -> Resolution {
        println!("'{duplicate}' has the same content as '{existing}'.");
        loop {
            print!("[s]kip, [k]eep as alias, or [d]elete the file? ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Resolution::Skip,
                Ok(_) => {}
            }
            match line.trim().to_lowercase().as_str() {
                "s" | "skip" | "" => return Resolution::Skip,
                "k" | "keep" => return Resolution::KeepAlias,
                "d" | "delete" => return Resolution::DeleteFile,
                _ => println!("Please answer s, k or d."),
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "ragwatch", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);
    let app = App::open(cfg)?;

    match cli.command {
        Commands::Run { interactive } => run_session(&app, interactive)?,
        Commands::Index { interactive } => {
            let report = bulk_index(&app, interactive)?;
            print_report(&report);
        }
        Commands::Query { question, k } => {
            let generator = app.generator()?;
            let k = k.unwrap_or(app.pipeline.k());
            let pipeline = QueryPipeline::new(Arc::clone(&app.index), k);
            let answer = pipeline.answer(&question, generator.as_ref())?;
            print_answer(&answer);
        }
        Commands::List => print_documents(&app)?,
        Commands::Delete { target } => delete(&app, &target)?,
        Commands::Purge => {
            app.indexer.purge()?;
            println!("Collection '{}' purged.", app.index.collection());
        }
        Commands::Ledger => {
            let entries = app.indexer.ledger().entries()?;
            if entries.is_empty() {
                println!("Ledger is empty.");
            }
            for (path, hash) in entries {
                println!("{hash}  {path}");
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn bulk_index(app: &App, interactive: bool) -> Result<BulkReport> {
    if interactive {
        app.indexer.bulk_index(&PromptResolver)
    } else {
        app.indexer.bulk_index(&PolicyResolver(app.indexer.policy()))
    }
}

fn run_session(app: &App, interactive: bool) -> Result<()> {
    let report = bulk_index(app, interactive)?;
    print_report(&report);

    let handle = app.watcher().spawn()?;
    let generator = app.generator()?;
    println!(
        "Watching {}. Ask a question, or type 'info', 'list', 'delete <file>', 'purge', 'clear' or 'exit'.",
        app.indexer.root().display()
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        if let Err(e) = handle_input(app, input, generator.as_ref(), &handle) {
            eprintln!("Error: {e:#}");
        }
    }

    handle.stop();
    Ok(())
}

fn handle_input(
    app: &App,
    input: &str,
    generator: &dyn Generator,
    handle: &WatcherHandle,
) -> Result<()> {
    match input {
        "info" => {
            println!("Documents:  {}", app.indexer.root().display());
            println!("Collection: {}", app.index.collection());
            println!("Chunks:     {}", app.index.count()?);
            println!("Known:      {} files", app.indexer.tracker().len());
            println!("Embedder:   {}", app.index.embedder().model_name());
            println!("Watcher:    {:?}", handle.state());
        }
        "list" => print_documents(app)?,
        "purge" => {
            app.indexer.purge()?;
            println!("Collection purged.");
        }
        "clear" => {
            let removed = app.indexer.clear_documents()?;
            println!("Removed {removed} files from the documents directory.");
        }
        _ => {
            if let Some(target) = input.strip_prefix("delete ") {
                return delete(app, target.trim());
            }
            let answer = app.pipeline.answer(input, generator)?;
            print_answer(&answer);
        }
    }
    Ok(())
}

fn delete(app: &App, target: &str) -> Result<()> {
    if let Some(removed) = app.indexer.retract_file(target)? {
        println!("Removed {removed} chunks of '{target}'.");
        return Ok(());
    }
    let removed = app.indexer.retract(target)?;
    if removed > 0 {
        println!("Removed {removed} chunks of document {target}.");
    } else {
        println!("No indexed document matches '{target}'.");
    }
    Ok(())
}

fn print_documents(app: &App) -> Result<()> {
    let documents = app.index.list_documents()?;
    if documents.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }
    for doc in documents {
        println!(
            "{}  {:<40} {:>4} chunks  {}",
            &doc.doc_id[..doc.doc_id.len().min(12)],
            doc.filename,
            doc.chunks,
            doc.upload_time
        );
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.context.is_empty() {
        println!("\nSources: {}", answer.sources().join(", "));
    }
    println!("({:.2}s)", answer.elapsed.as_secs_f64());
}

fn print_report(report: &BulkReport) {
    println!(
        "Indexed {} of {} files ({} chunks); {} unchanged, {} duplicates, {} unsupported, {} empty, {} unreadable.",
        report.indexed.len(),
        report.discovered,
        report.chunks(),
        report.unchanged.len(),
        report.duplicates.len(),
        report.unsupported.len(),
        report.empty.len(),
        report.unreadable.len()
    );
    for (duplicate, existing) in &report.duplicates {
        println!("  duplicate: {duplicate} = {existing}");
    }
    for (path, reason) in &report.failed {
        println!("  failed: {path}: {reason}");
    }
}
