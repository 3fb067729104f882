//! Chronicle CLI — ask questions about a corpus of historical events.
//!
//! `chronicle index` embeds an events file and persists the vector index;
//! `chronicle ask` answers a question against it.

use anyhow::Context;
use chronicle_core::config::load_config;
use chronicle_core::corpus::{Corpus, EventRow};
use chronicle_core::index::VectorIndex;
use chronicle_core::pipeline::{Pipeline, QueryRequest};
use chronicle_core::providers::BackendKind;
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Chronicle: retrieval-augmented answers over historical events
#[derive(Parser, Debug)]
#[command(name = "chronicle", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds chronicle.toml and the index snapshot)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Embed an events file and persist the vector index
    Index {
        /// Events file: one JSON object per line with event, label, date, abstract
        #[arg(short, long)]
        events: PathBuf,
    },
    /// Answer a question against the indexed events
    Ask {
        /// The question to answer
        question: String,

        /// Events file the index was built from
        #[arg(short, long)]
        events: PathBuf,

        /// Number of events to retrieve (out-of-range values use the default)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Generation backend: local or hosted
        #[arg(short, long)]
        backend: Option<String>,

        /// Re-embed the events instead of loading the persisted index
        #[arg(long)]
        no_snapshot: bool,
    },
}

/// Read a JSON-lines events file into rows, skipping blank lines.
fn load_rows(path: &Path) -> anyhow::Result<Vec<EventRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open events file {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut rows = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: EventRow = serde_json::from_str(&line)
            .with_context(|| format!("invalid event on line {} of {}", lineno + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_backend(name: &str) -> anyhow::Result<BackendKind> {
    match name.to_ascii_lowercase().as_str() {
        "local" => Ok(BackendKind::Local),
        "hosted" => Ok(BackendKind::Hosted),
        other => anyhow::bail!("unknown backend '{other}' (expected 'local' or 'hosted')"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry().with(stderr_layer).init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let config = load_config(Some(&workspace)).context("failed to load configuration")?;
    let index_path = workspace.join(&config.index.path);
    tracing::debug!(
        workspace = %workspace.display(),
        index = %index_path.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Index { events } => {
            let corpus = Corpus::load(load_rows(&events)?)?;
            let records = corpus.len();
            let pipeline = Pipeline::from_corpus(config, corpus)?;
            pipeline.knowledge().index().persist(&index_path)?;
            println!(
                "Indexed {records} events into {}",
                index_path.display()
            );
        }
        Commands::Ask {
            question,
            events,
            top_k,
            backend,
            no_snapshot,
        } => {
            let corpus = Corpus::load(load_rows(&events)?)?;
            let backend = backend.as_deref().map(parse_backend).transpose()?;

            let pipeline = if !no_snapshot && index_path.exists() {
                let index = VectorIndex::restore(&index_path).with_context(|| {
                    format!(
                        "failed to load index snapshot {} (re-run `chronicle index`)",
                        index_path.display()
                    )
                })?;
                Pipeline::from_snapshot(config, corpus, index).context(
                    "index snapshot does not match the events file (re-run `chronicle index`)",
                )?
            } else {
                Pipeline::from_corpus(config, corpus)?
            };

            let response = pipeline
                .answer(&QueryRequest {
                    query: question,
                    top_k,
                    backend,
                })
                .await?;

            println!("{}", response.answer);
            if !cli.quiet {
                eprintln!(
                    "[{} backend, {} events retrieved]",
                    response.backend, response.effective_top_k
                );
            }
        }
    }

    Ok(())
}
