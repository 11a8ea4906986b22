use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_core::embedding::EmbeddingStore;
use search_core::index::{AcceptAll, ClassifierGate, DocId, IndexBuilder, RawDocument, ScoreGate};
use search_core::persist;
use search_core::SearchConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the inverted index from classified documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from JSON/JSONL document files and atomically
    /// replace the artifact at the output path
    Build {
        /// Input path (file or directory of .json/.jsonl files)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Minimum classifier score for a document to be indexed;
        /// omit to index every structurally valid document
        #[arg(long)]
        min_score: Option<f32>,
        /// Optional JSONL file of document embeddings ({"url", "vector"})
        #[arg(long)]
        embeddings: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            min_score,
            embeddings,
        } => build(&input, &output, min_score, embeddings.as_deref()),
    }
}

fn build(input: &str, output: &str, min_score: Option<f32>, embeddings: Option<&str>) -> Result<()> {
    let docs = collect_documents(Path::new(input))?;
    tracing::info!(count = docs.len(), "documents read");

    let gate: Box<dyn ClassifierGate> = match min_score {
        Some(threshold) => Box::new(ScoreGate { threshold }),
        None => Box::new(AcceptAll),
    };
    let mut builder = IndexBuilder::new();
    let mut gated_out = 0usize;
    for doc in &docs {
        if gate.accept(doc) {
            builder.add(doc);
        } else {
            gated_out += 1;
        }
    }
    if gated_out > 0 {
        tracing::info!(gated_out, "documents rejected by classifier gate");
    }
    let index = builder.finish();

    let store = match embeddings {
        Some(path) => build_embedding_store(Path::new(path), &index)?,
        None => None,
    };

    let config = SearchConfig::default();
    persist::save(&index, store.as_ref(), &config, output)?;
    tracing::info!(output, "index build complete");
    Ok(())
}

fn collect_documents(input: &Path) -> Result<Vec<RawDocument>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file()
                && matches!(
                    p.extension().and_then(|s| s.to_str()),
                    Some("json") | Some("jsonl")
                )
            {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else {
        files.push(input.to_path_buf());
    }

    let mut docs = Vec::new();
    let mut unreadable = 0usize;
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("open {}", file.display()))?,
            );
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<RawDocument>(&line) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => {
                        unreadable += 1;
                        tracing::warn!(file = %file.display(), error = %e, "skipping bad line");
                    }
                }
            }
        } else {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("open {}", file.display()))?,
            );
            match serde_json::from_reader::<_, serde_json::Value>(reader) {
                Ok(serde_json::Value::Array(arr)) => {
                    for v in arr {
                        match serde_json::from_value::<RawDocument>(v) {
                            Ok(doc) => docs.push(doc),
                            Err(e) => {
                                unreadable += 1;
                                tracing::warn!(file = %file.display(), error = %e, "skipping bad entry");
                            }
                        }
                    }
                }
                Ok(v) => match serde_json::from_value::<RawDocument>(v) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => {
                        unreadable += 1;
                        tracing::warn!(file = %file.display(), error = %e, "skipping bad file");
                    }
                },
                Err(e) => {
                    unreadable += 1;
                    tracing::warn!(file = %file.display(), error = %e, "skipping unreadable file");
                }
            }
        }
    }
    if unreadable > 0 {
        tracing::warn!(unreadable, "documents skipped while reading input");
    }
    Ok(docs)
}

#[derive(Deserialize)]
struct EmbeddingRecord {
    url: String,
    vector: Vec<f32>,
}

/// Read per-URL embedding vectors and attach them to the freshly built
/// index. Vectors for unknown URLs or with the wrong dimensionality are
/// skipped with a warning; the index remains fully usable without them.
fn build_embedding_store(
    path: &Path,
    index: &search_core::index::SearchIndex,
) -> Result<Option<EmbeddingStore>> {
    let by_url: HashMap<&str, DocId> = index
        .docs
        .iter()
        .enumerate()
        .map(|(i, meta)| (meta.url.as_str(), i as DocId))
        .collect();

    let reader =
        BufReader::new(File::open(path).with_context(|| format!("open {}", path.display()))?);
    let mut store: Option<EmbeddingStore> = None;
    let mut attached = 0usize;
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: EmbeddingRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "skipping bad embedding line");
                continue;
            }
        };
        let Some(&doc_id) = by_url.get(record.url.as_str()) else {
            skipped += 1;
            continue;
        };
        let store = store.get_or_insert_with(|| EmbeddingStore::new(record.vector.len()));
        match store.insert(doc_id, &record.vector) {
            Ok(()) => attached += 1,
            Err(e) => {
                skipped += 1;
                tracing::warn!(url = record.url, error = %e, "embedding rejected");
            }
        }
    }
    tracing::info!(attached, skipped, "embedding store built");
    Ok(store)
}
