mod ingest;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use resonant_core::checkpoint::{read_checkpoint, write_checkpoint};
use resonant_core::store::SledStore;
use resonant_core::{Checkpoint, EngineConfig, FrontierSnapshot, Index, ScoreWeights, SearchOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, query and maintain a prime-vector index", long_about = None)]
struct Cli {
    /// Checkpoint file holding the index
    #[arg(long, global = true, default_value = "./data/index.ckpt")]
    index: PathBuf,
    /// Tokenizer and scoring settings as JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add text, markdown, HTML and JSON/JSONL files to the index
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Also mirror the documents into a sled store at this directory
        #[arg(long)]
        store: Option<PathBuf>,
        /// Compress document bodies before saving
        #[arg(long, default_value_t = false)]
        compress: bool,
    },
    /// Rank documents against a query
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Standard score only (no quantum or persistence terms)
        #[arg(long, default_value_t = false)]
        standard_only: bool,
        #[arg(long, default_value_t = false)]
        no_persistence: bool,
        /// Do not update reversibility of the matched documents
        #[arg(long, default_value_t = false)]
        no_feedback: bool,
        #[arg(long)]
        min_score: Option<f64>,
        /// Weight of the feedback update
        #[arg(long, default_value_t = 1.0)]
        importance: f64,
        /// Comma separated standard,quantum,persistence weights
        #[arg(long)]
        weights: Option<String>,
        /// Print results as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print document count, vocabulary size and average entropy
    Stats,
    /// Compress (or with --undo decompress) every stored body
    Compress {
        #[arg(long, default_value_t = false)]
        undo: bool,
    },
    /// Write one JSON line per document
    Export {
        #[arg(long)]
        output: PathBuf,
    },
    /// Remove the document with the given origin
    Remove {
        origin: String,
    },
    /// Load the index from a sled store and write it as a checkpoint
    Load {
        #[arg(long)]
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build { input, store, compress } => {
            let (index, frontier) = open_index(&cli.index, config)?;
            let stats = ingest::ingest_path(&index, &input)?;
            if compress {
                index.compress_all_documents()?;
            }
            if let Some(dir) = store {
                let n = index.save_to_store(&SledStore::open(&dir)?)?;
                tracing::info!(documents = n, store = %dir.display(), "store updated");
            }
            save_index(&cli.index, &index, frontier)?;
            eprintln!(
                "indexed={} duplicates={} empty={} failed_files={} -> {}",
                stats.indexed,
                stats.duplicates,
                stats.empty,
                stats.failed_files,
                cli.index.display()
            );
        }
        Commands::Search { query, top_k, standard_only, no_persistence, no_feedback, min_score, importance, weights, json } => {
            let (index, frontier) = open_index(&cli.index, config)?;
            let mut options = if standard_only { SearchOptions::standard_only() } else { SearchOptions::default() };
            options.enable_persistence &= !no_persistence;
            options.apply_feedback = !no_feedback;
            options.min_score = min_score;
            options.importance = importance;
            if let Some(w) = weights {
                options.weights = parse_weights(&w)?;
            }
            let results = index.search(&query, top_k, &options);
            for (rank, r) in results.iter().enumerate() {
                if json {
                    println!("{}", serde_json::to_string(r)?);
                } else {
                    println!("{:>2}. [{:.4}] {} ({})", rank + 1, r.scores.combined, r.title, r.origin);
                    if let Some(s) = &r.snippet {
                        println!("    {s}");
                    }
                }
            }
            if results.is_empty() && !json {
                println!("no results");
            }
            if options.apply_feedback && !results.is_empty() {
                save_index(&cli.index, &index, frontier)?;
            }
        }
        Commands::Stats => {
            let (index, frontier) = open_index(&cli.index, config)?;
            let stats = index.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("frontier: queued={} visited={}", frontier.queue.len(), frontier.visited.len());
        }
        Commands::Compress { undo } => {
            let (index, frontier) = open_index(&cli.index, config)?;
            let n = if undo { index.decompress_all_documents()? } else { index.compress_all_documents()? };
            save_index(&cli.index, &index, frontier)?;
            eprintln!("{} documents {}", n, if undo { "decompressed" } else { "compressed" });
        }
        Commands::Export { output } => {
            let (index, _) = open_index(&cli.index, config)?;
            let n = index.export_jsonl(&output)?;
            eprintln!("exported {} documents -> {}", n, output.display());
        }
        Commands::Remove { origin } => {
            let (index, frontier) = open_index(&cli.index, config)?;
            let id = index.doc_id_for_origin(&origin).ok_or_else(|| anyhow!("no document with origin {origin}"))?;
            index.remove_document(id);
            save_index(&cli.index, &index, frontier)?;
            eprintln!("removed document {id}");
        }
        Commands::Load { store } => {
            let index = Index::new(config);
            let n = index.load_from_store(&SledStore::open(&store)?)?;
            save_index(&cli.index, &index, FrontierSnapshot::default())?;
            eprintln!("loaded {} documents from {} -> {}", n, store.display(), cli.index.display());
        }
    }
    Ok(())
}

/// The index stored at `path`, or an empty one when the file does not exist yet.
/// Any crawl frontier in the checkpoint is carried along untouched.
fn open_index(path: &Path, config: EngineConfig) -> Result<(Index, FrontierSnapshot)> {
    let index = Index::new(config);
    if !path.exists() {
        return Ok((index, FrontierSnapshot::default()));
    }
    let checkpoint = read_checkpoint(path)?;
    index.restore(checkpoint.index)?;
    Ok((index, checkpoint.frontier))
}

fn save_index(path: &Path, index: &Index, frontier: FrontierSnapshot) -> Result<()> {
    write_checkpoint(path, &Checkpoint::capture(index, frontier)?)?;
    Ok(())
}

fn parse_weights(s: &str) -> Result<ScoreWeights> {
    let parts: Vec<f64> = s.split(',').map(|p| p.trim().parse::<f64>()).collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [standard, quantum, persistence] => {
            Ok(ScoreWeights { standard: *standard, quantum: *quantum, persistence: *persistence })
        }
        _ => Err(anyhow!("expected three comma separated weights, got {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn weights_parse() {
        let w = parse_weights("1, 0.5,0").unwrap();
        assert_eq!(w, ScoreWeights { standard: 1.0, quantum: 0.5, persistence: 0.0 });
        assert!(parse_weights("1,2").is_err());
        assert!(parse_weights("a,b,c").is_err());
    }

    #[test]
    fn index_survives_save_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.ckpt");
        let (index, frontier) = open_index(&path, EngineConfig::default()).unwrap();
        assert!(index.is_empty());
        index.add_document("t", "mem://t", "saved words").unwrap();
        save_index(&path, &index, frontier).unwrap();

        let (reopened, _) = open_index(&path, EngineConfig::default()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.search("words", 1, &SearchOptions::default()).len(), 1);
    }
}
