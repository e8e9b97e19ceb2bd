//! Local content ingestion: plain text, markdown, HTML and JSON/JSONL records.

use anyhow::Result;
use crawler::html_to_text;
use resonant_core::{Error as CoreError, Index};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    body: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub indexed: usize,
    pub duplicates: usize,
    pub empty: usize,
    pub failed_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Html,
    Json,
    JsonLines,
}

fn kind_of(path: &Path) -> Option<Kind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "md" | "markdown" => Some(Kind::Text),
        "html" | "htm" => Some(Kind::Html),
        "json" => Some(Kind::Json),
        "jsonl" => Some(Kind::JsonLines),
        _ => None,
    }
}

/// Supported files under `input` (or `input` itself), in path order.
pub fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = if input.is_dir() {
        WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| kind_of(p).is_some())
            .collect()
    } else if input.is_file() {
        vec![input.to_path_buf()]
    } else {
        Vec::new()
    };
    files.sort();
    files
}

/// Indexes every supported file under `input`. Unreadable or malformed
/// files are logged and skipped; only fatal index errors abort.
pub fn ingest_path(index: &Index, input: &Path) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    for file in collect_files(input) {
        match ingest_file(index, &file, &mut stats) {
            Ok(()) => {}
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping file");
                stats.failed_files += 1;
            }
        }
    }
    tracing::info!(
        indexed = stats.indexed,
        duplicates = stats.duplicates,
        empty = stats.empty,
        failed_files = stats.failed_files,
        "ingested documents"
    );
    Ok(stats)
}

fn is_fatal(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<CoreError>(), Some(CoreError::VocabularyExhausted { .. }))
}

fn ingest_file(index: &Index, file: &Path, stats: &mut IngestStats) -> Result<()> {
    let origin = file.display().to_string();
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
    match kind_of(file) {
        Some(Kind::Text) => add(index, &stem, &origin, &fs::read_to_string(file)?, stats),
        Some(Kind::Html) => {
            let (title, text) = html_to_text(&fs::read_to_string(file)?);
            let title = if title.is_empty() { stem } else { title };
            add(index, &title, &origin, &text, stats)
        }
        Some(Kind::Json) => {
            let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
            let docs: Vec<InputDoc> = match json {
                serde_json::Value::Array(arr) => {
                    arr.into_iter().map(serde_json::from_value).collect::<serde_json::Result<_>>()?
                }
                obj @ serde_json::Value::Object(_) => vec![serde_json::from_value(obj)?],
                _ => Vec::new(),
            };
            for (n, doc) in docs.into_iter().enumerate() {
                add_record(index, doc, &format!("{origin}#{n}"), stats)?;
            }
            Ok(())
        }
        Some(Kind::JsonLines) => {
            for (n, line) in BufReader::new(File::open(file)?).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let doc: InputDoc = serde_json::from_str(&line)?;
                add_record(index, doc, &format!("{origin}#{}", n + 1), stats)?;
            }
            Ok(())
        }
        None => Ok(()),
    }
}

fn add_record(index: &Index, doc: InputDoc, fallback_origin: &str, stats: &mut IngestStats) -> Result<()> {
    let origin = doc.url.or(doc.id).unwrap_or_else(|| fallback_origin.to_string());
    let title = if doc.title.is_empty() { origin.clone() } else { doc.title };
    add(index, &title, &origin, &doc.body, stats)
}

fn add(index: &Index, title: &str, origin: &str, body: &str, stats: &mut IngestStats) -> Result<()> {
    if body.trim().is_empty() {
        stats.empty += 1;
        return Ok(());
    }
    if index.contains_origin(origin) {
        stats.duplicates += 1;
        return Ok(());
    }
    index.add_document(title, origin, body)?;
    stats.indexed += 1;
    Ok(())
}
