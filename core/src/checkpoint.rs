//! Durable snapshots of the index and the crawl frontier.
//!
//! Layout: `[magic "RSCK"][u32 version BE][bincode payload][u32 CRC32 BE]`.
//! Files are written to `<path>.tmp`, synced, then renamed over `path`, so a
//! crash mid-write leaves the previous checkpoint intact.

use crate::error::{Error, Result};
use crate::index::{Index, IndexSnapshot};
use crate::Prime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

const MAGIC: &[u8; 4] = b"RSCK";
pub const CHECKPOINT_VERSION: u32 = 2;

/// A URL waiting in the crawl queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
    pub domain: String,
    pub discovered_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub queue: Vec<FrontierEntry>,
    pub visited: BTreeSet<String>,
    /// Page budget already spent by settled fetches. Resumed crawls count
    /// against `max_pages` from here.
    pub pages_claimed: usize,
}

impl FrontierSnapshot {
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.visited.is_empty()
    }

    /// Union of visited sets; queued URLs already visited by either side are
    /// dropped. Spent budgets add up.
    pub fn merge(mut self, other: FrontierSnapshot) -> Self {
        self.visited.extend(other.visited);
        self.pages_claimed = self.pages_claimed.saturating_add(other.pages_claimed);
        let mut queued = BTreeSet::new();
        let visited = &self.visited;
        self.queue = self
            .queue
            .into_iter()
            .chain(other.queue)
            .filter(|e| !visited.contains(&e.url) && queued.insert(e.url.clone()))
            .collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub created_at: String,
    pub index: IndexSnapshot,
    pub frontier: FrontierSnapshot,
}

impl Checkpoint {
    pub fn new(index: IndexSnapshot, frontier: FrontierSnapshot) -> Self {
        let created_at = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        Self { version: CHECKPOINT_VERSION, created_at, index, frontier }
    }

    pub fn capture(index: &Index, frontier: FrontierSnapshot) -> Result<Self> {
        Ok(Self::new(index.snapshot()?, frontier))
    }

    pub fn last_prime_assigned(&self) -> Prime {
        self.index.vocabulary.last_prime
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn write_checkpoint<P: AsRef<Path>>(path: P, checkpoint: &Checkpoint) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let payload = bincode::serialize(checkpoint)?;
    let mut bytes = Vec::with_capacity(payload.len() + 12);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&CHECKPOINT_VERSION.to_be_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());

    let tmp = temp_path(path);
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    tracing::info!(
        path = %path.display(),
        bytes = bytes.len(),
        documents = checkpoint.index.documents.len(),
        queued = checkpoint.frontier.queue.len(),
        visited = checkpoint.frontier.visited.len(),
        "checkpoint written"
    );
    Ok(())
}

/// Reads and verifies a checkpoint. I/O failures surface as `Error::Io`;
/// anything wrong with the content is `Error::CheckpointCorruption`.
pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    let raw = fs::read(path.as_ref())?;
    if raw.len() < 12 || &raw[..4] != MAGIC {
        return Err(Error::CheckpointCorruption("missing checkpoint header".into()));
    }
    let version = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
    if version != CHECKPOINT_VERSION {
        return Err(Error::CheckpointCorruption(format!("unsupported checkpoint version {version}")));
    }
    let (payload, footer) = raw[8..].split_at(raw.len() - 12);
    let stored = u32::from_be_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(Error::CheckpointCorruption(format!(
            "CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }
    bincode::deserialize(payload).map_err(|e| Error::CheckpointCorruption(e.to_string()))
}
