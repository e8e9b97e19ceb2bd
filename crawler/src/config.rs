use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Larger bodies are dropped.
    pub max_body_bytes: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "resonant-crawler/0.1 (+https://example.com/bot)".to_string(),
            timeout_secs: 12,
            max_body_bytes: 2 * 1024 * 1024,
            max_redirects: 5,
        }
    }
}

/// Per-crawl behaviour besides the page/depth/worker limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOptions {
    /// Only follow links on the seeds' hosts.
    pub same_domain: bool,
    /// Further hosts links may point to. Set on its own (with `same_domain`
    /// off) it is the complete list.
    pub allowed_domains: Option<Vec<String>>,
    pub respect_robots: bool,
    /// Minimum gap between two requests to one host; robots `Crawl-delay` wins when longer.
    pub politeness_delay_ms: u64,
    pub max_retries: u32,
    /// First retry delay, doubled on every further attempt.
    pub retry_backoff_ms: u64,
    /// Write a checkpoint after this many indexed pages (0: only when the crawl ends).
    pub checkpoint_every: usize,
    pub checkpoint_path: Option<PathBuf>,
    pub progress_every: usize,
}

impl CrawlOptions {
    /// Hosts the crawl may follow links to, given the seeds' hosts. `None`
    /// means anywhere.
    pub fn link_domains<I: IntoIterator<Item = String>>(&self, seed_domains: I) -> Option<HashSet<String>> {
        let mut allowed: Option<HashSet<String>> = self.same_domain.then(|| seed_domains.into_iter().collect());
        if let Some(extra) = &self.allowed_domains {
            allowed
                .get_or_insert_with(HashSet::new)
                .extend(extra.iter().map(|d| d.trim().to_ascii_lowercase()).filter(|d| !d.is_empty()));
        }
        allowed
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            same_domain: true,
            allowed_domains: None,
            respect_robots: true,
            politeness_delay_ms: 1000,
            max_retries: 2,
            retry_backoff_ms: 500,
            checkpoint_every: 0,
            checkpoint_path: None,
            progress_every: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_pages: usize,
    pub max_depth: u32,
    pub worker_count: usize,
    pub options: CrawlOptions,
    pub fetch: FetchConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_depth: 2,
            worker_count: 8,
            options: CrawlOptions::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl CrawlConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Seed URLs from a file, one per line; blank lines and `#` comments are ignored.
pub fn read_seeds<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let mut seeds = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        seeds.push(s);
    }
    Ok(seeds)
}
