use anyhow::{anyhow, Result};
use clap::Parser;
use crawler::{read_seeds, CrawlConfig, Engine};
use resonant_core::EngineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the web into a prime-vector index, respecting robots.txt")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: Option<PathBuf>,
    /// Checkpoint file, written periodically and when the crawl ends
    #[arg(long, default_value = "./data/crawl.ckpt")]
    checkpoint: PathBuf,
    /// Continue from the checkpoint instead of starting from seeds
    #[arg(long, default_value_t = false)]
    resume: bool,
    /// Crawl settings as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tokenizer and scoring settings as JSON
    #[arg(long)]
    engine_config: Option<PathBuf>,
    /// Maximum number of pages to index, including those of a resumed crawl
    #[arg(long)]
    max_pages: Option<usize>,
    /// Maximum link depth from the seeds
    #[arg(long)]
    max_depth: Option<u32>,
    /// Concurrency (number of workers)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Request timeout seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long)]
    user_agent: Option<String>,
    /// Follow links to any host, not only the seeds' hosts
    #[arg(long, default_value_t = false)]
    any_domain: bool,
    /// Also follow links to this host (repeatable)
    #[arg(long = "allow-domain")]
    allow_domains: Vec<String>,
    /// Minimum delay between requests to one host, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Checkpoint after this many indexed pages (0: only at the end)
    #[arg(long)]
    checkpoint_every: Option<usize>,
}

impl Cli {
    fn crawl_config(&self) -> Result<CrawlConfig> {
        let mut cfg = match &self.config {
            Some(path) => CrawlConfig::from_json_file(path)?,
            None => CrawlConfig::default(),
        };
        if let Some(n) = self.max_pages { cfg.max_pages = n; }
        if let Some(d) = self.max_depth { cfg.max_depth = d; }
        if let Some(c) = self.concurrency { cfg.worker_count = c; }
        if let Some(t) = self.timeout_secs { cfg.fetch.timeout_secs = t; }
        if let Some(ua) = &self.user_agent { cfg.fetch.user_agent = ua.clone(); }
        if let Some(ms) = self.delay_ms { cfg.options.politeness_delay_ms = ms; }
        if let Some(n) = self.checkpoint_every { cfg.options.checkpoint_every = n; }
        if self.any_domain { cfg.options.same_domain = false; }
        if !self.allow_domains.is_empty() {
            cfg.options.allowed_domains.get_or_insert_with(Vec::new).extend(self.allow_domains.iter().cloned());
        }
        cfg.options.checkpoint_path = Some(self.checkpoint.clone());
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    let cfg = args.crawl_config()?;
    let engine_config = match &args.engine_config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = Arc::new(Engine::http(engine_config, &cfg.fetch)?);

    let id = if args.resume {
        let summary = engine.resume(&args.checkpoint)?;
        eprintln!(
            "crawler: resumed documents={} queued={} visited={} from {}",
            summary.documents,
            summary.queued,
            summary.visited,
            args.checkpoint.display()
        );
        engine.continue_crawl(cfg.max_pages, cfg.max_depth, cfg.worker_count, cfg.options.clone())?
    } else {
        let path = args.seeds.as_ref().ok_or_else(|| anyhow!("--seeds is required unless --resume is given"))?;
        let seeds = read_seeds(path)?;
        eprintln!(
            "crawler: seeds_loaded={} max_pages={} max_depth={} concurrency={} same_domain={} checkpoint={}",
            seeds.len(),
            cfg.max_pages,
            cfg.max_depth,
            cfg.worker_count,
            cfg.options.same_domain,
            args.checkpoint.display()
        );
        engine.start_crawl(&seeds, cfg.max_pages, cfg.max_depth, cfg.worker_count, cfg.options.clone())?
    };

    let stopper = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("crawler: stopping, waiting for in-flight fetches");
            stopper.stop_all();
        }
    });

    let report = engine.wait(id).await?;
    let stats = engine.stats();
    eprintln!(
        "done: indexed={} failed={} skipped={} documents={} vocabulary={} stopped={} -> {}",
        report.indexed,
        report.failed,
        report.skipped,
        stats.document_count,
        stats.vocabulary_size,
        report.stopped,
        args.checkpoint.display()
    );
    Ok(())
}
