//! Crawl sessions and the worker pool that drains their frontier.

use crate::config::CrawlOptions;
use crate::error::FetchError;
use crate::extract::extract;
use crate::fetch::{FetchedPage, Fetcher};
use crate::frontier::{normalize, EntryState, Frontier, SkipReason};
use crate::politeness::Politeness;
use crate::robots::RobotsCache;
use parking_lot::Mutex;
use resonant_core::checkpoint::write_checkpoint;
use resonant_core::{Checkpoint, Clock, FrontierEntry, Index, SystemClock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use url::Url;

pub type CrawlId = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlProgress {
    /// Pages fetched and indexed.
    pub pages_fetched: usize,
    /// Page budget of the crawl.
    pub pages_total: usize,
    pub queue_size: usize,
    pub failed: usize,
    pub skipped: usize,
    pub visited: usize,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub id: CrawlId,
    pub indexed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped: bool,
}

/// One crawl: its frontier, options, counters and stop flag.
pub struct CrawlSession {
    id: CrawlId,
    frontier: Frontier,
    options: CrawlOptions,
    worker_count: usize,
    indexed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    stop: AtomicBool,
    finished: AtomicBool,
    checkpoint_lock: Mutex<()>,
}

impl CrawlSession {
    pub fn new(id: CrawlId, frontier: Frontier, worker_count: usize, options: CrawlOptions) -> Self {
        Self {
            id,
            frontier,
            options,
            worker_count: worker_count.max(1),
            indexed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            checkpoint_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> CrawlId {
        self.id
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// In-flight fetches finish; nothing new is started.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.frontier.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> CrawlProgress {
        CrawlProgress {
            pages_fetched: self.indexed.load(Ordering::SeqCst),
            pages_total: self.frontier.limits().max_pages,
            queue_size: self.frontier.queue_len(),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            visited: self.frontier.visited_len(),
            finished: self.is_finished(),
        }
    }

    pub fn report(&self) -> CrawlReport {
        CrawlReport {
            id: self.id,
            indexed: self.indexed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            stopped: self.is_stopped(),
        }
    }

    fn record(&self, state: EntryState) -> usize {
        let counter = match state {
            EntryState::Indexed(_) => &self.indexed,
            EntryState::Failed => &self.failed,
            EntryState::Skipped(_) => &self.skipped,
            EntryState::Discovered | EntryState::Fetching => return 0,
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Shared by every crawl of an engine: fetcher, index, robots cache and
/// per-host politeness slots.
pub struct Crawler<F: Fetcher> {
    fetcher: Arc<F>,
    index: Arc<Index>,
    robots: RobotsCache,
    politeness: Politeness,
    clock: Arc<dyn Clock>,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: Arc<F>, index: Arc<Index>) -> Self {
        Self::with_clock(fetcher, index, Arc::new(SystemClock))
    }

    pub fn with_clock(fetcher: Arc<F>, index: Arc<Index>, clock: Arc<dyn Clock>) -> Self {
        Self { fetcher, index, robots: RobotsCache::new(), politeness: Politeness::new(), clock }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// Runs `session` to completion on `worker_count` tasks.
    pub async fn run(self: Arc<Self>, session: Arc<CrawlSession>) -> CrawlReport {
        tracing::info!(
            crawl_id = session.id,
            workers = session.worker_count,
            queued = session.frontier.queue_len(),
            max_pages = session.frontier.limits().max_pages,
            max_depth = session.frontier.limits().max_depth,
            "crawl started"
        );
        let mut workers = JoinSet::new();
        for worker in 0..session.worker_count {
            workers.spawn(self.clone().worker(session.clone(), worker));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(crawl_id = session.id, error = %e, "crawl worker panicked");
            }
        }
        session.finished.store(true, Ordering::SeqCst);
        self.checkpoint(&session).await;

        let report = session.report();
        tracing::info!(
            crawl_id = report.id,
            indexed = report.indexed,
            failed = report.failed,
            skipped = report.skipped,
            visited = session.frontier.visited_len(),
            frontier = session.frontier.queue_len(),
            stopped = report.stopped,
            "crawl finished"
        );
        report
    }

    async fn worker(self: Arc<Self>, session: Arc<CrawlSession>, worker: usize) {
        while !session.is_stopped() {
            let Some(entry) = session.frontier.next().await else { break };
            if session.is_stopped() {
                session.frontier.release(entry);
                break;
            }
            let state = self.process(&session, &entry).await;
            session.frontier.complete(&entry.url, state);
            let count = session.record(state);
            if let EntryState::Indexed(_) = state {
                let opts = &session.options;
                if opts.progress_every > 0 && count % opts.progress_every == 0 {
                    tracing::info!(
                        crawl_id = session.id,
                        fetched = count,
                        visited = session.frontier.visited_len(),
                        frontier = session.frontier.queue_len(),
                        "progress"
                    );
                }
                if opts.checkpoint_every > 0 && count % opts.checkpoint_every == 0 {
                    self.checkpoint(&session).await;
                }
            }
        }
        tracing::debug!(crawl_id = session.id, worker, "worker exiting");
    }

    async fn process(&self, session: &CrawlSession, entry: &FrontierEntry) -> EntryState {
        if self.index.contains_origin(&entry.url) {
            return EntryState::Skipped(SkipReason::Duplicate);
        }
        let Ok(url) = Url::parse(&entry.url) else {
            tracing::warn!(url = %entry.url, "unparseable frontier url");
            return EntryState::Failed;
        };
        let opts = &session.options;
        let mut delay = Duration::from_millis(opts.politeness_delay_ms);
        if opts.respect_robots {
            let rules = self.robots.rules_for(&*self.fetcher, &self.politeness, &url, delay).await;
            if !rules.allows(url.path()) {
                tracing::debug!(url = %url, "disallowed by robots.txt");
                return EntryState::Skipped(SkipReason::Robots);
            }
            if let Some(d) = rules.crawl_delay() {
                delay = delay.max(d);
            }
        }

        let page = match self.fetch_with_retries(session, &url, &entry.domain, delay).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "fetch failed");
                return EntryState::Failed;
            }
        };
        let final_url = normalize(&page.url);
        if final_url.as_str() != entry.url && self.index.contains_origin(final_url.as_str()) {
            return EntryState::Skipped(SkipReason::Duplicate);
        }
        let extracted = match extract(&page) {
            Ok(x) => x,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "page not indexed");
                return EntryState::Failed;
            }
        };

        let now = self.clock.now();
        for link in &extracted.links {
            // Rejections (depth, domain, duplicates, budget) are routine.
            let _ = session.frontier.enqueue(link, entry.depth + 1, now);
        }
        let title = if extracted.title.is_empty() { entry.url.as_str() } else { extracted.title.as_str() };
        match self.index.add_document(title, &entry.url, &extracted.text) {
            Ok(id) => EntryState::Indexed(id),
            Err(e @ resonant_core::Error::VocabularyExhausted { .. }) => {
                tracing::error!(error = %e, "stopping crawl");
                session.stop();
                EntryState::Failed
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "indexing failed");
                EntryState::Failed
            }
        }
    }

    /// Fetches `url`, retrying transient failures with exponential backoff.
    async fn fetch_with_retries(
        &self,
        session: &CrawlSession,
        url: &Url,
        domain: &str,
        delay: Duration,
    ) -> Result<FetchedPage, FetchError> {
        let opts = &session.options;
        let mut attempt = 0;
        loop {
            self.politeness.wait(domain, delay).await;
            match self.fetcher.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < opts.max_retries => {
                    let backoff = Duration::from_millis(opts.retry_backoff_ms.saturating_mul(1 << attempt.min(16)));
                    tracing::debug!(url = %url, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the session's checkpoint when a path is configured, on the
    /// blocking pool. Failures are logged.
    async fn checkpoint(&self, session: &Arc<CrawlSession>) {
        let Some(path) = session.options.checkpoint_path.clone() else { return };
        let index = self.index.clone();
        let session = session.clone();
        let id = session.id;
        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || {
            let _guard = session.checkpoint_lock.lock();
            Checkpoint::capture(&index, session.frontier.snapshot()).and_then(|cp| write_checkpoint(&target, &cp))
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(crawl_id = id, path = %path.display(), error = %e, "checkpoint failed"),
            Err(e) => tracing::error!(crawl_id = id, path = %path.display(), error = %e, "checkpoint task failed"),
        }
    }
}
