//! Facade tying the index and the crawler together: indexing, search,
//! crawl management, checkpoint and resume.

use crate::config::{CrawlOptions, FetchConfig};
use crate::error::{CrawlError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::frontier::{domain_of, parse_seed, Frontier, FrontierLimits};
use crate::worker::{CrawlId, CrawlProgress, CrawlReport, CrawlSession, Crawler};
use parking_lot::{Mutex, RwLock};
use resonant_core::checkpoint::{read_checkpoint, write_checkpoint};
use resonant_core::{
    Checkpoint, Clock, DocId, EngineConfig, FrontierSnapshot, Index, IndexStats, SearchOptions, SearchResult,
    SystemClock,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

struct CrawlHandle {
    session: Arc<CrawlSession>,
    task: Mutex<Option<JoinHandle<CrawlReport>>>,
}

/// What `resume` brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeSummary {
    pub documents: usize,
    pub queued: usize,
    pub visited: usize,
}

pub struct Engine<F: Fetcher> {
    index: Arc<Index>,
    crawler: Arc<Crawler<F>>,
    clock: Arc<dyn Clock>,
    crawls: RwLock<BTreeMap<CrawlId, CrawlHandle>>,
    next_crawl: AtomicU64,
    /// Frontier restored by `resume`, waiting for `continue_crawl`.
    restored: Mutex<Option<FrontierSnapshot>>,
}

impl Engine<HttpFetcher> {
    pub fn http(config: EngineConfig, fetch: &FetchConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(Index::new(config)), HttpFetcher::new(fetch)?))
    }
}

impl<F: Fetcher> Engine<F> {
    pub fn new(index: Arc<Index>, fetcher: F) -> Self {
        Self::with_clock(index, fetcher, Arc::new(SystemClock))
    }

    pub fn with_clock(index: Arc<Index>, fetcher: F, clock: Arc<dyn Clock>) -> Self {
        let crawler = Arc::new(Crawler::with_clock(Arc::new(fetcher), index.clone(), clock.clone()));
        Self {
            index,
            crawler,
            clock,
            crawls: RwLock::new(BTreeMap::new()),
            next_crawl: AtomicU64::new(1),
            restored: Mutex::new(None),
        }
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn add_document(&self, title: &str, origin: &str, body: &str) -> Result<DocId> {
        Ok(self.index.add_document(title, origin, body)?)
    }

    pub fn search(&self, query: &str, top_k: usize, options: &SearchOptions) -> Vec<SearchResult> {
        self.index.search(query, top_k, options)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Starts a crawl in the background and returns its id. Must be called
    /// from within a tokio runtime.
    pub fn start_crawl<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_pages: usize,
        max_depth: u32,
        worker_count: usize,
        options: CrawlOptions,
    ) -> Result<CrawlId> {
        let seeds: Vec<Url> = seeds.iter().filter_map(|s| parse_seed(s.as_ref())).collect();
        if seeds.is_empty() {
            return Err(CrawlError::NoSeeds);
        }
        let allowed = options.link_domains(seeds.iter().map(domain_of));
        let frontier = Frontier::new(FrontierLimits { max_pages, max_depth, allowed_domains: allowed });
        frontier.seed(&seeds, self.clock.now());
        Ok(self.launch(frontier, worker_count, options))
    }

    /// Starts a crawl and waits for it to finish.
    pub async fn crawl<S: AsRef<str>>(
        &self,
        seeds: &[S],
        max_pages: usize,
        max_depth: u32,
        worker_count: usize,
        options: CrawlOptions,
    ) -> Result<CrawlReport> {
        let id = self.start_crawl(seeds, max_pages, max_depth, worker_count, options)?;
        self.wait(id).await
    }

    /// Continues from the frontier restored by the last `resume`. Pages
    /// settled before the checkpoint count against `max_pages`.
    pub fn continue_crawl(
        &self,
        max_pages: usize,
        max_depth: u32,
        worker_count: usize,
        options: CrawlOptions,
    ) -> Result<CrawlId> {
        let snapshot = self.restored.lock().take().ok_or(CrawlError::NothingToResume)?;
        let crawled: HashSet<String> = snapshot
            .queue
            .iter()
            .map(|e| e.domain.clone())
            .chain(snapshot.visited.iter().filter_map(|u| Url::parse(u).ok()).map(|u| domain_of(&u)))
            .collect();
        let allowed = options.link_domains(crawled);
        let frontier = Frontier::from_snapshot(FrontierLimits { max_pages, max_depth, allowed_domains: allowed }, snapshot);
        Ok(self.launch(frontier, worker_count, options))
    }

    fn launch(&self, frontier: Frontier, worker_count: usize, options: CrawlOptions) -> CrawlId {
        let id = self.next_crawl.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(CrawlSession::new(id, frontier, worker_count, options));
        let task = tokio::spawn(self.crawler.clone().run(session.clone()));
        self.crawls
            .write()
            .insert(id, CrawlHandle { session, task: Mutex::new(Some(task)) });
        id
    }

    pub fn crawl_progress(&self, id: CrawlId) -> Option<CrawlProgress> {
        self.crawls.read().get(&id).map(|h| h.session.progress())
    }

    pub fn stop_crawl(&self, id: CrawlId) -> Result<()> {
        let crawls = self.crawls.read();
        let handle = crawls.get(&id).ok_or(CrawlError::UnknownCrawl(id))?;
        tracing::info!(crawl_id = id, "stop requested");
        handle.session.stop();
        Ok(())
    }

    pub fn stop_all(&self) {
        for handle in self.crawls.read().values() {
            handle.session.stop();
        }
    }

    /// Waits for a crawl to finish. Later calls return the final counters.
    pub async fn wait(&self, id: CrawlId) -> Result<CrawlReport> {
        let (session, task) = {
            let crawls = self.crawls.read();
            let handle = crawls.get(&id).ok_or(CrawlError::UnknownCrawl(id))?;
            let task = handle.task.lock().take();
            (handle.session.clone(), task)
        };
        match task {
            Some(task) => match task.await {
                Ok(report) => Ok(report),
                Err(e) => {
                    tracing::error!(crawl_id = id, error = %e, "crawl task failed");
                    Ok(session.report())
                }
            },
            None => Ok(session.report()),
        }
    }

    /// Writes the index and every crawl's frontier to `path` atomically.
    pub fn checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut frontier = self.restored.lock().clone().unwrap_or_default();
        for handle in self.crawls.read().values() {
            frontier = frontier.merge(handle.session.frontier().snapshot());
        }
        let checkpoint = Checkpoint::capture(&self.index, frontier)?;
        write_checkpoint(path, &checkpoint)?;
        Ok(())
    }

    /// Restores the index and frontier from `path`. On any error the engine
    /// keeps its current state.
    pub fn resume<P: AsRef<Path>>(&self, path: P) -> Result<ResumeSummary> {
        let checkpoint = read_checkpoint(path.as_ref())?;
        let documents = checkpoint.index.documents.len();
        self.index.restore(checkpoint.index)?;
        let summary = ResumeSummary {
            documents,
            queued: checkpoint.frontier.queue.len(),
            visited: checkpoint.frontier.visited.len(),
        };
        tracing::info!(
            path = %path.as_ref().display(),
            documents,
            queued = summary.queued,
            visited = summary.visited,
            created_at = %checkpoint.created_at,
            "resumed from checkpoint"
        );
        *self.restored.lock() = Some(checkpoint.frontier);
        Ok(summary)
    }
}
