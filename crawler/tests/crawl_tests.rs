use crawler::{CrawlError, CrawlOptions, Engine, FetchError, FetchedPage, Fetcher};
use parking_lot::Mutex;
use resonant_core::{EngineConfig, Index, SearchOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;
use url::Url;

#[derive(Clone)]
enum Reply {
    Html(String),
    Text(&'static str, String),
    Status(u16),
}

/// In-memory web. Each URL answers with its replies in turn, repeating the last one.
#[derive(Clone, Default)]
struct MockWeb {
    replies: Arc<Mutex<HashMap<String, Vec<Reply>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockWeb {
    fn page(self, url: &str, title: &str, links: &[&str]) -> Self {
        let anchors: String = links.iter().map(|l| format!("<a href=\"{l}\">{l}</a> ")).collect();
        let html = format!("<html><head><title>{title}</title></head><body><p>{title} page text</p>{anchors}</body></html>");
        self.replies(url, vec![Reply::Html(html)])
    }

    fn replies(self, url: &str, replies: Vec<Reply>) -> Self {
        self.replies.lock().insert(url.to_string(), replies);
        self
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }

    /// Page fetches, robots.txt excluded.
    fn page_hits(&self) -> usize {
        self.hits.lock().iter().filter(|(u, _)| !u.ends_with("/robots.txt")).map(|(_, n)| n).sum()
    }
}

impl Fetcher for MockWeb {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let n = {
            let mut hits = self.hits.lock();
            let n = hits.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let reply = self
            .replies
            .lock()
            .get(url.as_str())
            .and_then(|r| r.get(n - 1).or_else(|| r.last()).cloned())
            .unwrap_or(Reply::Status(404));
        let page = |content_type: &str, body: String| FetchedPage {
            url: url.clone(),
            status: 200,
            content_type: Some(content_type.to_string()),
            body,
        };
        match reply {
            Reply::Html(body) => Ok(page("text/html; charset=utf-8", body)),
            Reply::Text(content_type, body) => Ok(page(content_type, body)),
            Reply::Status(status) => Err(FetchError::Status { url: url.to_string(), status }),
        }
    }
}

fn options() -> CrawlOptions {
    CrawlOptions { politeness_delay_ms: 0, retry_backoff_ms: 1, ..CrawlOptions::default() }
}

fn engine(web: &MockWeb) -> Engine<MockWeb> {
    Engine::new(Arc::new(Index::new(EngineConfig::default())), web.clone())
}

#[tokio::test]
async fn seed_and_two_links_at_depth_one() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["/a", "/b"])
        .page("https://site.test/a", "alpha", &["/deep"])
        .page("https://site.test/b", "beta", &["/a"])
        .page("https://site.test/deep", "deep", &[]);
    let engine = engine(&web);

    let report = engine.crawl(&["https://site.test/"], 10, 1, 4, options()).await.unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(web.page_hits(), 3);
    assert_eq!(web.hits("https://site.test/deep"), 0);
    assert_eq!(engine.stats().document_count, 3);
    assert!(engine.index().contains_origin("https://site.test/b"));

    let hits = engine.search("alpha", 5, &SearchOptions::default());
    assert_eq!(hits[0].origin, "https://site.test/a");
    assert_eq!(hits[0].title, "alpha");
}

#[tokio::test]
async fn page_budget_is_never_exceeded() {
    let mut web = MockWeb::default();
    for i in 0..20 {
        let next = format!("/p{}", i + 1);
        web = web.page(&format!("https://site.test/p{i}"), &format!("page{i}"), &[next.as_str(), "/p0"]);
    }
    let engine = engine(&web);
    let report = engine.crawl(&["https://site.test/p0"], 4, 50, 3, options()).await.unwrap();
    assert_eq!(report.indexed, 4);
    assert_eq!(engine.stats().document_count, 4);
    assert_eq!(web.page_hits(), 4);
}

#[tokio::test]
async fn robots_rules_are_respected() {
    let web = MockWeb::default()
        .replies(
            "https://site.test/robots.txt",
            vec![Reply::Text("text/plain", "User-agent: *\nDisallow: /private\n".into())],
        )
        .page("https://site.test/", "home", &["/private/secret", "/public"])
        .page("https://site.test/private/secret", "secret", &[])
        .page("https://site.test/public", "public", &[]);
    let engine = engine(&web);
    let report = engine.crawl(&["https://site.test/"], 10, 2, 2, options()).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(web.hits("https://site.test/private/secret"), 0);
    assert_eq!(web.hits("https://site.test/robots.txt"), 1);
}

#[tokio::test]
async fn links_stay_on_seed_domains_unless_allowed() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["https://other.test/x"])
        .page("https://other.test/x", "elsewhere", &[]);

    let same = engine(&web);
    same.crawl(&["https://site.test/"], 10, 2, 1, options()).await.unwrap();
    assert_eq!(web.hits("https://other.test/x"), 0);

    let any = engine(&web);
    let opts = CrawlOptions { same_domain: false, ..options() };
    let report = any.crawl(&["https://site.test/"], 10, 2, 1, opts).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(web.hits("https://other.test/x"), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_permanent_ones_are_not() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["/flaky", "/gone", "/binary"])
        .replies(
            "https://site.test/flaky",
            vec![Reply::Status(503), Reply::Status(503), Reply::Html("<p>finally</p>".into())],
        )
        .replies("https://site.test/gone", vec![Reply::Status(404)])
        .replies("https://site.test/binary", vec![Reply::Text("application/octet-stream", "xx".into())]);
    let engine = engine(&web);
    let report = engine.crawl(&["https://site.test/"], 10, 1, 2, options()).await.unwrap();
    assert_eq!(web.hits("https://site.test/flaky"), 3);
    assert_eq!(web.hits("https://site.test/gone"), 1);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failed, 2);

    let progress = engine.crawl_progress(report.id).unwrap();
    assert!(progress.finished);
    assert_eq!(progress.pages_fetched, 2);
    assert_eq!(progress.pages_total, 10);
    assert_eq!(progress.queue_size, 0);
}

#[tokio::test]
async fn retries_give_up_after_the_limit() {
    let web = MockWeb::default().replies("https://site.test/", vec![Reply::Status(500)]);
    let engine = engine(&web);
    let opts = CrawlOptions { max_retries: 1, ..options() };
    let report = engine.crawl(&["https://site.test/"], 10, 1, 1, opts).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(web.hits("https://site.test/"), 2);
}

#[tokio::test]
async fn resume_never_refetches_or_reindexes() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["/p1", "/p2", "/p3"])
        .page("https://site.test/p1", "one", &["/"])
        .page("https://site.test/p2", "two", &["/p1"])
        .page("https://site.test/p3", "three", &[]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("crawl.ckpt");

    let first = engine(&web);
    let report = first.crawl(&["https://site.test/"], 2, 1, 1, options()).await.unwrap();
    assert_eq!(report.indexed, 2);
    first.checkpoint(&path).unwrap();

    let second = engine(&web);
    let summary = second.resume(&path).unwrap();
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.queued, 2);
    let id = second.continue_crawl(10, 1, 2, options()).unwrap();
    let report = second.wait(id).await.unwrap();
    assert_eq!(report.indexed, 2);

    assert_eq!(second.stats().document_count, 4);
    for url in ["https://site.test/", "https://site.test/p1", "https://site.test/p2", "https://site.test/p3"] {
        assert_eq!(web.hits(url), 1, "{url}");
    }
    assert!(matches!(
        second.continue_crawl(10, 1, 1, options()),
        Err(CrawlError::NothingToResume)
    ));
}

#[tokio::test]
async fn page_budget_carries_over_a_resume() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["/p1", "/p2", "/p3"])
        .page("https://site.test/p1", "one", &[])
        .page("https://site.test/p2", "two", &[])
        .page("https://site.test/p3", "three", &[]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("budget.ckpt");
    let opts = CrawlOptions { checkpoint_path: Some(path.clone()), ..options() };

    let first = engine(&web);
    assert_eq!(first.crawl(&["https://site.test/"], 2, 1, 1, opts.clone()).await.unwrap().indexed, 2);

    let second = engine(&web);
    assert_eq!(second.resume(&path).unwrap().queued, 2);
    let id = second.continue_crawl(2, 1, 1, opts.clone()).unwrap();
    assert_eq!(second.wait(id).await.unwrap().indexed, 0);
    assert_eq!(second.stats().document_count, 2);

    // a larger budget picks up where the first crawl stopped
    let third = engine(&web);
    third.resume(&path).unwrap();
    let id = third.continue_crawl(3, 1, 1, opts).unwrap();
    assert_eq!(third.wait(id).await.unwrap().indexed, 1);
    assert_eq!(third.stats().document_count, 3);
}

#[tokio::test]
async fn explicit_domain_list_extends_the_seed_hosts() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["https://friend.test/x", "https://other.test/y"])
        .page("https://friend.test/x", "friend", &[])
        .page("https://other.test/y", "other", &[]);
    let engine = engine(&web);
    let opts = CrawlOptions { allowed_domains: Some(vec!["friend.test".into()]), ..options() };
    let report = engine.crawl(&["https://site.test/"], 10, 2, 1, opts).await.unwrap();
    assert_eq!(report.indexed, 2);
    assert_eq!(web.hits("https://friend.test/x"), 1);
    assert_eq!(web.hits("https://other.test/y"), 0);
}

#[tokio::test]
async fn corrupt_checkpoint_keeps_the_current_index() {
    let web = MockWeb::default();
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.ckpt");
    std::fs::write(&path, b"RSCK not really a checkpoint").unwrap();

    let engine = engine(&web);
    engine.add_document("kept", "mem://kept", "still here").unwrap();
    assert!(matches!(
        engine.resume(&path),
        Err(CrawlError::Core(resonant_core::Error::CheckpointCorruption(_)))
    ));
    assert_eq!(engine.stats().document_count, 1);
}

#[tokio::test]
async fn periodic_checkpoints_are_written_during_the_crawl() {
    let web = MockWeb::default()
        .page("https://site.test/", "home", &["/a"])
        .page("https://site.test/a", "alpha", &[]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("auto.ckpt");
    let opts = CrawlOptions { checkpoint_every: 1, checkpoint_path: Some(path.clone()), ..options() };
    engine(&web).crawl(&["https://site.test/"], 10, 1, 1, opts).await.unwrap();

    let checkpoint = resonant_core::checkpoint::read_checkpoint(&path).unwrap();
    assert_eq!(checkpoint.index.documents.len(), 2);
    assert!(checkpoint.frontier.queue.is_empty());
    assert_eq!(checkpoint.frontier.visited.len(), 2);
}

#[tokio::test]
async fn stop_signal_ends_the_crawl() {
    let mut web = MockWeb::default();
    for i in 0..50 {
        let next = format!("/p{}", i + 1);
        web = web.page(&format!("https://site.test/p{i}"), &format!("page{i}"), &[next.as_str()]);
    }
    let engine = engine(&web);
    let opts = CrawlOptions { politeness_delay_ms: 20, ..options() };
    let id = engine.start_crawl(&["https://site.test/p0"], 100, 100, 1, opts).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    engine.stop_crawl(id).unwrap();
    let report = engine.wait(id).await.unwrap();
    assert!(report.stopped);
    assert!(report.indexed < 50);
    assert!(engine.crawl_progress(id).unwrap().finished);
}

#[tokio::test]
async fn bad_seeds_and_unknown_crawls_are_errors() {
    let engine = engine(&MockWeb::default());
    assert!(matches!(engine.start_crawl(&["", "   "], 1, 1, 1, options()), Err(CrawlError::NoSeeds)));
    assert!(matches!(engine.stop_crawl(99), Err(CrawlError::UnknownCrawl(99))));
}
