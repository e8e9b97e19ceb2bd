//! The crawl frontier: URLs waiting to be fetched plus everything already
//! settled. It is the only crawl state shared between workers.

use parking_lot::Mutex;
use resonant_core::{DocId, FrontierEntry, FrontierSnapshot};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tokio::sync::Notify;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Robots,
    Depth,
    Domain,
    Budget,
    Duplicate,
}

/// Lifecycle of a frontier entry: `Discovered -> Fetching -> Indexed | Failed | Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Discovered,
    Fetching,
    Indexed(DocId),
    Failed,
    Skipped(SkipReason),
}

impl EntryState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, EntryState::Discovered | EntryState::Fetching)
    }
}

/// Fragment-free form used as the identity of a URL.
pub fn normalize(url: &Url) -> Url {
    let mut u = url.clone();
    u.set_fragment(None);
    u
}

pub fn domain_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// Parses a seed, assuming https when no scheme is given.
pub fn parse_seed(s: &str) -> Option<Url> {
    let s = s.trim();
    Url::parse(s)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .or_else(|| Url::parse(&format!("https://{s}")).ok())
        .filter(|u| u.host_str().is_some())
        .map(|u| normalize(&u))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierLimits {
    pub max_pages: usize,
    pub max_depth: u32,
    /// Hosts links may point to; `None` follows links anywhere.
    pub allowed_domains: Option<HashSet<String>>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<FrontierEntry>,
    in_flight: HashMap<String, FrontierEntry>,
    states: HashMap<String, EntryState>,
    /// Settled URLs, including those restored from a checkpoint.
    visited: BTreeSet<String>,
    /// Entries handed out against `max_pages`; skips give theirs back.
    claimed: usize,
    closed: bool,
}

pub struct Frontier {
    limits: FrontierLimits,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Frontier {
    pub fn new(limits: FrontierLimits) -> Self {
        Self { limits, inner: Mutex::new(Inner::default()), notify: Notify::new() }
    }

    /// Rebuilds a frontier from a checkpoint. Visited URLs are never queued
    /// again and the budget spent before the checkpoint stays spent.
    pub fn from_snapshot(limits: FrontierLimits, snapshot: FrontierSnapshot) -> Self {
        let frontier = Self::new(limits);
        {
            let mut inner = frontier.inner.lock();
            inner.visited = snapshot.visited;
            inner.claimed = snapshot.pages_claimed;
            for entry in snapshot.queue {
                if inner.visited.contains(&entry.url) || inner.states.contains_key(&entry.url) {
                    continue;
                }
                inner.states.insert(entry.url.clone(), EntryState::Discovered);
                inner.queue.push_back(entry);
            }
        }
        frontier
    }

    pub fn limits(&self) -> &FrontierLimits {
        &self.limits
    }

    /// Queues seed URLs at depth 0. Seeds bypass the domain filter.
    pub fn seed(&self, seeds: &[Url], now: u64) -> usize {
        seeds.iter().filter(|u| self.push(u, 0, now, false).is_ok()).count()
    }

    /// Queues a discovered link, or says why it was not queued.
    pub fn enqueue(&self, url: &Url, depth: u32, now: u64) -> Result<(), SkipReason> {
        self.push(url, depth, now, true)
    }

    fn push(&self, url: &Url, depth: u32, now: u64, check_domain: bool) -> Result<(), SkipReason> {
        if depth > self.limits.max_depth {
            return Err(SkipReason::Depth);
        }
        let domain = domain_of(url);
        if check_domain && self.limits.allowed_domains.as_ref().is_some_and(|d| !d.contains(&domain)) {
            return Err(SkipReason::Domain);
        }
        let key = normalize(url).to_string();
        let mut inner = self.inner.lock();
        if inner.visited.contains(&key) || inner.states.contains_key(&key) {
            return Err(SkipReason::Duplicate);
        }
        if inner.claimed >= self.limits.max_pages {
            return Err(SkipReason::Budget);
        }
        inner.states.insert(key.clone(), EntryState::Discovered);
        inner.queue.push_back(FrontierEntry { url: key, depth, domain, discovered_at: now });
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Next entry to fetch. Waits while the queue is empty but other entries
    /// are still being fetched (they may discover more links). Returns `None`
    /// once the frontier is closed, the page budget is spent, or nothing is
    /// left anywhere.
    pub async fn next(&self) -> Option<FrontierEntry> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if inner.claimed < self.limits.max_pages {
                    if let Some(entry) = inner.queue.pop_front() {
                        inner.claimed += 1;
                        inner.states.insert(entry.url.clone(), EntryState::Fetching);
                        inner.in_flight.insert(entry.url.clone(), entry.clone());
                        return Some(entry);
                    }
                }
                if inner.in_flight.is_empty() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Records the outcome of a fetched entry.
    pub fn complete(&self, url: &str, state: EntryState) {
        debug_assert!(state.is_settled());
        {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(url);
            if matches!(state, EntryState::Skipped(_)) {
                inner.claimed = inner.claimed.saturating_sub(1);
            }
            inner.states.insert(url.to_string(), state);
            inner.visited.insert(url.to_string());
        }
        self.notify.notify_waiters();
    }

    /// Puts a claimed but unfetched entry back at the front of the queue.
    pub fn release(&self, entry: FrontierEntry) {
        {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(&entry.url);
            inner.claimed = inner.claimed.saturating_sub(1);
            inner.states.insert(entry.url.clone(), EntryState::Discovered);
            inner.queue.push_front(entry);
        }
        self.notify.notify_waiters();
    }

    /// Wakes every waiting worker; `next` returns `None` from now on.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn state(&self, url: &str) -> Option<EntryState> {
        self.inner.lock().states.get(url).copied()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.inner.lock().visited.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Queue (in-flight entries first, since they are not settled yet),
    /// visited set and the budget spent by settled entries.
    pub fn snapshot(&self) -> FrontierSnapshot {
        let inner = self.inner.lock();
        let mut in_flight: Vec<FrontierEntry> = inner.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
        FrontierSnapshot {
            queue: in_flight.into_iter().chain(inner.queue.iter().cloned()).collect(),
            visited: inner.visited.clone(),
            pages_claimed: inner.claimed.saturating_sub(inner.in_flight.len()),
        }
    }
}
