use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;

/// Time source in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}

/// Settable clock for deterministic scoring and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: u64) {
        self.now.fetch_add(days * SECONDS_PER_DAY as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Whole and fractional days elapsed between two unix timestamps; never negative.
pub fn days_between(earlier: u64, later: u64) -> f64 {
    later.saturating_sub(earlier) as f64 / SECONDS_PER_DAY
}
