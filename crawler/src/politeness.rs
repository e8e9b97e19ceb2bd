use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Spaces out requests to the same host.
#[derive(Default)]
pub struct Politeness {
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl Politeness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the next free slot on `domain` and books the one after it,
    /// `delay` later. Concurrent callers queue up one `delay` apart.
    pub async fn wait(&self, domain: &str, delay: Duration) {
        let at = {
            let mut slots = self.next_slot.lock();
            let now = Instant::now();
            let at = slots.get(domain).copied().filter(|t| *t > now).unwrap_or(now);
            slots.insert(domain.to_string(), at + delay);
            at
        };
        sleep_until(at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn same_domain_requests_are_spaced() {
        let p = Politeness::new();
        let start = Instant::now();
        let delay = Duration::from_millis(500);
        p.wait("a.example", delay).await;
        p.wait("b.example", delay).await;
        assert!(start.elapsed() < delay);
        p.wait("a.example", delay).await;
        p.wait("a.example", delay).await;
        assert!(start.elapsed() >= 2 * delay);
    }
}
