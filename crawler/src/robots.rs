//! Minimal robots.txt support for the `*` user-agent group.

use crate::fetch::Fetcher;
use crate::frontier::domain_of;
use crate::politeness::Politeness;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay_ms: Option<u64>,
}

impl Robots {
    /// Longest matching rule wins; ties go to `Allow`.
    pub fn allows(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules.iter().filter(|r| path.starts_with(r.as_str())).map(String::len).max()
        };
        match (longest(self.allows.as_slice()), longest(self.disallows.as_slice())) {
            (Some(a), Some(d)) => a >= d,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay_ms.map(Duration::from_millis)
    }
}

pub fn parse_robots(txt: &str) -> Robots {
    let mut active = false;
    let mut robots = Robots::default();
    for line in txt.lines() {
        let l = line.split('#').next().unwrap_or_default().trim();
        if l.is_empty() {
            continue;
        }
        let Some((k, v)) = l.split_once(':') else { continue };
        let val = v.trim();
        match k.trim().to_ascii_lowercase().as_str() {
            "user-agent" => active = val == "*",
            // An empty Disallow allows everything.
            "allow" | "disallow" if active && val.is_empty() => {}
            "allow" if active => robots.allows.push(val.to_string()),
            "disallow" if active => robots.disallows.push(val.to_string()),
            "crawl-delay" if active => {
                if let Ok(n) = val.parse::<f64>() {
                    if n.is_finite() && n >= 0.0 {
                        robots.crawl_delay_ms = Some((n * 1000.0) as u64);
                    }
                }
            }
            _ => {}
        }
    }
    robots
}

/// robots.txt rules per `scheme://host:port`, fetched once each.
#[derive(Default)]
pub struct RobotsCache {
    rules: RwLock<HashMap<String, Arc<Robots>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the site of `url`. A missing or unreachable robots.txt allows
    /// everything. The robots.txt request takes its own politeness slot.
    pub async fn rules_for<F: Fetcher>(
        &self,
        fetcher: &F,
        politeness: &Politeness,
        url: &Url,
        delay: Duration,
    ) -> Arc<Robots> {
        let key = url.origin().ascii_serialization();
        if let Some(r) = self.rules.read().get(&key) {
            return r.clone();
        }
        let parsed = match url.join("/robots.txt") {
            Ok(robots_url) => {
                politeness.wait(&domain_of(url), delay).await;
                match fetcher.fetch(&robots_url).await {
                    Ok(page) => parse_robots(&page.body),
                    Err(e) => {
                        tracing::debug!(site = %key, error = %e, "robots.txt unavailable, allowing all");
                        Robots::default()
                    }
                }
            }
            Err(_) => Robots::default(),
        };
        self.rules.write().entry(key).or_insert_with(|| Arc::new(parsed)).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_group_rules_apply() {
        let robots = parse_robots(
            "User-agent: googlebot\nDisallow: /\n\n\
             User-agent: *\nDisallow: /private # secret\nAllow: /private/open\nCrawl-delay: 1.5\n",
        );
        assert!(robots.allows("/"));
        assert!(robots.allows("/public/page"));
        assert!(!robots.allows("/private/thing"));
        assert!(robots.allows("/private/open/doc"));
        assert_eq!(robots.crawl_delay(), Some(Duration::from_millis(1500)));
    }

    struct NoRobots;

    impl Fetcher for NoRobots {
        async fn fetch(&self, url: &Url) -> Result<crate::fetch::FetchedPage, crate::error::FetchError> {
            Err(crate::error::FetchError::Status { url: url.to_string(), status: 404 })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn robots_request_takes_a_politeness_slot() {
        let cache = RobotsCache::new();
        let politeness = Politeness::new();
        let delay = Duration::from_millis(500);
        let page = Url::parse("https://a.example/page").unwrap();
        let start = tokio::time::Instant::now();

        assert!(cache.rules_for(&NoRobots, &politeness, &page, delay).await.allows("/page"));
        assert!(start.elapsed() < delay);
        // the page request after it has to wait a full delay
        politeness.wait("a.example", delay).await;
        assert!(start.elapsed() >= delay);
        // cached rules do not book another slot
        cache.rules_for(&NoRobots, &politeness, &page, delay).await;
        assert!(start.elapsed() < delay * 2);
    }

    #[test]
    fn empty_disallow_allows_all() {
        let robots = parse_robots("User-agent: *\nDisallow:\n");
        assert!(robots.allows("/anything"));
        assert!(!parse_robots("User-agent: *\nDisallow: /\n").allows("/anything"));
    }
}
