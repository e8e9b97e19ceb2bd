//! Polite concurrent crawler feeding a `resonant_core::Index`.

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod politeness;
pub mod robots;
pub mod worker;

pub use config::{read_seeds, CrawlConfig, CrawlOptions, FetchConfig};
pub use engine::{Engine, ResumeSummary};
pub use error::{CrawlError, FetchError, ParseError, Result};
pub use extract::{extract, html_to_text, ExtractedPage};
pub use fetch::{FetchedPage, Fetcher, HttpFetcher};
pub use frontier::{EntryState, Frontier, FrontierLimits, SkipReason};
pub use worker::{CrawlId, CrawlProgress, CrawlReport, CrawlSession, Crawler};
