use crate::worker::CrawlId;
use thiserror::Error;
use url::Url;

/// Failure to retrieve a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

impl FetchError {
    pub fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else {
            FetchError::Network { url: url.to_string(), message: err.to_string() }
        }
    }

    /// Worth another attempt: timeouts, connection trouble, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::TooLarge { .. } => false,
        }
    }
}

/// A fetched page that cannot be turned into a document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("page has no text")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("no valid seed urls")]
    NoSeeds,
    #[error("no restored frontier to continue from")]
    NothingToResume,
    #[error("unknown crawl {0}")]
    UnknownCrawl(CrawlId),
    #[error(transparent)]
    Core(#[from] resonant_core::Error),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retried() {
        let status = |status| FetchError::Status { url: "u".into(), status };
        assert!(FetchError::Timeout("u".into()).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!FetchError::TooLarge { url: "u".into(), limit: 1 }.is_transient());
    }
}
