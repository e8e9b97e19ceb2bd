use crate::config::FetchConfig;
use crate::error::FetchError;
use reqwest::{header, Client};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Retrieves one URL. Non-2xx responses are errors.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, max_body_bytes: config.max_body_bytes })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let too_large = || FetchError::TooLarge { url: url.to_string(), limit: self.max_body_bytes };
        if resp.content_length().is_some_and(|n| n > self.max_body_bytes as u64) {
            return Err(too_large());
        }
        let final_url = resp.url().clone();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await.map_err(|e| FetchError::from_reqwest(url, e))?;
        if bytes.len() > self.max_body_bytes {
            return Err(too_large());
        }
        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}
