use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const TIMEOUT_SECS: u64 = 30;

/// A fetched resource after redirects have been followed.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single-attempt HTTP GET. Transport failures surface as `Err`; HTTP error
/// statuses do not, callers decide what a 404 means for them.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
            .to_vec();

        Ok(FetchedPage {
            final_url,
            status,
            body,
        })
    }
}
