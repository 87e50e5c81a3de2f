use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::classify::Topic;

const VALUESERP_URL: &str = "https://api.valueserp.com/search";
const SEARCH_LOCATION: &str = "Washington,DC (Hagerstown,MD),United States";

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Organic result links for the topic's ordinance query, in rank order.
    async fn ordinance_links(&self, topic: &Topic) -> Result<Vec<String>>;
}

pub fn build_query(topic: &Topic) -> String {
    format!("{} {} {} ordinance", topic.city_county, topic.state, topic.issue)
}

pub struct ValueSerp {
    client: reqwest::Client,
    api_key: String,
}

impl ValueSerp {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    organic_results: Option<Vec<OrganicResult>>,
}

#[derive(Deserialize)]
struct OrganicResult {
    link: String,
}

#[async_trait]
impl SearchEngine for ValueSerp {
    async fn ordinance_links(&self, topic: &Topic) -> Result<Vec<String>> {
        let query = build_query(topic);
        info!("Search query: {}", query);

        let response = self
            .client
            .get(VALUESERP_URL)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("q", query.as_str()),
                ("location", SEARCH_LOCATION),
                ("google_domain", "google.com"),
                ("gl", "us"),
                ("hl", "en"),
                ("output", "json"),
            ])
            .send()
            .await
            .context("Search request failed")?
            .error_for_status()
            .context("Search API returned an error status")?;

        let body: SearchResponse = response.json().await.context("Unreadable search response")?;
        let results = body
            .organic_results
            .ok_or_else(|| anyhow!("Search response has no organic_results"))?;
        Ok(results.into_iter().map(|r| r.link).collect())
    }
}
