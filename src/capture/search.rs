use crate::capture::types::SearchHit;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Finds candidate listing pages through the Google Custom Search JSON API
pub struct ListingSearch {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    link: String,
}

impl ListingSearch {
    pub fn new(api_key: &str, engine_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: CUSTOM_SEARCH_URL.to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Search for properties for sale around `location`
    pub async fn search(&self, location: &str) -> Result<Vec<SearchHit>> {
        let location = location.trim();
        if location.is_empty() {
            anyhow::bail!("Search location must not be empty");
        }
        let query = search_query(location);
        debug!("Custom search query: {}", query);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query.as_str()),
                ("num", "10"),
            ])
            .send()
            .await
            .context("Failed to reach search API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Search API returned status: {}", status);
            anyhow::bail!("Search API error ({}): {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to decode search response")?;
        let hits = dedup_hits(parsed.items);

        info!("Found {} candidate listings for {}", hits.len(), location);
        Ok(hits)
    }
}

fn search_query(location: &str) -> String {
    format!("{} property for sale", location)
}

fn dedup_hits(items: Vec<SearchItem>) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.link.is_empty() && seen.insert(item.link.clone()))
        .map(|item| SearchHit {
            title: if item.title.is_empty() {
                item.link.clone()
            } else {
                item.title
            },
            link: item.link,
        })
        .collect()
}
