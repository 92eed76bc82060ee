// ABOUTME: HTTP client for the BeatSaver maps API
// ABOUTME: Fetches paginated latest-map listings and single maps by id

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::models::PageResponse;
use super::Catalog;

/// Default BeatSaver maps API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.beatsaver.com/maps";

pub struct CatalogClient {
    client: Client,
    api_base_url: String,
}

impl CatalogClient {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `<base>/latest?automapper=false&before=<cursor>&pageSize=<n>`
    pub fn latest_url(&self, before: &str, page_size: u32) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/latest", self.api_base_url))
            .with_context(|| format!("Invalid catalog base URL: {}", self.api_base_url))?;
        url.query_pairs_mut()
            .append_pair("automapper", "false")
            .append_pair("before", before)
            .append_pair("pageSize", &page_size.to_string());
        Ok(url)
    }

    pub fn map_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/id/", self.api_base_url))
            .with_context(|| format!("Invalid catalog base URL: {}", self.api_base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Catalog base URL cannot have path segments"))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn latest_page(&self, before: &str, page_size: u32) -> Result<Vec<Value>> {
        let url = self.latest_url(before, page_size)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to request catalog page")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Catalog page request failed with status {}: {}", status, body);
        }

        let page: PageResponse = response
            .json()
            .await
            .context("Failed to parse catalog page")?;

        Ok(page.docs)
    }

    async fn map_by_id(&self, id: &str) -> Result<Option<Value>> {
        let url = self.map_url(id)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request map {}", id))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Map {} request failed with status {}: {}", id, status, body);
        }

        let map: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse map {}", id))?;

        Ok(Some(map))
    }
}
