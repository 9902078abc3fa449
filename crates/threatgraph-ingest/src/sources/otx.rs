//! AlienVault OTX pulse search

use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub const OTX_ENDPOINT: &str = "https://otx.alienvault.com";

/// Source of pulses for a threat group
#[async_trait]
pub trait PulseFeed: Send + Sync {
    /// Search pulses mentioning `query`.
    ///
    /// Returns the raw response object; callers validate its shape.
    async fn search_pulses(&self, query: &str) -> FeedResult<Value>;
}

/// OTX client configuration
#[derive(Debug, Clone)]
pub struct OtxConfig {
    pub endpoint: String,
    pub api_key: String,
    pub max_results: usize,
    pub page_size: usize,
    pub timeout_seconds: u64,
}

impl OtxConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            endpoint: OTX_ENDPOINT.to_string(),
            api_key: api_key.to_string(),
            max_results: 25,
            page_size: 20,
            timeout_seconds: 30,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// OTX REST client
pub struct OtxClient {
    config: OtxConfig,
    client: Client,
}

impl OtxClient {
    pub fn new(config: OtxConfig) -> FeedResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(FeedError::ConfigError("OTX API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }

    async fn get_page(&self, request: reqwest::RequestBuilder) -> FeedResult<Value> {
        let response = request
            .header("X-OTX-API-KEY", &self.config.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = response.text().await.unwrap_or_default();
                Err(FeedError::AuthError(message))
            }
            status if status.is_success() => Ok(response.json().await?),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(FeedError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl PulseFeed for OtxClient {
    async fn search_pulses(&self, query: &str) -> FeedResult<Value> {
        let url = format!("{}/api/v1/search/pulses", self.config.endpoint);
        let first = self.client.get(&url).query(&[
            ("q", query.to_string()),
            ("page", "1".to_string()),
            ("limit", self.config.page_size.to_string()),
        ]);
        let mut page = self.get_page(first).await?;

        let mut results = match page.get("results").and_then(Value::as_array) {
            Some(results) => results.clone(),
            None => return Ok(page),
        };
        let count = page.get("count").cloned().unwrap_or(Value::Null);

        while results.len() < self.config.max_results {
            let Some(next) = page.get("next").and_then(Value::as_str).map(str::to_string) else {
                break;
            };
            debug!(query, next = %next, "Following OTX page");
            page = self.get_page(self.client.get(&next)).await?;
            match page.get("results").and_then(Value::as_array) {
                Some(more) if !more.is_empty() => results.extend(more.iter().cloned()),
                _ => break,
            }
        }

        results.truncate(self.config.max_results);
        info!(query, pulses = results.len(), "Fetched OTX pulses");
        Ok(json!({ "results": results, "count": count }))
    }
}
