//! Tavily search adapter.
//!
//! `POST {base}/search` with a bearer key. Tavily scores results itself, so
//! its `score` field becomes the record relevance.

use crate::http::{build_client, map_http_error, map_transport_error, parse_json};
use async_trait::async_trait;
use reqwest::Client;
use scholar_core::config::SearchConfig;
use scholar_core::error::ProviderError;
use scholar_core::search::{SearchProvider, SourceRecord};
use serde_json::{Value, json};
use tracing::debug;

const PROVIDER: &str = "tavily";

pub struct TavilyProvider {
    client: Client,
    base_url: String,
    api_key: String,
    search_depth: String,
    timeout_secs: u64,
}

impl TavilyProvider {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(PROVIDER, config.timeout_secs)?,
            base_url: config.tavily_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            search_depth: config.search_depth.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn build_request_body(&self, query: &str, limit: usize) -> Value {
        json!({
            "query": query,
            "max_results": limit,
            "search_depth": self.search_depth,
            "include_answer": false,
            "include_raw_content": false,
        })
    }

    /// Parse a `/search` response into at most `limit` records.
    ///
    /// Rows without a URL are skipped; a missing `score` counts as zero.
    pub fn parse_response(body: &Value, limit: usize) -> Result<Vec<SourceRecord>, ProviderError> {
        let results = body
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| ProviderError::ResponseParse {
                provider: PROVIDER.to_string(),
                message: "response has no 'results' array".to_string(),
            })?;

        Ok(results
            .iter()
            .filter_map(|row| {
                let url = row.get("url").and_then(|v| v.as_str())?;
                if url.trim().is_empty() {
                    return None;
                }
                Some(SourceRecord::new(
                    row.get("title").and_then(|v| v.as_str()).unwrap_or_default(),
                    url,
                    row.get("content").and_then(|v| v.as_str()).unwrap_or_default(),
                    row.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                ))
            })
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRecord>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        debug!(url = %url, query, limit, "Sending Tavily search request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request_body(query, limit))
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e, self.timeout_secs))?;
        if !status.is_success() {
            return Err(map_http_error(PROVIDER, status, &body));
        }

        let records = Self::parse_response(&parse_json(PROVIDER, &body)?, limit)?;
        debug!(query, results = records.len(), "Tavily search complete");
        Ok(records)
    }
}
