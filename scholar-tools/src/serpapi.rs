//! SerpAPI (Google engine) search adapter.
//!
//! SerpAPI returns ranked organic results without scores, so relevance is
//! derived from rank: the first of `n` results gets 1.0, the last `1/n`.

use crate::http::{build_client, map_http_error, map_transport_error, parse_json};
use async_trait::async_trait;
use reqwest::Client;
use scholar_core::config::SearchConfig;
use scholar_core::error::ProviderError;
use scholar_core::search::{SearchProvider, SourceRecord};
use serde_json::Value;
use tracing::debug;

const PROVIDER: &str = "serpapi";

pub struct SerpApiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl SerpApiProvider {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(PROVIDER, config.timeout_secs)?,
            base_url: config.serpapi_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Parse a `search.json` response into at most `limit` records.
    pub fn parse_response(body: &Value, limit: usize) -> Result<Vec<SourceRecord>, ProviderError> {
        if let Some(message) = body.get("error").and_then(|e| e.as_str()) {
            // Reported as an error, but it just means zero hits.
            if message.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(ProviderError::Request {
                provider: PROVIDER.to_string(),
                message: message.to_string(),
            });
        }

        // No organic results is a valid, empty answer.
        let Some(rows) = body.get("organic_results").and_then(|r| r.as_array()) else {
            return Ok(Vec::new());
        };

        let usable: Vec<&Value> = rows
            .iter()
            .filter(|row| {
                row.get("link")
                    .and_then(|v| v.as_str())
                    .is_some_and(|l| !l.trim().is_empty())
            })
            .take(limit)
            .collect();
        let n = usable.len();

        Ok(usable
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                SourceRecord::new(
                    row.get("title").and_then(|v| v.as_str()).unwrap_or_default(),
                    row.get("link").and_then(|v| v.as_str()).unwrap_or_default(),
                    row.get("snippet").and_then(|v| v.as_str()).unwrap_or_default(),
                    (n - i) as f64 / n as f64,
                )
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRecord>, ProviderError> {
        let url = format!("{}/search.json", self.base_url);
        debug!(url = %url, query, limit, "Sending SerpAPI search request");

        let num = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
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
        debug!(query, results = records.len(), "SerpAPI search complete");
        Ok(records)
    }
}
