//! Web search abstraction.
//!
//! `SearchProvider` is the single seam between the research stage and a
//! search backend. Concrete HTTP backends live in `scholar-tools`; this module
//! carries the record type and a scriptable mock.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider-assigned relevance in `[0, 1]`.
    pub relevance: f64,
}

impl SourceRecord {
    /// Build a record, trimming text fields and clamping relevance into `[0, 1]`.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        relevance: f64,
    ) -> Self {
        let relevance = if relevance.is_finite() {
            relevance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            title: title.into().trim().to_string(),
            url: url.into().trim().to_string(),
            snippet: snippet.into().trim().to_string(),
            relevance,
        }
    }

    /// Identity key used for deduplication.
    pub fn dedup_key(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Normalize a URL for identity comparison: the fragment is dropped and a
/// trailing `/` removed. Scheme and host case are normalized when the URL parses.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let normalized = match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.split('#').next().unwrap_or(raw).to_string(),
    };
    normalized.trim_end_matches('/').to_string()
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Run one query, returning at most `limit` records.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRecord>, ProviderError>;
}

/// A scriptable search provider for tests and demos.
///
/// Answers from per-query canned results, falling back to a default list.
/// In failing mode every call errors. Every received query is recorded.
pub struct MockSearchProvider {
    canned: HashMap<String, Vec<SourceRecord>>,
    default_results: Vec<SourceRecord>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self {
            canned: HashMap::new(),
            default_results: Vec::new(),
            failing: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails with a request error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    /// Canned results for an exact query string.
    pub fn with_results(mut self, query: impl Into<String>, results: Vec<SourceRecord>) -> Self {
        self.canned.insert(query.into(), results);
        self
    }

    /// Results for any query without canned results.
    pub fn with_default_results(mut self, results: Vec<SourceRecord>) -> Self {
        self.default_results = results;
        self
    }

    /// Every query received so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRecord>, ProviderError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());

        if self.failing {
            return Err(ProviderError::Request {
                provider: "mock".to_string(),
                message: "simulated outage".to_string(),
            });
        }

        let results = self.canned.get(query).unwrap_or(&self.default_results);
        Ok(results.iter().take(limit).cloned().collect())
    }
}
