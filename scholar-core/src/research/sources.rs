//! Curated source sets.
//!
//! The research stage gathers raw search hits; `CuratedSourceSet::curate`
//! turns them into the bounded, deduplicated, relevance-ordered list the
//! synthesis stage is allowed to cite.

use crate::search::{SourceRecord, normalize_url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The sources one research run settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedSourceSet {
    topic: String,
    sources: Vec<SourceRecord>,
    queries: Vec<String>,
    analysis: Option<String>,
}

impl CuratedSourceSet {
    /// Deduplicate by normalized URL (higher relevance wins), order by
    /// descending relevance (stable for ties) and keep at most `max_sources`.
    /// Records without a URL are dropped.
    pub fn curate(
        topic: impl Into<String>,
        candidates: impl IntoIterator<Item = SourceRecord>,
        max_sources: usize,
    ) -> Self {
        let mut sources: Vec<SourceRecord> = Vec::new();
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for record in candidates {
            if record.url.is_empty() {
                continue;
            }
            let key = record.dedup_key();
            match index_by_key.get(&key) {
                Some(&idx) => {
                    if record.relevance > sources[idx].relevance {
                        sources[idx] = record;
                    }
                }
                None => {
                    index_by_key.insert(key, sources.len());
                    sources.push(record);
                }
            }
        }

        sources.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        sources.truncate(max_sources);

        Self {
            topic: topic.into(),
            sources,
            queries: Vec::new(),
            analysis: None,
        }
    }

    /// Record the queries that produced this set.
    pub fn with_queries(mut self, queries: Vec<String>) -> Self {
        self.queries = queries;
        self
    }

    /// Attach the research model's closing analysis.
    pub fn with_analysis(mut self, analysis: Option<String>) -> Self {
        self.analysis = analysis.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Look up a source by URL, comparing normalized forms.
    pub fn find_by_url(&self, url: &str) -> Option<&SourceRecord> {
        let key = normalize_url(url);
        self.sources.iter().find(|s| s.dedup_key() == key)
    }

    /// Resolve a citation written by the model.
    ///
    /// Accepts a URL, or a 1-based index into the set written as `3` or `[3]`.
    pub fn resolve_citation(&self, citation: &str) -> Option<&SourceRecord> {
        let trimmed = citation.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed)
            .trim();

        if let Ok(n) = inner.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.sources.get(i));
        }
        if inner.is_empty() {
            return None;
        }
        self.find_by_url(inner)
    }
}
