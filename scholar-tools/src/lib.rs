//! # Scholar Tools
//!
//! Web search provider implementations for the Scholar research pipeline.
//! Provides Tavily and SerpAPI adapters behind the core `SearchProvider` trait.

mod http;
pub mod serpapi;
pub mod tavily;

use scholar_core::config::{SearchConfig, SearchProviderKind};
use scholar_core::error::ProviderError;
use scholar_core::search::SearchProvider;
use std::sync::Arc;

pub use serpapi::SerpApiProvider;
pub use tavily::TavilyProvider;

/// Create the configured search provider.
///
/// Selection follows [`SearchConfig::select_provider`]: an explicit choice
/// wins, otherwise the first backend with a credential.
pub fn create_search_provider(
    config: &SearchConfig,
) -> Result<Arc<dyn SearchProvider>, ProviderError> {
    let (kind, api_key) = config.select_provider()?;
    let provider: Arc<dyn SearchProvider> = match kind {
        SearchProviderKind::Tavily => Arc::new(TavilyProvider::new(config, api_key)?),
        SearchProviderKind::Serpapi => Arc::new(SerpApiProvider::new(config, api_key)?),
    };
    tracing::info!(provider = provider.name(), "Search provider ready");
    Ok(provider)
}
