//! LLM provider implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM, LM Studio)
//! - Anthropic Messages API (Claude models)
//!
//! Use `create_provider()` to instantiate the appropriate provider based on config.

pub mod anthropic;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider based on the configuration.
///
/// Routes to the appropriate provider implementation:
/// - `"anthropic"` → `AnthropicProvider` (native Anthropic Messages API)
/// - Everything else → `OpenAiCompatibleProvider` (OpenAI, Azure, Ollama, local, etc.)
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "anthropic" => Arc::new(AnthropicProvider::new(config)?),
        _ => Arc::new(OpenAiCompatibleProvider::new(config)?),
    };
    tracing::info!(
        provider = %config.provider,
        model = provider.model_name(),
        "LLM provider ready"
    );
    Ok(provider)
}
