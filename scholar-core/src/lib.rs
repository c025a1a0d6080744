//! # Scholar Core
//!
//! Core library for the Scholar research assistant.
//! Provides the LLM interface (brain), search provider abstraction,
//! research and synthesis stages, report export, and configuration.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod search;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{
    ExportConfig, LlmConfig, ResearchConfig, ScholarConfig, SearchConfig, SearchProviderKind,
    load_config,
};
pub use error::{
    ConfigError, LlmError, ProviderError, ResearchError, ScholarError, Stage, SynthesisError,
};
pub use research::{
    CuratedSourceSet, Finding, Report, ResearchPipeline, ResearchRequest, Style, Tone, TopSource,
};
pub use search::{MockSearchProvider, SearchProvider, SourceRecord};
pub use types::{
    CompletionRequest, CompletionResponse, Content, Message, ResponseFormat, Role, TokenUsage,
    ToolDefinition,
};
