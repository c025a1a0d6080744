//! Error types for the Scholar research pipeline.
//!
//! Uses `thiserror` for public API error types: one enum per concern, composed
//! into a top-level `ScholarError` tagged with the stage that failed.

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    Synthesis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Research => write!(f, "research"),
            Stage::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Top-level error type for the Scholar core library.
#[derive(Debug, thiserror::Error)]
pub enum ScholarError {
    #[error("Research stage failed: {0}")]
    Research(#[from] ResearchError),

    #[error("Synthesis stage failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl ScholarError {
    /// The pipeline stage this error was raised in.
    pub fn stage(&self) -> Stage {
        match self {
            ScholarError::Research(_) => Stage::Research,
            ScholarError::Synthesis(_) => Stage::Synthesis,
        }
    }
}

/// Errors from search provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("No credential for search provider '{provider}' (set {env_var})")]
    MissingCredential { provider: String, env_var: String },

    #[error("Search provider '{provider}' rejected the credential")]
    Unauthorized { provider: String },

    #[error("Search provider '{provider}' rate limited the request")]
    RateLimited { provider: String },

    #[error("Search provider '{provider}' timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("Search request to '{provider}' failed: {message}")]
    Request { provider: String, message: String },

    #[error("Could not parse '{provider}' response: {message}")]
    ResponseParse { provider: String, message: String },

    #[error("Unknown search provider: {name}")]
    UnknownProvider { name: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from the research stage.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Research topic is empty")]
    EmptyTopic,

    #[error("max_sources must be between 1 and {max}, got {requested}")]
    InvalidMaxSources { requested: usize, max: usize },

    #[error("No usable sources found for '{topic}'")]
    NoSources { topic: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Completion call failed: {0}")]
    Completion(#[source] LlmError),
}

/// Errors from the synthesis stage.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("No sources to synthesize")]
    EmptySources,

    #[error("Completion call failed: {0}")]
    Completion(#[source] LlmError),

    #[error("Model output invalid after {attempts} attempts: {problems}")]
    InvalidOutput { attempts: usize, problems: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}
