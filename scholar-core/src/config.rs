//! Configuration system for Scholar.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/scholar/config.toml` and/or `.scholar/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ConfigError, ProviderError};
use crate::research::MAX_SOURCES_LIMIT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScholarConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchConfig,
    pub export: ExportConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic", or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model driving the research tool loop.
    pub model: String,
    /// Optional stronger model for the synthesis call. Falls back to `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_model: Option<String>,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Resolved API key. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            synthesis_model: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// The model used for the synthesis call.
    pub fn synthesis_model(&self) -> &str {
        self.synthesis_model.as_deref().unwrap_or(&self.model)
    }
}

/// Supported web search backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
    Serpapi,
}

impl SearchProviderKind {
    /// Credential lookup order when no provider is named explicitly.
    pub const PRIORITY: [SearchProviderKind; 2] =
        [SearchProviderKind::Tavily, SearchProviderKind::Serpapi];
}

impl std::fmt::Display for SearchProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchProviderKind::Tavily => write!(f, "tavily"),
            SearchProviderKind::Serpapi => write!(f, "serpapi"),
        }
    }
}

impl std::str::FromStr for SearchProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tavily" => Ok(SearchProviderKind::Tavily),
            "serpapi" => Ok(SearchProviderKind::Serpapi),
            other => Err(ProviderError::UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Web search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Explicit provider choice. When unset the first provider with a credential wins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<SearchProviderKind>,
    pub tavily_api_key_env: String,
    pub serpapi_api_key_env: String,
    #[serde(skip_serializing)]
    pub tavily_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub serpapi_api_key: Option<String>,
    pub tavily_base_url: String,
    pub serpapi_base_url: String,
    /// Tavily search depth: "basic" or "advanced".
    pub search_depth: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: None,
            tavily_api_key_env: "TAVILY_API_KEY".to_string(),
            serpapi_api_key_env: "SERPAPI_API_KEY".to_string(),
            tavily_api_key: None,
            serpapi_api_key: None,
            tavily_base_url: "https://api.tavily.com".to_string(),
            serpapi_base_url: "https://serpapi.com".to_string(),
            search_depth: "advanced".to_string(),
            timeout_secs: 15,
        }
    }
}

impl SearchConfig {
    /// The resolved credential for a provider, if any.
    pub fn api_key(&self, kind: SearchProviderKind) -> Option<&str> {
        let key = match kind {
            SearchProviderKind::Tavily => self.tavily_api_key.as_deref(),
            SearchProviderKind::Serpapi => self.serpapi_api_key.as_deref(),
        };
        key.filter(|k| !k.trim().is_empty())
    }

    /// The environment variable a provider's credential is read from.
    pub fn api_key_env(&self, kind: SearchProviderKind) -> &str {
        match kind {
            SearchProviderKind::Tavily => &self.tavily_api_key_env,
            SearchProviderKind::Serpapi => &self.serpapi_api_key_env,
        }
    }

    /// Pick the search backend and its credential.
    ///
    /// An explicit `provider` wins. Otherwise the first provider in
    /// [`SearchProviderKind::PRIORITY`] with a credential is used.
    pub fn select_provider(&self) -> Result<(SearchProviderKind, String), ProviderError> {
        if let Some(kind) = self.provider {
            return self
                .api_key(kind)
                .map(|key| (kind, key.to_string()))
                .ok_or_else(|| ProviderError::MissingCredential {
                    provider: kind.to_string(),
                    env_var: self.api_key_env(kind).to_string(),
                });
        }

        let available: Vec<SearchProviderKind> = SearchProviderKind::PRIORITY
            .into_iter()
            .filter(|kind| self.api_key(*kind).is_some())
            .collect();

        match available.as_slice() {
            [] => Err(ProviderError::MissingCredential {
                provider: "tavily or serpapi".to_string(),
                env_var: format!("{} or {}", self.tavily_api_key_env, self.serpapi_api_key_env),
            }),
            [chosen, rest @ ..] => {
                if !rest.is_empty() {
                    info!(
                        chosen = %chosen,
                        also_available = ?rest,
                        "Multiple search credentials present; using priority order"
                    );
                }
                let key = self.api_key(*chosen).unwrap_or_default().to_string();
                Ok((*chosen, key))
            }
        }
    }
}

/// Research and synthesis limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Upper bound on curated sources passed to synthesis.
    pub max_search_results: usize,
    /// Upper bound on `Report.top_sources`.
    pub max_final_sources: usize,
    pub max_summary_words: usize,
    /// Completion rounds allowed in the research tool loop.
    pub max_tool_rounds: usize,
    /// Results requested per search when the model omits `k`.
    pub results_per_query: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_search_results: 10,
            max_final_sources: 5,
            max_summary_words: 120,
            max_tool_rounds: 5,
            results_per_query: 10,
        }
    }
}

/// Export destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl ScholarConfig {
    /// Fill every unset secret from the variables named by the `*_env` fields.
    pub fn resolve_credentials(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        if self.llm.api_key.is_none() {
            self.llm.api_key = non_blank(&self.llm.api_key_env);
        }
        if self.search.tavily_api_key.is_none() {
            self.search.tavily_api_key = non_blank(&self.search.tavily_api_key_env);
        }
        if self.search.serpapi_api_key.is_none() {
            self.search.serpapi_api_key = non_blank(&self.search.serpapi_api_key_env);
        }
    }

    /// Check limits. Returns non-fatal warnings, or the first hard error.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let research = &self.research;
        if research.max_search_results == 0 || research.max_search_results > MAX_SOURCES_LIMIT {
            return Err(ConfigError::Invalid {
                message: format!(
                    "research.max_search_results must be between 1 and {}, got {}",
                    MAX_SOURCES_LIMIT, research.max_search_results
                ),
            });
        }
        if research.max_final_sources == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_final_sources must be at least 1".to_string(),
            });
        }
        if research.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_tool_rounds must be at least 1".to_string(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "llm.model".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if research.max_final_sources > research.max_search_results {
            warnings.push(format!(
                "research.max_final_sources ({}) exceeds max_search_results ({}); at most {} top sources are possible",
                research.max_final_sources,
                research.max_search_results,
                research.max_search_results
            ));
        }
        if research.results_per_query > MAX_SOURCES_LIMIT {
            warnings.push(format!(
                "research.results_per_query ({}) is clamped to {}",
                research.results_per_query, MAX_SOURCES_LIMIT
            ));
        }
        if research.max_summary_words < 10 {
            warnings.push(format!(
                "research.max_summary_words is {}; summaries will be very short",
                research.max_summary_words
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside the usual 0.0-2.0 range",
                self.llm.temperature
            ));
        }
        Ok(warnings)
    }

    /// Render the effective configuration as TOML. Secrets are omitted.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Path of the user-level config file, if a home directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "scholar", "scholar")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from all layers, highest priority first:
///
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SCHOLAR_`)
/// 3. Workspace-local config (`.scholar/config.toml`)
/// 4. User config (`~/.config/scholar/config.toml`)
/// 5. Built-in defaults
///
/// Secrets are then resolved once from the process environment.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ScholarConfig>,
) -> Result<ScholarConfig, Box<figment::Error>> {
    let mut config: ScholarConfig = layered_figment(workspace, overrides).extract()?;
    config.resolve_credentials(|var| std::env::var(var).ok());
    Ok(config)
}

fn layered_figment(workspace: Option<&Path>, overrides: Option<&ScholarConfig>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ScholarConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".scholar").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SCHOLAR_LLM__MODEL, SCHOLAR_RESEARCH__MAX_TOOL_ROUNDS, etc.
    figment = figment.merge(Env::prefixed("SCHOLAR_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment
}
