//! Research stage: an LLM-driven web search loop.
//!
//! The model is offered a single `web_search` tool and decides what to
//! search for. Every hit is collected, then curated into a
//! [`CuratedSourceSet`] once the model stops calling tools or the round
//! limit is reached.

use super::MAX_SOURCES_LIMIT;
use super::progress::{NoOpResearchCallback, ResearchCallback};
use super::sources::CuratedSourceSet;
use crate::brain::LlmProvider;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::search::{SearchProvider, SourceRecord};
use crate::types::{CompletionRequest, Message, TokenUsage, ToolDefinition};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the only tool exposed to the research model.
pub const WEB_SEARCH_TOOL: &str = "web_search";

const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant tasked with finding and curating relevant sources on a topic. \
Use the web_search tool to look for authoritative, recent and diverse sources. \
Issue focused queries, refine them based on what you find, and stop searching once you have enough material. \
When you are done, reply without calling a tool and briefly describe what the sources cover and where they disagree.";

/// Tool descriptor for `web_search`.
pub fn web_search_tool() -> ToolDefinition {
    ToolDefinition {
        name: WEB_SEARCH_TOOL.to_string(),
        description: "Search the web and return the most relevant results as JSON records \
                      with title, url, snippet and relevance."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "k": {
                    "type": "integer",
                    "description": "Number of results to return (1-20)",
                    "minimum": 1,
                    "maximum": MAX_SOURCES_LIMIT
                }
            },
            "required": ["query"]
        }),
    }
}

/// A validated `web_search` invocation.
#[derive(Debug, Clone, PartialEq)]
struct SearchCall {
    query: String,
    k: usize,
}

/// Validate a tool call. The error string is sent back to the model.
fn parse_search_call(name: &str, arguments: &Value, default_k: usize) -> Result<SearchCall, String> {
    if name != WEB_SEARCH_TOOL {
        return Err(format!(
            "Unknown tool '{name}'. The only available tool is {WEB_SEARCH_TOOL}."
        ));
    }

    // Some providers hand back arguments they could not decode as a raw string.
    let decoded;
    let args = match arguments {
        Value::String(raw) => {
            decoded = serde_json::from_str::<Value>(raw)
                .map_err(|e| format!("Arguments are not valid JSON: {e}"))?;
            &decoded
        }
        other => other,
    };

    let query = args
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| "Missing required string argument 'query'.".to_string())?;

    let k = match args.get("k") {
        None | Some(Value::Null) => default_k,
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as usize))
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<usize>().ok()))
            .ok_or_else(|| format!("Argument 'k' must be a positive integer, got {v}."))?,
    };

    Ok(SearchCall {
        query: query.to_string(),
        k: k.clamp(1, MAX_SOURCES_LIMIT),
    })
}

/// Drives the research tool loop.
pub struct ResearchAgent {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
    temperature: f32,
    max_tokens: Option<usize>,
    callback: Arc<dyn ResearchCallback>,
}

impl ResearchAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            llm,
            search,
            config,
            temperature: 0.3,
            max_tokens: None,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    /// Sampling settings for the research completions.
    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Research `topic` and return at most `max_sources` curated sources.
    pub async fn research(
        &self,
        topic: &str,
        max_sources: usize,
    ) -> Result<CuratedSourceSet, ResearchError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ResearchError::EmptyTopic);
        }
        if !(1..=MAX_SOURCES_LIMIT).contains(&max_sources) {
            return Err(ResearchError::InvalidMaxSources {
                requested: max_sources,
                max: MAX_SOURCES_LIMIT,
            });
        }

        info!(
            topic,
            max_sources,
            search_provider = self.search.name(),
            model = self.llm.model_name(),
            "Starting research stage"
        );
        self.callback.on_stage_change("researching", 0.1);

        let default_k = self.config.results_per_query.clamp(1, MAX_SOURCES_LIMIT);
        let tools = vec![web_search_tool()];
        let mut messages = vec![
            Message::system(RESEARCH_SYSTEM_PROMPT),
            Message::user(format!(
                "Research this topic and find the most relevant sources: {topic}"
            )),
        ];
        let mut collected: Vec<SourceRecord> = Vec::new();
        let mut queries: Vec<String> = Vec::new();
        let mut analysis: Option<String> = None;
        let mut usage = TokenUsage::default();

        let rounds = if self.llm.supports_tools() {
            self.config.max_tool_rounds
        } else {
            warn!(
                model = self.llm.model_name(),
                "Model does not support tool calling; searching the topic directly"
            );
            0
        };

        for round in 1..=rounds {
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: Some(tools.clone()),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                ..Default::default()
            };
            let response = self
                .llm
                .complete(request)
                .await
                .map_err(ResearchError::Completion)?;
            usage.accumulate(&response.usage);

            let calls: Vec<(String, String, Value)> = response
                .message
                .content
                .tool_calls()
                .into_iter()
                .map(|c| (c.id.to_string(), c.name.to_string(), c.arguments.clone()))
                .collect();

            if calls.is_empty() {
                debug!(round, "Research model finished without further tool calls");
                analysis = Some(response.message.content.joined_text());
                break;
            }

            debug!(round, calls = calls.len(), "Executing research tool calls");
            messages.push(response.message);

            for (call_id, name, arguments) in calls {
                let call = match parse_search_call(&name, &arguments, default_k) {
                    Ok(call) => call,
                    Err(problem) => {
                        warn!(tool = %name, problem = %problem, "Rejected research tool call");
                        messages.push(Message::tool_result(call_id, problem, true));
                        continue;
                    }
                };

                let hits = self.run_search(&call.query, call.k).await?;
                let (output, is_error) = match serde_json::to_string(&hits) {
                    Ok(json) => (json, false),
                    Err(e) => (format!("Search results could not be encoded: {e}"), true),
                };
                queries.push(call.query);
                collected.extend(hits);
                messages.push(Message::tool_result(call_id, output, is_error));
            }

            if round == rounds {
                warn!(
                    max_tool_rounds = self.config.max_tool_rounds,
                    collected = collected.len(),
                    "Research tool loop hit the round limit; curating what was collected"
                );
            }
        }

        if queries.is_empty() {
            debug!(topic, "Research model issued no searches; searching the topic directly");
            let hits = self.run_search(topic, default_k).await?;
            queries.push(topic.to_string());
            collected.extend(hits);
        }

        self.callback.on_stage_change("curating", 0.5);
        let candidates = collected.len();
        let set = CuratedSourceSet::curate(topic, collected, max_sources)
            .with_queries(queries)
            .with_analysis(analysis);

        if set.is_empty() {
            return Err(ResearchError::NoSources {
                topic: topic.to_string(),
            });
        }

        info!(
            candidates,
            curated = set.len(),
            queries = set.queries().len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            total_tokens = usage.total(),
            "Research stage complete"
        );
        Ok(set)
    }

    async fn run_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, ResearchError> {
        debug!(query, limit, provider = self.search.name(), "Running web search");
        let hits = self.search.search(query, limit).await?;
        self.callback.on_search_complete(query, hits.len());
        Ok(hits)
    }
}
