//! Anthropic Messages API provider implementation.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System message is a top-level `system` field, not in the messages array
//! - Tool calls use `tool_use` / `tool_result` content block conventions
//! - No native JSON mode; structured output is requested through the prompt

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    timeout_secs: u64,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Returns `LlmError::AuthFailed` if no key was resolved into `config.api_key`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| LlmError::AuthFailed {
            provider: format!("Anthropic (env var '{}' not set)", config.api_key_env),
        })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new Anthropic provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body for the Anthropic Messages API.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        let (system_text, non_system_messages) = Self::extract_system_message(&request.messages);

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "messages": Self::messages_to_anthropic_json(&non_system_messages),
        });

        if let Some(system) = system_text {
            body["system"] = Value::String(system);
        }

        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            let tools_json: Vec<Value> = tools.iter().map(Self::tool_definition_to_json).collect();
            body["tools"] = Value::Array(tools_json);
        }

        body
    }

    /// Split system messages out of the list, concatenating them with blank lines.
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let (system, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);

        let system_parts: Vec<&str> = system.iter().filter_map(|m| m.content.as_text()).collect();
        let system_text = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system_text, rest)
    }

    /// Convert messages to Anthropic format.
    ///
    /// Consecutive tool results are folded into one `user` turn, which is how
    /// the API expects the answers to a multi-call assistant turn.
    fn messages_to_anthropic_json(messages: &[&Message]) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::with_capacity(messages.len());
        let mut previous_was_tool = false;

        for msg in messages {
            let blocks = Self::content_to_anthropic_json(&msg.content);
            let is_tool = msg.role == Role::Tool;

            if is_tool
                && previous_was_tool
                && let Some(last) = out.last_mut()
                && let (Some(existing), Value::Array(new_blocks)) =
                    (last["content"].as_array_mut(), blocks.clone())
            {
                existing.extend(new_blocks);
                continue;
            }

            let role = match msg.role {
                Role::Assistant => "assistant",
                Role::User | Role::Tool | Role::System => "user",
            };
            out.push(serde_json::json!({
                "role": role,
                "content": blocks,
            }));
            previous_was_tool = is_tool;
        }

        out
    }

    /// Convert a `Content` enum to Anthropic JSON content block(s).
    fn content_to_anthropic_json(content: &Content) -> Value {
        match content {
            Content::Text { text } => {
                serde_json::json!([{
                    "type": "text",
                    "text": text,
                }])
            }
            Content::ToolCall {
                id,
                name,
                arguments,
            } => {
                serde_json::json!([{
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": arguments,
                }])
            }
            Content::ToolResult {
                call_id,
                output,
                is_error,
            } => {
                let mut block = serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": output,
                });
                if *is_error {
                    block["is_error"] = Value::Bool(true);
                }
                serde_json::json!([block])
            }
            Content::MultiPart { parts } => {
                let blocks: Vec<Value> = parts
                    .iter()
                    .flat_map(|part| match Self::content_to_anthropic_json(part) {
                        Value::Array(arr) => arr,
                        other => vec![other],
                    })
                    .collect();
                Value::Array(blocks)
            }
        }
    }

    fn tool_definition_to_json(tool: &ToolDefinition) -> Value {
        serde_json::json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    /// Parse an Anthropic API response JSON into a `CompletionResponse`.
    fn parse_response(body: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let model = body["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string();

        let finish_reason = body["stop_reason"].as_str().map(|s| s.to_string());

        let usage = TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        let content_blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        Ok(CompletionResponse {
            message: Message::new(Role::Assistant, Self::parse_content_blocks(content_blocks)),
            usage,
            model,
            finish_reason,
        })
    }

    /// Parse Anthropic content blocks. A single block is returned as-is,
    /// several become `Content::MultiPart`.
    fn parse_content_blocks(blocks: &[Value]) -> Content {
        let mut parts: Vec<Content> = Vec::new();

        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => {
                    let text = block["text"].as_str().unwrap_or("");
                    parts.push(Content::text(text));
                }
                "tool_use" => {
                    parts.push(Content::tool_call(
                        block["id"].as_str().unwrap_or(""),
                        block["name"].as_str().unwrap_or(""),
                        block["input"].clone(),
                    ));
                }
                other => {
                    debug!(block_type = other, "Ignoring unknown content block type");
                }
            }
        }

        match parts.len() {
            0 => Content::text(""),
            1 => parts.remove(0),
            _ => Content::MultiPart { parts },
        }
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %body["model"],
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let timeout_secs = self.timeout_secs;
        let map_send_error = |e: reqwest::Error| {
            if e.is_timeout() {
                LlmError::Timeout { timeout_secs }
            } else if e.is_connect() {
                LlmError::Connection {
                    message: e.to_string(),
                }
            } else {
                LlmError::ApiRequest {
                    message: format!("Request to Anthropic API failed: {}", e),
                }
            }
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        let body_text = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
