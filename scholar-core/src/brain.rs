//! Brain module: LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait that the research and synthesis stages talk
//! to, plus a scriptable mock used throughout the test suite.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return whether this provider supports tool/function calling.
    fn supports_tools(&self) -> bool {
        true
    }
}

/// A mock LLM provider for testing.
///
/// Returns queued responses (or errors) in FIFO order and records every
/// request it receives. An empty queue yields a fixed text reply.
pub struct MockLlmProvider {
    model: String,
    tools: bool,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::with_model("mock-model")
    }

    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            tools: true,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Report no tool-calling support.
    pub fn without_tools(mut self) -> Self {
        self.tools = false;
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_responses().push_back(Ok(response));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.lock_responses().push_back(Err(error));
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    /// A copy of every request received, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock_requests().clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Create a tool call response for testing.
    pub fn tool_call_response(tool_name: &str, arguments: serde_json::Value) -> CompletionResponse {
        Self::multi_tool_call_response(vec![(tool_name, arguments)])
    }

    /// Create a response carrying several tool calls in one assistant turn.
    pub fn multi_tool_call_response(calls: Vec<(&str, serde_json::Value)>) -> CompletionResponse {
        let mut parts: Vec<Content> = calls
            .into_iter()
            .map(|(name, arguments)| {
                Content::tool_call(format!("call_{}", uuid::Uuid::new_v4()), name, arguments)
            })
            .collect();
        let content = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Content::MultiPart { parts }
        };
        CompletionResponse {
            message: Message::new(Role::Assistant, content),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<CompletionResponse, LlmError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<CompletionRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.lock_requests().push(request);
        match self.lock_responses().pop_front() {
            Some(result) => result,
            None => Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        self.tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_default_response() {
        let provider = MockLlmProvider::new();
        let response = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert!(response.message.content.as_text().is_some());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_queued_responses() {
        let provider = MockLlmProvider::new();
        provider.queue_response(MockLlmProvider::text_response("first"));
        provider.queue_response(MockLlmProvider::text_response("second"));

        let r1 = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert_eq!(r1.message.content.as_text(), Some("first"));

        let r2 = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap();
        assert_eq!(r2.message.content.as_text(), Some("second"));
    }

    #[tokio::test]
    async fn test_mock_provider_queued_error() {
        let provider = MockLlmProvider::new();
        provider.queue_error(LlmError::Timeout { timeout_secs: 60 });
        let err = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { timeout_secs: 60 }));
    }

    #[tokio::test]
    async fn test_mock_provider_records_requests() {
        let provider = MockLlmProvider::new();
        let request = CompletionRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        provider.complete(request).await.unwrap();
        let recorded = provider.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].messages[0].content.as_text(), Some("hello"));
    }

    #[test]
    fn test_multi_tool_call_response() {
        let response = MockLlmProvider::multi_tool_call_response(vec![
            ("web_search", serde_json::json!({"query": "a"})),
            ("web_search", serde_json::json!({"query": "b"})),
        ]);
        assert_eq!(response.message.content.tool_calls().len(), 2);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));

        let single = MockLlmProvider::tool_call_response("web_search", serde_json::json!({}));
        assert!(matches!(single.message.content, Content::ToolCall { .. }));
    }
}
