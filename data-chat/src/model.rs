//! Chat completion client for an Azure-OpenAI-shaped endpoint.
//!
//! The conversation loop talks to the model through the `ChatModel` trait;
//! `CompletionsClient` is the real HTTP implementation. A turn is reduced
//! to a `ModelTurn`: the finish signal plus whatever content and tool calls
//! the model produced.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ChatError;
use crate::protocol::{ChatMessage, OpenAITool, OpenAIToolCall, ParsedToolCall};

pub const API_VERSION: &str = "2024-05-01-preview";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Endpoint and generation parameters for the completion call.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

/// What the model signalled at the end of a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishSignal {
    Stop,
    ToolCalls,
    /// Anything else (content filter, length, missing reason). The loop
    /// treats this as a terminal diagnostic rather than spinning.
    Other(String),
}

/// One decoded model turn.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub finish: FinishSignal,
    pub content: String,
    pub tool_calls: Vec<ParsedToolCall>,
}

/// The model boundary the conversation loop depends on.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[OpenAITool],
    ) -> Result<ModelTurn, ChatError>;
}

// ============ HTTP implementation ============

pub struct CompletionsClient {
    http: reqwest::Client,
    settings: ModelSettings,
}

impl CompletionsClient {
    pub fn new(settings: ModelSettings) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(CompletionsClient { http, settings })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            API_VERSION
        )
    }
}

/// Build the chat request body: full history, advertised tool schemas, and
/// generation parameters.
fn build_chat_request_body(
    settings: &ModelSettings,
    messages: &[ChatMessage],
    tools: &[OpenAITool],
) -> Value {
    let mut body = json!({
        "messages": messages,
        "max_tokens": settings.max_tokens,
        "temperature": settings.temperature,
        "top_p": settings.top_p,
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    body
}

#[async_trait]
impl ChatModel for CompletionsClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[OpenAITool],
    ) -> Result<ModelTurn, ChatError> {
        let body = build_chat_request_body(&self.settings, messages, tools);
        let response = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Model(format!("HTTP {}: {}", status, detail)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        turn_from_response(completion)
    }
}

// ============ Response decoding ============

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

fn turn_from_response(completion: ChatCompletionResponse) -> Result<ModelTurn, ChatError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Decode("response contained no choices".to_string()))?;

    let finish = match choice.finish_reason.as_deref() {
        Some("stop") => FinishSignal::Stop,
        Some("tool_calls") => FinishSignal::ToolCalls,
        Some(other) => FinishSignal::Other(other.to_string()),
        None => FinishSignal::Other("<missing>".to_string()),
    };

    let content = choice.message.content.unwrap_or_default();
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                eprintln!(
                    "[CompletionsClient] tool call {} has malformed arguments ({}), using empty object",
                    call.id, e
                );
                json!({})
            });
            ParsedToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ModelTurn {
        finish,
        content,
        tool_calls,
    })
}
