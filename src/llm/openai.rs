//! OpenAI-compatible chat-completions client over reqwest.
//!
//! Works against api.openai.com and any server exposing the same
//! `/chat/completions` contract with function calling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    ToolCall, ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};

const PROVIDER: &str = "openai";

/// Per-request timeout. A hung call stalls one message, not the process.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

// ── Provider ────────────────────────────────────────────────────────

/// Chat-completions provider.
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, base_url: &str, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
        }
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> ChatRequest {
        let has_tools = !tools.is_empty();
        ChatRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            temperature,
            max_tokens,
            tools: has_tools.then(|| {
                tools
                    .into_iter()
                    .map(|function| WireTool {
                        r#type: "function",
                        function,
                    })
                    .collect()
            }),
            tool_choice: has_tools.then_some("auto"),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.into(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LlmError::RateLimited {
                provider: PROVIDER.into(),
                retry_after,
            });
        }

        let body = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {preview}"),
            });
        }

        parse_chat_response(&body)
    }
}

/// Parse a chat-completions response body.
fn parse_chat_response(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    if parsed.choices.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "response contained no choices".into(),
        });
    }
    Ok(parsed)
}

/// Split a parsed response into its first choice plus token counts.
fn first_choice(response: ChatResponse) -> (Choice, u32, u32) {
    let (input, output) = response
        .usage
        .map(|u| (u.prompt_tokens, u.completion_tokens))
        .unwrap_or((0, 0));
    // parse_chat_response guarantees at least one choice
    let choice = response
        .choices
        .into_iter()
        .next()
        .unwrap_or(Choice {
            message: ResponseMessage {
                content: None,
                tool_calls: Vec::new(),
            },
            finish_reason: None,
        });
    (choice, input, output)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let wire = self.build_request(
            request.messages,
            Vec::new(),
            request.temperature,
            request.max_tokens,
        );
        let (choice, input_tokens, output_tokens) = first_choice(self.send(&wire).await?);

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let wire = self.build_request(request.messages, request.tools, request.temperature, None);
        let (choice, input_tokens, output_tokens) = first_choice(self.send(&wire).await?);

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ToolCompletionResponse {
            content: choice.message.content,
            tool_calls,
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
        })
    }
}
