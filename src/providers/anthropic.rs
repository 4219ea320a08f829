//! Anthropic Messages API adapter (§4.A, §6 wire format).
//!
//! Unlike the OpenAI-compatible adapters, Anthropic's `/v1/messages` endpoint takes the system
//! prompt as a top-level field rather than a message with `role: "system"`, authenticates via
//! `x-api-key` instead of a bearer token, and requires an explicit `anthropic-version` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::common::SHARED_HTTP_CLIENT;
use super::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ModelCapabilities,
    ProviderAdapter, ProviderError, TokenUsage, ToolCall,
};

const API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicToolDefinition>>,
}

#[derive(Serialize)]
struct AnthropicToolDefinition {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic requires an explicit `max_tokens`; providers upstream of this adapter (the router)
/// are expected to pass one, but a completion request built by hand in a test or a workflow
/// task may omit it, so we fall back to a conservative default instead of failing the call.
const DEFAULT_MAX_TOKENS: u32 = 1024;

fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth,
        429 => ProviderError::RateLimit,
        404 if body.to_lowercase().contains("model") => {
            ProviderError::InvalidModel(body.to_string())
        }
        _ => ProviderError::Upstream(format!("anthropic returned {status}: {body}")),
    }
}

pub struct AnthropicAdapter {
    capabilities: Vec<ModelCapabilities>,
}

impl AnthropicAdapter {
    pub fn new(capabilities: Vec<ModelCapabilities>) -> Self {
        Self { capabilities }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> &[ModelCapabilities] {
        &self.capabilities
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str());

        let messages: Vec<AnthropicMessage<'_>> = request
            .messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::System => unreachable!("filtered above"),
                },
                content: &m.content,
            })
            .collect();

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicToolDefinition {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t.function.parameters.clone(),
                })
                .collect()
        });

        let body = AnthropicRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: request.temperature,
            tools,
        };

        let started = Instant::now();
        let response = SHARED_HTTP_CLIENT
            .post(format!("{}/messages", API_BASE))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(super::common::DEFAULT_COMPLETION_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(started.elapsed().as_millis() as u64)
                } else {
                    ProviderError::Upstream(format!("anthropic request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(format!("malformed response: {e}")))?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicContentBlock::Text { text } => text_parts.push(text),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                AnthropicContentBlock::Other => {}
            }
        }

        Ok(CompletionResponse {
            content: text_parts.join(""),
            model: request.model.clone(),
            provider: "anthropic",
            usage: TokenUsage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
            },
            finish_reason: parsed.stop_reason,
            tool_calls,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
