//! OpenAI Chat Completions adapter (§4.A, §6 wire format).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::common::SHARED_HTTP_CLIENT;
use super::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ModelCapabilities,
    ProviderAdapter, ProviderError, TokenUsage, ToolCall, ToolDefinition,
};

const API_BASE: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiToolCallFunction,
}

#[derive(Deserialize)]
struct OpenAiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

/// Classify a non-2xx OpenAI-compatible response into the adapter error taxonomy (§4.A, §7).
fn classify_status(status: reqwest::StatusCode, body: &str, provider: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth,
        429 => ProviderError::RateLimit,
        404 if body.to_lowercase().contains("model") => {
            ProviderError::InvalidModel(body.to_string())
        }
        _ => ProviderError::Upstream(format!("{provider} returned {status}: {body}")),
    }
}

/// Adapter for OpenAI's `/v1/chat/completions` endpoint. Also the base implementation `groq`
/// delegates to, since Groq exposes the same wire format at a different base URL.
pub struct OpenAiAdapter {
    capabilities: Vec<ModelCapabilities>,
    base_url: String,
    provider_name: &'static str,
}

impl OpenAiAdapter {
    pub fn new(capabilities: Vec<ModelCapabilities>) -> Self {
        Self {
            capabilities,
            base_url: API_BASE.to_string(),
            provider_name: "openai",
        }
    }

    /// Build an adapter pointed at an OpenAI-compatible endpoint under a different provider
    /// name, e.g. Groq's `https://api.groq.com/openai/v1`.
    pub fn new_compatible(
        provider_name: &'static str,
        base_url: impl Into<String>,
        capabilities: Vec<ModelCapabilities>,
    ) -> Self {
        Self {
            capabilities,
            base_url: base_url.into(),
            provider_name,
        }
    }

    fn to_wire_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage<'_>> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect()
    }

    /// Groq's fast tier uses a shorter deadline than the 60s default (§4.A timeouts).
    fn completion_timeout(&self) -> std::time::Duration {
        if self.provider_name == "groq" {
            super::common::FAST_PATH_TIMEOUT
        } else {
            super::common::DEFAULT_COMPLETION_TIMEOUT
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        self.provider_name
    }

    fn capabilities(&self) -> &[ModelCapabilities] {
        &self.capabilities
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = OpenAiRequest {
            model: &request.model,
            messages: Self::to_wire_messages(&request.messages),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.as_deref(),
        };

        let started = Instant::now();
        let response = SHARED_HTTP_CLIENT
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.completion_timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(started.elapsed().as_millis() as u64)
                } else {
                    ProviderError::Upstream(format!("{} request failed: {e}", self.provider_name))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text, self.provider_name));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(format!("malformed response: {e}")))?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ProviderError::Upstream(format!("{} returned no choices", self.provider_name))
        })?;

        let usage = parsed.usage.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();

        Ok(CompletionResponse {
            content: choice.message.content,
            model: request.model.clone(),
            provider: self.provider_name,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            },
            finish_reason: choice.finish_reason,
            tool_calls,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
