//! Vendor-agnostic LLM completion trait and shared types (§4.A).
//!
//! Concrete adapters live in sibling modules ([`openai`], [`anthropic`], [`groq`]); the
//! [`Router`](crate::routing::Router) only ever talks to them through [`ProviderAdapter`].

pub mod anthropic;
pub mod common;
pub mod groq;
pub mod openai;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One turn of conversation sent to a provider. Distinct from
/// [`crate::domain::ConversationMessage`] — that's the persisted chat history; this is the
/// wire-level unit a [`ProviderAdapter`] understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// OpenAI-style tool declaration (§4.A contract: adapters translate this to each backend's
/// native schema and normalize tool-calls back to this shape before returning).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation the model asked for, normalized to OpenAI's shape regardless of which
/// backend produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Token accounting a provider reports alongside its response.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// The full shape §4.A's `complete` operation returns: `{content, model, provider, usage,
/// finish_reason, tool_calls?, latency_ms}`.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub provider: &'static str,
    pub usage: TokenUsage,
    /// Provider-reported finish reason (e.g. `"stop"`, `"length"`), when available.
    pub finish_reason: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub latency_ms: u64,
}

/// A lazy chunk of a streaming completion (§4.A `stream`). Finite, not restartable; dropping the
/// stream is how a caller cancels the upstream connection.
pub type CompletionChunkStream = BoxStream<'static, Result<String, ProviderError>>;

/// Adapter failure kinds (§4.A, §7) an adapter classifies its own HTTP failures into, so the
/// router and error taxonomy never have to parse status codes or message text themselves.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("authentication rejected")]
    Auth,
    #[error("rate limited")]
    RateLimit,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("unsupported model: {0}")]
    InvalidModel(String),
}

/// Static capability/cost description of one model, used by the router's scoring formula
/// (§4.B) rather than by the adapter itself — an adapter only needs to know how to *call* a
/// model, not how good it is.
#[derive(Debug, Clone)]
pub struct ModelCapabilities {
    pub model: String,
    pub provider: &'static str,
    /// USD per 1M prompt tokens.
    pub cost_per_million_input: f64,
    /// USD per 1M completion tokens.
    pub cost_per_million_output: f64,
    /// Relative reasoning capability, 1 (weakest) to 5 (strongest) — §4.B capability vector.
    pub reasoning: u8,
    /// Relative creative-writing capability, 1 to 5.
    pub creativity: u8,
    /// Relative response speed, 1 (slowest) to 5 (fastest).
    pub speed: u8,
    /// Relative cost-effectiveness, 1 (priciest) to 5 (cheapest) — not the same axis as the USD
    /// price fields, which feed usage-record cost estimation rather than scoring.
    pub cost: u8,
    pub streaming: bool,
    pub tools: bool,
    pub vision: bool,
}

/// Per-model `{streaming?, tools?, vision?}` support flags (§4.A `capabilities(model)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFlags {
    pub streaming: bool,
    pub tools: bool,
    pub vision: bool,
}

/// A vendor's chat-completion endpoint (§4.A). Implementations must be `Send + Sync` so a
/// single instance can be shared across the worker pool behind an `Arc`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier used in routing decisions, health tracking, and usage records
    /// (e.g. `"openai"`, `"anthropic"`, `"groq"`).
    fn name(&self) -> &'static str;

    /// Model capability table this adapter can serve, used to seed the router's candidate set.
    fn capabilities(&self) -> &[ModelCapabilities];

    /// Ordered list of model identifiers this adapter supports (§4.A `models()`).
    fn models(&self) -> Vec<String> {
        self.capabilities().iter().map(|c| c.model.clone()).collect()
    }

    /// `{streaming?, tools?, vision?}` for one model (§4.A `capabilities(model)`), or the default
    /// (all `false`) if the model isn't in this adapter's roster.
    fn model_flags(&self, model: &str) -> ModelFlags {
        self.capabilities()
            .iter()
            .find(|c| c.model == model)
            .map(|c| ModelFlags {
                streaming: c.streaming,
                tools: c.tools,
                vision: c.vision,
            })
            .unwrap_or_default()
    }

    /// Issue a request/response completion against `api_key`.
    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Stream a completion as a lazy sequence of text chunks (§4.A `stream`). Not restartable;
    /// has no overall deadline but an idle-chunk timeout of 30s is enforced by the caller
    /// draining the stream. The default implementation issues a non-streaming `complete` and
    /// yields its content as a single chunk — adapters that support a native streaming endpoint
    /// override this.
    async fn stream(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<CompletionChunkStream, ProviderError> {
        let response = self.complete(request, api_key).await?;
        Ok(Box::pin(futures_util::stream::once(async move { Ok(response.content) })))
    }
}
