//! The error taxonomy (§7 of the specification).
//!
//! A single [`ConduitError`] enum covers every failure kind the core can raise. Call sites that
//! need a caller-supplied error type (the `Tool`/`ProviderAdapter` trait boundaries) keep
//! `Box<dyn std::error::Error + Send + Sync>` instead, exactly as the teacher does for its own
//! `ToolProtocol` boundary — those boundaries host error types the core can't know about ahead
//! of time.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Every failure kind the core can raise, with the structured fields callers need to react
/// without parsing a message string.
#[derive(Debug, Error, Clone)]
pub enum ConduitError {
    /// The upstream provider rejected the configured credentials.
    #[error("provider {provider} rejected credentials")]
    Auth {
        /// Provider identifier (e.g. `"openai"`).
        provider: String,
    },

    /// The tenant's monthly token budget would be exceeded by this call.
    #[error("quota exceeded: {remaining} of {limit} tokens remaining, resets at {reset_at}")]
    QuotaExceeded {
        /// Tokens left before the limit is reached.
        remaining: u64,
        /// The tenant's monthly token limit.
        limit: u64,
        /// When the counter resets (first instant of next calendar month, UTC).
        reset_at: DateTime<Utc>,
    },

    /// The upstream provider responded with HTTP 429.
    #[error("provider {provider} rate limited the request")]
    RateLimit {
        /// Provider identifier.
        provider: String,
    },

    /// The upstream provider responded with a non-2xx status other than 429.
    #[error("provider {provider} returned an upstream error: {message}")]
    Upstream {
        /// Provider identifier.
        provider: String,
        /// Human-readable detail extracted from the response body, if any.
        message: String,
    },

    /// A call exceeded its deadline.
    #[error("provider {provider} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Provider identifier.
        provider: String,
        /// How long the call ran before the deadline fired.
        elapsed_ms: u64,
    },

    /// A required workflow input field was absent and had no declared default.
    #[error("missing required workflow input: {field}")]
    MissingInput {
        /// Name of the missing field, per the workflow's declared input schema.
        field: String,
    },

    /// A loop exceeded 100 iterations, or an execution's gotos exceeded 25.
    #[error("{0}")]
    LoopBound(String),

    /// A task referenced a tool whose status is not `active`.
    #[error("tool {tool_id} is not active (status: {status})")]
    ToolStatus {
        /// The referenced tool's identity.
        tool_id: String,
        /// The tool's current status.
        status: String,
    },

    /// The execution was cancelled externally.
    #[error("execution cancelled")]
    Cancelled,

    /// A configuration value was invalid at the point it was written/validated (BYOK mode with
    /// no keys, unknown model identifier, unknown task type, or — for workflow authoring — a
    /// condition expression outside the supported grammar).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A model identifier is not recognized by any registered provider adapter.
    #[error("unknown model: {0}")]
    InvalidModel(String),

    /// A registered tool's `run` returned a structured failure (§6 tool interface).
    #[error("tool {tool_id} failed: {message}")]
    ToolFailure {
        tool_id: String,
        message: String,
        retryable: bool,
    },

    /// A `Store` lookup a caller assumed would succeed came back empty.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The entity kind that was missing, e.g. `"workflow"` or `"tenant"`.
        kind: &'static str,
        id: String,
    },
}

impl ConduitError {
    /// `true` for kinds that should raise a provider's failure counter (§4.B, §7).
    pub fn counts_as_provider_failure(&self) -> bool {
        matches!(
            self,
            ConduitError::Auth { .. }
                | ConduitError::Upstream { .. }
                | ConduitError::Timeout { .. }
        )
    }
}
