//! LLM usage accounting (§3, § routing budget).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TenantId;

/// Whether a recorded call counted against the tenant's platform token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Billed against the tenant's monthly platform allowance.
    Platform,
    /// Paid for with the tenant's own provider key; recorded for analytics only.
    Byok,
}

/// One completed LLM call, appended to the usage ledger for accounting and health feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tenant_id: TenantId,
    pub provider: String,
    pub model: String,
    pub usage_type: UsageType,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64,
    pub succeeded: bool,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
