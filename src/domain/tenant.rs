//! Tenant and per-tenant LLM configuration (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::TenantId;

/// The LLM tier a tenant is entitled to. Higher tiers can always use every model available to
/// lower tiers (§4.B tier gating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmTier {
    Free,
    Standard,
    Professional,
    Enterprise,
}

impl LlmTier {
    /// All tiers at or below `self`, in ascending order — the candidate-set union from §4.B.
    pub fn at_or_below(self) -> Vec<LlmTier> {
        use LlmTier::*;
        match self {
            Free => vec![Free],
            Standard => vec![Free, Standard],
            Professional => vec![Free, Standard, Professional],
            Enterprise => vec![Free, Standard, Professional, Enterprise],
        }
    }
}

/// Billing/isolation root. Owns its Users, Sessions, API keys, LLM config, Usage Records, and
/// Conversations exclusively (§3 Ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan: String,
    pub subscription_active: bool,
    pub trial_end: Option<DateTime<Utc>>,
    pub llm_tier: LlmTier,
    /// `None` means unlimited.
    pub monthly_token_limit: Option<u64>,
    pub tokens_used_this_period: u64,
    /// First instant of next calendar month, UTC — when `tokens_used_this_period` resets.
    pub limit_reset_at: DateTime<Utc>,
    pub max_users: Option<u32>,
    pub max_agents: Option<u32>,
    pub max_workflows: Option<u32>,
    pub max_executions_per_month: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Tokens left before `monthly_token_limit` is hit. `None` (unlimited) never blocks a call.
    pub fn tokens_remaining(&self) -> Option<u64> {
        self.monthly_token_limit
            .map(|limit| limit.saturating_sub(self.tokens_used_this_period))
    }

    /// First instant of the next calendar month after `now`, UTC. Used both to initialize
    /// `limit_reset_at` and to advance it once a reset fires.
    pub fn next_month_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::{Datelike, TimeZone};
        let (year, month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .expect("first of month is always a valid instant")
    }

    /// Reset the monthly counter if `now` is at or past `limit_reset_at`, advancing the boundary
    /// to the following month. No-op otherwise. Returns `true` if a reset happened.
    pub fn reset_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if now >= self.limit_reset_at {
            self.tokens_used_this_period = 0;
            self.limit_reset_at = Self::next_month_boundary(now);
            true
        } else {
            false
        }
    }
}

/// How a tenant's LLM calls are funded (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageMode {
    /// Only platform-held provider keys are used; usage counts against the monthly limit.
    Platform,
    /// Only tenant-supplied keys are used; usage is recorded for analytics but never decrements
    /// the platform limit.
    Byok,
    /// Tenant keys are tried first; platform keys backfill any provider the tenant hasn't
    /// configured. Usage against backfilled providers still counts toward the platform limit.
    Hybrid,
}

/// Already-decrypted BYOK credentials for one tenant, handed to the core by the caller.
///
/// The core never decrypts anything itself — `TenantLlmConfig` only stores which providers have
/// a key configured; the key material lives here, assembled by the (external) auth layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub groq: Option<String>,
}

impl ProviderCredentials {
    /// `true` if at least one provider key is present.
    pub fn is_empty(&self) -> bool {
        self.openai.is_none() && self.anthropic.is_none() && self.groq.is_none()
    }

    pub fn for_provider(&self, provider: &str) -> Option<&str> {
        match provider {
            "openai" => self.openai.as_deref(),
            "anthropic" => self.anthropic.as_deref(),
            "groq" => self.groq.as_deref(),
            _ => None,
        }
    }
}

/// One per tenant; governs which provider keys and models are in play for that tenant's calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantLlmConfig {
    pub tenant_id: TenantId,
    pub usage_mode: UsageMode,
    /// Which providers the tenant has configured a BYOK key for (the key material itself is
    /// never held by the core — see [`ProviderCredentials`]).
    pub byok_providers: HashSet<String>,
    pub model_allow_list: Option<HashSet<String>>,
    pub model_block_list: HashSet<String>,
    pub preferred_provider: Option<String>,
    pub preferred_model: Option<String>,
}

impl TenantLlmConfig {
    /// Validate the invariant from §3: `byok` mode requires at least one configured key.
    pub fn validate(&self) -> Result<(), crate::error::ConduitError> {
        if self.usage_mode == UsageMode::Byok && self.byok_providers.is_empty() {
            return Err(crate::error::ConduitError::Config(
                "byok usage mode requires at least one configured provider key".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `model` is permitted by the allow/block lists.
    pub fn allows_model(&self, model: &str) -> bool {
        if self.model_block_list.contains(model) {
            return false;
        }
        match &self.model_allow_list {
            Some(allowed) => allowed.contains(model),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tier_at_or_below_is_cumulative() {
        assert_eq!(LlmTier::Free.at_or_below(), vec![LlmTier::Free]);
        assert_eq!(
            LlmTier::Professional.at_or_below(),
            vec![LlmTier::Free, LlmTier::Standard, LlmTier::Professional]
        );
    }

    #[test]
    fn next_month_boundary_wraps_december() {
        let dec = Utc.with_ymd_and_hms(2024, 12, 15, 10, 0, 0).unwrap();
        let next = Tenant::next_month_boundary(dec);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn byok_requires_keys() {
        let cfg = TenantLlmConfig {
            tenant_id: TenantId::new(),
            usage_mode: UsageMode::Byok,
            byok_providers: HashSet::new(),
            model_allow_list: None,
            model_block_list: HashSet::new(),
            preferred_provider: None,
            preferred_model: None,
        };
        assert!(cfg.validate().is_err());
    }
}
