//! Tenant budget/credential resolution (§3 usage modes, §4.B).

use crate::domain::{ProviderCredentials, Tenant, TenantLlmConfig, UsageMode, UsageType};
use crate::error::ConduitError;

/// The resolved credential and accounting decision for one completion call, produced before the
/// call is made so a quota check can short-circuit it.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub api_key: String,
    pub usage_type: UsageType,
}

/// Resolve which API key to use for `provider` given the tenant's usage mode, and whether the
/// resulting call should be billed against the platform limit.
///
/// - `Byok`: only tenant keys are used; a missing key is an error rather than a silent
///   platform-key fallback (§3: BYOK tenants never have platform keys used on their behalf).
/// - `Platform`: only the platform key is used, regardless of any tenant key.
/// - `Hybrid`: the tenant key wins when present; otherwise the platform key backfills and the
///   call counts toward the platform limit.
pub fn resolve_credential(
    config: &TenantLlmConfig,
    provider: &str,
    tenant_credentials: &ProviderCredentials,
    platform_key: Option<&str>,
) -> Result<ResolvedCredential, ConduitError> {
    match config.usage_mode {
        UsageMode::Byok => tenant_credentials
            .for_provider(provider)
            .map(|key| ResolvedCredential {
                api_key: key.to_string(),
                usage_type: UsageType::Byok,
            })
            .ok_or_else(|| ConduitError::Auth {
                provider: provider.to_string(),
            }),
        UsageMode::Platform => platform_key
            .map(|key| ResolvedCredential {
                api_key: key.to_string(),
                usage_type: UsageType::Platform,
            })
            .ok_or_else(|| ConduitError::Auth {
                provider: provider.to_string(),
            }),
        UsageMode::Hybrid => {
            if let Some(key) = tenant_credentials.for_provider(provider) {
                Ok(ResolvedCredential {
                    api_key: key.to_string(),
                    usage_type: UsageType::Byok,
                })
            } else {
                platform_key
                    .map(|key| ResolvedCredential {
                        api_key: key.to_string(),
                        usage_type: UsageType::Platform,
                    })
                    .ok_or_else(|| ConduitError::Auth {
                        provider: provider.to_string(),
                    })
            }
        }
    }
}

/// Conservative pre-call token estimate added to `tokens_used_this_period` before the budget
/// check, since the call's actual usage isn't known until the provider responds (§8 Scenario S2:
/// 99,800 used + 500 estimate against a 100,000 limit trips the block).
pub const PRE_CALL_TOKEN_ESTIMATE: u64 = 500;

/// Enforce the tenant's monthly token limit before a platform-billed call is made: blocks once
/// `tokens_used_this_period + estimate` would reach or exceed `monthly_token_limit`. BYOK-funded
/// calls never consume the platform allowance and always pass.
pub fn check_budget(tenant: &Tenant, usage_type: UsageType, estimate: u64) -> Result<(), ConduitError> {
    if usage_type == UsageType::Byok {
        return Ok(());
    }
    let Some(limit) = tenant.monthly_token_limit else {
        return Ok(());
    };
    if tenant.tokens_used_this_period.saturating_add(estimate) >= limit {
        return Err(ConduitError::QuotaExceeded {
            remaining: tenant.tokens_remaining().unwrap_or(0),
            limit,
            reset_at: tenant.limit_reset_at,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn config(mode: UsageMode) -> TenantLlmConfig {
        TenantLlmConfig {
            tenant_id: crate::domain::TenantId::new(),
            usage_mode: mode,
            byok_providers: HashSet::new(),
            model_allow_list: None,
            model_block_list: HashSet::new(),
            preferred_provider: None,
            preferred_model: None,
        }
    }

    #[test]
    fn byok_mode_rejects_when_no_tenant_key() {
        let cfg = config(UsageMode::Byok);
        let creds = ProviderCredentials::default();
        let result = resolve_credential(&cfg, "openai", &creds, Some("platform-key"));
        assert!(result.is_err());
    }

    #[test]
    fn hybrid_mode_falls_back_to_platform_key() {
        let cfg = config(UsageMode::Hybrid);
        let creds = ProviderCredentials::default();
        let resolved = resolve_credential(&cfg, "openai", &creds, Some("platform-key")).unwrap();
        assert_eq!(resolved.usage_type, UsageType::Platform);
        assert_eq!(resolved.api_key, "platform-key");
    }

    #[test]
    fn hybrid_mode_prefers_tenant_key() {
        let cfg = config(UsageMode::Hybrid);
        let mut creds = ProviderCredentials::default();
        creds.openai = Some("tenant-key".to_string());
        let resolved = resolve_credential(&cfg, "openai", &creds, Some("platform-key")).unwrap();
        assert_eq!(resolved.usage_type, UsageType::Byok);
        assert_eq!(resolved.api_key, "tenant-key");
    }

    #[test]
    fn exhausted_platform_budget_blocks_call() {
        let tenant = Tenant {
            id: crate::domain::TenantId::new(),
            name: "acme".to_string(),
            plan: "standard".to_string(),
            subscription_active: true,
            trial_end: None,
            llm_tier: crate::domain::LlmTier::Standard,
            monthly_token_limit: Some(1000),
            tokens_used_this_period: 1000,
            limit_reset_at: Utc::now(),
            max_users: None,
            max_agents: None,
            max_workflows: None,
            max_executions_per_month: None,
            created_at: Utc::now(),
        };
        assert!(check_budget(&tenant, UsageType::Platform, 0).is_err());
        assert!(check_budget(&tenant, UsageType::Byok, 0).is_ok());
    }

    #[test]
    fn pre_call_estimate_trips_the_block_before_the_limit_is_reached() {
        let tenant = Tenant {
            id: crate::domain::TenantId::new(),
            name: "acme".to_string(),
            plan: "standard".to_string(),
            subscription_active: true,
            trial_end: None,
            llm_tier: crate::domain::LlmTier::Standard,
            monthly_token_limit: Some(100_000),
            tokens_used_this_period: 99_800,
            limit_reset_at: Utc::now(),
            max_users: None,
            max_agents: None,
            max_workflows: None,
            max_executions_per_month: None,
            created_at: Utc::now(),
        };
        assert!(check_budget(&tenant, UsageType::Platform, PRE_CALL_TOKEN_ESTIMATE).is_err());
    }
}
