//! LLM routing: tier-gated, health-aware, cost/speed/quality scored model selection (§4.B, §4.C).

pub mod budget;
pub mod capability;
pub mod cost;
pub mod health;
pub mod scoring;
pub mod task_type;

pub use cost::estimate_cost;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::domain::{LlmTier, ProviderCredentials, Tenant, TenantLlmConfig, UsageRecord, UsageType};
use crate::error::ConduitError;
use crate::providers::{ChatMessage, CompletionRequest, CompletionResponse, ProviderAdapter, ProviderError};
use capability::RosterEntry;
use health::ProviderHealth;
use scoring::ScoringWeights;
use task_type::TaskType;

/// A caller's preferences for one routing decision, layered on top of the tenant's tier and
/// configured allow/block lists.
#[derive(Debug, Clone, Default)]
pub struct RoutingPreferences {
    pub task_type: Option<TaskType>,
    pub prefer_speed: bool,
    pub prefer_quality: bool,
    /// Bypasses scoring entirely and routes straight to this model, subject to tier/allow-list
    /// gating — the tenant's `preferred_model` configuration surfaces here.
    pub forced_model: Option<String>,
}

/// Platform API keys, used only when a tenant's usage mode calls for a platform-funded call.
#[derive(Debug, Clone, Default)]
pub struct PlatformCredentials {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub groq: Option<String>,
}

impl PlatformCredentials {
    fn for_provider(&self, provider: &str) -> Option<&str> {
        match provider {
            "openai" => self.openai.as_deref(),
            "anthropic" => self.anthropic.as_deref(),
            "groq" => self.groq.as_deref(),
            _ => None,
        }
    }
}

/// Why the router picked the model it did, surfaced for observability and for the routed
/// completion's bookkeeping (§4.B: "record the selection reason as `Fallback`" once the healthy
/// candidate set is empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Scored,
    Fallback,
}

/// Routes completion requests across registered [`ProviderAdapter`]s, tracking health per
/// provider and falling back to an upgraded tier once on failure (§4.C).
pub struct Router {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
    roster: Vec<RosterEntry>,
    health: Mutex<HashMap<String, ProviderHealth>>,
}

/// Outcome of a successful routed call, bundling the response with the bookkeeping the caller
/// needs to persist (usage ledger, tenant token counter).
pub struct RoutedCompletion {
    pub response: CompletionResponse,
    pub provider: String,
    pub model: String,
    pub usage_type: UsageType,
    pub reason: SelectionReason,
}

/// Point-in-time health/capability snapshot for one registered provider, for an operator-facing
/// status surface.
#[derive(Debug, Clone)]
pub struct ProviderStats {
    pub provider: String,
    pub failure_count: u32,
    pub average_latency_ms: Option<u64>,
    pub models: Vec<String>,
}

/// One scored (or fallback) candidate the router is willing to try, in priority order.
struct Candidate {
    entry: RosterEntry,
    reason: SelectionReason,
}

impl Router {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let mut map = HashMap::new();
        for adapter in adapters {
            map.insert(adapter.name(), adapter);
        }
        Self {
            adapters: map,
            roster: capability::roster(),
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Candidate roster entries for `tier`, filtered by tier/allow-list/block-list, scored
    /// highest-first, ties broken by tier (lower first) then candidate-list order (§4.B). If
    /// health-exclusion empties the pool, falls back to any healthy adapter's first advertised
    /// model with [`SelectionReason::Fallback`].
    async fn candidates(
        &self,
        tier: LlmTier,
        preferences: &RoutingPreferences,
        config: &TenantLlmConfig,
    ) -> Vec<Candidate> {
        let allowed_tiers = tier.at_or_below();
        let task_type = preferences.task_type.unwrap_or(TaskType::Chat);
        let req = task_type.requirement();
        let a = task_type.quality_weight_a();
        let weights = ScoringWeights::with_preference(preferences.prefer_speed, preferences.prefer_quality);

        let health = self.health.lock().await;
        let gated: Vec<RosterEntry> = self
            .roster
            .iter()
            .filter(|entry| allowed_tiers.contains(&entry.min_tier))
            .filter(|entry| config.allows_model(&entry.capabilities.model))
            .cloned()
            .collect();

        let forced: Option<RosterEntry> = preferences.forced_model.as_ref().and_then(|model| {
            gated.iter().find(|e| &e.capabilities.model == model).cloned()
        });
        if let Some(entry) = forced {
            return vec![Candidate { entry, reason: SelectionReason::Scored }];
        }

        let mut pool: Vec<RosterEntry> = gated
            .iter()
            .filter(|entry| {
                health
                    .get(entry.capabilities.provider)
                    .map(|h| !h.is_excluded())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if pool.is_empty() {
            drop(health);
            return self
                .fallback_candidate()
                .await
                .into_iter()
                .collect();
        }

        pool.sort_by(|x, y| {
            let score_x = scoring::score_model(&x.capabilities, req, a, weights);
            let score_y = scoring::score_model(&y.capabilities, req, a, weights);
            score_y
                .partial_cmp(&score_x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.min_tier.cmp(&y.min_tier))
        });
        drop(health);

        pool.into_iter().map(|entry| Candidate { entry, reason: SelectionReason::Scored }).collect()
    }

    /// Any healthy registered adapter's first advertised model, for the §4.B "exclusion empties
    /// the set" fallback path. Adapter iteration order is a `HashMap`'s, which is unspecified but
    /// stable within one process — acceptable since this path only fires when every scored
    /// candidate is already excluded.
    async fn fallback_candidate(&self) -> Option<Candidate> {
        let health = self.health.lock().await;
        for adapter in self.adapters.values() {
            let name = adapter.name();
            let healthy = health.get(name).map(|h| !h.is_excluded()).unwrap_or(true);
            if !healthy {
                continue;
            }
            if let Some(capabilities) = adapter.capabilities().first() {
                let min_tier = self
                    .roster
                    .iter()
                    .find(|e| e.capabilities.model == capabilities.model)
                    .map(|e| e.min_tier)
                    .unwrap_or(LlmTier::Enterprise);
                return Some(Candidate {
                    entry: RosterEntry { capabilities: capabilities.clone(), min_tier },
                    reason: SelectionReason::Fallback,
                });
            }
        }
        None
    }

    /// Route and execute a completion for `tenant`, trying the top-scored candidate first and
    /// falling back once to the next-best candidate at an upgraded tier on a provider-level
    /// failure (§4.B "Fallback on call failure"). Returns the first success; if the fallback
    /// also fails, the fallback's error is returned.
    pub async fn route_and_complete(
        &self,
        tenant: &Tenant,
        config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
        platform_credentials: &PlatformCredentials,
        preferences: &RoutingPreferences,
        messages: Vec<ChatMessage>,
    ) -> Result<RoutedCompletion, ConduitError> {
        let fallback_tier = match tenant.llm_tier {
            LlmTier::Free => LlmTier::Standard,
            LlmTier::Standard => LlmTier::Professional,
            LlmTier::Professional => LlmTier::Enterprise,
            LlmTier::Enterprise => LlmTier::Enterprise,
        };

        let primary = self.candidates(tenant.llm_tier, preferences, config).await;
        let failed_provider = primary.first().map(|c| c.entry.capabilities.provider.to_string());
        match self
            .try_candidates(&primary, tenant, config, tenant_credentials, platform_credentials, &messages)
            .await
        {
            Ok(completion) => Ok(completion),
            Err(first_error) if first_error.counts_as_provider_failure() => {
                // `try_candidates` already bumped this provider's failure count; only escalate
                // once that count is itself past the exclusion threshold (§4.B: "if >3, re-select
                // at one tier higher ... and retry once on a different provider"). A single
                // isolated failure (count still ≤3) surfaces unchanged.
                let past_threshold = match &failed_provider {
                    Some(provider) => {
                        let health = self.health.lock().await;
                        health.get(provider).map(|h| h.failure_count() > 3).unwrap_or(false)
                    }
                    None => false,
                };
                if !past_threshold {
                    return Err(first_error);
                }

                let mut upgraded = preferences.clone();
                upgraded.prefer_quality = true;
                upgraded.forced_model = None;
                let mut fallback = self.candidates(fallback_tier, &upgraded, config).await;
                if let Some(provider) = &failed_provider {
                    fallback.retain(|c| c.entry.capabilities.provider != provider);
                }
                self.try_candidates(
                    &fallback,
                    tenant,
                    config,
                    tenant_credentials,
                    platform_credentials,
                    &messages,
                )
                .await
            }
            Err(other) => Err(other),
        }
    }

    async fn try_candidates(
        &self,
        candidates: &[Candidate],
        tenant: &Tenant,
        config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
        platform_credentials: &PlatformCredentials,
        messages: &[ChatMessage],
    ) -> Result<RoutedCompletion, ConduitError> {
        let candidate = candidates
            .first()
            .ok_or_else(|| ConduitError::InvalidModel("no eligible model for tenant tier".to_string()))?;
        let entry = &candidate.entry;

        let provider = entry.capabilities.provider;
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| ConduitError::Config(format!("no adapter registered for {provider}")))?;

        let credential = budget::resolve_credential(
            config,
            provider,
            tenant_credentials,
            platform_credentials.for_provider(provider),
        )?;
        budget::check_budget(tenant, credential.usage_type, budget::PRE_CALL_TOKEN_ESTIMATE)?;

        let request = CompletionRequest {
            model: entry.capabilities.model.clone(),
            messages: messages.to_vec(),
            max_tokens: None,
            temperature: None,
            tools: None,
        };

        let started = Instant::now();
        let mut result = adapter.complete(&request, &credential.api_key).await;

        // §7: ErrRateLimit gets one local retry with backoff before it's surfaced or counted
        // against the provider's health.
        if let Err(ProviderError::RateLimit) = &result {
            tokio::time::sleep(Duration::from_secs(1)).await;
            result = adapter.complete(&request, &credential.api_key).await;
        }

        let mut health = self.health.lock().await;
        let provider_health = health
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));

        match result {
            Ok(response) => {
                provider_health.record_success(started.elapsed());
                Ok(RoutedCompletion {
                    response,
                    provider: provider.to_string(),
                    model: entry.capabilities.model.clone(),
                    usage_type: credential.usage_type,
                    reason: candidate.reason,
                })
            }
            Err(err) => {
                let conduit_err = match &err {
                    ProviderError::Auth => {
                        provider_health.record_failure();
                        ConduitError::Auth { provider: provider.to_string() }
                    }
                    ProviderError::RateLimit => ConduitError::RateLimit { provider: provider.to_string() },
                    ProviderError::Upstream(message) => {
                        provider_health.record_failure();
                        ConduitError::Upstream { provider: provider.to_string(), message: message.clone() }
                    }
                    ProviderError::Timeout(elapsed_ms) => {
                        provider_health.record_failure();
                        ConduitError::Timeout { provider: provider.to_string(), elapsed_ms: *elapsed_ms }
                    }
                    ProviderError::InvalidModel(model) => {
                        ConduitError::InvalidModel(model.clone())
                    }
                };
                Err(conduit_err)
            }
        }
    }

    /// Snapshot every registered provider's health and known models, for an operator status
    /// surface (§1, §4.B). Providers never dialed yet report a zero failure count and no latency
    /// sample.
    pub async fn stats(&self) -> Vec<ProviderStats> {
        let health = self.health.lock().await;
        self.adapters
            .values()
            .map(|adapter| {
                let name = adapter.name();
                let entry = health.get(name);
                ProviderStats {
                    provider: name.to_string(),
                    failure_count: entry.map(|h| h.failure_count()).unwrap_or(0),
                    average_latency_ms: entry
                        .and_then(|h| h.average_latency())
                        .map(|d| d.as_millis() as u64),
                    models: adapter.models(),
                }
            })
            .collect()
    }

    /// Build the usage record for a completed routed call, ready to append to the usage ledger.
    pub fn usage_record(
        tenant_id: crate::domain::TenantId,
        completion: &RoutedCompletion,
        recorded_at: chrono::DateTime<chrono::Utc>,
    ) -> UsageRecord {
        UsageRecord {
            tenant_id,
            provider: completion.provider.clone(),
            model: completion.model.clone(),
            usage_type: completion.usage_type,
            prompt_tokens: completion.response.usage.prompt_tokens,
            completion_tokens: completion.response.usage.completion_tokens,
            latency_ms: completion.response.latency_ms,
            succeeded: true,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LlmTier;
    use crate::providers::{ChatRole, ProviderError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// An adapter whose `complete` calls are scripted in order; once the script is exhausted the
    /// last entry repeats. Lets a test drive "fails twice then succeeds" without real I/O.
    struct ScriptedAdapter {
        name: &'static str,
        caps: Vec<ModelCapabilities>,
        script: StdMutex<Vec<Result<&'static str, ProviderError>>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(name: &'static str, caps: Vec<ModelCapabilities>, script: Vec<Result<&'static str, ProviderError>>) -> Self {
            Self {
                name,
                caps,
                script: StdMutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn always_fails(name: &'static str, caps: Vec<ModelCapabilities>, err: fn() -> ProviderError) -> Self {
            Self::new(name, caps, vec![Err(err())])
        }

        fn always_succeeds(name: &'static str, caps: Vec<ModelCapabilities>) -> Self {
            Self::new(name, caps, vec![Ok("ok")])
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capabilities(&self) -> &[ModelCapabilities] {
            &self.caps
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
            _api_key: &str,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let step = if script.len() > 1 { script.remove(0) } else { script[0].clone() };
            step.map(|content| CompletionResponse {
                content: content.to_string(),
                model: request.model.clone(),
                provider: self.name,
                usage: crate::providers::TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
                finish_reason: Some("stop".to_string()),
                tool_calls: Vec::new(),
                latency_ms: 5,
            })
        }
    }

    fn test_tenant(tier: LlmTier) -> Tenant {
        Tenant {
            id: crate::domain::TenantId::new(),
            name: "acme".to_string(),
            plan: "test".to_string(),
            subscription_active: true,
            trial_end: None,
            llm_tier: tier,
            monthly_token_limit: None,
            tokens_used_this_period: 0,
            limit_reset_at: chrono::Utc::now(),
            max_users: None,
            max_agents: None,
            max_workflows: None,
            max_executions_per_month: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn permissive_config(tenant_id: crate::domain::TenantId) -> TenantLlmConfig {
        TenantLlmConfig {
            tenant_id,
            usage_mode: crate::domain::UsageMode::Platform,
            byok_providers: HashSet::new(),
            model_allow_list: None,
            model_block_list: HashSet::new(),
            preferred_provider: None,
            preferred_model: None,
        }
    }

    fn platform_credentials() -> PlatformCredentials {
        PlatformCredentials {
            openai: Some("platform-openai-key".to_string()),
            anthropic: Some("platform-anthropic-key".to_string()),
            groq: Some("platform-groq-key".to_string()),
        }
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: ChatRole::User,
            content: "hello".to_string(),
        }]
    }

    /// Testable Property 3: `select_model` (here, the candidate pool) never returns a model
    /// outside the tenant's tier-gated union.
    #[tokio::test]
    async fn tier_gating_excludes_models_above_the_tenant_tier() {
        let router = Router::new(vec![]);
        let tenant_id = crate::domain::TenantId::new();
        let config = permissive_config(tenant_id);

        let candidates = router
            .candidates(LlmTier::Free, &RoutingPreferences::default(), &config)
            .await;

        for candidate in &candidates {
            assert_eq!(candidate.entry.min_tier, LlmTier::Free);
        }
        assert!(!candidates.is_empty());
    }

    /// Testable Property 4: two calls with identical inputs (task type, tier, preferences,
    /// healthy providers, available models) yield an identically ordered candidate pool.
    #[tokio::test]
    async fn scoring_is_a_pure_function_of_its_inputs() {
        let router = Router::new(vec![]);
        let tenant_id = crate::domain::TenantId::new();
        let config = permissive_config(tenant_id);
        let prefs = RoutingPreferences {
            task_type: Some(TaskType::Code),
            ..Default::default()
        };

        let first = router.candidates(LlmTier::Enterprise, &prefs, &config).await;
        let second = router.candidates(LlmTier::Enterprise, &prefs, &config).await;

        let first_models: Vec<&str> = first.iter().map(|c| c.entry.capabilities.model.as_str()).collect();
        let second_models: Vec<&str> = second.iter().map(|c| c.entry.capabilities.model.as_str()).collect();
        assert_eq!(first_models, second_models);
    }

    /// An allow-list that names no roster model empties the gated pool for that tenant.
    #[tokio::test]
    async fn allow_list_restricts_the_candidate_pool() {
        let router = Router::new(vec![]);
        let tenant_id = crate::domain::TenantId::new();
        let mut config = permissive_config(tenant_id);
        config.model_allow_list = Some(HashSet::from(["claude-opus-4-5".to_string()]));

        let candidates = router
            .candidates(LlmTier::Enterprise, &RoutingPreferences::default(), &config)
            .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entry.capabilities.model, "claude-opus-4-5");
    }

    /// Testable Property 10 / scenario-style check: once a provider's failure count is raised
    /// past the exclusion threshold, a later call with `prefer_quality` routes to a different,
    /// healthy provider instead.
    #[tokio::test]
    async fn failover_excludes_an_unhealthy_provider_after_repeated_failures() {
        let failing = Arc::new(ScriptedAdapter::always_fails(
            "openai",
            capability::roster()
                .into_iter()
                .filter(|e| e.capabilities.provider == "openai")
                .map(|e| e.capabilities)
                .collect(),
            || ProviderError::Upstream("boom".to_string()),
        ));
        let healthy = Arc::new(ScriptedAdapter::always_succeeds(
            "groq",
            capability::roster()
                .into_iter()
                .filter(|e| e.capabilities.provider == "groq")
                .map(|e| e.capabilities)
                .collect(),
        ));

        let router = Router::new(vec![failing.clone() as Arc<dyn ProviderAdapter>, healthy.clone() as Arc<dyn ProviderAdapter>]);
        let tenant_id = crate::domain::TenantId::new();
        let tenant = test_tenant(LlmTier::Free);
        let mut config = permissive_config(tenant_id);
        // Force every call at the base tier onto the openai roster entries so failures land there.
        config.model_allow_list = Some(HashSet::from([
            "gpt-4.1-nano".to_string(),
            "llama-3.1-8b-instant".to_string(),
            "llama-3.3-70b-versatile".to_string(),
        ]));
        let prefs = RoutingPreferences {
            forced_model: Some("gpt-4.1-nano".to_string()),
            ..Default::default()
        };

        // The first three forced calls each push openai's failure count to ≤3, which per §4.B
        // surfaces the error unchanged rather than escalating to a different provider.
        for _ in 0..3 {
            let result = router
                .route_and_complete(
                    &tenant,
                    &config,
                    &ProviderCredentials::default(),
                    &platform_credentials(),
                    &prefs,
                    messages(),
                )
                .await;
            assert!(result.is_err(), "forced openai model should keep failing");
        }

        // The fourth call pushes openai's failure count past the exclusion threshold (now 4), so
        // the router escalates to an upgraded tier and retries once on a different, healthy
        // provider instead of surfacing the error.
        let result = router
            .route_and_complete(
                &tenant,
                &config,
                &ProviderCredentials::default(),
                &platform_credentials(),
                &prefs,
                messages(),
            )
            .await
            .expect("crossing the exclusion threshold should fall back to a healthy provider");
        assert_eq!(result.provider, "groq");

        let stats = router.stats().await;
        let openai_stats = stats.iter().find(|s| s.provider == "openai").unwrap();
        assert!(openai_stats.failure_count > 3);

        // Without a forced model, scoring now only considers the healthy groq roster.
        let prefs_unforced = RoutingPreferences {
            prefer_quality: true,
            ..Default::default()
        };
        let result = router
            .route_and_complete(
                &tenant,
                &config,
                &ProviderCredentials::default(),
                &platform_credentials(),
                &prefs_unforced,
                messages(),
            )
            .await
            .expect("groq should serve the fallback candidate");
        assert_eq!(result.provider, "groq");
        assert!(healthy.call_count() >= 1);
    }

    /// Happy-path routed completion: a scored (not fallback) candidate succeeds and the router
    /// reports `SelectionReason::Scored`.
    #[tokio::test]
    async fn successful_call_reports_scored_selection() {
        let groq = Arc::new(ScriptedAdapter::always_succeeds(
            "groq",
            capability::roster()
                .into_iter()
                .filter(|e| e.capabilities.provider == "groq")
                .map(|e| e.capabilities)
                .collect(),
        ));
        let router = Router::new(vec![groq as Arc<dyn ProviderAdapter>]);
        let tenant_id = crate::domain::TenantId::new();
        let tenant = test_tenant(LlmTier::Free);
        let config = permissive_config(tenant_id);
        let prefs = RoutingPreferences {
            task_type: Some(TaskType::Summarize),
            ..Default::default()
        };

        let completion = router
            .route_and_complete(
                &tenant,
                &config,
                &ProviderCredentials::default(),
                &platform_credentials(),
                &prefs,
                messages(),
            )
            .await
            .expect("groq should serve a free-tier summarize request");

        assert_eq!(completion.provider, "groq");
        assert_eq!(completion.reason, SelectionReason::Scored);
        assert!(completion.response.usage.total_tokens() > 0);
    }
}
