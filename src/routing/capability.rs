//! Static model roster: which models exist, what they cost, and which tier unlocks each (§4.B).

use crate::domain::LlmTier;
use crate::providers::ModelCapabilities;

/// One entry in the platform's model roster: capability/cost data plus the minimum tier
/// entitled to route to it.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub capabilities: ModelCapabilities,
    pub min_tier: LlmTier,
}

/// The full set of models the platform knows how to route to. Seeding this from a static table
/// rather than discovering it from the provider at request time keeps routing decisions fast
/// and deterministic; a deployment that wants to add a model edits this table.
pub fn roster() -> Vec<RosterEntry> {
    vec![
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "gpt-4.1-nano".to_string(),
                provider: "openai",
                cost_per_million_input: 0.10,
                cost_per_million_output: 0.40,
                reasoning: 2,
                creativity: 2,
                speed: 5,
                cost: 5,
                streaming: true,
                tools: true,
                vision: false,
            },
            min_tier: LlmTier::Free,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "gpt-4.1-mini".to_string(),
                provider: "openai",
                cost_per_million_input: 0.40,
                cost_per_million_output: 1.60,
                reasoning: 3,
                creativity: 3,
                speed: 4,
                cost: 4,
                streaming: true,
                tools: true,
                vision: true,
            },
            min_tier: LlmTier::Standard,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "gpt-4.1".to_string(),
                provider: "openai",
                cost_per_million_input: 2.00,
                cost_per_million_output: 8.00,
                reasoning: 5,
                creativity: 4,
                speed: 2,
                cost: 2,
                streaming: true,
                tools: true,
                vision: true,
            },
            min_tier: LlmTier::Professional,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "claude-haiku-4-5".to_string(),
                provider: "anthropic",
                cost_per_million_input: 0.25,
                cost_per_million_output: 1.25,
                reasoning: 3,
                creativity: 3,
                speed: 4,
                cost: 4,
                streaming: true,
                tools: true,
                vision: true,
            },
            min_tier: LlmTier::Standard,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "claude-sonnet-4-5".to_string(),
                provider: "anthropic",
                cost_per_million_input: 3.00,
                cost_per_million_output: 15.00,
                reasoning: 5,
                creativity: 5,
                speed: 3,
                cost: 2,
                streaming: true,
                tools: true,
                vision: true,
            },
            min_tier: LlmTier::Professional,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "claude-opus-4-5".to_string(),
                provider: "anthropic",
                cost_per_million_input: 15.00,
                cost_per_million_output: 75.00,
                reasoning: 5,
                creativity: 5,
                speed: 2,
                cost: 1,
                streaming: true,
                tools: true,
                vision: true,
            },
            min_tier: LlmTier::Enterprise,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "llama-3.1-8b-instant".to_string(),
                provider: "groq",
                cost_per_million_input: 0.05,
                cost_per_million_output: 0.08,
                reasoning: 2,
                creativity: 2,
                speed: 5,
                cost: 5,
                streaming: true,
                tools: false,
                vision: false,
            },
            min_tier: LlmTier::Free,
        },
        RosterEntry {
            capabilities: ModelCapabilities {
                model: "llama-3.3-70b-versatile".to_string(),
                provider: "groq",
                cost_per_million_input: 0.59,
                cost_per_million_output: 0.79,
                reasoning: 4,
                creativity: 3,
                speed: 5,
                cost: 5,
                streaming: true,
                tools: true,
                vision: false,
            },
            min_tier: LlmTier::Free,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_includes_groqs_versatile_model() {
        assert!(roster()
            .iter()
            .any(|e| e.capabilities.model == "llama-3.3-70b-versatile" && e.min_tier == LlmTier::Free));
    }

    #[test]
    fn every_entry_has_an_adapter_provider_name() {
        for entry in roster() {
            assert!(["openai", "anthropic", "groq"].contains(&entry.capabilities.provider));
        }
    }
}
