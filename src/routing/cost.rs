//! Cost estimation shared between pre-call budget checks and post-call usage recording (§4.B).

use crate::providers::TokenUsage;
use crate::routing::capability;

/// Estimated USD cost of `usage` against `model`, or `None` if `model` isn't in the roster.
/// Used both to project a call's cost before it's made (quota/budget gating) and to price a
/// completed call for the usage ledger, so the two numbers are always computed the same way.
pub fn estimate_cost(model: &str, usage: TokenUsage) -> Option<f64> {
    capability::roster()
        .into_iter()
        .find(|entry| entry.capabilities.model == model)
        .map(|entry| {
            let input = usage.prompt_tokens as f64 / 1_000_000.0 * entry.capabilities.cost_per_million_input;
            let output = usage.completion_tokens as f64 / 1_000_000.0 * entry.capabilities.cost_per_million_output;
            input + output
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_a_known_model() {
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
        };
        let cost = estimate_cost("gpt-4.1-nano", usage).unwrap();
        assert!((cost - 0.50).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_has_no_estimate() {
        assert!(estimate_cost("not-a-real-model", TokenUsage::default()).is_none());
    }
}
