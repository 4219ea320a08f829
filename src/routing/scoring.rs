//! Weighted cost/speed/quality scoring (§4.B) — the literal formula:
//!
//! ```text
//! cost_term   = w_cost  × model.cost    × (model.cost ≥ req.min_cost ? 1 : 0.5)
//! speed_term  = w_speed × model.speed   × (model.speed ≥ req.speed   ? 1 : 0.5)
//! quality     = min(model.reasoning/req.reasoning, 1.5) × a
//!             + min(model.creativity/req.creativity, 1.5) × (1-a)
//! quality_term = w_quality × quality × 5
//! score = cost_term + speed_term + quality_term
//! ```

use crate::providers::ModelCapabilities;
use crate::routing::task_type::TaskRequirement;

/// Tunable weighting for [`score_model`]. Defaults sum to 1.0; `prefer_speed`/`prefer_quality`
/// boost their respective weight by 1.5x and renormalize the whole set so the output stays
/// comparable regardless of which preference (if any) was requested.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub cost_weight: f64,
    pub speed_weight: f64,
    pub quality_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cost_weight: 0.3,
            speed_weight: 0.3,
            quality_weight: 0.4,
        }
    }
}

impl ScoringWeights {
    pub fn with_preference(prefer_speed: bool, prefer_quality: bool) -> Self {
        let mut w = Self::default();
        if prefer_speed {
            w.speed_weight *= 1.5;
        }
        if prefer_quality {
            w.quality_weight *= 1.5;
        }
        w.normalize();
        w
    }

    fn normalize(&mut self) {
        let total = self.cost_weight + self.speed_weight + self.quality_weight;
        if total > 0.0 {
            self.cost_weight /= total;
            self.speed_weight /= total;
            self.quality_weight /= total;
        }
    }
}

/// Weighted score for one candidate model against `req`, higher is better. `a` is the
/// quality-blend weight from [`crate::routing::task_type::TaskType::quality_weight_a`].
pub fn score_model(
    model: &ModelCapabilities,
    req: TaskRequirement,
    a: f64,
    weights: ScoringWeights,
) -> f64 {
    let cost_term = weights.cost_weight
        * model.cost as f64
        * if model.cost >= req.min_cost { 1.0 } else { 0.5 };
    let speed_term = weights.speed_weight
        * model.speed as f64
        * if model.speed >= req.speed { 1.0 } else { 0.5 };

    let reasoning_ratio = (model.reasoning as f64 / req.reasoning as f64).min(1.5);
    let creativity_ratio = (model.creativity as f64 / req.creativity as f64).min(1.5);
    let quality = reasoning_ratio * a + creativity_ratio * (1.0 - a);
    let quality_term = weights.quality_weight * quality * 5.0;

    cost_term + speed_term + quality_term
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(reasoning: u8, creativity: u8, speed: u8, cost: u8) -> ModelCapabilities {
        ModelCapabilities {
            model: "m".to_string(),
            provider: "p",
            cost_per_million_input: 0.0,
            cost_per_million_output: 0.0,
            reasoning,
            creativity,
            speed,
            cost,
            streaming: true,
            tools: false,
            vision: false,
        }
    }

    #[test]
    fn preference_boost_renormalizes_to_one() {
        let w = ScoringWeights::with_preference(true, false);
        assert!((w.cost_weight + w.speed_weight + w.quality_weight - 1.0).abs() < 1e-9);
        assert!(w.speed_weight > ScoringWeights::default().speed_weight);
    }

    #[test]
    fn cheaper_faster_model_scores_higher_at_equal_quality() {
        let cheap_fast = model(3, 3, 5, 5);
        let expensive_slow = model(3, 3, 1, 1);
        let req = TaskRequirement { speed: 3, reasoning: 3, creativity: 3, min_cost: 3 };
        let weights = ScoringWeights::default();
        assert!(
            score_model(&cheap_fast, req, 0.5, weights) > score_model(&expensive_slow, req, 0.5, weights)
        );
    }

    #[test]
    fn below_min_cost_is_penalized_by_half() {
        let req = TaskRequirement { speed: 1, reasoning: 1, creativity: 1, min_cost: 5 };
        let weights = ScoringWeights { cost_weight: 1.0, speed_weight: 0.0, quality_weight: 0.0 };
        let cheap = model(1, 1, 1, 5);
        let pricier = model(1, 1, 1, 2);
        // pricier's cost (2) < min_cost (5), so its cost_term is halved relative to its raw value.
        assert_eq!(score_model(&cheap, req, 0.5, weights), 5.0);
        assert_eq!(score_model(&pricier, req, 0.5, weights), 1.0);
    }

    #[test]
    fn summarize_on_free_tier_favors_versatile_groq_model() {
        use crate::routing::task_type::TaskType;
        let req = TaskType::Summarize.requirement();
        let a = TaskType::Summarize.quality_weight_a();
        let weights = ScoringWeights::default();

        let nano = model(2, 2, 5, 5); // gpt-4.1-nano-shaped
        let versatile = model(4, 3, 5, 5); // llama-3.3-70b-versatile-shaped
        assert!(score_model(&versatile, req, a, weights) > score_model(&nano, req, a, weights));
    }
}
