//! Task type classification driving per-request capability requirements (§4.B).

use serde::{Deserialize, Serialize};

/// The kind of work a completion request is being routed for. Each variant carries a
/// `{speed, reasoning, creativity, min_cost}` requirement vector (1-5, higher = better) that
/// [`crate::routing::scoring::score_model`] scores candidates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Code generation and debugging.
    Code,
    /// Short, low-stakes completions where latency dominates (handoff summaries, classification).
    Quick,
    /// Condensing a longer text into a shorter one.
    Summarize,
    /// Long-form or creative writing.
    Writing,
    /// Drafting or replying to an email on the tenant's behalf.
    Email,
    /// General-purpose conversational chat.
    Chat,
    /// Multi-step reasoning over data (e.g. reading a report, extracting structured facts).
    Analysis,
    /// Multi-step task decomposition / planning.
    Planning,
    /// Choosing between options given constraints (e.g. workflow branching advice).
    Decision,
}

/// A `{speed, reasoning, creativity, min_cost}` requirement vector, each component 1-5.
#[derive(Debug, Clone, Copy)]
pub struct TaskRequirement {
    pub speed: u8,
    pub reasoning: u8,
    pub creativity: u8,
    pub min_cost: u8,
}

impl TaskType {
    /// The static requirement vector for this task type (§4.B "Static tables"). `CODE` and
    /// `QUICK` reproduce the two examples spec.md gives verbatim (`CODE` reasoning 5; `QUICK`
    /// speed 5, min_cost 5); the rest are this crate's own calibration, since spec.md does not
    /// enumerate every task type's vector.
    pub fn requirement(self) -> TaskRequirement {
        use TaskType::*;
        match self {
            Code => TaskRequirement { speed: 2, reasoning: 5, creativity: 2, min_cost: 2 },
            Quick => TaskRequirement { speed: 5, reasoning: 2, creativity: 1, min_cost: 5 },
            Summarize => TaskRequirement { speed: 4, reasoning: 3, creativity: 2, min_cost: 3 },
            Writing => TaskRequirement { speed: 3, reasoning: 2, creativity: 5, min_cost: 2 },
            Email => TaskRequirement { speed: 4, reasoning: 2, creativity: 3, min_cost: 3 },
            Chat => TaskRequirement { speed: 4, reasoning: 3, creativity: 3, min_cost: 3 },
            Analysis => TaskRequirement { speed: 2, reasoning: 5, creativity: 2, min_cost: 2 },
            Planning => TaskRequirement { speed: 2, reasoning: 4, creativity: 3, min_cost: 2 },
            Decision => TaskRequirement { speed: 3, reasoning: 5, creativity: 1, min_cost: 2 },
        }
    }

    /// The quality-blend weight `a` in the scoring formula's `quality` term (§4.B): 0.7 for
    /// code/analysis/planning/decision tasks (reasoning-dominated), 0.3 for writing/email
    /// (creativity-dominated), 0.5 otherwise.
    pub fn quality_weight_a(self) -> f64 {
        use TaskType::*;
        match self {
            Code | Analysis | Planning | Decision => 0.7,
            Writing | Email => 0.3,
            Quick | Summarize | Chat => 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_the_literal_example() {
        assert_eq!(TaskType::Code.requirement().reasoning, 5);
    }

    #[test]
    fn quick_matches_the_literal_example() {
        let req = TaskType::Quick.requirement();
        assert_eq!(req.speed, 5);
        assert_eq!(req.min_cost, 5);
    }

    #[test]
    fn reasoning_heavy_tasks_weight_a_at_0_7() {
        assert_eq!(TaskType::Code.quality_weight_a(), 0.7);
        assert_eq!(TaskType::Analysis.quality_weight_a(), 0.7);
        assert_eq!(TaskType::Planning.quality_weight_a(), 0.7);
        assert_eq!(TaskType::Decision.quality_weight_a(), 0.7);
    }

    #[test]
    fn creative_tasks_weight_a_at_0_3() {
        assert_eq!(TaskType::Writing.quality_weight_a(), 0.3);
        assert_eq!(TaskType::Email.quality_weight_a(), 0.3);
    }
}
