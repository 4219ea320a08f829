//! Chat handoff router (§4.E): pure keyword-substring scoring between agents, no LLM involvement.
//! Runs before Routing & Policy selects a model for the reply.

use crate::domain::AgentId;

/// One agent's routing entry: the keywords that route a message to it and a human-readable
/// reason surfaced on the resulting [`HandoffInfo`].
#[derive(Debug, Clone)]
pub struct HandoffRule {
    pub agent_id: AgentId,
    pub keywords: Vec<String>,
    pub description: String,
}

/// Emitted when the router decides the conversation should move to a different agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffInfo {
    pub to_agent_id: AgentId,
    pub reason: String,
}

/// Score every rule against `message` and hand off to the best match, provided it beats the
/// current agent (§4.E):
/// 1. Lowercase the message.
/// 2. For each rule, count how many of its keywords substring-match.
/// 3. If the best score is ≥ 1 and its agent isn't `current_agent`, return a [`HandoffInfo`].
pub fn route(message: &str, current_agent: Option<AgentId>, rules: &[HandoffRule]) -> Option<HandoffInfo> {
    let lowered = message.to_lowercase();

    let mut best: Option<(&HandoffRule, usize)> = None;
    for rule in rules {
        let score = rule
            .keywords
            .iter()
            .filter(|keyword| lowered.contains(&keyword.to_lowercase()))
            .count();
        if score == 0 {
            continue;
        }
        match best {
            Some((_, best_score)) if best_score >= score => {}
            _ => best = Some((rule, score)),
        }
    }

    let (rule, score) = best?;
    if score < 1 || Some(rule.agent_id) == current_agent {
        return None;
    }

    Some(HandoffInfo {
        to_agent_id: rule.agent_id,
        reason: rule.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_best_scoring_agent() {
        let billing = AgentId::new();
        let support = AgentId::new();
        let rules = vec![
            HandoffRule {
                agent_id: billing,
                keywords: vec!["relance".to_string(), "facture".to_string()],
                description: "billing follow-up".to_string(),
            },
            HandoffRule {
                agent_id: support,
                keywords: vec!["bug".to_string(), "erreur".to_string()],
                description: "technical support".to_string(),
            },
        ];

        let decision = route(
            "je dois relancer un client qui n'a pas payé sa facture",
            None,
            &rules,
        )
        .expect("should hand off");
        assert_eq!(decision.to_agent_id, billing);
        assert_eq!(decision.reason, "billing follow-up");
    }

    #[test]
    fn no_handoff_when_already_on_the_best_match() {
        let billing = AgentId::new();
        let rules = vec![HandoffRule {
            agent_id: billing,
            keywords: vec!["facture".to_string()],
            description: "billing follow-up".to_string(),
        }];

        assert!(route("une facture", Some(billing), &rules).is_none());
    }

    #[test]
    fn no_keyword_match_is_no_handoff() {
        let rules = vec![HandoffRule {
            agent_id: AgentId::new(),
            keywords: vec!["facture".to_string()],
            description: "billing follow-up".to_string(),
        }];
        assert!(route("bonjour", None, &rules).is_none());
    }
}
