//! Agent bundle (§3, GLOSSARY).

use serde::{Deserialize, Serialize};

use super::{AgentId, PromptId, TenantId, ToolId};

/// Where an agent may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentScope {
    Enterprise,
    Business,
}

/// A user-authored bundle of {system prompt, allowed tools, prompt templates} targeting one
/// business role. Read-only during execution (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tenant_id: TenantId,
    pub scope: AgentScope,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub system_prompt: String,
    /// Ordered: earlier tool references take precedence when names collide in a
    /// [`crate::tool::ToolRegistry`].
    pub tool_refs: Vec<ToolId>,
    pub prompt_refs: Vec<PromptId>,
    /// Free-form grouping tag (e.g. `"sales"`, `"support"`) — see `SPEC_FULL.md` §3 for why this
    /// stays a string rather than a closed enum.
    pub functional_area: Option<String>,
    /// Participates in chat handoff as a candidate target but never initiates one itself.
    pub moderator: bool,
}
