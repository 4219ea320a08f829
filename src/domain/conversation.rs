//! Chat conversation and message history (§3, § handoff).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, ConversationId, TenantId, UserId};

/// Speaker of a [`ConversationMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Which agent authored this message, when `role == Assistant`. `None` for a message
    /// produced before any agent had taken the conversation.
    pub agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

/// A running chat session, owned by one tenant, that can hand off between agents mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub active_agent: Option<AgentId>,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn push(&mut self, message: ConversationMessage) {
        self.updated_at = message.created_at;
        self.messages.push(message);
    }

    /// Most recent user message, the text handoff scoring runs against.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}
