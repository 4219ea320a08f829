//! The persisted data model (§3).
//!
//! Every type here is a plain, serializable value — there are no cyclic object references.
//! Relationships (e.g. a [`Workflow`] to its owning [`Agent`]) are represented as identity
//! fields resolved at read time through a [`crate::store::Store`], per the "arena-with-index"
//! redesign note in §9: cyclic references in the source become id-based lookups here.

mod agent;
mod conversation;
mod execution;
mod prompt;
mod scheduled_job;
mod tenant;
mod tool_ref;
mod usage;
mod workflow;

pub use agent::Agent;
pub use conversation::{Conversation, ConversationMessage, Role};
pub use execution::{ExecutionStatus, TaskResult, TaskResultStatus, WorkflowExecution};
pub use prompt::PromptTemplate;
pub use scheduled_job::ScheduledJob;
pub use tenant::{LlmTier, ProviderCredentials, Tenant, TenantLlmConfig, UsageMode};
pub use tool_ref::{ToolCategory, ToolReference, ToolStatus};
pub use usage::{UsageRecord, UsageType};
pub use workflow::{
    ErrorPolicy, InputField, Trigger, TriggerConfig, WaitKind, Workflow, WorkflowTask,
    WorkflowTaskType,
};

use uuid::Uuid;

/// Newtype wrapper shared by every entity id in the domain model.
///
/// A bare `Uuid` would let a `TenantId` be passed where a `WorkflowId` is expected; the
/// per-entity wrappers below close that hole at compile time while staying cheap to copy.
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(TenantId);
entity_id!(UserId);
entity_id!(AgentId);
entity_id!(PromptId);
entity_id!(ToolId);
entity_id!(WorkflowId);
entity_id!(ExecutionId);
entity_id!(ScheduledJobId);
entity_id!(ConversationId);
