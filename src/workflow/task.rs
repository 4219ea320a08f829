//! Per-task execution outcome (§4.D).

use serde_json::Value;

use crate::domain::WorkflowTaskType;
use crate::error::ConduitError;

/// What the interpreter should do immediately after a task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Continue to the task with the next-higher order key.
    Advance,
    /// Jump to the task at this exact order key (used by `condition` and `loop`).
    JumpTo(String),
    /// Suspend the execution; `resume_at` (if any) was already written onto it.
    Suspend,
    /// The execution is finished.
    Terminate { success: bool, message: Option<String> },
}

/// Result of running one [`WorkflowTaskType`] against the current scope.
pub struct TaskOutcome {
    /// Value to store under the task's `output_key`, if it declared one.
    pub output: Option<Value>,
    pub next: Next,
}

impl TaskOutcome {
    pub fn advance(output: Option<Value>) -> Self {
        Self {
            output,
            next: Next::Advance,
        }
    }

    pub fn jump(to: impl Into<String>) -> Self {
        Self {
            output: None,
            next: Next::JumpTo(to.into()),
        }
    }

    pub fn suspend() -> Self {
        Self {
            output: None,
            next: Next::Suspend,
        }
    }

    pub fn terminate(success: bool, message: Option<String>) -> Self {
        Self {
            output: None,
            next: Next::Terminate { success, message },
        }
    }
}

/// Surface area a [`WorkflowTaskType::McpAction`] task needs from the interpreter without
/// depending on the interpreter module directly: the registry lookup and invocation.
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        tool_id: crate::domain::ToolId,
        params: serde_json::Map<String, Value>,
    ) -> Result<Value, ConduitError>;
}
