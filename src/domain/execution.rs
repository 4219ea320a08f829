//! Workflow execution state (§3, §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{ExecutionId, TenantId, WorkflowId};

/// Lifecycle state of a [`WorkflowExecution`] (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    /// Parked on a `Wait` or `Approval` task; resumes when `resume_at` passes or an operator acts.
    Suspended,
    Completed,
    Failed,
    /// Stopped by a `Terminate` task with `success: false`, or by an operator.
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Per-task bookkeeping recorded into [`WorkflowExecution::task_results`] after every task
/// boundary (§3: "per-task results map").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Succeeded,
    /// Recorded but didn't stop the execution (`error_policy == Continue`).
    Failed,
    /// A `retry` policy exhausted its attempts before eventually stopping the execution; kept
    /// distinct from `Failed` so an operator can tell a retried task from one that failed once.
    RetriesExhausted,
}

/// Outcome of one completed task, independent of whether it advanced the cursor or stopped the
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskResultStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// One in-flight or finished run of a [`crate::domain::Workflow`].
///
/// `scope` is the running variable map the `{{scope.key}}` interpolation grammar resolves
/// against; it accumulates one entry per task that declares an `output_key`. Progress is
/// persisted task-by-task (via the `Store` boundary, typically backed by `conduit_ledger`) so a
/// crash mid-run can resume from `current_task` rather than restarting the whole execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub tenant_id: TenantId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    /// Order key of the task currently running or about to resume.
    pub current_task: Option<String>,
    pub scope: HashMap<String, Value>,
    /// Consumed by `Loop` tasks: order_key -> iterations already executed.
    pub loop_counters: HashMap<String, u32>,
    /// Order keys that have finished, in completion order (§3: "completed task list").
    pub tasks_completed: Vec<String>,
    /// Per-task outcome, keyed by order_key (§3: "per-task results map").
    pub task_results: HashMap<String, TaskResult>,
    /// Number of `goto` transitions taken so far, capped at 25 (§4.D) to prevent an
    /// `error_policy == Goto` cycle from looping forever.
    pub goto_count: u32,
    pub resume_at: Option<DateTime<Utc>>,
    /// Set while suspended on `wait { kind: event }`: the event type that resumes this execution
    /// early, independent of `resume_at`'s timeout.
    pub waiting_event: Option<String>,
    pub error: Option<String>,
    /// Order key of the task that caused a `Failed` status, when applicable.
    pub failing_task: Option<String>,
    /// Final result of the run, set on `Completed` from the last task's output (or a declared
    /// output mapping, left to the caller to apply before persisting).
    pub output: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new(tenant_id: TenantId, workflow_id: WorkflowId, now: DateTime<Utc>) -> Self {
        Self {
            id: ExecutionId::new(),
            tenant_id,
            workflow_id,
            status: ExecutionStatus::Running,
            current_task: None,
            scope: HashMap::new(),
            loop_counters: HashMap::new(),
            tasks_completed: Vec::new(),
            task_results: HashMap::new(),
            goto_count: 0,
            resume_at: None,
            waiting_event: None,
            error: None,
            failing_task: None,
            output: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Suspended
            && self.resume_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_starts_running_with_empty_history() {
        let execution = WorkflowExecution::new(TenantId::new(), WorkflowId::new(), Utc::now());
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.tasks_completed.is_empty());
        assert!(execution.task_results.is_empty());
        assert_eq!(execution.goto_count, 0);
    }
}
