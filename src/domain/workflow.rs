//! Workflow definition (§3, §4.D task-type table).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{AgentId, TenantId, ToolId, WorkflowId};

/// What triggers a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Cron,
    Event,
}

/// Trigger-specific configuration. Only the variant matching the owning [`Workflow`]'s
/// `trigger` is meaningful; the others are left at their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Cron expression or named preset (§ scheduler presets), only when `trigger == Cron`.
    pub cron_expression: Option<String>,
    /// IANA timezone name the cron expression is evaluated in. Falls back to the tenant/platform
    /// default when absent.
    pub timezone: Option<String>,
    /// Event type string this workflow subscribes to, only when `trigger == Event`.
    pub event_type: Option<String>,
}

/// A single declared input the workflow expects when started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub default: Option<Value>,
}

/// What happens to the execution when a task fails (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the execution and mark it failed.
    Stop,
    /// Skip this task and continue with the next task in order-key order.
    Continue,
    /// Jump the cursor to `WorkflowTask::error_goto` instead of failing. Counted against the
    /// execution's 25-goto cap (§4.D) to prevent an author from building an infinite loop.
    Goto,
    /// Retry up to `WorkflowTask::max_retries` times before falling back to `Stop`.
    Retry,
}

/// What a `wait` task is suspended on (§4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitKind {
    /// Resume automatically once `resume_at` passes.
    Delay { resume_at: DateTime<Utc> },
    /// Resume when an event of `event_type` is published on the tenant's bus, or when
    /// `timeout_at` passes, whichever happens first.
    Event {
        event_type: String,
        timeout_at: Option<DateTime<Utc>>,
    },
}

/// The task types an interpreter must support (§4.D): the nine named in the task-type table,
/// plus `emit`/`handoff` — grounded in the Event Bus (§4.C) and Chat Handoff (§5) components
/// that already exist as first-class platform concerns this interpreter is wired to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowTaskType {
    /// Call an LLM through the router and store its output in scope.
    Prompt {
        prompt_id: Option<super::PromptId>,
        /// Used instead of `prompt_id` for an inline, unsaved prompt body.
        inline_body: Option<String>,
        model_hint: Option<String>,
        /// The routing task type to score against; defaults to `chat` when absent (§4.D:
        /// "task_type=CHAT, or the type declared on the task").
        task_type: Option<crate::routing::task_type::TaskType>,
    },
    /// Invoke a registered MCP-style tool by id with interpolated parameters.
    McpAction {
        tool_id: ToolId,
        params: HashMap<String, Value>,
    },
    /// Evaluate a restricted boolean expression against the current scope; branches on the
    /// result via `on_true`/`on_false` order keys.
    Condition {
        expression: String,
        on_true: String,
        on_false: String,
    },
    /// For each element of the array at `iterate_over` (a `{{scope.path}}`-style dotted path),
    /// bind it to `item_var` and run the order-key range `body_start..=body_end` once, bounded by
    /// the interpreter's iteration cap.
    Loop {
        iterate_over: String,
        item_var: String,
        body_start: String,
        body_end: String,
    },
    /// Suspend the execution on a delay or an awaited event.
    Wait { kind: WaitKind },
    /// Run several independent branches — each an ordered list of task order keys — to
    /// completion before advancing; the first branch error fails the whole task.
    Parallel { branches: Vec<Vec<String>> },
    /// Suspend the execution until a human approves or rejects it.
    HumanApproval { prompt: String },
    /// Assign a value (after interpolation) to a scope key without calling out anywhere.
    SetVariable { key: String, value: Value },
    /// Issue a bounded, size-capped HTTP request and store its parsed response in scope.
    HttpRequest {
        url: String,
        method: String,
        headers: HashMap<String, String>,
        body: Option<Value>,
        timeout_ms: Option<u64>,
    },
    /// Publish an event onto the tenant-scoped bus.
    Emit {
        event_type: String,
        payload: HashMap<String, Value>,
    },
    /// Hand the conversation off to another agent (§5 handoff).
    Handoff { target_agent: Option<AgentId> },
    /// Terminate the execution immediately with a final status.
    Terminate { success: bool, message: Option<String> },
}

/// A single step in a [`Workflow`], ordered by `order_key` (dotted-decimal, e.g. `"1"`, `"2.1"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub order_key: String,
    pub name: String,
    pub task: WorkflowTaskType,
    pub error_policy: ErrorPolicy,
    pub max_retries: u32,
    /// Target order key for `error_policy == Goto`. Ignored otherwise.
    pub error_goto: Option<String>,
    /// Where in `scope` this task's result is stored for later interpolation.
    pub output_key: Option<String>,
}

/// A user-authored, declarative process definition (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub tenant_id: TenantId,
    pub owning_agent: Option<AgentId>,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub trigger_config: TriggerConfig,
    pub inputs: Vec<InputField>,
    pub tasks: Vec<WorkflowTask>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Tasks sorted by `order_key` (dotted-decimal order, not lexical string order).
    pub fn ordered_tasks(&self) -> Vec<&WorkflowTask> {
        let mut tasks: Vec<&WorkflowTask> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| {
            crate::workflow::order_key::OrderKey::parse(&a.order_key)
                .cmp(&crate::workflow::order_key::OrderKey::parse(&b.order_key))
        });
        tasks
    }

    /// Validate that every declared required input is present in `provided`.
    pub fn missing_required_inputs(&self, provided: &HashMap<String, Value>) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|f| f.required && !provided.contains_key(&f.key))
            .map(|f| f.key.as_str())
            .collect()
    }
}
