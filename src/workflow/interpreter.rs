//! The interpreter: executes a [`Workflow`] over a mutable [`WorkflowExecution`] (§4.D).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;

use crate::domain::{
    ErrorPolicy, ExecutionStatus, ProviderCredentials, Tenant, TenantLlmConfig, TenantId,
    TaskResult, TaskResultStatus, ToolId, ToolStatus, WaitKind, Workflow, WorkflowExecution,
    WorkflowTask, WorkflowTaskType,
};
use crate::error::ConduitError;
use crate::events::{Envelope, EventBus};
use crate::providers::common::SHARED_HTTP_CLIENT;
use crate::routing::task_type::TaskType;
use crate::routing::{PlatformCredentials, Router, RoutingPreferences};
use crate::store::Store;
use crate::tool::ToolRegistry;

use super::condition;
use super::interpolation::interpolate_tracking;
use super::order_key::OrderKey;
use super::task::{Next, TaskOutcome, ToolInvoker};

/// Order key an author can target from `on_true`/`on_false`/`error_goto` to terminate the
/// execution successfully without a dedicated `Terminate` task (§4.D: "Both branches MUST
/// reference existing tasks or be terminal markers").
pub const END_MARKER: &str = "end";

/// Hard cap on `Loop` iterations and on cumulative `goto` transitions per execution (§4.D, §7).
const LOOP_ITERATION_CAP: u32 = 100;
const GOTO_CAP: u32 = 25;

/// Default per-call timeout for an `http_request` task when the task doesn't declare its own,
/// and the hard cap on the response body it will read, mirroring the bounded-read HTTP client
/// pattern the platform's own tool-calling surface uses.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_HTTP_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Backoff schedule for `error_policy == Retry`: 1s, 2s, 4s, then capped at 30s (§4.D).
fn retry_backoff(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt).min(30);
    Duration::from_secs(secs)
}

/// Everything the interpreter needs to run one `Workflow`: the persisted-entity boundary, the
/// LLM router, the tool registry, and the event bus. Constructed once and shared (behind `Arc`)
/// across every in-flight execution, matching the `Core` value described in §9's
/// global-mutable-state redesign note.
pub struct Interpreter {
    store: Arc<dyn Store>,
    router: Arc<Router>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    platform_credentials: PlatformCredentials,
}

impl Interpreter {
    pub fn new(
        store: Arc<dyn Store>,
        router: Arc<Router>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventBus>,
        platform_credentials: PlatformCredentials,
    ) -> Self {
        Self {
            store,
            router,
            tools,
            events,
            platform_credentials,
        }
    }

    fn publish(&self, tenant_id: TenantId, event_type: &str, payload: HashMap<String, Value>) {
        self.events.publish(Envelope {
            tenant_id,
            event_type: event_type.to_string(),
            payload,
            emitted_at: Utc::now(),
        });
    }

    fn publish_interpolation_warning(&self, tenant_id: TenantId, order_key: &str, missing: &[String]) {
        if missing.is_empty() {
            return;
        }
        let mut payload = HashMap::new();
        payload.insert("order_key".to_string(), Value::String(order_key.to_string()));
        payload.insert(
            "missing".to_string(),
            Value::Array(missing.iter().cloned().map(Value::String).collect()),
        );
        self.publish(tenant_id, "notification.error", payload);
    }

    fn publish_step_completed(&self, tenant_id: TenantId, execution: &WorkflowExecution, order_key: &str) {
        self.publish(
            tenant_id,
            "workflow.step_completed",
            HashMap::from([
                ("execution_id".to_string(), Value::String(execution.id.to_string())),
                ("order_key".to_string(), Value::String(order_key.to_string())),
            ]),
        );
    }

    /// Validate `input_data` against the workflow's declared schema and — on success — create
    /// and run a fresh [`WorkflowExecution`] to completion or first suspension point
    /// (§4.D entry validation, "Execution record").
    pub async fn start(
        &self,
        workflow: &Workflow,
        input_data: HashMap<String, Value>,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
    ) -> Result<WorkflowExecution, ConduitError> {
        if let Some(field) = workflow.missing_required_inputs(&input_data).first() {
            return Err(ConduitError::MissingInput {
                field: field.to_string(),
            });
        }

        let mut scope = input_data;
        for field in &workflow.inputs {
            if !scope.contains_key(&field.key) {
                if let Some(default) = &field.default {
                    scope.insert(field.key.clone(), default.clone());
                }
            }
        }
        scope.insert("input".to_string(), Value::Object(scope.clone().into_iter().collect()));

        let now = Utc::now();
        let mut execution = WorkflowExecution::new(tenant.id, workflow.id, now);
        execution.scope = scope;
        execution.current_task = workflow.ordered_tasks().first().map(|t| t.order_key.clone());

        self.store.save_execution(execution.clone()).await;
        self.publish(
            tenant.id,
            "workflow.started",
            HashMap::from([
                ("execution_id".to_string(), Value::String(execution.id.to_string())),
                ("workflow_id".to_string(), Value::String(workflow.id.to_string())),
            ]),
        );

        self.drive(workflow, &mut execution, tenant, tenant_config, tenant_credentials)
            .await?;
        Ok(execution)
    }

    /// Resume a suspended execution — either a `human_approval` decision or a `wait` (delay or
    /// event) firing. `approved = None` means "resume because the wait condition/timeout was
    /// satisfied", not a human decision.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        mut execution: WorkflowExecution,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
        approved: Option<bool>,
    ) -> Result<WorkflowExecution, ConduitError> {
        if execution.status != ExecutionStatus::Suspended {
            return Ok(execution);
        }

        if approved == Some(false) {
            execution.status = ExecutionStatus::Cancelled;
            execution.error = Some("Rejected by user".to_string());
            execution.completed_at = Some(Utc::now());
            self.store.save_execution(execution.clone()).await;
            self.publish(
                tenant.id,
                "workflow.failed",
                HashMap::from([(
                    "execution_id".to_string(),
                    Value::String(execution.id.to_string()),
                )]),
            );
            return Ok(execution);
        }

        execution.status = ExecutionStatus::Running;
        execution.resume_at = None;
        execution.waiting_event = None;
        execution.current_task = execution
            .current_task
            .as_ref()
            .and_then(|order| next_after(workflow, order));

        self.drive(workflow, &mut execution, tenant, tenant_config, tenant_credentials)
            .await?;
        Ok(execution)
    }

    /// Resume every execution of `workflow` suspended on `event_type`, as it's published on the
    /// tenant's bus (§4.D `wait { kind: event }`).
    pub async fn resume_matching_event(
        &self,
        workflow: &Workflow,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
        event_type: &str,
    ) -> Result<Vec<WorkflowExecution>, ConduitError> {
        let mut resumed = Vec::new();
        for execution in self.store.executions_waiting_on(workflow.id, event_type).await {
            let execution = self
                .resume(workflow, execution, tenant, tenant_config, tenant_credentials, None)
                .await?;
            resumed.push(execution);
        }
        Ok(resumed)
    }

    /// Externally requested cancellation, observed at the next task boundary (§5).
    pub async fn cancel(&self, mut execution: WorkflowExecution) -> WorkflowExecution {
        if !execution.status.is_terminal() {
            execution.status = ExecutionStatus::Cancelled;
            execution.completed_at = Some(Utc::now());
            execution.error = Some("cancelled".to_string());
            self.store.save_execution(execution.clone()).await;
        }
        execution
    }

    /// Drive `execution` forward, task by task, until it terminates or suspends.
    async fn drive(
        &self,
        workflow: &Workflow,
        execution: &mut WorkflowExecution,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
    ) -> Result<(), ConduitError> {
        loop {
            if execution.status != ExecutionStatus::Running {
                return Ok(());
            }

            let Some(order) = execution.current_task.clone() else {
                self.complete(workflow, execution);
                return Ok(());
            };

            if order == END_MARKER {
                self.complete(workflow, execution);
                return Ok(());
            }

            let Some(task) = task_by_order(workflow, &order) else {
                self.fail(execution, &order, format!("no task at order key {order}"));
                return Ok(());
            };

            match self
                .execute_with_policy(workflow, task, execution, tenant, tenant_config, tenant_credentials)
                .await
            {
                StepOutcome::Advance(next_order) => {
                    self.publish_step_completed(tenant.id, execution, &order);
                    execution.current_task = Some(next_order);
                    execution.updated_at = Utc::now();
                    self.store.save_execution(execution.clone()).await;
                }
                StepOutcome::Suspend => {
                    execution.status = ExecutionStatus::Suspended;
                    execution.updated_at = Utc::now();
                    self.store.save_execution(execution.clone()).await;
                    return Ok(());
                }
                StepOutcome::Terminate { success, message } => {
                    execution.status = if success {
                        ExecutionStatus::Completed
                    } else {
                        ExecutionStatus::Cancelled
                    };
                    execution.completed_at = Some(Utc::now());
                    execution.error = message;
                    execution.updated_at = Utc::now();
                    self.store.save_execution(execution.clone()).await;
                    let event = if success {
                        "workflow.completed"
                    } else {
                        "workflow.failed"
                    };
                    self.publish(
                        tenant.id,
                        event,
                        HashMap::from([(
                            "execution_id".to_string(),
                            Value::String(execution.id.to_string()),
                        )]),
                    );
                    return Ok(());
                }
                StepOutcome::Fail(order, message) => {
                    self.fail(execution, &order, message);
                    self.publish(
                        tenant.id,
                        "workflow.failed",
                        HashMap::from([(
                            "execution_id".to_string(),
                            Value::String(execution.id.to_string()),
                        )]),
                    );
                    return Ok(());
                }
            }
        }
    }

    fn complete(&self, workflow: &Workflow, execution: &mut WorkflowExecution) {
        execution.status = ExecutionStatus::Completed;
        execution.completed_at = Some(Utc::now());
        execution.updated_at = Utc::now();
        if execution.output.is_none() {
            execution.output = execution
                .tasks_completed
                .last()
                .and_then(|order| execution.task_results.get(order))
                .and_then(|result| result.output.clone());
        }
        let store = self.store.clone();
        let execution_clone = execution.clone();
        tokio::spawn(async move {
            store.save_execution(execution_clone).await;
        });
        self.publish(
            workflow.tenant_id,
            "workflow.completed",
            HashMap::from([(
                "execution_id".to_string(),
                Value::String(execution.id.to_string()),
            )]),
        );
    }

    fn fail(&self, execution: &mut WorkflowExecution, order: &str, message: String) {
        execution.status = ExecutionStatus::Failed;
        execution.error = Some(message);
        execution.failing_task = Some(order.to_string());
        execution.completed_at = Some(Utc::now());
        execution.updated_at = Utc::now();
        let store = self.store.clone();
        let execution_clone = execution.clone();
        tokio::spawn(async move {
            store.save_execution(execution_clone).await;
        });
    }

    /// Run one task, applying its `error_policy` around the raw attempt (retry/continue/goto).
    async fn execute_with_policy(
        &self,
        workflow: &Workflow,
        task: &WorkflowTask,
        execution: &mut WorkflowExecution,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
    ) -> StepOutcome {
        let mut attempt = 0u32;
        loop {
            let result = self
                .execute_task(workflow, task, execution, tenant, tenant_config, tenant_credentials)
                .await;

            match result {
                Ok(outcome) => {
                    // §4.D scope prefixes: `prev` and `step.<order>` see every completed task's
                    // raw output regardless of whether it declared an `output_key`; `vars.<key>`
                    // mirrors whatever this task wrote under `output_key` (`record_variable`
                    // keeps the author-facing bare-key lookup `WorkflowTaskType::SetVariable`
                    // already relies on working too).
                    if let Some(value) = &outcome.output {
                        execution.scope.insert("prev".to_string(), value.clone());
                        record_step_output(execution, &task.order_key, value.clone());
                    }
                    if let Some(key) = &task.output_key {
                        if let Some(value) = &outcome.output {
                            record_variable(execution, key, value);
                        }
                    }
                    execution.tasks_completed.push(task.order_key.clone());
                    execution.task_results.insert(
                        task.order_key.clone(),
                        TaskResult {
                            status: TaskResultStatus::Succeeded,
                            output: outcome.output.clone(),
                            error: None,
                        },
                    );
                    return match outcome.next {
                        Next::Advance => StepOutcome::Advance(
                            next_after(workflow, &task.order_key).unwrap_or_else(|| END_MARKER.to_string()),
                        ),
                        Next::JumpTo(order) => StepOutcome::Advance(order),
                        Next::Suspend => StepOutcome::Suspend,
                        Next::Terminate { success, message } => {
                            StepOutcome::Terminate { success, message }
                        }
                    };
                }
                Err(err) => match task.error_policy {
                    ErrorPolicy::Stop => {
                        execution.task_results.insert(
                            task.order_key.clone(),
                            TaskResult {
                                status: TaskResultStatus::Failed,
                                output: None,
                                error: Some(err.to_string()),
                            },
                        );
                        return StepOutcome::Fail(task.order_key.clone(), err.to_string());
                    }
                    ErrorPolicy::Continue => {
                        execution.tasks_completed.push(task.order_key.clone());
                        execution.task_results.insert(
                            task.order_key.clone(),
                            TaskResult {
                                status: TaskResultStatus::Failed,
                                output: None,
                                error: Some(err.to_string()),
                            },
                        );
                        return StepOutcome::Advance(
                            next_after(workflow, &task.order_key).unwrap_or_else(|| END_MARKER.to_string()),
                        );
                    }
                    ErrorPolicy::Goto => {
                        if execution.goto_count >= GOTO_CAP {
                            return StepOutcome::Fail(
                                task.order_key.clone(),
                                format!("exceeded {GOTO_CAP} goto transitions in one execution"),
                            );
                        }
                        execution.goto_count += 1;
                        execution.task_results.insert(
                            task.order_key.clone(),
                            TaskResult {
                                status: TaskResultStatus::Failed,
                                output: None,
                                error: Some(err.to_string()),
                            },
                        );
                        let target = task
                            .error_goto
                            .clone()
                            .unwrap_or_else(|| END_MARKER.to_string());
                        return StepOutcome::Advance(target);
                    }
                    ErrorPolicy::Retry => {
                        if attempt >= task.max_retries {
                            execution.task_results.insert(
                                task.order_key.clone(),
                                TaskResult {
                                    status: TaskResultStatus::RetriesExhausted,
                                    output: None,
                                    error: Some(err.to_string()),
                                },
                            );
                            return StepOutcome::Fail(task.order_key.clone(), err.to_string());
                        }
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                },
            }
        }
    }

    /// Run exactly one attempt of one task's semantics (§4.D task-type table), with no
    /// error-policy handling — that's the caller's job. Boxed because `parallel` tasks recurse
    /// into this same method for each of their branches.
    fn execute_task<'a>(
        &'a self,
        workflow: &'a Workflow,
        task: &'a WorkflowTask,
        execution: &'a mut WorkflowExecution,
        tenant: &'a Tenant,
        tenant_config: &'a TenantLlmConfig,
        tenant_credentials: &'a ProviderCredentials,
    ) -> Pin<Box<dyn Future<Output = Result<TaskOutcome, ConduitError>> + Send + 'a>> {
        Box::pin(async move {
            match &task.task {
                WorkflowTaskType::Prompt {
                    prompt_id,
                    inline_body,
                    model_hint,
                    task_type,
                } => {
                    // A saved `PromptTemplate` uses its own `{variable}` grammar, rendered once
                    // against a flattened copy of scope; an inline body is workflow-authored text
                    // and goes through the `{{scope.key}}` grammar like any other task field.
                    let (rendered, missing) = if let Some(id) = prompt_id {
                        let template = self
                            .store
                            .get_prompt(*id)
                            .await
                            .ok_or_else(|| ConduitError::Config(format!("unknown prompt id {id}")))?;
                        let flat = flatten_scope(&execution.scope);
                        (template.render(&flat), Vec::new())
                    } else {
                        interpolate_tracking(&inline_body.clone().unwrap_or_default(), &execution.scope)
                    };
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);

                    let preferences = RoutingPreferences {
                        task_type: Some(task_type.unwrap_or(TaskType::Chat)),
                        prefer_speed: false,
                        prefer_quality: false,
                        forced_model: model_hint.clone(),
                    };

                    let messages = vec![crate::providers::ChatMessage {
                        role: crate::providers::ChatRole::User,
                        content: rendered,
                    }];

                    let now = Utc::now();
                    let mut fresh_tenant =
                        self.store.get_tenant(tenant.id).await.unwrap_or_else(|| tenant.clone());
                    if fresh_tenant.reset_if_due(now) {
                        self.store.save_tenant(fresh_tenant.clone()).await;
                    }

                    let completion = self
                        .router
                        .route_and_complete(
                            &fresh_tenant,
                            tenant_config,
                            tenant_credentials,
                            &self.platform_credentials,
                            &preferences,
                            messages,
                        )
                        .await?;

                    if completion.usage_type == crate::domain::UsageType::Platform {
                        fresh_tenant.tokens_used_this_period += completion.response.usage.prompt_tokens
                            + completion.response.usage.completion_tokens;
                        self.store.save_tenant(fresh_tenant).await;
                    }

                    let usage_record = Router::usage_record(tenant.id, &completion, now);
                    self.store.append_usage(usage_record).await;

                    Ok(TaskOutcome::advance(Some(Value::String(completion.response.content))))
                }
                WorkflowTaskType::McpAction { tool_id, params } => {
                    let params_value = Value::Object(params.clone().into_iter().collect());
                    let (interpolated, missing) = interpolate_value_tracking(&params_value, &execution.scope);
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);
                    let params_map = match interpolated {
                        Value::Object(map) => map,
                        other => other.as_object().cloned().unwrap_or_default(),
                    };
                    let output = self.invoke(*tool_id, params_map).await?;
                    Ok(TaskOutcome::advance(Some(output)))
                }
                WorkflowTaskType::Condition {
                    expression,
                    on_true,
                    on_false,
                } => {
                    let holds = condition::evaluate(expression, &execution.scope)?;
                    let target = if holds { on_true } else { on_false };
                    Ok(TaskOutcome::jump(target.clone()))
                }
                WorkflowTaskType::Loop {
                    iterate_over,
                    item_var,
                    body_start,
                    body_end,
                } => {
                    let items = resolve_array(&execution.scope, iterate_over);
                    let index = execution.loop_counters.get(&task.order_key).copied().unwrap_or(0);

                    if index as usize >= items.len() {
                        execution.loop_counters.remove(&task.order_key);
                        execution.scope.remove(item_var);
                        return Ok(TaskOutcome::jump(
                            next_after(workflow, body_end).unwrap_or_else(|| END_MARKER.to_string()),
                        ));
                    }

                    // §4.D / §7: 100 iterations is a hard cap — a longer `iterate_over` fails the
                    // task with `ErrLoopBound` rather than silently truncating the collection.
                    if index >= LOOP_ITERATION_CAP {
                        return Err(ConduitError::LoopBound(format!(
                            "loop at {} exceeded {LOOP_ITERATION_CAP} iterations",
                            task.order_key
                        )));
                    }

                    execution
                        .scope
                        .insert(item_var.clone(), items.get(index as usize).cloned().unwrap_or(Value::Null));
                    execution
                        .loop_counters
                        .insert(task.order_key.clone(), index + 1);
                    Ok(TaskOutcome::jump(body_start.clone()))
                }
                WorkflowTaskType::Wait { kind } => {
                    match kind {
                        WaitKind::Delay { resume_at } => {
                            // §4.D/§5: `wait.delay` is capped at 24h; an author-supplied
                            // `resume_at` further out than that is clamped to the cap rather
                            // than honored as-is.
                            let cap = Utc::now() + chrono::Duration::hours(24);
                            execution.resume_at = Some((*resume_at).min(cap));
                            execution.waiting_event = None;
                        }
                        WaitKind::Event { event_type, timeout_at } => {
                            execution.waiting_event = Some(event_type.clone());
                            execution.resume_at =
                                Some(timeout_at.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(24)));
                        }
                    }
                    Ok(TaskOutcome::suspend())
                }
                WorkflowTaskType::Parallel { branches } => {
                    let mut clones: Vec<WorkflowExecution> =
                        branches.iter().map(|_| execution.clone()).collect();
                    let futures = branches.iter().zip(clones.iter_mut()).map(|(branch, branch_execution)| {
                        self.run_branch(
                            workflow,
                            branch,
                            branch_execution,
                            tenant,
                            tenant_config,
                            tenant_credentials,
                        )
                    });
                    let results = join_all(futures).await;

                    let mut merged = Vec::with_capacity(results.len());
                    for (branch_execution, result) in clones.into_iter().zip(results) {
                        let outputs = result?;
                        merged.push(Value::Array(outputs));
                        for (key, value) in branch_execution.scope {
                            execution.scope.entry(key).or_insert(value);
                        }
                    }
                    Ok(TaskOutcome::advance(Some(Value::Array(merged))))
                }
                WorkflowTaskType::HumanApproval { prompt } => {
                    let (rendered, missing) = interpolate_tracking(prompt, &execution.scope);
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);
                    self.publish(
                        tenant.id,
                        "agent.thinking",
                        HashMap::from([("message".to_string(), Value::String(rendered))]),
                    );
                    execution.resume_at = Some(Utc::now() + chrono::Duration::seconds(86400));
                    Ok(TaskOutcome::suspend())
                }
                WorkflowTaskType::SetVariable { key, value } => {
                    let (interpolated, missing) = interpolate_value_tracking(value, &execution.scope);
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);
                    record_variable(execution, key, &interpolated);
                    Ok(TaskOutcome::advance(Some(interpolated)))
                }
                WorkflowTaskType::HttpRequest {
                    url,
                    method,
                    headers,
                    body,
                    timeout_ms,
                } => {
                    let (url, url_missing) = interpolate_tracking(url, &execution.scope);
                    let mut rendered_headers = HashMap::new();
                    let mut missing = url_missing;
                    for (name, value) in headers {
                        let (rendered, mut misses) = interpolate_tracking(value, &execution.scope);
                        rendered_headers.insert(name.clone(), rendered);
                        missing.append(&mut misses);
                    }
                    let rendered_body = body
                        .as_ref()
                        .map(|b| interpolate_value_tracking(b, &execution.scope))
                        .map(|(value, mut misses)| {
                            missing.append(&mut misses);
                            value
                        });
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);

                    let timeout = timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(DEFAULT_HTTP_TIMEOUT);
                    let response = execute_http_request(&url, method, rendered_headers, rendered_body, timeout)
                        .await?;
                    Ok(TaskOutcome::advance(Some(response)))
                }
                WorkflowTaskType::Emit { event_type, payload } => {
                    let (interpolated, missing) = interpolate_value_tracking(
                        &Value::Object(payload.clone().into_iter().collect()),
                        &execution.scope,
                    );
                    self.publish_interpolation_warning(tenant.id, &task.order_key, &missing);
                    let map: HashMap<String, Value> = interpolated
                        .as_object()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .collect();
                    self.publish(tenant.id, event_type, map);
                    Ok(TaskOutcome::advance(None))
                }
                WorkflowTaskType::Handoff { target_agent } => {
                    let output = target_agent.map(|id| Value::String(id.to_string()));
                    Ok(TaskOutcome::advance(output))
                }
                WorkflowTaskType::Terminate { success, message } => {
                    Ok(TaskOutcome::terminate(*success, message.clone()))
                }
            }
        })
    }

    /// Run one `parallel` branch — an ordered list of order keys — against its own isolated
    /// execution clone, returning each task's output in order. The first task error aborts the
    /// branch and propagates.
    async fn run_branch(
        &self,
        workflow: &Workflow,
        branch: &[String],
        branch_execution: &mut WorkflowExecution,
        tenant: &Tenant,
        tenant_config: &TenantLlmConfig,
        tenant_credentials: &ProviderCredentials,
    ) -> Result<Vec<Value>, ConduitError> {
        let mut outputs = Vec::with_capacity(branch.len());
        for order in branch {
            let task = task_by_order(workflow, order)
                .ok_or_else(|| ConduitError::Config(format!("no task at order key {order}")))?;
            let outcome = self
                .execute_task(workflow, task, branch_execution, tenant, tenant_config, tenant_credentials)
                .await?;
            if let Some(value) = &outcome.output {
                branch_execution.scope.insert("prev".to_string(), value.clone());
                record_step_output(branch_execution, order, value.clone());
            }
            if let Some(key) = &task.output_key {
                if let Some(value) = &outcome.output {
                    record_variable(branch_execution, key, value);
                }
            }
            if let Some(value) = outcome.output {
                outputs.push(value);
            }
        }
        Ok(outputs)
    }
}

#[async_trait]
impl ToolInvoker for Interpreter {
    async fn invoke(
        &self,
        tool_id: ToolId,
        params: serde_json::Map<String, Value>,
    ) -> Result<Value, ConduitError> {
        let tool_ref = self
            .store
            .get_tool_ref(tool_id)
            .await
            .ok_or_else(|| ConduitError::Config(format!("unknown tool reference {tool_id}")))?;

        if !tool_ref.status.is_invocable() {
            return Err(ConduitError::ToolStatus {
                tool_id: tool_id.to_string(),
                status: format!("{:?}", tool_ref.status),
            });
        }

        let tool = self
            .tools
            .get(tool_id)
            .ok_or_else(|| ConduitError::Config(format!("tool {tool_id} not registered")))?;

        tool.run(params).await.map_err(|e| ConduitError::ToolFailure {
            tool_id: tool_id.to_string(),
            message: e.message,
            retryable: e.retryable,
        })
    }
}

/// What the interpreter's `drive` loop should do after one task-with-policy attempt.
enum StepOutcome {
    Advance(String),
    Suspend,
    Terminate { success: bool, message: Option<String> },
    Fail(String, String),
}

fn task_by_order<'a>(workflow: &'a Workflow, order: &str) -> Option<&'a WorkflowTask> {
    workflow.tasks.iter().find(|t| t.order_key == order)
}

/// The order key immediately after `order` in the workflow's sorted task list, or `None` if
/// `order` is the last task (the execution is then complete).
fn next_after(workflow: &Workflow, order: &str) -> Option<String> {
    let ordered = workflow.ordered_tasks();
    let target = OrderKey::parse(order);
    let index = ordered
        .iter()
        .position(|t| OrderKey::parse(&t.order_key) == target)?;
    ordered.get(index + 1).map(|t| t.order_key.clone())
}

/// Assign `key := value` in `scope`, both as the bare top-level entry every existing
/// `{{key}}`/`iterate_over` reference already resolves against, and mirrored under the
/// `vars.<key>` path §4.D's scope-prefix grammar names explicitly.
fn record_variable(execution: &mut WorkflowExecution, key: &str, value: &Value) {
    execution.scope.insert(key.to_string(), value.clone());
    let vars = execution
        .scope
        .entry("vars".to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(map) = vars {
        map.insert(key.to_string(), value.clone());
    }
}

/// Record a completed task's raw output under `step.<order_key>`, for the `step.<order>` scope
/// prefix (§4.D). Order keys containing their own `.` (e.g. `"2.1"`) aren't addressable through
/// the dotted interpolation grammar this way — that's an inherent overlap between the two
/// dotted-string conventions, not something this helper can resolve on its own.
fn record_step_output(execution: &mut WorkflowExecution, order_key: &str, value: Value) {
    let step = execution
        .scope
        .entry("step".to_string())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(map) = step {
        map.insert(order_key.to_string(), value);
    }
}

/// Resolve a `{{scope.path}}`-style dotted path (without the braces) to an array, for `loop`
/// tasks. A missing path or a non-array value behaves as an empty array rather than an error —
/// an author-declared `iterate_over` pointing at nothing simply runs the loop body zero times.
fn resolve_array(scope: &HashMap<String, Value>, path: &str) -> Vec<Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let Some(mut current) = scope.get(first) else {
        return Vec::new();
    };
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    match current {
        Value::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

/// Issue one bounded HTTP call for an `http_request` task: a streamed, size-capped body read,
/// the same shape the platform's tool-calling HTTP client uses so a malicious or misbehaving
/// endpoint can't exhaust worker memory.
async fn execute_http_request(
    url: &str,
    method: &str,
    headers: HashMap<String, String>,
    body: Option<Value>,
    timeout: Duration,
) -> Result<Value, ConduitError> {
    let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| ConduitError::Config(format!("invalid HTTP method: {method}")))?;

    let mut request = SHARED_HTTP_CLIENT.request(method, url).timeout(timeout);
    for (name, value) in &headers {
        request = request.header(name, value);
    }
    if let Some(body) = &body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ConduitError::Config(format!("http_request failed: {e}")))?;
    let status = response.status();

    use futures_util::StreamExt;
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ConduitError::Config(format!("http_request body error: {e}")))?;
        if buffer.len() + chunk.len() > MAX_HTTP_RESPONSE_BYTES {
            return Err(ConduitError::Config(format!(
                "http_request response exceeded {MAX_HTTP_RESPONSE_BYTES} bytes"
            )));
        }
        buffer.extend_from_slice(&chunk);
    }

    let text = String::from_utf8_lossy(&buffer).into_owned();
    let body_value = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    Ok(serde_json::json!({
        "status": status.as_u16(),
        "body": body_value,
    }))
}

/// Recursively interpolate every string leaf in a JSON value tree, collecting every reference
/// that failed to resolve (§4.D: config fields may interpolate, not just prompt bodies).
fn interpolate_value_tracking(value: &Value, scope: &HashMap<String, Value>) -> (Value, Vec<String>) {
    let mut missing = Vec::new();
    let rendered = interpolate_value_inner(value, scope, &mut missing);
    (rendered, missing)
}

fn interpolate_value_inner(value: &Value, scope: &HashMap<String, Value>, missing: &mut Vec<String>) -> Value {
    match value {
        Value::String(s) => {
            let (rendered, mut misses) = interpolate_tracking(s, scope);
            missing.append(&mut misses);
            Value::String(rendered)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| interpolate_value_inner(v, scope, missing))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value_inner(v, scope, missing)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Flatten the top-level entries of an execution's scope into strings, for
/// [`crate::domain::PromptTemplate::render`]'s `{variable}` grammar — which only ever takes flat
/// string values, unlike the interpreter's own dotted-path `{{scope.key}}` lookup.
fn flatten_scope(scope: &HashMap<String, Value>) -> HashMap<String, String> {
    scope
        .iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        InputField, LlmTier, ToolCategory, ToolReference, Trigger, TriggerConfig, UsageMode,
        WorkflowId,
    };
    use crate::events::EventBus;
    use crate::store::{InMemoryStore, Store};
    use crate::tool::{Tool, ToolError, ToolRegistry};
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_tenant() -> Tenant {
        Tenant {
            id: TenantId::new(),
            name: "acme".to_string(),
            plan: "free".to_string(),
            subscription_active: true,
            trial_end: None,
            llm_tier: LlmTier::Free,
            monthly_token_limit: None,
            tokens_used_this_period: 0,
            limit_reset_at: Utc::now() + chrono::Duration::days(30),
            max_users: None,
            max_agents: None,
            max_workflows: None,
            max_executions_per_month: None,
            created_at: Utc::now(),
        }
    }

    fn permissive_config(tenant_id: TenantId) -> TenantLlmConfig {
        TenantLlmConfig {
            tenant_id,
            usage_mode: UsageMode::Platform,
            byok_providers: Default::default(),
            model_allow_list: None,
            model_block_list: Default::default(),
            preferred_provider: None,
            preferred_model: None,
        }
    }

    fn task(order_key: &str, task_type: WorkflowTaskType) -> WorkflowTask {
        WorkflowTask {
            order_key: order_key.to_string(),
            name: order_key.to_string(),
            task: task_type,
            error_policy: ErrorPolicy::Stop,
            max_retries: 0,
            error_goto: None,
            output_key: None,
        }
    }

    fn workflow(tenant_id: TenantId, inputs: Vec<InputField>, tasks: Vec<WorkflowTask>) -> Workflow {
        Workflow {
            id: WorkflowId::new(),
            tenant_id,
            owning_agent: None,
            name: "test-workflow".to_string(),
            description: String::new(),
            trigger: Trigger::Manual,
            trigger_config: TriggerConfig::default(),
            inputs,
            tasks,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn bare_interpreter(store: Arc<dyn Store>, tools: Arc<ToolRegistry>) -> Interpreter {
        Interpreter::new(
            store,
            Arc::new(Router::new(vec![])),
            tools,
            Arc::new(EventBus::new()),
            PlatformCredentials::default(),
        )
    }

    /// Testable Property 5: a workflow with tasks `{"1","2","2.1","2.2","10"}` visits them in
    /// exactly dotted-decimal order under a straight run with no branching.
    #[tokio::test]
    async fn visits_tasks_in_dotted_order_key_order() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store.clone(), Arc::new(ToolRegistry::new()));

        let order_keys = ["1", "2", "2.1", "2.2", "10"];
        let tasks = order_keys
            .iter()
            .map(|key| {
                task(
                    key,
                    WorkflowTaskType::SetVariable {
                        key: format!("visited_{key}").replace('.', "_"),
                        value: Value::Bool(true),
                    },
                )
            })
            .collect();
        let wf = workflow(tenant.id, vec![], tasks);
        let config = permissive_config(tenant.id);

        let execution = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.tasks_completed, vec!["1", "2", "2.1", "2.2", "10"]);
    }

    /// Testable Property 6: `set_variable(x = "{{input.name}}")` followed by a task referencing
    /// `{{vars.x}}` sees the same literal string as `input.name`.
    #[tokio::test]
    async fn variable_interpolation_round_trips_through_vars_prefix() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store.clone(), Arc::new(ToolRegistry::new()));

        let inputs = vec![crate::domain::InputField {
            key: "name".to_string(),
            label: "Name".to_string(),
            required: true,
            default: None,
        }];
        let tasks = vec![
            task(
                "1",
                WorkflowTaskType::SetVariable {
                    key: "x".to_string(),
                    value: Value::String("{{input.name}}".to_string()),
                },
            ),
            task(
                "2",
                WorkflowTaskType::SetVariable {
                    key: "y".to_string(),
                    value: Value::String("{{vars.x}}".to_string()),
                },
            ),
        ];
        let wf = workflow(tenant.id, inputs, tasks);
        let config = permissive_config(tenant.id);

        let mut input_data = HashMap::new();
        input_data.insert("name".to_string(), Value::String("Alice".to_string()));

        let execution = interpreter
            .start(&wf, input_data, &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.scope.get("y"), Some(&Value::String("Alice".to_string())));
    }

    /// A workflow that declares a required input and receives nothing for it is rejected before
    /// any execution record is created (§4.D entry validation).
    #[tokio::test]
    async fn missing_required_input_is_rejected_before_execution_starts() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store, Arc::new(ToolRegistry::new()));

        let inputs = vec![crate::domain::InputField {
            key: "name".to_string(),
            label: "Name".to_string(),
            required: true,
            default: None,
        }];
        let wf = workflow(tenant.id, inputs, vec![]);
        let config = permissive_config(tenant.id);

        let result = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await;

        assert!(matches!(result, Err(ConduitError::MissingInput { field }) if field == "name"));
    }

    struct FlakyTool {
        id: ToolId,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn id(&self) -> ToolId {
            self.id
        }
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "fails once, then succeeds"
        }
        fn required_config(&self) -> &[String] {
            &[]
        }
        async fn run(&self, _params: Map<String, Value>) -> Result<Value, ToolError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(ToolError {
                    code: "connection".to_string(),
                    message: "transient failure".to_string(),
                    retryable: true,
                })
            } else {
                Ok(json!({"sent": true}))
            }
        }
    }

    /// §8 Scenario S3: a `condition` routes to an `mcp_action` whose `on_error: retry` absorbs
    /// one failure before succeeding, and the skipped branch never runs.
    #[tokio::test]
    async fn condition_and_retry_scenario_matches_s3() {
        let tenant = test_tenant();
        let in_memory = InMemoryStore::new();

        let tool_id = ToolId::new();
        in_memory.put_tool_ref(ToolReference {
            id: tool_id,
            tenant_id: tenant.id,
            name: "email".to_string(),
            category: ToolCategory::Email,
            status: ToolStatus::Active,
            required_config_keys: vec![],
            config: Default::default(),
        });
        let store: Arc<dyn Store> = Arc::new(in_memory);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FlakyTool {
            id: tool_id,
            calls: AtomicU32::new(0),
        }));
        let interpreter = bare_interpreter(store, Arc::new(registry));

        // "2.1" sorts before "3" in dotted-decimal order, so it's only ever reached via the
        // condition's explicit `on_false` jump — falling through past "3" would never land there.
        let tasks = vec![
            task(
                "1",
                WorkflowTaskType::SetVariable {
                    key: "marker".to_string(),
                    value: Value::String("ok".to_string()),
                },
            ),
            task(
                "2",
                WorkflowTaskType::Condition {
                    // §8 Scenario S3's literal expression text, braces and all.
                    expression: "{{prev}} contains 'ok'".to_string(),
                    on_true: "3".to_string(),
                    on_false: "2.1".to_string(),
                },
            ),
            task(
                "2.1",
                WorkflowTaskType::SetVariable {
                    key: "skipped".to_string(),
                    value: Value::Bool(true),
                },
            ),
            WorkflowTask {
                error_policy: ErrorPolicy::Retry,
                max_retries: 2,
                ..task(
                    "3",
                    WorkflowTaskType::McpAction {
                        tool_id,
                        params: Default::default(),
                    },
                )
            },
        ];
        let tenant_id = tenant.id;
        let wf = workflow(tenant_id, vec![], tasks);
        let config = permissive_config(tenant_id);

        let execution = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.tasks_completed, vec!["1", "2", "3"]);
        assert!(!execution.scope.contains_key("skipped"));
    }

    /// §8 Scenario S4: a `human_approval` task suspends the execution; an external `approve`
    /// resumes it to completion, and a rejection cancels it with the spec's literal message.
    #[tokio::test]
    async fn human_approval_pauses_and_resumes() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store, Arc::new(ToolRegistry::new()));

        let tasks = vec![task(
            "2",
            WorkflowTaskType::HumanApproval {
                prompt: "Approve this action?".to_string(),
            },
        )];
        let wf = workflow(tenant.id, vec![], tasks);
        let config = permissive_config(tenant.id);

        let suspended = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();
        assert_eq!(suspended.status, ExecutionStatus::Suspended);
        assert_eq!(suspended.current_task.as_deref(), Some("2"));

        let approved = interpreter
            .resume(&wf, suspended.clone(), &tenant, &config, &ProviderCredentials::default(), Some(true))
            .await
            .unwrap();
        assert_eq!(approved.status, ExecutionStatus::Completed);

        let rejected = interpreter
            .resume(&wf, suspended, &tenant, &config, &ProviderCredentials::default(), Some(false))
            .await
            .unwrap();
        assert_eq!(rejected.status, ExecutionStatus::Cancelled);
        assert_eq!(rejected.error.as_deref(), Some("Rejected by user"));
    }

    /// §4.D: `wait { type: delay }` is bounded by 24h — an author-supplied `resume_at` further
    /// out than that is clamped to the cap rather than honored as-is.
    #[tokio::test]
    async fn wait_delay_resume_at_is_clamped_to_24h() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store, Arc::new(ToolRegistry::new()));

        let far_future = Utc::now() + chrono::Duration::days(30);
        let tasks = vec![task(
            "1",
            WorkflowTaskType::Wait {
                kind: WaitKind::Delay { resume_at: far_future },
            },
        )];
        let wf = workflow(tenant.id, vec![], tasks);
        let config = permissive_config(tenant.id);

        let suspended = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(suspended.status, ExecutionStatus::Suspended);
        let resume_at = suspended.resume_at.expect("wait.delay sets resume_at");
        assert!(resume_at < far_future);
        assert!(resume_at <= Utc::now() + chrono::Duration::hours(24));
    }

    /// §7/§4.D: a `loop` over more than 100 elements fails the task with a loop-bound error
    /// rather than silently truncating the iteration.
    #[tokio::test]
    async fn loop_over_the_iteration_cap_fails_the_execution() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store, Arc::new(ToolRegistry::new()));

        // The body is a `condition` that unconditionally jumps back to the loop task, so each
        // pass through "2.1" re-enters "2" and advances its counter — the only way a body re-runs
        // the loop, since a plain sequential `Advance` out of the body never revisits an
        // earlier-ordered task.
        let items: Vec<Value> = (0..150).map(Value::from).collect();
        let tasks = vec![
            task(
                "1",
                WorkflowTaskType::SetVariable {
                    key: "items".to_string(),
                    value: Value::Array(items),
                },
            ),
            task(
                "2",
                WorkflowTaskType::Loop {
                    iterate_over: "items".to_string(),
                    item_var: "item".to_string(),
                    body_start: "2.1".to_string(),
                    body_end: "2.1".to_string(),
                },
            ),
            task(
                "2.1",
                WorkflowTaskType::Condition {
                    expression: "true".to_string(),
                    on_true: "2".to_string(),
                    on_false: "2".to_string(),
                },
            ),
        ];
        let wf = workflow(tenant.id, vec![], tasks);
        let config = permissive_config(tenant.id);

        let execution = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.failing_task.as_deref(), Some("2"));
        assert!(execution.error.as_ref().unwrap().contains("100 iterations"));
    }

    /// A `goto` error policy relocates the cursor to `error_goto` instead of failing the
    /// execution outright.
    #[tokio::test]
    async fn goto_error_policy_jumps_past_a_failing_task() {
        let tenant = test_tenant();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let interpreter = bare_interpreter(store, Arc::new(ToolRegistry::new()));

        let unregistered_tool = ToolId::new();
        let tasks = vec![
            WorkflowTask {
                error_policy: ErrorPolicy::Goto,
                error_goto: Some("3".to_string()),
                ..task(
                    "1",
                    WorkflowTaskType::McpAction {
                        tool_id: unregistered_tool,
                        params: Default::default(),
                    },
                )
            },
            task(
                "2",
                WorkflowTaskType::SetVariable {
                    key: "should_skip".to_string(),
                    value: Value::Bool(true),
                },
            ),
            task(
                "3",
                WorkflowTaskType::SetVariable {
                    key: "recovered".to_string(),
                    value: Value::Bool(true),
                },
            ),
        ];
        let wf = workflow(tenant.id, vec![], tasks);
        let config = permissive_config(tenant.id);

        let execution = interpreter
            .start(&wf, HashMap::new(), &tenant, &config, &ProviderCredentials::default())
            .await
            .unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(!execution.scope.contains_key("should_skip"));
        assert_eq!(execution.scope.get("recovered"), Some(&Value::Bool(true)));
    }
}
