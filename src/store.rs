//! The `Store` trait boundary (§6): the persisted entities the core reads and writes, with no
//! opinion on the backing database — that's an external collaborator per §1. An in-memory
//! implementation backs the test suite; a real deployment implements the same trait against its
//! relational store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Agent, AgentId, Conversation, ConversationId, ExecutionId, ExecutionStatus, PromptId,
    PromptTemplate, ScheduledJob, ScheduledJobId, Tenant, TenantId, TenantLlmConfig, ToolId,
    ToolReference, UsageRecord, Workflow, WorkflowExecution, WorkflowId,
};

/// Every entity the core needs to load or persist, per §6's "Persisted state layout". Methods
/// are `async` even on the in-memory implementation so a real database-backed implementation
/// slots in without changing any call site.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_tenant(&self, id: TenantId) -> Option<Tenant>;
    async fn save_tenant(&self, tenant: Tenant);

    async fn get_tenant_llm_config(&self, tenant_id: TenantId) -> Option<TenantLlmConfig>;

    async fn get_agent(&self, id: AgentId) -> Option<Agent>;
    async fn get_prompt(&self, id: PromptId) -> Option<PromptTemplate>;
    async fn get_tool_ref(&self, id: ToolId) -> Option<ToolReference>;

    async fn get_workflow(&self, id: WorkflowId) -> Option<Workflow>;
    async fn save_workflow(&self, workflow: Workflow);

    async fn get_execution(&self, id: ExecutionId) -> Option<WorkflowExecution>;
    /// Persist the full execution state. Per §5, this is the single transaction boundary for a
    /// step: `(status, current_task, scope, loop_counters)` are written together, atomically, as
    /// one call.
    async fn save_execution(&self, execution: WorkflowExecution);

    /// Every suspended execution of `workflow_id` currently waiting on `event_type` (§4.D
    /// `wait { kind: event }`), for the event bus to resume when a matching event is published.
    async fn executions_waiting_on(
        &self,
        workflow_id: WorkflowId,
        event_type: &str,
    ) -> Vec<WorkflowExecution>;

    async fn append_usage(&self, record: UsageRecord);
    /// Usage records for `tenant_id` in the billing period `"YYYY-MM"` — the only read path the
    /// quota invariant (Testable Property 1) needs.
    async fn usage_for_period(&self, tenant_id: TenantId, period: &str) -> Vec<UsageRecord>;

    async fn get_scheduled_job(&self, id: ScheduledJobId) -> Option<ScheduledJob>;
    async fn due_scheduled_jobs(&self, now: DateTime<Utc>) -> Vec<ScheduledJob>;
    /// Compare-and-swap a scheduled job's fire bookkeeping (§5): succeeds only if the stored
    /// `fire_count` still equals `expected_fire_count`, so two scheduler instances racing on the
    /// same due job never both dispatch it.
    async fn cas_scheduled_job(&self, updated: ScheduledJob, expected_fire_count: u64) -> bool;

    async fn get_conversation(&self, id: ConversationId) -> Option<Conversation>;
    async fn save_conversation(&self, conversation: Conversation);

    /// Admin/cron housekeeping hook (`cleanup_executions` in the original — §1 supplemental):
    /// drop terminal executions older than `older_than`, returning how many were removed. Out of
    /// scope for the interpreter itself; exposed so a caller wired to a real retention policy has
    /// somewhere to hang it.
    async fn prune_executions(&self, tenant_id: TenantId, older_than: DateTime<Utc>) -> usize;
}

#[derive(Default)]
struct Tables {
    tenants: HashMap<TenantId, Tenant>,
    tenant_configs: HashMap<TenantId, TenantLlmConfig>,
    agents: HashMap<AgentId, Agent>,
    prompts: HashMap<PromptId, PromptTemplate>,
    tool_refs: HashMap<ToolId, ToolReference>,
    workflows: HashMap<WorkflowId, Workflow>,
    executions: HashMap<ExecutionId, WorkflowExecution>,
    usage: Vec<UsageRecord>,
    scheduled_jobs: HashMap<ScheduledJobId, ScheduledJob>,
    conversations: HashMap<ConversationId, Conversation>,
}

/// In-memory [`Store`] implementation. Good enough for a single-process deployment or for tests;
/// every method takes a brief lock rather than holding one across an `.await`.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helpers, used by tests and by a caller bootstrapping a fresh deployment. Not part of
    /// the `Store` trait itself since they're convenience, not persisted-entity access.
    pub fn put_tenant(&self, tenant: Tenant) {
        self.tables.lock().expect("store mutex poisoned").tenants.insert(tenant.id, tenant);
    }

    pub fn put_tenant_llm_config(&self, config: TenantLlmConfig) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .tenant_configs
            .insert(config.tenant_id, config);
    }

    pub fn put_agent(&self, agent: Agent) {
        self.tables.lock().expect("store mutex poisoned").agents.insert(agent.id, agent);
    }

    pub fn put_prompt(&self, prompt: PromptTemplate) {
        self.tables.lock().expect("store mutex poisoned").prompts.insert(prompt.id, prompt);
    }

    pub fn put_tool_ref(&self, tool_ref: ToolReference) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .tool_refs
            .insert(tool_ref.id, tool_ref);
    }

    pub fn put_workflow(&self, workflow: Workflow) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .workflows
            .insert(workflow.id, workflow);
    }

    pub fn put_scheduled_job(&self, job: ScheduledJob) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .scheduled_jobs
            .insert(job.id, job);
    }

    pub fn put_conversation(&self, conversation: Conversation) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .conversations
            .insert(conversation.id, conversation);
    }

    /// Load a previously persisted execution back into the table, bypassing whatever ledgering a
    /// wrapping [`LedgerBackedStore`] would otherwise do on `save_execution`. Used only during
    /// ledger replay at startup.
    fn restore_execution(&self, execution: WorkflowExecution) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .executions
            .insert(execution.id, execution);
    }

    /// Replay a usage record recovered from the ledger, without re-appending it. Used only
    /// during ledger replay at startup.
    fn restore_usage(&self, record: UsageRecord) {
        self.tables.lock().expect("store mutex poisoned").usage.push(record);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_tenant(&self, id: TenantId) -> Option<Tenant> {
        self.tables.lock().expect("store mutex poisoned").tenants.get(&id).cloned()
    }

    async fn save_tenant(&self, tenant: Tenant) {
        self.tables.lock().expect("store mutex poisoned").tenants.insert(tenant.id, tenant);
    }

    async fn get_tenant_llm_config(&self, tenant_id: TenantId) -> Option<TenantLlmConfig> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .tenant_configs
            .get(&tenant_id)
            .cloned()
    }

    async fn get_agent(&self, id: AgentId) -> Option<Agent> {
        self.tables.lock().expect("store mutex poisoned").agents.get(&id).cloned()
    }

    async fn get_prompt(&self, id: PromptId) -> Option<PromptTemplate> {
        self.tables.lock().expect("store mutex poisoned").prompts.get(&id).cloned()
    }

    async fn get_tool_ref(&self, id: ToolId) -> Option<ToolReference> {
        self.tables.lock().expect("store mutex poisoned").tool_refs.get(&id).cloned()
    }

    async fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.tables.lock().expect("store mutex poisoned").workflows.get(&id).cloned()
    }

    async fn save_workflow(&self, workflow: Workflow) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .workflows
            .insert(workflow.id, workflow);
    }

    async fn get_execution(&self, id: ExecutionId) -> Option<WorkflowExecution> {
        self.tables.lock().expect("store mutex poisoned").executions.get(&id).cloned()
    }

    async fn save_execution(&self, execution: WorkflowExecution) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .executions
            .insert(execution.id, execution);
    }

    async fn executions_waiting_on(
        &self,
        workflow_id: WorkflowId,
        event_type: &str,
    ) -> Vec<WorkflowExecution> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .executions
            .values()
            .filter(|e| {
                e.workflow_id == workflow_id
                    && e.status == ExecutionStatus::Suspended
                    && e.waiting_event.as_deref() == Some(event_type)
            })
            .cloned()
            .collect()
    }

    async fn append_usage(&self, record: UsageRecord) {
        self.tables.lock().expect("store mutex poisoned").usage.push(record);
    }

    async fn usage_for_period(&self, tenant_id: TenantId, period: &str) -> Vec<UsageRecord> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .usage
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.recorded_at.format("%Y-%m").to_string() == period)
            .cloned()
            .collect()
    }

    async fn get_scheduled_job(&self, id: ScheduledJobId) -> Option<ScheduledJob> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .scheduled_jobs
            .get(&id)
            .cloned()
    }

    async fn due_scheduled_jobs(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .scheduled_jobs
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect()
    }

    async fn cas_scheduled_job(&self, updated: ScheduledJob, expected_fire_count: u64) -> bool {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        match tables.scheduled_jobs.get(&updated.id) {
            Some(current) if current.fire_count == expected_fire_count => {
                tables.scheduled_jobs.insert(updated.id, updated);
                true
            }
            _ => false,
        }
    }

    async fn get_conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .conversations
            .get(&id)
            .cloned()
    }

    async fn save_conversation(&self, conversation: Conversation) {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .conversations
            .insert(conversation.id, conversation);
    }

    async fn prune_executions(&self, tenant_id: TenantId, older_than: DateTime<Utc>) -> usize {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let before = tables.executions.len();
        tables.executions.retain(|_, execution| {
            !(execution.tenant_id == tenant_id
                && execution.status.is_terminal()
                && execution.updated_at < older_than)
        });
        before - tables.executions.len()
    }
}


/// A [`Store`] that mirrors every execution step and usage record to a disk-backed
/// [`conduit_ledger::Ledger`] before acknowledging the write, so a process restart can rebuild
/// its in-memory tables from the last entry each stream recorded (§7, Testable Property 7:
/// "crash-recovery idempotence"). Everything that isn't execution or usage state — tenants,
/// workflows, prompts, and so on — is delegated straight to an [`InMemoryStore`]; a real
/// deployment would back those with its relational database instead.
pub struct LedgerBackedStore {
    inner: InMemoryStore,
    dir: std::path::PathBuf,
    execution_ledgers: Mutex<HashMap<ExecutionId, conduit_ledger::Ledger>>,
    usage_ledgers: Mutex<HashMap<TenantId, conduit_ledger::Ledger>>,
}

impl LedgerBackedStore {
    fn executions_dir(dir: &std::path::Path) -> std::path::PathBuf {
        dir.join("executions")
    }

    fn usage_dir(dir: &std::path::Path) -> std::path::PathBuf {
        dir.join("usage")
    }

    /// Open (or create) a ledger-backed store rooted at `dir`, replaying every existing stream's
    /// last known state into a fresh [`InMemoryStore`] before returning.
    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self, conduit_ledger::LedgerError> {
        let dir = dir.into();
        let inner = InMemoryStore::new();

        let executions_dir = Self::executions_dir(&dir);
        std::fs::create_dir_all(&executions_dir)?;
        for entry in std::fs::read_dir(&executions_dir)? {
            let entry = entry?;
            let Some(stream_id) = stream_id_from_path(&entry.path()) else {
                continue;
            };
            let ledger = conduit_ledger::Ledger::open(&executions_dir, &stream_id)?;
            if let Some(last) = ledger.last() {
                if let Ok(execution) = serde_json::from_value::<WorkflowExecution>(last.payload.clone()) {
                    inner.restore_execution(execution);
                }
            }
        }

        let usage_dir = Self::usage_dir(&dir);
        std::fs::create_dir_all(&usage_dir)?;
        for entry in std::fs::read_dir(&usage_dir)? {
            let entry = entry?;
            let Some(stream_id) = stream_id_from_path(&entry.path()) else {
                continue;
            };
            let ledger = conduit_ledger::Ledger::open(&usage_dir, &stream_id)?;
            for record in ledger.entries() {
                if let Ok(record) = serde_json::from_value::<UsageRecord>(record.payload.clone()) {
                    inner.restore_usage(record);
                }
            }
        }

        Ok(Self {
            inner,
            dir,
            execution_ledgers: Mutex::new(HashMap::new()),
            usage_ledgers: Mutex::new(HashMap::new()),
        })
    }
}

fn stream_id_from_path(path: &std::path::Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
        return None;
    }
    path.file_stem().and_then(|stem| stem.to_str()).map(str::to_string)
}

#[async_trait]
impl Store for LedgerBackedStore {
    async fn get_tenant(&self, id: TenantId) -> Option<Tenant> {
        self.inner.get_tenant(id).await
    }

    async fn save_tenant(&self, tenant: Tenant) {
        self.inner.save_tenant(tenant).await
    }

    async fn get_tenant_llm_config(&self, tenant_id: TenantId) -> Option<TenantLlmConfig> {
        self.inner.get_tenant_llm_config(tenant_id).await
    }

    async fn get_agent(&self, id: AgentId) -> Option<Agent> {
        self.inner.get_agent(id).await
    }

    async fn get_prompt(&self, id: PromptId) -> Option<PromptTemplate> {
        self.inner.get_prompt(id).await
    }

    async fn get_tool_ref(&self, id: ToolId) -> Option<ToolReference> {
        self.inner.get_tool_ref(id).await
    }

    async fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.inner.get_workflow(id).await
    }

    async fn save_workflow(&self, workflow: Workflow) {
        self.inner.save_workflow(workflow).await
    }

    async fn get_execution(&self, id: ExecutionId) -> Option<WorkflowExecution> {
        self.inner.get_execution(id).await
    }

    async fn save_execution(&self, execution: WorkflowExecution) {
        let execution_id = execution.id;
        let payload = serde_json::to_value(&execution)
            .expect("WorkflowExecution always serializes");
        {
            let mut ledgers = self.execution_ledgers.lock().expect("store mutex poisoned");
            let ledger = match ledgers.entry(execution_id) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let opened = conduit_ledger::Ledger::open(
                        &Self::executions_dir(&self.dir),
                        &execution_id.to_string(),
                    )
                    .expect("execution ledger directory is writable");
                    entry.insert(opened)
                }
            };
            ledger.append("step", payload).expect("execution ledger append succeeds");
        }
        self.inner.save_execution(execution).await
    }

    async fn executions_waiting_on(
        &self,
        workflow_id: WorkflowId,
        event_type: &str,
    ) -> Vec<WorkflowExecution> {
        self.inner.executions_waiting_on(workflow_id, event_type).await
    }

    async fn append_usage(&self, record: UsageRecord) {
        let tenant_id = record.tenant_id;
        let payload = serde_json::to_value(&record).expect("UsageRecord always serializes");
        {
            let mut ledgers = self.usage_ledgers.lock().expect("store mutex poisoned");
            let ledger = match ledgers.entry(tenant_id) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let opened = conduit_ledger::Ledger::open(&Self::usage_dir(&self.dir), &tenant_id.to_string())
                        .expect("usage ledger directory is writable");
                    entry.insert(opened)
                }
            };
            ledger.append("usage", payload).expect("usage ledger append succeeds");
        }
        self.inner.append_usage(record).await
    }

    async fn usage_for_period(&self, tenant_id: TenantId, period: &str) -> Vec<UsageRecord> {
        self.inner.usage_for_period(tenant_id, period).await
    }

    async fn get_scheduled_job(&self, id: ScheduledJobId) -> Option<ScheduledJob> {
        self.inner.get_scheduled_job(id).await
    }

    async fn due_scheduled_jobs(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        self.inner.due_scheduled_jobs(now).await
    }

    async fn cas_scheduled_job(&self, updated: ScheduledJob, expected_fire_count: u64) -> bool {
        self.inner.cas_scheduled_job(updated, expected_fire_count).await
    }

    async fn get_conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.inner.get_conversation(id).await
    }

    async fn save_conversation(&self, conversation: Conversation) {
        self.inner.save_conversation(conversation).await
    }

    async fn prune_executions(&self, tenant_id: TenantId, older_than: DateTime<Utc>) -> usize {
        self.inner.prune_executions(tenant_id, older_than).await
    }
}

#[cfg(test)]
mod ledger_backed_tests {
    use super::*;
    use crate::domain::{UsageType, WorkflowExecution};

    #[tokio::test]
    async fn recovers_latest_execution_state_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tenant_id = TenantId::new();
        let workflow_id = WorkflowId::new();
        let execution_id;

        {
            let store = LedgerBackedStore::open(dir.path()).unwrap();
            let mut execution = WorkflowExecution::new(tenant_id, workflow_id, Utc::now());
            execution_id = execution.id;
            store.save_execution(execution.clone()).await;

            execution.current_task = Some("2".to_string());
            execution.tasks_completed.push("1".to_string());
            store.save_execution(execution).await;
        }

        let reopened = LedgerBackedStore::open(dir.path()).unwrap();
        let recovered = reopened.get_execution(execution_id).await.unwrap();
        assert_eq!(recovered.current_task.as_deref(), Some("2"));
        assert_eq!(recovered.tasks_completed, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn recovers_every_usage_record_not_just_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let tenant_id = TenantId::new();

        {
            let store = LedgerBackedStore::open(dir.path()).unwrap();
            for n in 0..3 {
                store
                    .append_usage(UsageRecord {
                        tenant_id,
                        provider: "openai".to_string(),
                        model: "gpt-4.1-nano".to_string(),
                        usage_type: UsageType::Platform,
                        prompt_tokens: 10,
                        completion_tokens: n,
                        latency_ms: 50,
                        succeeded: true,
                        recorded_at: Utc::now(),
                    })
                    .await;
            }
        }

        let reopened = LedgerBackedStore::open(dir.path()).unwrap();
        let period = Utc::now().format("%Y-%m").to_string();
        let records = reopened.usage_for_period(tenant_id, &period).await;
        assert_eq!(records.len(), 3);
    }
}
