//! Worker pool entry point (§5): claims jobs off the queue, runs the workflow interpreter, and
//! drives the scheduler's cron tick loop. Persistence, auth, and the HTTP/CRUD surface in front
//! of this process are external collaborators — this binary only wires the core's own pieces
//! together behind the environment-driven [`Settings`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conduit::config::Settings;
use conduit::domain::ProviderCredentials;
use conduit::events::queue::{InMemoryJobQueue, JobKind, JobQueue};
use conduit::events::EventBus;
use conduit::providers::anthropic::AnthropicAdapter;
use conduit::providers::groq;
use conduit::providers::openai::OpenAiAdapter;
use conduit::providers::ProviderAdapter;
use conduit::routing::{capability, PlatformCredentials, Router};
use conduit::scheduler::Scheduler;
use conduit::store::{LedgerBackedStore, Store};
use conduit::tool::ToolRegistry;
use conduit::workflow::Interpreter;

fn capabilities_for(provider: &str) -> Vec<conduit::providers::ModelCapabilities> {
    capability::roster()
        .into_iter()
        .filter(|entry| entry.capabilities.provider == provider)
        .map(|entry| entry.capabilities)
        .collect()
}

fn build_router() -> Router {
    let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
        Arc::new(OpenAiAdapter::new(capabilities_for("openai"))),
        Arc::new(AnthropicAdapter::new(capabilities_for("anthropic"))),
        Arc::new(groq::adapter(capabilities_for("groq"))),
    ];
    Router::new(adapters)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let settings = Settings::from_env();
    log::info!(
        "conduit-worker starting: max_jobs={} job_timeout={:?}",
        settings.max_jobs,
        settings.job_timeout
    );

    let platform_credentials = PlatformCredentials {
        openai: settings.openai_api_key.clone(),
        anthropic: settings.anthropic_api_key.clone(),
        groq: settings.groq_api_key.clone(),
    };

    let store = Arc::new(
        LedgerBackedStore::open(settings.ledger_dir.clone())
            .expect("ledger directory must be creatable/writable"),
    );
    let events = Arc::new(EventBus::new());
    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
    let router = Arc::new(build_router());
    let tools = Arc::new(ToolRegistry::new());

    let interpreter = Arc::new(Interpreter::new(
        store.clone(),
        router.clone(),
        tools,
        events,
        platform_credentials,
    ));

    let scheduler = Scheduler::new(store.clone(), queue.clone());

    // Scheduler loop: one tick per second, consulting every due `ScheduledJob` and enqueuing its
    // workflow as a job envelope.
    let scheduler_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let dispatched = scheduler.tick(chrono::Utc::now()).await;
            if !dispatched.is_empty() {
                log::info!("scheduler dispatched {} job(s)", dispatched.len());
            }
        }
    });

    // Worker pool: `max_jobs` cooperative tasks each draining the queue and driving a workflow
    // execution to completion or its next suspension point. A deployment supplies the actual
    // `Workflow`/`Tenant`/`TenantLlmConfig`/`ProviderCredentials` lookups through the `Store`;
    // this loop only demonstrates the claim-and-dispatch shape the worker pool follows.
    let mut worker_handles = Vec::with_capacity(settings.max_jobs);
    for worker_id in 0..settings.max_jobs {
        let queue = queue.clone();
        let store = store.clone();
        let interpreter = interpreter.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let job = queue.dequeue_blocking().await;
                log::info!(
                    "worker {worker_id} claimed {:?} job for workflow {} (tenant {})",
                    job.kind,
                    job.workflow_id,
                    job.tenant_id
                );
                if let Err(err) = dispatch(&store, &interpreter, &job).await {
                    log::error!("worker {worker_id} job failed: {err}");
                }
            }
        }));
    }

    let _ = tokio::join!(scheduler_handle, futures_util::future::join_all(worker_handles));
}

/// Claim-and-run one job envelope. Missing `Tenant`/`Workflow`/`TenantLlmConfig` records are
/// logged and dropped rather than retried — in this demonstration binary nothing ever writes
/// those records into the `Store`, so a job only reaches here at all once a real deployment's
/// HTTP/CRUD surface has populated them.
async fn dispatch(
    store: &Arc<LedgerBackedStore>,
    interpreter: &Arc<Interpreter>,
    job: &conduit::events::queue::Job,
) -> Result<(), conduit::error::ConduitError> {
    match &job.kind {
        JobKind::ExecuteWorkflow | JobKind::ExecuteAgentTask => {
            let workflow = store
                .get_workflow(job.workflow_id)
                .await
                .ok_or_else(|| conduit::error::ConduitError::NotFound {
                    kind: "workflow",
                    id: job.workflow_id.to_string(),
                })?;
            let tenant = store
                .get_tenant(job.tenant_id)
                .await
                .ok_or_else(|| conduit::error::ConduitError::NotFound {
                    kind: "tenant",
                    id: job.tenant_id.to_string(),
                })?;
            let tenant_config = store.get_tenant_llm_config(job.tenant_id).await.ok_or_else(|| {
                conduit::error::ConduitError::NotFound {
                    kind: "tenant_llm_config",
                    id: job.tenant_id.to_string(),
                }
            })?;
            // Decrypted BYOK key material lives with the (external) auth layer, never in the
            // `Store` itself — see `ProviderCredentials`'s doc comment. This binary has no auth
            // layer wired in, so every job here runs under whatever platform credentials
            // `Settings` supplied at startup.
            let tenant_credentials = ProviderCredentials::default();

            let execution = interpreter
                .start(&workflow, HashMap::new(), &tenant, &tenant_config, &tenant_credentials)
                .await?;
            log::info!(
                "execution {} for workflow {} finished in state {:?}",
                execution.id,
                workflow.id,
                execution.status
            );
            Ok(())
        }
        JobKind::SendScheduledEmail { prompt_id, recipient } => {
            let prompt = store.get_prompt(*prompt_id).await.ok_or_else(|| {
                conduit::error::ConduitError::NotFound {
                    kind: "prompt",
                    id: prompt_id.to_string(),
                }
            })?;
            let rendered = prompt.render(&HashMap::new());
            // Actually delivering mail is an external collaborator (§1); this binary only proves
            // out the render-then-hand-off shape.
            log::info!("would send scheduled email to {recipient}: {rendered:?}");
            Ok(())
        }
    }
}
