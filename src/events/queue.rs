//! Priority job queue (§4.E, §5).
//!
//! An in-memory, three-lane FIFO implementation sits behind the [`JobQueue`] trait so a
//! deployment can later swap in a Redis-backed queue without touching dispatch logic.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::domain::{PromptId, ScheduledJobId, TenantId, WorkflowId};

/// Dispatch priority a job is enqueued at. Higher lanes always drain before lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Default,
    Low,
}

/// What a job envelope asks the worker pool to do (§1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobKind {
    ExecuteWorkflow,
    ExecuteAgentTask,
    /// Render and send a saved prompt template as an email, outside any workflow — the target of
    /// a schedule whose job is "nudge this tenant" rather than "run this workflow".
    SendScheduledEmail { prompt_id: PromptId, recipient: String },
}

/// One unit of dispatchable work, tagged with which kind of work it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub tenant_id: TenantId,
    pub workflow_id: WorkflowId,
    pub scheduled_job_id: Option<ScheduledJobId>,
    pub priority: Priority,
    pub kind: JobKind,
}

/// Queue abstraction the worker pool dispatches against (§5).
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job);
    /// Pop the next job, draining `High` before `Default` before `Low`, FIFO within a lane.
    /// Returns `None` when all lanes are empty.
    async fn dequeue(&self) -> Option<Job>;
    async fn len(&self) -> usize;

    /// Wait for a job to become available and return it, without the caller busy-polling.
    /// The default implementation polls [`Self::dequeue`] on a short interval; [`InMemoryJobQueue`]
    /// overrides it with a single shared [`Notify`] so a worker parks instead of spinning.
    async fn dequeue_blocking(&self) -> Job {
        loop {
            if let Some(job) = self.dequeue().await {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[derive(Default)]
struct Lanes {
    high: VecDeque<Job>,
    default: VecDeque<Job>,
    low: VecDeque<Job>,
}

/// In-memory [`JobQueue`] implementation, good enough for a single-process deployment or for
/// tests; a production multi-worker deployment swaps this for a Redis-backed implementation of
/// the same trait without touching call sites. Guarded by a single [`Notify`] (§4.C) rather than
/// a condvar per lane, since every enqueue can wake any waiting worker regardless of which lane
/// it landed in.
pub struct InMemoryJobQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) {
        let mut lanes = self.lanes.lock().expect("job queue mutex poisoned");
        match job.priority {
            Priority::High => lanes.high.push_back(job),
            Priority::Default => lanes.default.push_back(job),
            Priority::Low => lanes.low.push_back(job),
        }
        drop(lanes);
        self.notify.notify_one();
    }

    async fn dequeue(&self) -> Option<Job> {
        let mut lanes = self.lanes.lock().expect("job queue mutex poisoned");
        lanes
            .high
            .pop_front()
            .or_else(|| lanes.default.pop_front())
            .or_else(|| lanes.low.pop_front())
    }

    async fn len(&self) -> usize {
        let lanes = self.lanes.lock().expect("job queue mutex poisoned");
        lanes.high.len() + lanes.default.len() + lanes.low.len()
    }

    async fn dequeue_blocking(&self) -> Job {
        loop {
            // Register interest before checking the queue so an enqueue landing between the
            // check and the wait can't be missed.
            let notified = self.notify.notified();
            if let Some(job) = self.dequeue().await {
                return job;
            }
            notified.await;
        }
    }
}
