//! Scheduled job (§3, § scheduler).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScheduledJobId, TenantId, WorkflowId};

/// A durable cron-driven binding between a schedule and a workflow.
///
/// `fire_count` doubles as the optimistic-concurrency token the scheduler's CAS update relies on
/// (§4.E): a worker only commits `next_fire_at`/`last_fired_at` if `fire_count` still matches
/// what it read, so two workers racing on the same due job never both dispatch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: ScheduledJobId,
    pub tenant_id: TenantId,
    pub workflow_id: WorkflowId,
    pub cron_expression: String,
    pub timezone: String,
    pub active: bool,
    pub next_fire_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

impl ScheduledJob {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && now >= self.next_fire_at
    }
}
