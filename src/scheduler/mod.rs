//! Cron planner and next-fire computation (§4.E).

pub mod presets;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::domain::ScheduledJob;
use crate::error::ConduitError;
use crate::events::queue::{Job, JobKind, JobQueue, Priority};
use crate::store::Store;

/// `cron`'s parser wants a leading seconds field; a job's `cron_expression` is the ordinary
/// five-field unix form (`"0 9 * * 1-5"`) so every caller can write the same syntax the external
/// CRUD surface exposes. A six-field expression is passed through unchanged.
fn normalize(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

fn parse_schedule(expression: &str) -> Result<Schedule, ConduitError> {
    Schedule::from_str(&normalize(expression))
        .map_err(|e| ConduitError::Config(format!("invalid cron expression '{expression}': {e}")))
}

/// Next fire instant strictly after `after`, in UTC. "Coalesce not replay" (§4.E): computing
/// strictly after the current instant on every call means any number of fires missed while the
/// scheduler was down are silently skipped rather than replayed.
pub fn next_fire(expression: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ConduitError> {
    let schedule = parse_schedule(expression)?;
    let tz: Tz = timezone
        .parse()
        .map_err(|_| ConduitError::Config(format!("unknown timezone: {timezone}")))?;

    let local_after = after.with_timezone(&tz);
    schedule
        .after(&local_after)
        .next()
        .map(|next| next.with_timezone(&Utc))
        .ok_or_else(|| ConduitError::Config(format!("cron expression '{expression}' never fires")))
}

/// Drives due [`ScheduledJob`]s onto the job queue. One tick checks every job due at `now`,
/// advances it past `now` via CAS (so two scheduler instances racing on the same tick never both
/// dispatch it — §5), and enqueues a `Default`-priority job envelope for each job it won the race
/// on.
pub struct Scheduler {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Run one scheduling pass at `now`. Returns the scheduled jobs this tick actually dispatched
    /// (lost CAS races are silently skipped — another instance is handling them).
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut dispatched = Vec::new();
        for job in self.store.due_scheduled_jobs(now).await {
            let next = match next_fire(&job.cron_expression, &job.timezone, now) {
                Ok(next) => next,
                Err(_) => continue,
            };

            let expected = job.fire_count;
            let mut updated = job.clone();
            updated.last_fired_at = Some(now);
            updated.next_fire_at = next;
            updated.fire_count = expected + 1;

            if !self.store.cas_scheduled_job(updated.clone(), expected).await {
                continue;
            }

            self.queue
                .enqueue(Job {
                    tenant_id: job.tenant_id,
                    workflow_id: job.workflow_id,
                    scheduled_job_id: Some(job.id),
                    priority: Priority::Default,
                    kind: JobKind::ExecuteWorkflow,
                })
                .await;
            dispatched.push(updated);
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekday_9am_paris_skips_the_weekend() {
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let next = next_fire("0 9 * * 1-5", "Europe/Paris", friday).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 8, 0, 0).unwrap());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(next_fire("not a cron", "UTC", Utc::now()).is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(next_fire("0 9 * * 1-5", "Nowhere/Place", Utc::now()).is_err());
    }
}
