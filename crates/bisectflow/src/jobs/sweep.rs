use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::dispatch::BuildDispatchClient;
use crate::jobs::errors::JobError;
use crate::jobs::ledger::RetryLedger;
use crate::jobs::model::{JobRecord, JobState};
use crate::store::JobStore;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// A Running job whose last observed progress is older than this is
    /// suspected stuck.
    pub staleness_threshold: Duration,
    /// Re-dispatches allowed per job before it is failed outright.
    pub max_retries: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::hours(6),
            max_retries: 3,
        }
    }
}

/// What one reconciliation pass did. Returned to the trigger and logged.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub fresh: usize,
    pub redispatched: usize,
    pub failed: usize,
    pub errored: usize,
}

enum Outcome {
    Fresh,
    Redispatched,
    Failed,
}

/// Periodic liveness pass over Running jobs: refresh, re-dispatch, or fail.
/// Queued and terminal jobs are never touched. Re-entrant; overlapping
/// invocations are safe because per-job work is independent.
pub struct ReconciliationSweep {
    store: Arc<dyn JobStore>,
    ledger: Arc<dyn RetryLedger>,
    dispatch: Arc<BuildDispatchClient>,
    config: SweepConfig,
}

impl ReconciliationSweep {
    pub fn new(
        store: Arc<dyn JobStore>,
        ledger: Arc<dyn RetryLedger>,
        dispatch: Arc<BuildDispatchClient>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            dispatch,
            config,
        }
    }

    /// One pass over every Running job. Per-job failures are counted and
    /// swallowed; one stuck job never blocks the rest of the sweep.
    pub async fn run(&self) -> anyhow::Result<SweepReport> {
        let running = self.store.list_by_state(JobState::Running).await?;
        let now = Utc::now();

        let mut report = SweepReport {
            examined: running.len(),
            ..SweepReport::default()
        };
        for job in running {
            let job_id = job.id;
            match self.reconcile(job, now).await {
                Ok(Outcome::Fresh) => report.fresh += 1,
                Ok(Outcome::Redispatched) => report.redispatched += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Err(err) => {
                    report.errored += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        error = %err,
                        "reconciliation tick failed; job stays eligible for the next cycle"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn reconcile(
        &self,
        mut job: JobRecord,
        now: DateTime<Utc>,
    ) -> Result<Outcome, JobError> {
        if now - job.last_progress_time <= self.config.staleness_threshold {
            return Ok(Outcome::Fresh);
        }

        // A lost or unreadable ledger entry reads as zero retries.
        let retries = match self.ledger.get(job.id).await {
            Ok(count) => count.unwrap_or(0),
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "retry ledger unreadable");
                0
            }
        };

        if retries >= self.config.max_retries {
            job.mark_failed()?;
            self.store.update(&job).await.map_err(JobError::Storage)?;
            tracing::info!(job_id = %job.id, retries, "stale job failed, retry budget exhausted");
            return Ok(Outcome::Failed);
        }

        // The increment lands before the dispatch call; the counter store
        // and the job store are not transactionally linked, so a crash in
        // between leaves the counter ahead of the true attempt count.
        self.ledger
            .set(job.id, retries + 1)
            .await
            .map_err(JobError::Storage)?;

        let handle = self.dispatch.schedule_build(&job.build).await?;
        job.mark_running(handle)?;
        self.store.update(&job).await.map_err(JobError::Storage)?;

        tracing::info!(job_id = %job.id, retry = retries + 1, "stale job re-dispatched");
        Ok(Outcome::Redispatched)
    }
}
