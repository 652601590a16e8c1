mod common;

use std::sync::Arc;

use bisectflow::dispatch::{BuildDispatchClient, BuildTransport, Endpoints, Protocol};
use bisectflow::jobs::ledger::{MemoryRetryLedger, RetryLedger};
use bisectflow::jobs::model::{JobRecord, JobState};
use bisectflow::jobs::sweep::{ReconciliationSweep, SweepConfig};
use bisectflow::store::{JobStore, MemoryJobStore};
use chrono::{Duration, Utc};
use common::{build_spec, running_job, FailingTransport, SpyTransport};
use serde_json::json;

const MAX_RETRIES: u32 = 3;

struct Fixture {
    store: Arc<MemoryJobStore>,
    ledger: Arc<MemoryRetryLedger>,
    sweep: ReconciliationSweep,
}

fn fixture(transport: Arc<dyn BuildTransport>) -> Fixture {
    let store = Arc::new(MemoryJobStore::new());
    let ledger = Arc::new(MemoryRetryLedger::new());
    let dispatch = Arc::new(BuildDispatchClient::new(
        Protocol::Modern,
        Endpoints::default(),
        transport,
    ));
    let sweep = ReconciliationSweep::new(
        store.clone(),
        ledger.clone(),
        dispatch,
        SweepConfig {
            staleness_threshold: Duration::hours(6),
            max_retries: MAX_RETRIES,
        },
    );
    Fixture {
        store,
        ledger,
        sweep,
    }
}

#[tokio::test]
async fn exhausted_retry_budget_fails_the_job_without_dispatching() {
    let transport = SpyTransport::new(json!({"id": "unused"}));
    let f = fixture(transport.clone());

    let job = running_job(Duration::hours(8));
    f.store.insert(&job).await.unwrap();
    f.ledger.set(job.id, MAX_RETRIES).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.failed, 1);
    assert!(transport.calls().is_empty());

    let stored = f.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    // The ledger is left alone on the failure path.
    assert_eq!(f.ledger.get(job.id).await.unwrap(), Some(MAX_RETRIES));
}

#[tokio::test]
async fn over_limit_ledger_entries_also_fail_the_job() {
    let transport = SpyTransport::new(json!({"id": "unused"}));
    let f = fixture(transport.clone());

    let job = running_job(Duration::hours(8));
    f.store.insert(&job).await.unwrap();
    f.ledger.set(job.id, MAX_RETRIES + 1).await.unwrap();

    f.sweep.run().await.unwrap();
    let stored = f.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn stale_job_below_budget_is_redispatched_once() {
    let transport = SpyTransport::new(json!({"id": "redispatched-build"}));
    let f = fixture(transport.clone());

    let job = running_job(Duration::hours(8));
    let progress_before = job.last_progress_time;
    f.store.insert(&job).await.unwrap();
    f.ledger.set(job.id, MAX_RETRIES - 1).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.redispatched, 1);
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(f.ledger.get(job.id).await.unwrap(), Some(MAX_RETRIES));

    let stored = f.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Running);
    assert_eq!(stored.dispatch_handle.as_deref(), Some("redispatched-build"));
    assert!(stored.last_progress_time > progress_before);
}

#[tokio::test]
async fn absent_ledger_entry_counts_as_zero_retries() {
    let transport = SpyTransport::new(json!({"id": "redispatched-build"}));
    let f = fixture(transport.clone());

    let job = running_job(Duration::hours(8));
    f.store.insert(&job).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.redispatched, 1);
    assert_eq!(f.ledger.get(job.id).await.unwrap(), Some(1));
}

#[tokio::test]
async fn fresh_running_jobs_are_left_alone() {
    let transport = SpyTransport::new(json!({"id": "unused"}));
    let f = fixture(transport.clone());

    let job = running_job(Duration::hours(1));
    f.store.insert(&job).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.fresh, 1);
    assert!(transport.calls().is_empty());

    let stored = f.store.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.dispatch_handle.as_deref(), Some("build-1"));
    assert_eq!(f.ledger.get(job.id).await.unwrap(), None);
}

#[tokio::test]
async fn queued_and_terminal_jobs_are_not_swept() {
    let transport = SpyTransport::new(json!({"id": "unused"}));
    let f = fixture(transport.clone());

    let mut queued = JobRecord::new("alice@example.com", build_spec());
    queued.last_progress_time = Utc::now() - Duration::hours(24);
    f.store.insert(&queued).await.unwrap();

    let mut cancelled = running_job(Duration::hours(24));
    cancelled.cancel("user asked".to_string()).unwrap();
    f.store.insert(&cancelled).await.unwrap();

    let mut failed = running_job(Duration::hours(24));
    failed.mark_failed().unwrap();
    f.store.insert(&failed).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(transport.calls().is_empty());

    assert_eq!(
        f.store.get(queued.id).await.unwrap().unwrap().state,
        JobState::Queued
    );
    assert_eq!(
        f.store.get(cancelled.id).await.unwrap().unwrap().state,
        JobState::Cancelled
    );
    assert_eq!(
        f.store.get(failed.id).await.unwrap().unwrap().state,
        JobState::Failed
    );
}

#[tokio::test]
async fn dispatch_failure_leaves_state_unchanged_and_the_sweep_alive() {
    let transport = FailingTransport::new();
    let f = fixture(transport.clone());

    let first = running_job(Duration::hours(8));
    let second = running_job(Duration::hours(9));
    f.store.insert(&first).await.unwrap();
    f.store.insert(&second).await.unwrap();

    let report = f.sweep.run().await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.errored, 2);
    // Both jobs got their dispatch attempt; neither aborted the other's.
    assert_eq!(transport.call_count(), 2);

    for job in [&first, &second] {
        let stored = f.store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Running);
        assert_eq!(stored.dispatch_handle.as_deref(), Some("build-1"));
        // The attempt still consumed retry budget.
        assert_eq!(f.ledger.get(job.id).await.unwrap(), Some(1));
    }
}
