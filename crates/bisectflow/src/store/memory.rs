use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::jobs::model::{JobRecord, JobState};
use crate::store::JobStore;

/// Map-backed store for tests and database-less dev runs. Each insert or
/// update replaces the whole record in one step.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &JobRecord) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<JobRecord>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(&id).cloned())
    }

    async fn list_by_state(&self, state: JobState) -> anyhow::Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<JobRecord> =
            jobs.values().filter(|j| j.state == state).cloned().collect();
        matching.sort_by_key(|j| j.created_at);
        Ok(matching)
    }

    async fn update(&self, job: &JobRecord) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}
