use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

/// Ephemeral per-job re-dispatch counters, kept apart from the durable job
/// record. Entries may be evicted at any time; an absent entry reads as zero
/// retries. Duplicate-build safety does not depend on this ledger: the
/// remote protocol's idempotency token covers that.
#[async_trait]
pub trait RetryLedger: Send + Sync {
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<u32>>;
    async fn set(&self, job_id: Uuid, retries: u32) -> anyhow::Result<()>;
}

/// In-process ledger. Counters vanish on restart, which resets the retry
/// budget in the lenient direction.
#[derive(Default)]
pub struct MemoryRetryLedger {
    entries: Mutex<HashMap<Uuid, u32>>,
}

impl MemoryRetryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryLedger for MemoryRetryLedger {
    async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<u32>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&job_id).copied())
    }

    async fn set(&self, job_id: Uuid, retries: u32) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(job_id, retries);
        Ok(())
    }
}
