use async_trait::async_trait;
use uuid::Uuid;

use crate::jobs::model::{JobRecord, JobState};

pub mod memory;
pub mod pg;

pub use memory::MemoryJobStore;
pub use pg::PgJobStore;

/// Durable job store. Writes of a single record are atomic with
/// last-write-wins semantics; nothing here assumes cross-record
/// transactions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &JobRecord) -> anyhow::Result<()>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<JobRecord>>;

    async fn list_by_state(&self, state: JobState) -> anyhow::Result<Vec<JobRecord>>;

    /// Replace the mutable fields of the record in one write.
    async fn update(&self, job: &JobRecord) -> anyhow::Result<()>;
}
