use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{BuildSpec, JobRecord, JobState};
use crate::store::JobStore;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    owner_email: String,
    state: String,
    dispatch_handle: Option<String>,
    last_progress_time: DateTime<Utc>,
    cancel_reason: Option<String>,
    bucket: String,
    tags: Vec<String>,
    parameters: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> anyhow::Result<JobRecord> {
        let state = JobState::parse(&row.state).ok_or_else(|| {
            anyhow::anyhow!("unknown job state {:?} stored for job {}", row.state, row.id)
        })?;
        Ok(JobRecord {
            id: row.id,
            owner_email: row.owner_email,
            state,
            dispatch_handle: row.dispatch_handle,
            last_progress_time: row.last_progress_time,
            cancel_reason: row.cancel_reason,
            build: BuildSpec {
                bucket: row.bucket,
                tags: row.tags,
                parameters: row.parameters,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &JobRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, owner_email, state, dispatch_handle, last_progress_time,
                cancel_reason, bucket, tags, parameters, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.owner_email)
        .bind(job.state.as_str())
        .bind(&job.dispatch_handle)
        .bind(job.last_progress_time)
        .bind(&job.cancel_reason)
        .bind(&job.build.bucket)
        .bind(&job.build.tags)
        .bind(&job.build.parameters)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn list_by_state(&self, state: JobState) -> anyhow::Result<Vec<JobRecord>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT *
            FROM jobs
            WHERE state = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn update(&self, job: &JobRecord) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = $2,
                dispatch_handle = $3,
                last_progress_time = $4,
                cancel_reason = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.state.as_str())
        .bind(&job.dispatch_handle)
        .bind(job.last_progress_time)
        .bind(&job.cancel_reason)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
