use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::BuildDispatchClient;
use crate::jobs::cancel::{CancelRequest, CancellationGate};
use crate::jobs::errors::JobError;
use crate::jobs::model::{JobRecord, JobState};
use crate::jobs::sweep::ReconciliationSweep;
use crate::store::JobStore;

/// Header carrying the caller identity established by the fronting
/// authentication layer. Requests without it are treated as anonymous.
pub const IDENTITY_HEADER: &str = "x-authenticated-email";

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn JobStore>,
    pub gate: Arc<CancellationGate>,
    pub sweep: Arc<ReconciliationSweep>,
    pub dispatch: Arc<BuildDispatchClient>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/cancel", post(cancel_job))
        .route("/cron/refresh-jobs", get(refresh_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/build", get(get_job_build))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_status(err: &JobError) -> StatusCode {
    match err {
        JobError::Validation(_) | JobError::AlreadyTerminal { .. } => StatusCode::BAD_REQUEST,
        JobError::Unauthorized(_) => StatusCode::FORBIDDEN,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::DispatchUnavailable(_) => StatusCode::BAD_GATEWAY,
        JobError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: JobError) -> Response {
    (
        error_status(&err),
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn caller_identity(headers: &HeaderMap) -> Result<String, JobError> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| JobError::Unauthorized("anonymous".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    /// Absent fields fall through to the gate's required-field validation,
    /// which reports them as a 400, not a deserialization failure.
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub reason: String,
    /// Identity to act on behalf of; honored only for allow-listed callers.
    pub user: Option<String>,
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CancelBody>,
) -> Response {
    let requested_by = match caller_identity(&headers) {
        Ok(identity) => identity,
        Err(err) => return error_response(err),
    };

    let request = CancelRequest {
        job_id: body.job_id,
        reason: body.reason,
        requested_by,
        delegated_identity: body.user,
    };
    match state.gate.cancel(&request).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn refresh_jobs(State(state): State<ApiState>) -> Response {
    match state.sweep.run().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: format!("sweep failed: {err}"),
            }),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub owner_email: String,
    pub state: JobState,
    pub dispatch_handle: Option<String>,
    pub last_progress_time: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.id,
            owner_email: job.owner_email,
            state: job.state,
            dispatch_handle: job.dispatch_handle,
            last_progress_time: job.last_progress_time,
            cancel_reason: job.cancel_reason,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

pub async fn get_job(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    match state.store.get(id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(JobView::from(job))).into_response(),
        Ok(None) => error_response(JobError::NotFound(id.to_string())),
        Err(err) => error_response(JobError::Storage(err)),
    }
}

/// Live status of the job's in-flight remote build.
pub async fn get_job_build(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let job = match state.store.get(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return error_response(JobError::NotFound(id.to_string())),
        Err(err) => return error_response(JobError::Storage(err)),
    };
    let Some(handle) = job.dispatch_handle else {
        return error_response(JobError::NotFound(format!(
            "job {id} has no dispatched build"
        )));
    };

    match state.dispatch.query_status(&handle).await {
        Ok(build) => (StatusCode::OK, Json(build)).into_response(),
        Err(err) => error_response(err.into()),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
