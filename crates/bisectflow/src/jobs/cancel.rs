use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::jobs::errors::JobError;
use crate::jobs::model::JobState;
use crate::store::JobStore;

/// Stored cancellation reasons are capped at 255 characters; longer input
/// keeps the first 252 characters and gains an ellipsis marker.
const REASON_MAX_CHARS: usize = 255;
const REASON_KEEP_CHARS: usize = 252;
const REASON_ELLIPSIS: &str = "...";

/// One cancellation attempt. Not persisted beyond the gate's execution.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    pub job_id: String,
    pub reason: String,
    pub requested_by: String,
    /// Identity the caller claims to act on behalf of; honored only when the
    /// caller is on the delegation allow-list.
    pub delegated_identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelReceipt {
    pub job_id: Uuid,
    pub state: JobState,
}

/// Who may act as whom. The administrator set and the delegation allow-list
/// are separate policies: delegation changes the effective identity,
/// owner-or-admin decides whether that identity may cancel.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    administrators: HashSet<String>,
    delegation_allowlist: HashSet<String>,
}

impl AccessPolicy {
    pub fn new(
        administrators: impl IntoIterator<Item = String>,
        delegators: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            administrators: administrators.into_iter().collect(),
            delegation_allowlist: delegators.into_iter().collect(),
        }
    }

    pub fn is_administrator(&self, identity: &str) -> bool {
        self.administrators.contains(identity)
    }

    pub fn may_delegate(&self, identity: &str) -> bool {
        self.delegation_allowlist.contains(identity)
    }

    /// A non-allow-listed caller's delegation is ignored, not rejected: they
    /// simply act as themselves.
    pub fn effective_identity<'a>(
        &self,
        requested_by: &'a str,
        delegated: Option<&'a str>,
    ) -> &'a str {
        match delegated {
            Some(identity) if self.may_delegate(requested_by) => identity,
            _ => requested_by,
        }
    }
}

pub struct CancellationGate {
    store: Arc<dyn JobStore>,
    policy: AccessPolicy,
}

impl CancellationGate {
    pub fn new(store: Arc<dyn JobStore>, policy: AccessPolicy) -> Self {
        Self { store, policy }
    }

    /// Validate, authorize and execute one cancellation. Order of checks:
    /// required fields, job lookup, effective identity, owner-or-admin,
    /// then the state transition.
    pub async fn cancel(&self, request: &CancelRequest) -> Result<CancelReceipt, JobError> {
        if request.job_id.trim().is_empty() {
            return Err(JobError::Validation("job_id is required".to_string()));
        }
        if request.reason.trim().is_empty() {
            return Err(JobError::Validation("reason is required".to_string()));
        }
        if request.requested_by.trim().is_empty() {
            return Err(JobError::Unauthorized("anonymous".to_string()));
        }

        // An id that does not even parse names no job we know of.
        let job_id = Uuid::parse_str(request.job_id.trim())
            .map_err(|_| JobError::NotFound(request.job_id.clone()))?;
        let mut job = self
            .store
            .get(job_id)
            .await
            .map_err(JobError::Storage)?
            .ok_or_else(|| JobError::NotFound(request.job_id.clone()))?;

        let identity = self
            .policy
            .effective_identity(&request.requested_by, request.delegated_identity.as_deref());
        if !self.policy.is_administrator(identity) && identity != job.owner_email {
            return Err(JobError::Unauthorized(identity.to_string()));
        }

        job.cancel(normalize_reason(&request.reason))?;
        self.store.update(&job).await.map_err(JobError::Storage)?;

        tracing::info!(job_id = %job.id, cancelled_by = identity, "job cancelled");

        Ok(CancelReceipt {
            job_id: job.id,
            state: job.state,
        })
    }
}

/// Counted in characters, not bytes: 255 stays verbatim, anything longer
/// becomes the first 252 characters plus `...`, exactly 255 total.
pub fn normalize_reason(reason: &str) -> String {
    if reason.chars().count() > REASON_MAX_CHARS {
        let mut truncated: String = reason.chars().take(REASON_KEEP_CHARS).collect();
        truncated.push_str(REASON_ELLIPSIS);
        truncated
    } else {
        reason.to_string()
    }
}
