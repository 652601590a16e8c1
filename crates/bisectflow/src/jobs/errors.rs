use thiserror::Error;
use uuid::Uuid;

use crate::dispatch::DispatchError;
use crate::jobs::model::JobState;

/// Caller-facing error taxonomy for job operations. The HTTP layer maps
/// these onto status codes; nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no job with id {0:?}")]
    NotFound(String),

    #[error("{0} is not allowed to modify this job")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    /// Expected race: the job reached a terminal state before this request
    /// got to it. A client error, not a server error.
    #[error("job {job_id} is already in terminal state {state}")]
    AlreadyTerminal { job_id: Uuid, state: JobState },

    /// Transient remote failure; retried on a later reconciliation cycle.
    #[error("build dispatch unavailable: {0}")]
    DispatchUnavailable(String),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<DispatchError> for JobError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidBucketFormat(_) | DispatchError::InvalidRequest(_) => {
                JobError::Validation(err.to_string())
            }
            DispatchError::Unavailable(_) | DispatchError::BadResponse(_) => {
                JobError::DispatchUnavailable(err.to_string())
            }
        }
    }
}
