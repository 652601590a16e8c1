use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::errors::JobError;

/// Dispatch parameters a job was created with. The reconciliation sweep
/// re-sends these verbatim when it re-schedules a stale build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    pub bucket: String,
    /// Flat `"key:value"` tag strings, the form both remote protocols accept.
    pub tags: Vec<String>,
    /// Opaque build parameters. `builder_name` and `properties` (including
    /// `properties.patch_project`) are the fields the modern protocol pulls
    /// apart; the legacy protocol sends the whole value as one blob.
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "Queued",
            JobState::Running => "Running",
            JobState::Completed => "Completed",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "Queued" => Some(JobState::Queued),
            "Running" => Some(JobState::Running),
            "Completed" => Some(JobState::Completed),
            "Failed" => Some(JobState::Failed),
            "Cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    /// Completed, Failed and Cancelled admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bisection job and its lifecycle state.
///
/// `dispatch_handle` references the remote service's in-flight work item and
/// is only meaningful once the job has been dispatched; `last_progress_time`
/// is the staleness clock the sweep reads.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub owner_email: String,
    pub state: JobState,
    pub dispatch_handle: Option<String>,
    pub last_progress_time: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub build: BuildSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(owner_email: impl Into<String>, build: BuildSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_email: owner_email.into(),
            state: JobState::Queued,
            dispatch_handle: None,
            last_progress_time: now,
            cancel_reason: None,
            build,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn running(&self) -> bool {
        self.state == JobState::Running
    }

    /// Queued -> Running on first dispatch, or Running -> Running on a
    /// re-dispatch. Stores the new handle and resets the staleness clock.
    pub fn mark_running(&mut self, dispatch_handle: String) -> Result<(), JobError> {
        match self.state {
            JobState::Queued | JobState::Running => {
                self.state = JobState::Running;
                self.dispatch_handle = Some(dispatch_handle);
                self.last_progress_time = Utc::now();
                self.touch();
                Ok(())
            }
            state => Err(JobError::AlreadyTerminal {
                job_id: self.id,
                state,
            }),
        }
    }

    /// Running -> Running: the remote work was observed alive, refresh the
    /// staleness clock without touching the handle.
    pub fn touch_progress(&mut self) -> Result<(), JobError> {
        match self.state {
            JobState::Running => {
                self.last_progress_time = Utc::now();
                self.touch();
                Ok(())
            }
            state if state.is_terminal() => Err(JobError::AlreadyTerminal {
                job_id: self.id,
                state,
            }),
            state => Err(JobError::Validation(format!(
                "job {} is {state}, not Running",
                self.id
            ))),
        }
    }

    pub fn mark_completed(&mut self) -> Result<(), JobError> {
        self.finish(JobState::Completed)
    }

    pub fn mark_failed(&mut self) -> Result<(), JobError> {
        self.finish(JobState::Failed)
    }

    /// {Queued, Running} -> Cancelled. `reason` must already be normalized
    /// by the cancellation gate.
    pub fn cancel(&mut self, reason: String) -> Result<(), JobError> {
        if self.state.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                job_id: self.id,
                state: self.state,
            });
        }
        self.state = JobState::Cancelled;
        self.cancel_reason = Some(reason);
        self.touch();
        Ok(())
    }

    fn finish(&mut self, to: JobState) -> Result<(), JobError> {
        match self.state {
            JobState::Running => {
                self.state = to;
                self.touch();
                Ok(())
            }
            state if state.is_terminal() => Err(JobError::AlreadyTerminal {
                job_id: self.id,
                state,
            }),
            state => Err(JobError::Validation(format!(
                "job {} cannot reach {to} from {state}",
                self.id
            ))),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
