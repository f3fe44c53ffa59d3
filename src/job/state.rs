use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::types::{ClassificationResult, Job};
use crate::error::VeracityError;

/// Lifecycle states of a job.
///
/// Each job flows through: PENDING → PROCESSING → COMPLETE | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    /// `Complete` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Complete)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A requested state change, carrying the payload the target state needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A worker picked the job up.
    Start,
    /// Classification succeeded.
    Complete(ClassificationResult),
    /// Classification failed with the given cause.
    Fail(String),
}

impl Transition {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Processing,
            Transition::Complete(_) => JobStatus::Complete,
            Transition::Fail(_) => JobStatus::Failed,
        }
    }
}

/// Applies transitions to a `Job`, enforcing the lifecycle rules.
pub struct StateMachine;

impl StateMachine {
    /// Move `job` from `expected` to the transition's target state.
    ///
    /// Fails with `Conflict` when the job is not in `expected` (a second worker
    /// racing for the same job) and with `InvalidTransition` when the edge is
    /// not part of the lifecycle. On error the job is left untouched.
    pub fn apply(
        job: &mut Job,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<(), VeracityError> {
        if job.status != expected {
            return Err(VeracityError::Conflict {
                job_id: job.id.clone(),
                expected,
                actual: job.status,
            });
        }

        let next = transition.target();
        if !job.status.can_transition_to(next) {
            return Err(VeracityError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        let now = Utc::now();
        match transition {
            Transition::Start => {}
            Transition::Complete(result) => {
                job.result = Some(result);
                job.finished_at = Some(now);
            }
            Transition::Fail(reason) => {
                job.error = Some(reason);
                job.finished_at = Some(now);
            }
        }
        job.status = next;
        job.updated_at = now;
        Ok(())
    }
}
