//! Public entry points: submit text, poll for the outcome.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::VeracityError;
use crate::job::{ClassificationResult, Job, JobStatus};
use crate::queue::JobQueue;
use crate::store::ResultStore;

/// Accepts text, registers a `Pending` job and queues it. Never waits on
/// classification.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<ResultStore>,
    queue: Arc<JobQueue>,
}

impl SubmissionService {
    pub fn new(store: Arc<ResultStore>, queue: Arc<JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Returns the new job's id once it is queued.
    ///
    /// Whitespace-only text fails with `InvalidInput`. A full queue fails with
    /// `Overloaded` (immediately or after the configured wait) and leaves no
    /// job behind.
    pub async fn submit(&self, text: &str) -> Result<String, VeracityError> {
        if text.trim().is_empty() {
            return Err(VeracityError::InvalidInput(
                "text must not be empty".to_string(),
            ));
        }

        let job = Job::new(text.to_string());
        let job_id = job.id.clone();
        self.store.put(job)?;

        if let Err(e) = self.queue.enqueue(job_id.clone()).await {
            self.store.withdraw(&job_id);
            warn!(job_id = %job_id, error = %e, "submission rejected");
            return Err(e);
        }

        debug!(job_id = %job_id, depth = self.queue.depth(), "job queued");
        Ok(job_id)
    }
}

/// Caller-facing view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobView {
    Processing,
    Complete { result: ClassificationResult },
    Failed { error: String },
}

impl JobView {
    pub fn from_job(job: &Job) -> Self {
        match (job.status, &job.result) {
            (JobStatus::Complete, Some(result)) => JobView::Complete {
                result: result.clone(),
            },
            (JobStatus::Failed, _) => JobView::Failed {
                error: job
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            _ => JobView::Processing,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, JobView::Processing)
    }
}

/// Answers status queries with a single store lookup.
#[derive(Clone)]
pub struct StatusService {
    store: Arc<ResultStore>,
}

impl StatusService {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }

    pub fn status(&self, job_id: &str) -> Result<JobView, VeracityError> {
        self.store.get(job_id).map(|job| JobView::from_job(&job))
    }
}
