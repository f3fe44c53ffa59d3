//! Keyed store of job state, the single source of truth for status queries.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::VeracityError;
use crate::job::{Job, JobStatus, StateMachine, Transition};

/// Concurrent map from job id to job.
///
/// Writers to the same key are serialized by the shard lock held during
/// [`ResultStore::compare_and_transition`], which is the only way a job's
/// state advances.
pub struct ResultStore {
    jobs: DashMap<String, Job>,
    retention: TimeDelta,
}

impl ResultStore {
    /// `retention` is how long terminal jobs stay visible after finishing.
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Inserts a freshly created job. Ids are never reused.
    pub fn put(&self, job: Job) -> Result<(), VeracityError> {
        match self.jobs.entry(job.id.clone()) {
            Entry::Occupied(existing) => Err(VeracityError::Conflict {
                job_id: job.id,
                expected: JobStatus::Pending,
                actual: existing.get().status,
            }),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Result<Job, VeracityError> {
        self.jobs
            .get(job_id)
            .map(|job| job.value().clone())
            .ok_or_else(|| VeracityError::NotFound(job_id.to_string()))
    }

    /// Advances `job_id` from `expected` to the transition's target state and
    /// returns the updated job.
    pub fn compare_and_transition(
        &self,
        job_id: &str,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Job, VeracityError> {
        let mut job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| VeracityError::NotFound(job_id.to_string()))?;
        StateMachine::apply(&mut job, expected, transition)?;
        Ok(job.value().clone())
    }

    /// Removes a job that was never handed to the queue. Only `Pending` jobs
    /// can be withdrawn.
    pub fn withdraw(&self, job_id: &str) -> bool {
        self.jobs
            .remove_if(job_id, |_, job| job.status == JobStatus::Pending)
            .is_some()
    }

    /// Drops terminal jobs that finished more than the retention horizon
    /// before `now`. Returns how many were evicted.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| !self.is_expired(job, now));
        before.saturating_sub(self.jobs.len())
    }

    fn is_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        if !job.status.is_terminal() {
            return false;
        }
        match job.finished_at {
            Some(finished) => now.signed_duration_since(finished) >= self.retention,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs currently in `status`.
    pub fn count_in(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }
}
