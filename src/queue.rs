//! Bounded FIFO hand-off of job ids from submitters to workers.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};

use crate::error::VeracityError;

/// What `enqueue` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Fail with `Overloaded` immediately.
    Reject,
    /// Wait up to `timeout` for a free slot, then fail with `Overloaded`.
    Block { timeout: Duration },
}

/// Config-file spelling of [`Backpressure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    #[default]
    Reject,
    Block,
}

/// Multi-producer, multi-consumer job queue.
///
/// Ids come out in the order they went in. Consumers take turns on the
/// receiver, so each id is delivered to exactly one worker.
pub struct JobQueue {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    capacity: usize,
    policy: Backpressure,
}

impl JobQueue {
    pub fn new(capacity: usize, policy: Backpressure) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            policy,
        }
    }

    pub async fn enqueue(&self, job_id: String) -> Result<(), VeracityError> {
        let overloaded = VeracityError::Overloaded {
            capacity: self.capacity,
        };
        match self.policy {
            Backpressure::Reject => self.tx.try_send(job_id).map_err(|_| overloaded),
            Backpressure::Block { timeout } => self
                .tx
                .send_timeout(job_id, timeout)
                .await
                .map_err(|_| overloaded),
        }
    }

    /// Waits for the next job id. Returns `None` once the queue is closed and
    /// drained.
    pub async fn dequeue(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    /// Takes the next id if one is ready, without waiting.
    pub async fn try_dequeue(&self) -> Option<String> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Number of ids waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> Backpressure {
        self.policy
    }
}
