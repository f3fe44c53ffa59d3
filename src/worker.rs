//! Worker loops: dequeue a job, classify it, record the outcome.
//!
//! Every worker shares the queue, the result store, the audit log and one
//! long-lived classifier handle. Nothing that happens while processing a
//! single job can end the loop; only the shutdown token does.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::classifier::{Classification, Classifier, ClassifierError};
use crate::job::{ClassificationResult, JobStatus, Transition};
use crate::queue::JobQueue;
use crate::store::ResultStore;

/// Shared handles a worker needs to process jobs.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub store: Arc<ResultStore>,
    pub audit: Arc<AuditLog>,
    pub classifier: Arc<dyn Classifier>,
}

/// A fixed set of worker tasks draining the same queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn spawn(size: usize, ctx: WorkerContext, shutdown: CancellationToken) -> Self {
        let handles = (0..size.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker_loop(worker, ctx, shutdown).await })
            })
            .collect();
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker to stop after its current job and wait for them.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(worker: usize, ctx: WorkerContext, shutdown: CancellationToken) {
    info!(worker, "worker started");
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!(worker, "worker: shutdown signal received");
                break;
            }
            next = ctx.queue.dequeue() => {
                let Some(job_id) = next else {
                    info!(worker, "worker: queue closed");
                    break;
                };
                process_job(worker, &ctx, &job_id).await;
            }
        }
    }
}

/// Runs one job through `Pending → Processing → Complete | Failed`.
///
/// Returns the terminal status reached, or `None` if this worker did not own
/// the job (already taken, or evicted).
pub(crate) async fn process_job(
    worker: usize,
    ctx: &WorkerContext,
    job_id: &str,
) -> Option<JobStatus> {
    let job = match ctx
        .store
        .compare_and_transition(job_id, JobStatus::Pending, Transition::Start)
    {
        Ok(job) => job,
        Err(e) => {
            warn!(worker, job_id, error = %e, "skipping job");
            return None;
        }
    };

    let started = Instant::now();
    let outcome = invoke_classifier(Arc::clone(&ctx.classifier), job.text.clone())
        .await
        .and_then(Classification::validated);
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(classification) => {
            let result = ClassificationResult::new(
                classification.label,
                classification.confidence,
                classification.latency_seconds,
            );
            record_audit(worker, ctx, job_id, &job.text, &result).await;
            finish(worker, ctx, job_id, Transition::Complete(result), latency_ms)
        }
        Err(e) => {
            warn!(worker, job_id, error = %e, latency_ms, "classification failed");
            finish(worker, ctx, job_id, Transition::Fail(e.to_string()), latency_ms)
        }
    }
}

/// Runs the classifier on its own task so a panic becomes a job failure
/// instead of taking the worker down.
async fn invoke_classifier(
    classifier: Arc<dyn Classifier>,
    text: String,
) -> Result<Classification, ClassifierError> {
    let call = tokio::spawn(async move { classifier.classify(&text).await });
    match call.await {
        Ok(outcome) => outcome,
        Err(e) => Err(ClassifierError::Panicked(e.to_string())),
    }
}

/// Appends the audit record. A failure here is logged and otherwise ignored:
/// the job still completes with its correct result.
async fn record_audit(
    worker: usize,
    ctx: &WorkerContext,
    job_id: &str,
    text: &str,
    result: &ClassificationResult,
) {
    let audit = Arc::clone(&ctx.audit);
    let (id, text, owned) = (job_id.to_string(), text.to_string(), result.clone());
    let appended = tokio::task::spawn_blocking(move || audit.append(&id, &text, &owned)).await;

    match appended {
        Ok(Ok(record)) => {
            debug!(worker, job_id, sequence_id = record.sequence_id, "audit record written");
        }
        Ok(Err(e)) => {
            error!(worker, job_id, error = %e, "audit write failed");
        }
        Err(e) => {
            error!(worker, job_id, error = %e, "audit write task aborted");
        }
    }
}

fn finish(
    worker: usize,
    ctx: &WorkerContext,
    job_id: &str,
    transition: Transition,
    latency_ms: u64,
) -> Option<JobStatus> {
    match ctx
        .store
        .compare_and_transition(job_id, JobStatus::Processing, transition)
    {
        Ok(job) => {
            info!(worker, job_id, status = %job.status, latency_ms, "job finished");
            Some(job.status)
        }
        Err(e) => {
            error!(worker, job_id, error = %e, "could not record job outcome");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, Label};
    use crate::queue::Backpressure;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns a fixed classification, or fails for text containing "boom".
    struct StubClassifier {
        calls: AtomicUsize,
    }

    impl StubClassifier {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("panic") {
                panic!("model exploded");
            }
            if text.contains("overconfident") {
                return Ok(Classification {
                    label: Label::Ai,
                    confidence: 250.0,
                    latency_seconds: 0.01,
                });
            }
            if text.contains("boom") {
                return Err(ClassifierError::InvalidResponse("boom".into()));
            }
            Ok(Classification {
                label: Label::Human,
                confidence: 92.5,
                latency_seconds: 0.01,
            })
        }
    }

    fn context(classifier: Arc<dyn Classifier>) -> WorkerContext {
        WorkerContext {
            queue: Arc::new(JobQueue::new(16, Backpressure::Reject)),
            store: Arc::new(ResultStore::new(Duration::from_secs(60))),
            audit: Arc::new(AuditLog::open_in_memory().unwrap()),
            classifier,
        }
    }

    fn pending(ctx: &WorkerContext, text: &str) -> String {
        let job = Job::new(text.into());
        let id = job.id.clone();
        ctx.store.put(job).unwrap();
        id
    }

    #[tokio::test]
    async fn successful_job_completes_and_is_audited() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let id = pending(&ctx, "Hello world");

        assert_eq!(process_job(0, &ctx, &id).await, Some(JobStatus::Complete));

        let job = ctx.store.get(&id).unwrap();
        let result = job.result.unwrap();
        assert_eq!(result, ClassificationResult::new(Label::Human, 92.5, 0.01));

        let record = ctx.audit.find_by_job(&id).unwrap().unwrap();
        assert_eq!(record.label, result.label);
        assert_eq!(record.confidence, result.confidence);
        assert_eq!(record.latency_seconds, result.processing_time_seconds);
    }

    #[tokio::test]
    async fn classifier_error_fails_job_without_audit() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let id = pending(&ctx, "boom");

        assert_eq!(process_job(0, &ctx, &id).await, Some(JobStatus::Failed));

        let job = ctx.store.get(&id).unwrap();
        assert_eq!(job.error.as_deref(), Some("invalid classifier response: boom"));
        assert!(ctx.audit.find_by_job(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_range_classification_fails_job_without_audit() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let id = pending(&ctx, "overconfident");

        assert_eq!(process_job(0, &ctx, &id).await, Some(JobStatus::Failed));
        let job = ctx.store.get(&id).unwrap();
        assert!(job.result.is_none());
        assert!(job.error.unwrap().contains("outside 0..=100"));
        assert_eq!(ctx.audit.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn classifier_panic_fails_job() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let id = pending(&ctx, "please panic");

        assert_eq!(process_job(0, &ctx, &id).await, Some(JobStatus::Failed));
        let error = ctx.store.get(&id).unwrap().error.unwrap();
        assert!(error.starts_with("classifier panicked"), "{error}");
    }

    #[tokio::test]
    async fn audit_failure_does_not_downgrade_job() {
        let ctx = context(Arc::new(StubClassifier::new()));
        ctx.audit.break_storage();
        let id = pending(&ctx, "Hello world");

        assert_eq!(process_job(0, &ctx, &id).await, Some(JobStatus::Complete));
        assert!(ctx.store.get(&id).unwrap().result.is_some());
    }

    #[tokio::test]
    async fn job_already_taken_is_skipped() {
        let stub = Arc::new(StubClassifier::new());
        let ctx = context(stub.clone());
        let id = pending(&ctx, "Hello world");
        ctx.store
            .compare_and_transition(&id, JobStatus::Pending, Transition::Start)
            .unwrap();

        assert_eq!(process_job(0, &ctx, &id).await, None);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.audit.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_job_is_skipped() {
        let ctx = context(Arc::new(StubClassifier::new()));
        assert_eq!(process_job(0, &ctx, "does-not-exist").await, None);
    }

    #[tokio::test]
    async fn duplicate_delivery_completes_once() {
        let stub = Arc::new(StubClassifier::new());
        let ctx = context(stub.clone());
        let id = pending(&ctx, "Hello world");

        let (a, b) = tokio::join!(process_job(0, &ctx, &id), process_job(1, &ctx, &id));
        let finished = [a, b].into_iter().flatten().count();
        assert_eq!(finished, 1);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.audit.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn pool_keeps_running_after_failures() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let ids: Vec<String> = ["boom", "please panic", "Hello world", "boom again", "fine"]
            .iter()
            .map(|text| pending(&ctx, text))
            .collect();
        for id in &ids {
            ctx.queue.enqueue(id.clone()).await.unwrap();
        }

        let pool = WorkerPool::spawn(2, ctx.clone(), CancellationToken::new());
        assert_eq!(pool.size(), 2);

        for _ in 0..200 {
            let done = ids
                .iter()
                .filter(|id| ctx.store.get(id).unwrap().status.is_terminal())
                .count();
            if done == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await;

        assert_eq!(ctx.store.count_in(JobStatus::Complete), 2);
        assert_eq!(ctx.store.count_in(JobStatus::Failed), 3);
        assert_eq!(ctx.audit.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let ctx = context(Arc::new(StubClassifier::new()));
        let pool = WorkerPool::spawn(3, ctx, CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .expect("workers should stop promptly");
    }
}
