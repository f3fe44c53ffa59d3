//! Wires the queue, store, audit log, classifier and workers into one
//! running service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audit::AuditLog;
use crate::classifier::{BoundedClassifier, Classifier, HeuristicClassifier, HttpClassifier};
use crate::config::VeracityConfig;
use crate::error::VeracityError;
use crate::http::AppState;
use crate::queue::JobQueue;
use crate::service::{StatusService, SubmissionService};
use crate::store::ResultStore;
use crate::worker::{WorkerContext, WorkerPool};

/// A running instance: workers and the retention sweeper are live until
/// [`Veracity::shutdown`] is awaited.
pub struct Veracity {
    submissions: SubmissionService,
    status: StatusService,
    store: Arc<ResultStore>,
    queue: Arc<JobQueue>,
    audit: Arc<AuditLog>,
    pool: WorkerPool,
    sweeper: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Veracity {
    /// Opens the audit log and classifier named by `config`, then starts.
    pub fn open(config: &VeracityConfig) -> Result<Self, VeracityError> {
        let audit = Arc::new(AuditLog::open(&config.audit_db_path)?);
        let classifier = build_classifier(config)?;
        Ok(Self::start(config, classifier, audit))
    }

    /// Starts workers and the sweeper around the given collaborators. Must be
    /// called inside a Tokio runtime.
    pub fn start(
        config: &VeracityConfig,
        classifier: Arc<dyn Classifier>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let store = Arc::new(ResultStore::new(config.retention()));
        let queue = Arc::new(JobQueue::new(config.queue_capacity, config.backpressure()));
        let shutdown = CancellationToken::new();

        let pool = WorkerPool::spawn(
            config.workers,
            WorkerContext {
                queue: Arc::clone(&queue),
                store: Arc::clone(&store),
                audit: Arc::clone(&audit),
                classifier,
            },
            shutdown.child_token(),
        );
        let sweeper = spawn_sweeper(Arc::clone(&store), config.sweep_interval(), shutdown.child_token());

        info!(
            workers = pool.size(),
            queue_capacity = queue.capacity(),
            "veracity started"
        );

        Self {
            submissions: SubmissionService::new(Arc::clone(&store), Arc::clone(&queue)),
            status: StatusService::new(Arc::clone(&store)),
            store,
            queue,
            audit,
            pool,
            sweeper,
            shutdown,
        }
    }

    pub fn submissions(&self) -> &SubmissionService {
        &self.submissions
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// State handed to the HTTP router.
    pub fn http_state(&self) -> AppState {
        AppState {
            submissions: self.submissions.clone(),
            status: self.status.clone(),
            audit: Arc::clone(&self.audit),
        }
    }

    /// Stops workers between jobs and waits for them and the sweeper.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.pool.shutdown().await;
        let _ = self.sweeper.await;
        info!("veracity stopped");
    }
}

/// Picks the classifier for `config`: remote when a URL is set, heuristic
/// otherwise, optionally behind a concurrency bound.
pub fn build_classifier(config: &VeracityConfig) -> Result<Arc<dyn Classifier>, VeracityError> {
    let limit = config.classifier_concurrency;
    let classifier: Arc<dyn Classifier> = match &config.classifier_url {
        Some(url) => {
            info!(url = %url, "using remote classifier");
            let http = HttpClassifier::new(url.clone(), config.classifier_timeout())?;
            if limit > 0 {
                Arc::new(BoundedClassifier::new(http, limit))
            } else {
                Arc::new(http)
            }
        }
        None => {
            info!("no classifier_url configured, using heuristic classifier");
            if limit > 0 {
                Arc::new(BoundedClassifier::new(HeuristicClassifier, limit))
            } else {
                Arc::new(HeuristicClassifier)
            }
        }
    };
    Ok(classifier)
}

fn spawn_sweeper(
    store: Arc<ResultStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = store.evict_expired(Utc::now());
                    if evicted > 0 {
                        debug!(evicted, remaining = store.len(), "evicted expired jobs");
                    }
                }
            }
        }
    })
}
