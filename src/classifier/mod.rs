//! Classifier adapters: the boundary between the job engine and the model.
//!
//! The engine only sees the [`Classifier`] trait. [`HttpClassifier`] talks to
//! a remote inference service, [`HeuristicClassifier`] is an offline fallback,
//! and [`BoundedClassifier`] caps how many calls run at once for backends that
//! cannot take unbounded concurrency.

pub mod client;
pub mod error;
pub mod heuristic;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::job::Label;

pub use client::HttpClassifier;
pub use error::ClassifierError;
pub use heuristic::HeuristicClassifier;

/// Raw classifier output before it is attached to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Percent, 0..100.
    pub confidence: f64,
    pub latency_seconds: f64,
}

impl Classification {
    /// Rejects output that cannot be recorded as a result.
    pub fn validated(self) -> Result<Self, ClassifierError> {
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} outside 0..=100",
                self.confidence
            )));
        }
        if !self.latency_seconds.is_finite() || self.latency_seconds < 0.0 {
            return Err(ClassifierError::InvalidResponse(format!(
                "latency {} is not a duration",
                self.latency_seconds
            )));
        }
        Ok(self)
    }
}

/// Maps text to a label/confidence/latency triple.
///
/// Implementations are shared by every worker and must be safe for
/// concurrent use.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError>;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        (**self).classify(text).await
    }
}

/// Funnels calls to an inner classifier through a fixed number of permits.
pub struct BoundedClassifier<C> {
    inner: C,
    permits: Semaphore,
}

impl<C: Classifier> BoundedClassifier<C> {
    pub fn new(inner: C, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<C: Classifier> Classifier for BoundedClassifier<C> {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ClassifierError::Panicked(e.to_string()))?;
        self.inner.classify(text).await
    }
}
