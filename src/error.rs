use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum VeracityError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Queue is full ({capacity} pending jobs), retry later")]
    Overloaded { capacity: usize },

    #[error("Job {job_id} is {actual}, expected {expected}")]
    Conflict {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Audit log error: {0}")]
    Audit(#[from] AuditError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl VeracityError {
    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VeracityError::InvalidInput(_) => "invalid_input",
            VeracityError::NotFound(_) => "not_found",
            VeracityError::Overloaded { .. } => "overloaded",
            VeracityError::Conflict { .. } => "conflict",
            VeracityError::InvalidTransition { .. } => "invalid_transition",
            VeracityError::Classifier(_) => "classifier_failure",
            VeracityError::Audit(_) => "audit_write_failure",
            VeracityError::Config(_) => "config_error",
            VeracityError::Io(_) => "io_error",
            VeracityError::Toml(_) => "config_error",
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VeracityError::Overloaded { .. })
    }
}

/// Failures of the durable audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit log not found at {}", .0.display())]
    Missing(std::path::PathBuf),

    #[error("corrupt audit row: {0}")]
    Corrupt(String),

    #[error("audit task aborted: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display() {
        let err = VeracityError::Conflict {
            job_id: "abc123".into(),
            expected: JobStatus::Pending,
            actual: JobStatus::Complete,
        };
        assert_eq!(err.to_string(), "Job abc123 is complete, expected pending");
    }

    #[test]
    fn only_overloaded_is_retryable() {
        assert!(VeracityError::Overloaded { capacity: 4 }.is_retryable());
        assert!(!VeracityError::NotFound("x".into()).is_retryable());
        assert!(!VeracityError::InvalidInput("empty".into()).is_retryable());
    }

    #[test]
    fn error_codes() {
        assert_eq!(VeracityError::InvalidInput("".into()).code(), "invalid_input");
        assert_eq!(VeracityError::NotFound("x".into()).code(), "not_found");
        assert_eq!(VeracityError::Overloaded { capacity: 1 }.code(), "overloaded");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VeracityError>();
        assert_send_sync::<AuditError>();
    }
}
