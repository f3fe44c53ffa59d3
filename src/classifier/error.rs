//! Error types for classifier adapters.

use thiserror::Error;

/// Errors a classifier invocation can produce.
///
/// Every variant ends up as the `error` text of a `Failed` job; none of them
/// ever escapes a worker loop.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The inference service answered with a non-success HTTP status.
    #[error("inference API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure (DNS, connection refused, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered but the body could not be interpreted.
    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),

    /// The classifier panicked while handling the text.
    #[error("classifier panicked: {0}")]
    Panicked(String),
}
