//! Wire types for the remote inference service.

use serde::{Deserialize, Serialize};

/// Body posted to the inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

/// Body returned by the inference endpoint.
///
/// Services either report the decision directly (`label` + `confidence`) or
/// hand back the raw class probabilities `[p_human, p_ai]`, in which case the
/// argmax is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub label: Option<String>,
    /// Percent, 0..100.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
    /// Latency measured by the service itself, if it reports one.
    #[serde(default, rename = "latencySeconds", alias = "latency_seconds")]
    pub latency_seconds: Option<f64>,
}
