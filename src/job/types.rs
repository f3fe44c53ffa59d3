use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobStatus;

/// The closed set of labels a classification can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Human-written")]
    Human,
    #[serde(rename = "AI-generated")]
    Ai,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Human => "Human-written",
            Label::Ai => "AI-generated",
        }
    }

    /// Maps a model class index (0 = human, 1 = AI) to a label.
    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Human),
            1 => Some(Label::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    /// Accepts both the display form and the short adapter form (`human` / `ai`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human-written" | "human" => Ok(Label::Human),
            "ai-generated" | "ai" => Ok(Label::Ai),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

/// Outcome attached to a job once classification succeeds. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Confidence in percent, two decimals.
    pub confidence: f64,
    /// Processing latency in seconds, four decimals.
    pub processing_time_seconds: f64,
}

impl ClassificationResult {
    pub fn new(label: Label, confidence: f64, latency_seconds: f64) -> Self {
        Self {
            label,
            confidence: round_to(confidence.clamp(0.0, 100.0), 2),
            processing_time_seconds: round_to(latency_seconds.max(0.0), 4),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One submitted classification request and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub text: String,
    pub status: JobStatus,
    pub result: Option<ClassificationResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(text: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            text,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}
