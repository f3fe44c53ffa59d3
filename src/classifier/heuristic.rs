use std::time::Instant;

use async_trait::async_trait;

use super::error::ClassifierError;
use super::{Classification, Classifier};
use crate::job::Label;

/// Phrases that lean towards machine-generated prose, with weights.
const AI_MARKERS: &[(&str, u32)] = &[
    ("as an ai", 20),
    ("delve", 10),
    ("it is important to note", 10),
    ("in conclusion", 8),
    ("furthermore", 6),
    ("moreover", 6),
    ("additionally", 5),
    ("tapestry", 8),
    ("comprehensive", 4),
    ("crucial", 4),
    ("landscape", 3),
    ("overall,", 3),
];

/// Phrases that lean towards casual human writing, with weights.
const HUMAN_MARKERS: &[(&str, u32)] = &[
    ("lol", 10),
    ("gonna", 8),
    ("wanna", 8),
    ("btw", 8),
    ("honestly", 5),
    ("yeah", 5),
    ("i think", 4),
    ("i'm", 3),
    ("don't", 2),
    ("can't", 2),
    ("!!", 4),
];

/// Offline weighted-keyword classifier used when no inference endpoint is
/// configured. Deterministic and safe for concurrent use.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    /// Returns `(label, confidence_percent)` for the given text.
    pub fn score(text: &str) -> (Label, f64) {
        let lower = text.to_lowercase();

        let weigh = |markers: &[(&str, u32)]| -> u32 {
            markers
                .iter()
                .filter(|(keyword, _)| lower.contains(keyword))
                .map(|&(_, weight)| weight)
                .sum()
        };
        let mut ai_score = weigh(AI_MARKERS) as f64;
        let human_score = weigh(HUMAN_MARKERS) as f64;

        // Long, evenly punctuated paragraphs read as generated.
        let word_count = lower.split_whitespace().count();
        if word_count > 120 {
            ai_score += 3.0;
        }

        let p_ai = 1.0 / (1.0 + (-(ai_score - human_score) / 10.0).exp());
        if p_ai > 0.5 {
            (Label::Ai, p_ai * 100.0)
        } else {
            (Label::Human, (1.0 - p_ai) * 100.0)
        }
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let started = Instant::now();
        let (label, confidence) = Self::score(text);
        Ok(Classification {
            label,
            confidence,
            latency_seconds: started.elapsed().as_secs_f64(),
        })
    }
}
