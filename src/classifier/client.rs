use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use super::error::ClassifierError;
use super::types::{ClassifyRequest, ClassifyResponse};
use super::{Classification, Classifier};
use crate::job::Label;

/// Classifier backed by a remote inference service speaking JSON over HTTP.
pub struct HttpClassifier {
    client: Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest {
                text: text.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<ClassifyResponse>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let (label, confidence) = interpret(&body)?;

        Ok(Classification {
            label,
            confidence,
            latency_seconds: body
                .latency_seconds
                .unwrap_or_else(|| started.elapsed().as_secs_f64()),
        })
    }
}

fn interpret(body: &ClassifyResponse) -> Result<(Label, f64), ClassifierError> {
    if let Some(raw) = &body.label {
        let label = raw
            .parse::<Label>()
            .map_err(ClassifierError::InvalidResponse)?;
        let confidence = body.confidence.ok_or_else(|| {
            ClassifierError::InvalidResponse("label without confidence".to_string())
        })?;
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {confidence} outside 0..=100"
            )));
        }
        return Ok((label, confidence));
    }

    let probabilities = body.probabilities.as_deref().ok_or_else(|| {
        ClassifierError::InvalidResponse("neither label nor probabilities present".to_string())
    })?;
    if probabilities.len() != 2 {
        return Err(ClassifierError::InvalidResponse(format!(
            "expected 2 class probabilities, got {}",
            probabilities.len()
        )));
    }

    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || !(0.0..=1.0).contains(*p))
    {
        return Err(ClassifierError::InvalidResponse(format!(
            "probability {bad} outside 0..=1"
        )));
    }

    let (index, p) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
    let label = Label::from_class_index(index)
        .ok_or_else(|| ClassifierError::InvalidResponse(format!("class index {index}")))?;
    Ok((label, p * 100.0))
}
