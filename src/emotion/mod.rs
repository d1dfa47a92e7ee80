//! Emotion classification: backends that rank labels for a piece of text,
//! and the detector that turns a ranking into a single label.

pub mod huggingface;
pub mod ollama;

use crate::config_loader::Settings;
use crate::error::{ClassifierError, ServerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use huggingface::HuggingFaceClassifier;
pub use ollama::OllamaClassifier;

/// A short tag naming an emotional tone. Stored trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmotionLabel(String);

impl EmotionLabel {
    pub const NEUTRAL: &'static str = "neutral";

    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn neutral() -> Self {
        Self(Self::NEUTRAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ranked guess from a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Trait that all emotion classification backends implement.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Ranked predictions for `text`, best first.
    async fn classify(&self, text: &str) -> Result<Vec<Prediction>, ClassifierError>;

    /// Returns the unique ID of the backend (e.g., "huggingface")
    fn id(&self) -> &'static str;
}

/// Wraps a classifier and always yields a label, falling back to `neutral`.
#[derive(Clone)]
pub struct EmotionDetector {
    classifier: Arc<dyn EmotionClassifier>,
}

impl EmotionDetector {
    pub fn new(classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn detect(&self, text: &str) -> EmotionLabel {
        let result = self.classifier.classify(text).await.and_then(top_label);
        match result {
            Ok(label) => {
                info!(backend = self.classifier.id(), %label, "Emotion detected");
                label
            }
            Err(e) => {
                warn!(backend = self.classifier.id(), error = %e, "Classification failed, using neutral");
                EmotionLabel::neutral()
            }
        }
    }
}

/// Picks the highest-scoring prediction; the earliest one wins ties.
pub fn top_label(predictions: Vec<Prediction>) -> Result<EmotionLabel, ClassifierError> {
    debug!(?predictions, "Ranking predictions");
    predictions
        .into_iter()
        .filter(|p| !p.label.trim().is_empty())
        .min_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|p| EmotionLabel::new(p.label))
        .ok_or(ClassifierError::NoLabel)
}

pub fn build_classifier(settings: &Settings) -> Result<Arc<dyn EmotionClassifier>, ServerError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match settings.classifier_backend.as_str() {
        "huggingface" => Ok(Arc::new(HuggingFaceClassifier::new(
            &settings.classifier_url,
            &settings.classifier_model,
            &settings.classifier_token,
            timeout,
        )?)),
        "ollama" => Ok(Arc::new(OllamaClassifier::new(
            &settings.ollama_url,
            &settings.ollama_model,
            timeout,
        )?)),
        other => Err(ServerError::Config(format!(
            "unknown classifier backend '{}'",
            other
        ))),
    }
}
