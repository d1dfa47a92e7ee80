use super::{EmotionClassifier, Prediction};
use crate::error::ClassifierError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Hosted text-classification inference (Hugging Face Inference API).
pub struct HuggingFaceClassifier {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

// The API answers `[[{label, score}, ...]]` for a single input, some
// deployments flatten it to `[{label, score}, ...]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Batched(Vec<Vec<Prediction>>),
    Flat(Vec<Prediction>),
}

impl HuggingFaceClassifier {
    pub fn new(
        base_url: &str,
        model: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        let token = Some(token.trim().to_string()).filter(|t| !t.is_empty());

        Ok(Self {
            client,
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), model),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmotionClassifier for HuggingFaceClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<Prediction>, ClassifierError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "inputs": text }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(%body, "Inference response");
        let parsed: InferenceResponse =
            serde_json::from_str(&body).map_err(|e| ClassifierError::Parse(e.to_string()))?;

        let predictions = match parsed {
            InferenceResponse::Batched(batches) => batches.into_iter().next().unwrap_or_default(),
            InferenceResponse::Flat(predictions) => predictions,
        };
        Ok(predictions)
    }

    fn id(&self) -> &'static str {
        "huggingface"
    }
}
