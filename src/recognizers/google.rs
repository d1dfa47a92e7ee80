use super::{CapturedAudio, Transcriber};
use crate::error::RecognitionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Google's speech API v2 (the endpoint Chromium's web speech uses).
pub struct GoogleTranscriber {
    client: Client,
    url: String,
    key: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    result: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    confidence: Option<f32>,
}

impl GoogleTranscriber {
    pub fn new(
        url: &str,
        key: &str,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
            key: key.to_string(),
            language: language.to_string(),
        })
    }
}

/// The body is one JSON object per line; the first is usually an empty
/// `{"result":[]}`. Prefers the alternative carrying a confidence score.
fn best_transcript(body: &str) -> Option<String> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RecognizeResponse>(line).ok())
        .flat_map(|response| response.result)
        .find(|result| !result.alternative.is_empty())
        .and_then(|result| {
            let alternatives = result.alternative;
            let best = alternatives
                .iter()
                .position(|a| a.confidence.is_some())
                .unwrap_or(0);
            alternatives.into_iter().nth(best)
        })
        .map(|alternative| alternative.transcript)
}

#[async_trait]
impl Transcriber for GoogleTranscriber {
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String, RecognitionError> {
        let body: Vec<u8> = audio.samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let mut query = vec![
            ("client", "chromium"),
            ("lang", self.language.as_str()),
            ("pFilter", "0"),
        ];
        if !self.key.is_empty() {
            query.push(("key", self.key.as_str()));
        }

        let response = self
            .client
            .post(&self.url)
            .query(&query)
            .header(
                "Content-Type",
                format!("audio/l16; rate={}", audio.sample_rate),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::Unavailable(format!(
                "recognition request failed: HTTP {}",
                status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;
        debug!(body = %text, "Google recognition response");

        best_transcript(&text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(RecognitionError::Unintelligible)
    }

    fn id(&self) -> &'static str {
        "google"
    }
}
