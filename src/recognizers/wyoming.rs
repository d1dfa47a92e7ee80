use super::{non_blank, CapturedAudio, Transcriber};
use crate::error::RecognitionError;
use crate::wyoming::WyomingClient;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Transcription through a Wyoming ASR server (e.g. wyoming-faster-whisper).
pub struct WyomingTranscriber {
    host: String,
    port: u16,
    language: String,
    timeout: Duration,
}

impl WyomingTranscriber {
    pub fn new(host: &str, port: u16, language: &str, timeout: Duration) -> Self {
        // Wyoming servers expect a bare language code ("en", not "en-US").
        let language = language.split(['-', '_']).next().unwrap_or("en").to_string();
        Self {
            host: host.to_string(),
            port,
            language,
            timeout,
        }
    }

    async fn run(&self, audio: &CapturedAudio) -> std::io::Result<String> {
        let mut client = WyomingClient::connect(&self.host, self.port).await?;
        client
            .transcribe(&audio.samples, audio.sample_rate, &self.language)
            .await
    }
}

#[async_trait]
impl Transcriber for WyomingTranscriber {
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String, RecognitionError> {
        let unavailable = |reason: String| {
            RecognitionError::Unavailable(format!("Wyoming {}:{}: {}", self.host, self.port, reason))
        };

        // Bounds the whole exchange; a server that accepts and then stalls
        // would otherwise hold the session forever.
        let text = timeout(self.timeout, self.run(audio))
            .await
            .map_err(|_| unavailable(format!("no answer within {:?}", self.timeout)))?
            .map_err(|e| unavailable(e.to_string()))?;

        debug!(%text, "Wyoming transcript");
        non_blank(text)
    }

    fn id(&self) -> &'static str {
        "wyoming"
    }
}
