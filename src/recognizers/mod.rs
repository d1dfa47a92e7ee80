//! Speech-to-text services. Every backend receives 16 kHz mono PCM and
//! distinguishes "nothing intelligible was said" from "the service could
//! not be reached".

pub mod google;
#[cfg(feature = "whisper")]
pub mod whisper;
pub mod wyoming;

use crate::config_loader::Settings;
use crate::error::{RecognitionError, ServerError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use google::GoogleTranscriber;
#[cfg(feature = "whisper")]
pub use whisper::WhisperTranscriber;
pub use wyoming::WyomingTranscriber;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// One captured phrase, mono signed 16-bit PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String, RecognitionError>;

    fn id(&self) -> &'static str;
}

/// Blank transcripts count as unintelligible speech.
pub(crate) fn non_blank(text: String) -> Result<String, RecognitionError> {
    let text = text.trim();
    if text.is_empty() {
        Err(RecognitionError::Unintelligible)
    } else {
        Ok(text.to_string())
    }
}

pub fn build_transcriber(settings: &Settings) -> Result<Arc<dyn Transcriber>, ServerError> {
    match settings.stt_backend.as_str() {
        "wyoming" => Ok(Arc::new(WyomingTranscriber::new(
            &settings.wyoming_host,
            settings.wyoming_port,
            &settings.stt_language,
            Duration::from_secs(settings.request_timeout_secs),
        ))),
        "google" => Ok(Arc::new(
            GoogleTranscriber::new(
                &settings.google_speech_url,
                &settings.google_speech_key,
                &settings.stt_language,
                Duration::from_secs(settings.request_timeout_secs),
            )
            .map_err(|e| ServerError::Config(e.to_string()))?,
        )),
        #[cfg(feature = "whisper")]
        "whisper" => Ok(Arc::new(WhisperTranscriber::new(
            &settings.whisper_model_path,
            &settings.stt_language,
        ))),
        #[cfg(not(feature = "whisper"))]
        "whisper" => Err(ServerError::Config(
            "stt_backend 'whisper' needs the 'whisper' cargo feature".to_string(),
        )),
        other => Err(ServerError::Config(format!(
            "unknown STT backend '{}'",
            other
        ))),
    }
}
