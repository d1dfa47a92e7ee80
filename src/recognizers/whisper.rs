//! Native Whisper backend using whisper.cpp via whisper-rs bindings
//!
//! Runs recognition in-process; the model is loaded on first use and kept.

use super::{non_blank, CapturedAudio, Transcriber, TARGET_SAMPLE_RATE};
use crate::error::RecognitionError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

pub struct WhisperTranscriber {
    model_path: String,
    language: String,
    context: Arc<OnceLock<Arc<Mutex<WhisperContext>>>>,
}

impl WhisperTranscriber {
    pub fn new(model_path: &str, language: &str) -> Self {
        let language = language.split(['-', '_']).next().unwrap_or("en").to_string();
        Self {
            model_path: model_path.to_string(),
            language,
            context: Arc::new(OnceLock::new()),
        }
    }

    fn get_or_init_context(
        model_path: &str,
        cell: &OnceLock<Arc<Mutex<WhisperContext>>>,
    ) -> Result<Arc<Mutex<WhisperContext>>, String> {
        if let Some(ctx) = cell.get() {
            return Ok(ctx.clone());
        }

        // Expand ~ to home directory
        let expanded_path = if model_path.starts_with("~/") {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            model_path.replacen('~', &home, 1)
        } else {
            model_path.to_string()
        };

        info!("Whisper: Loading model from {}...", expanded_path);
        let ctx = WhisperContext::new_with_params(&expanded_path, WhisperContextParameters::default())
            .map_err(|e| format!("Failed to load Whisper model: {:?}", e))?;

        let ctx = Arc::new(Mutex::new(ctx));
        let _ = cell.set(ctx.clone());
        Ok(ctx)
    }

    fn run(
        model_path: &str,
        language: &str,
        cell: &OnceLock<Arc<Mutex<WhisperContext>>>,
        samples: &[f32],
    ) -> Result<String, String> {
        let ctx = Self::get_or_init_context(model_path, cell)?;
        let ctx_guard = ctx.lock().map_err(|_| "Context lock error")?;
        let mut state = ctx_guard
            .create_state()
            .map_err(|e| format!("Failed to create state: {:?}", e))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if !language.is_empty() && language != "auto" {
            params.set_language(Some(language));
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        // Single segment mode for short audio
        params.set_single_segment(true);

        state
            .full(params, samples)
            .map_err(|e| format!("Transcription failed: {:?}", e))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            if let Ok(segment_text) = segment.to_str() {
                text.push_str(segment_text);
                text.push(' ');
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &CapturedAudio) -> Result<String, RecognitionError> {
        if audio.sample_rate != TARGET_SAMPLE_RATE {
            return Err(RecognitionError::Capture(format!(
                "whisper needs {} Hz audio, got {} Hz",
                TARGET_SAMPLE_RATE, audio.sample_rate
            )));
        }

        let samples: Vec<f32> = audio.samples.iter().map(|s| *s as f32 / 32768.0).collect();
        let model_path = self.model_path.clone();
        let language = self.language.clone();
        let cell = self.context.clone();

        let text = tokio::task::spawn_blocking(move || {
            Self::run(&model_path, &language, &cell, &samples)
        })
        .await
        .map_err(|e| RecognitionError::Unavailable(e.to_string()))?
        .map_err(RecognitionError::Unavailable)?;

        non_blank(text)
    }

    fn id(&self) -> &'static str {
        "whisper"
    }
}
