use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CLASSIFIER_BACKENDS: &[&str] = &["huggingface", "ollama"];
const TTS_BACKENDS: &[&str] = &["gtts", "espeak", "piper"];
const STT_BACKENDS: &[&str] = &["wyoming", "google", "whisper"];
const RERUN_POLICIES: &[&str] = &["on_change", "always"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub bind_address: String,
    // Emotion classification
    pub classifier_backend: String, // "huggingface" or "ollama"
    pub classifier_url: String,
    pub classifier_model: String,
    pub classifier_token: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub request_timeout_secs: u64,
    // Speech output
    pub tts_backend: String, // "gtts", "espeak" or "piper"
    pub tts_language: String,
    pub gtts_tld: String,
    pub piper_binary: String,
    pub piper_model: String,
    pub audio_dir: String,
    pub enable_host_playback: bool,
    pub playback_volume: f32,
    // Speech input
    pub stt_backend: String, // "wyoming", "google" or "whisper"
    pub stt_language: String,
    pub wyoming_host: String,
    pub wyoming_port: u16,
    pub google_speech_url: String,
    pub google_speech_key: String,
    pub whisper_model_path: String,
    pub listen_timeout_secs: u64,
    pub phrase_limit_secs: u64,
    pub ambient_calibration_ms: u64,
    pub energy_threshold: f32,
    pub pause_duration_ms: u64,
    // Page behaviour
    pub rerun_policy: String, // "on_change" or "always"
    pub session_idle_secs: u64,
    pub rate_limit_turns: u32,  // pipeline runs per session per minute
    pub rate_limit_listen: u32, // microphone captures per session per minute
}

impl Default for Settings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let audio_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("emotion-chatbot")
            .join("audio");

        Self {
            bind_address: "127.0.0.1:8501".to_string(),
            classifier_backend: "huggingface".to_string(),
            classifier_url: "https://router.huggingface.co/hf-inference/models".to_string(),
            classifier_model: "bhadresh-savani/distilbert-base-uncased-emotion".to_string(),
            classifier_token: String::new(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3".to_string(),
            request_timeout_secs: 30,
            tts_backend: "gtts".to_string(),
            tts_language: "en".to_string(),
            gtts_tld: "com".to_string(),
            piper_binary: "piper".to_string(),
            piper_model: "en_US-lessac-medium".to_string(),
            audio_dir: audio_dir.to_string_lossy().into_owned(),
            enable_host_playback: false,
            playback_volume: 1.0,
            stt_backend: "wyoming".to_string(),
            stt_language: "en-US".to_string(),
            wyoming_host: "127.0.0.1".to_string(),
            wyoming_port: 10300,
            google_speech_url: "http://www.google.com/speech-api/v2/recognize".to_string(),
            google_speech_key: String::new(),
            whisper_model_path: format!("{}/.cache/whisper/ggml-base.en.bin", home),
            listen_timeout_secs: 5,
            phrase_limit_secs: 15,
            ambient_calibration_ms: 1000,
            energy_threshold: 300.0,
            pause_duration_ms: 800,
            rerun_policy: "on_change".to_string(),
            session_idle_secs: 3600,
            rate_limit_turns: 30,
            rate_limit_listen: 10,
        }
    }
}

impl Settings {
    /// Layered load: defaults, `Chatbot.*` in the working directory, the user
    /// config dir, an optional explicit file, then `CHATBOT_*` env vars.
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("Chatbot").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/emotion-chatbot/Chatbot",
                    std::env::var("HOME").unwrap_or_default()
                ))
                .required(false),
            );

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        // e.g. CHATBOT_TTS_BACKEND=espeak
        let settings: Settings = builder
            .add_source(Environment::with_prefix("CHATBOT").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_choice("classifier_backend", &self.classifier_backend, CLASSIFIER_BACKENDS)?;
        check_choice("tts_backend", &self.tts_backend, TTS_BACKENDS)?;
        check_choice("stt_backend", &self.stt_backend, STT_BACKENDS)?;
        check_choice("rerun_policy", &self.rerun_policy, RERUN_POLICIES)?;

        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            return Err(ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.listen_timeout_secs == 0 || self.phrase_limit_secs == 0 {
            return Err(ConfigError::Message(
                "listen_timeout_secs and phrase_limit_secs must be greater than 0".to_string(),
            ));
        }
        if self.energy_threshold <= 0.0 {
            return Err(ConfigError::Message(
                "energy_threshold must be positive".to_string(),
            ));
        }
        if self.rate_limit_turns == 0 || self.rate_limit_listen == 0 {
            return Err(ConfigError::Message(
                "rate_limit_turns and rate_limit_listen must be greater than 0".to_string(),
            ));
        }
        if self.tts_language.trim().is_empty() {
            return Err(ConfigError::Message("tts_language must not be empty".to_string()));
        }
        Ok(())
    }
}

fn check_choice(key: &str, value: &str, allowed: &[&str]) -> Result<(), ConfigError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Message(format!(
            "Invalid {}: '{}'. Expected one of: {}",
            key,
            value,
            allowed.join(", ")
        )))
    }
}
