pub mod espeak;
pub mod gtts;
pub mod piper;

use crate::config_loader::Settings;
use crate::error::ServerError;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use espeak::EspeakBackend;
pub use gtts::GttsBackend;
pub use piper::PiperBackend;

/// Container format of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

/// Trait that all speech synthesis backends must implement.
/// This allows us to plug in different engines (Google TTS, eSpeak, Piper, ...)
pub trait SpeechBackend: Send + Sync {
    /// Returns the encoded audio for `text` spoken in `language`.
    /// Blocking: callers run it off the async executor.
    fn synthesize(&self, text: &str, language: &str) -> std::io::Result<Vec<u8>>;

    /// Container format of what `synthesize` returns
    fn format(&self) -> AudioFormat;

    /// Returns the unique ID of the backend (e.g., "espeak-ng")
    fn id(&self) -> &'static str;
}

lazy_static! {
    static ref PICTOGRAPHS: Regex =
        Regex::new(r"[\p{Extended_Pictographic}\x{FE0F}\x{200D}]").unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
}

/// Prepares reply text for local engines: emoji are dropped (they would be
/// read out as code point names) and typographic punctuation folds to ASCII.
pub fn sanitize_for_speech(text: &str) -> String {
    let without_emoji = PICTOGRAPHS.replace_all(text, "");
    let folded = deunicode::deunicode(&without_emoji);
    SPACES.replace_all(folded.trim(), " ").into_owned()
}

/// Rejects process output that is not a WAV stream, e.g. an engine that
/// exited cleanly without producing audio.
pub fn check_wav(audio: &[u8]) -> std::io::Result<()> {
    let reader = hound::WavReader::new(std::io::Cursor::new(audio)).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("engine did not produce WAV audio: {}", e),
        )
    })?;
    let spec = reader.spec();
    debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        "WAV output"
    );
    Ok(())
}

pub fn build_backend(settings: &Settings) -> Result<Arc<dyn SpeechBackend>, ServerError> {
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match settings.tts_backend.as_str() {
        "gtts" => Ok(Arc::new(GttsBackend::new(&settings.gtts_tld, timeout))),
        "espeak" => Ok(Arc::new(EspeakBackend::new(timeout))),
        "piper" => Ok(Arc::new(PiperBackend::new(
            &settings.piper_binary,
            &settings.piper_model,
            timeout,
        ))),
        other => Err(ServerError::Config(format!(
            "unknown TTS backend '{}'",
            other
        ))),
    }
}
