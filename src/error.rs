use std::path::PathBuf;
use thiserror::Error;

/// Failures from an emotion classification backend.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse classifier response: {0}")]
    Parse(String),

    #[error("classifier returned no recognizable label")]
    NoLabel,
}

/// Failures while turning a reply into a playable audio artifact.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech backend failed: {0}")]
    Backend(#[from] std::io::Error),

    #[error("speech backend produced no audio")]
    Empty,

    #[error("could not write audio artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesis task failed: {0}")]
    Task(String),
}

/// Outcomes of a voice capture that did not yield text.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("speech was unintelligible")]
    Unintelligible,

    #[error("recognition service unavailable: {0}")]
    Unavailable(String),

    #[error("audio capture failed: {0}")]
    Capture(String),
}

/// Startup errors: the only ones allowed to stop the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
