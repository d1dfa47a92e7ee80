use crate::backends::{AudioFormat, SpeechBackend};
use crate::engine::AudioEngine;
use crate::error::SynthesisError;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The latest spoken reply of a session, on disk.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub session_id: SessionId,
    pub path: PathBuf,
    pub format: AudioFormat,
    pub created_at: DateTime<Utc>,
}

impl AudioArtifact {
    /// Page URL for the artifact. The timestamp defeats browser caching,
    /// since every turn overwrites the same file.
    pub fn url(&self) -> String {
        format!(
            "/audio/{}?v={}",
            self.session_id,
            self.created_at.timestamp_millis()
        )
    }
}

/// Turns reply text into a per-session audio file.
pub struct Speaker {
    backend: Arc<dyn SpeechBackend>,
    audio_dir: PathBuf,
    language: String,
    playback: Option<AudioEngine>,
}

impl Speaker {
    pub fn new(backend: Arc<dyn SpeechBackend>, audio_dir: impl Into<PathBuf>, language: &str) -> Self {
        Self {
            backend,
            audio_dir: audio_dir.into(),
            language: language.to_string(),
            playback: None,
        }
    }

    /// Also play every reply on the host's speakers.
    pub fn with_playback(mut self, engine: AudioEngine) -> Self {
        self.playback = Some(engine);
        self
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn format(&self) -> AudioFormat {
        self.backend.format()
    }

    pub fn artifact_path(&self, session: &SessionId) -> PathBuf {
        self.audio_dir
            .join(format!("{}.{}", session, self.backend.format().extension()))
    }

    pub async fn speak(
        &self,
        session: &SessionId,
        reply: &str,
    ) -> Result<AudioArtifact, SynthesisError> {
        let backend = self.backend.clone();
        let text = reply.to_string();
        let language = self.language.clone();

        info!(backend = backend.id(), "Synthesizing reply");
        let audio = tokio::task::spawn_blocking(move || backend.synthesize(&text, &language))
            .await
            .map_err(|e| SynthesisError::Task(e.to_string()))??;
        if audio.is_empty() {
            return Err(SynthesisError::Empty);
        }

        let path = self.artifact_path(session);
        self.write_artifact(&path, &audio).await?;
        debug!(bytes = audio.len(), path = %path.display(), "Audio artifact written");

        if let Some(engine) = &self.playback {
            engine.play(audio);
        }

        Ok(AudioArtifact {
            session_id: *session,
            path,
            format: self.backend.format(),
            created_at: Utc::now(),
        })
    }

    /// Current artifact for a session, if one has been written.
    pub fn current_artifact(&self, session: &SessionId) -> Option<PathBuf> {
        let path = self.artifact_path(session);
        path.is_file().then_some(path)
    }

    /// Removes a session's artifact once the session has ended.
    pub async fn discard(&self, session: &SessionId) {
        let path = self.artifact_path(session);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), "Could not remove audio artifact: {}", e);
            }
        }
    }

    // Write-then-rename, so a concurrent download never sees half a file.
    async fn write_artifact(&self, path: &Path, audio: &[u8]) -> Result<(), SynthesisError> {
        let write_err = |source| SynthesisError::Write {
            path: path.to_path_buf(),
            source,
        };

        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(write_err)?;
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, audio).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }
}
