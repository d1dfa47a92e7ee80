use super::{check_wav, sanitize_for_speech, AudioFormat, SpeechBackend};
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

pub struct PiperBackend {
    binary_path: String,
    model: String,
    models_dir: PathBuf,
    timeout: Duration,
}

impl PiperBackend {
    pub fn new(binary_path: &str, model: &str, timeout: Duration) -> Self {
        let models_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local/share/piper/models");
        Self::with_models_dir(binary_path, model, models_dir, timeout)
    }

    pub fn with_models_dir(
        binary_path: &str,
        model: &str,
        models_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            binary_path: binary_path.to_string(),
            model: model.to_string(),
            models_dir,
            timeout,
        }
    }

    fn find_model_files(&self) -> Option<(PathBuf, PathBuf)> {
        let onnx = self.models_dir.join(format!("{}.onnx", self.model));
        let config = self.models_dir.join(format!("{}.onnx.json", self.model));

        if onnx.exists() && config.exists() {
            Some((onnx, config))
        } else {
            None
        }
    }
}

impl SpeechBackend for PiperBackend {
    fn id(&self) -> &'static str {
        "piper"
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    // The voice model fixes the language, so `_language` is not forwarded.
    fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>> {
        let (onnx_path, _config_path) = self.find_model_files().ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!(
                    "Piper model not found locally for voice: {}. Please download it first.",
                    self.model
                ),
            )
        })?;

        let text = sanitize_for_speech(text);
        let mut child = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&onnx_path)
            .arg("--output_file")
            .arg("-") // Output WAV to stdout
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            stdin.write_all(b"\n")?;
        }

        // Drained on a thread so a full pipe cannot stall piper before the deadline.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::new(ErrorKind::Other, "piper stdout unavailable"))?;
        let reader = std::thread::spawn(move || {
            let mut audio = Vec::new();
            stdout.read_to_end(&mut audio).map(|_| audio)
        });

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let audio = reader
                    .join()
                    .map_err(|_| Error::new(ErrorKind::Other, "piper reader panicked"))??;
                if status.success() {
                    check_wav(&audio)?;
                    Ok(audio)
                } else {
                    let mut err = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        let _ = stderr.read_to_string(&mut err);
                    }
                    Err(Error::new(
                        ErrorKind::Other,
                        format!("Piper error: {}", err.trim()),
                    ))
                }
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::new(
                    ErrorKind::TimedOut,
                    format!("Piper timed out after {:?}", self.timeout),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend =
            PiperBackend::with_models_dir(
            "piper",
            "en_US-lessac-medium",
            dir.path().to_path_buf(),
            TIMEOUT,
        );
        let err = backend.synthesize("hello", "en").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_finds_model_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("voice.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();

        let backend = PiperBackend::with_models_dir("piper", "voice", dir.path().to_path_buf(), TIMEOUT);
        assert!(backend.find_model_files().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_process_is_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("voice.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("voice.onnx.json"), b"{}").unwrap();
        let binary = dir.path().join("stuck-piper");
        std::fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = PiperBackend::with_models_dir(
            binary.to_str().unwrap(),
            "voice",
            dir.path().to_path_buf(),
            Duration::from_millis(300),
        );
        let started = std::time::Instant::now();
        let err = backend.synthesize("hello", "en").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
