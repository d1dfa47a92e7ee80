use super::{check_wav, sanitize_for_speech, AudioFormat, SpeechBackend};

use std::io::{Error, ErrorKind, Read, Result};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

pub struct EspeakBackend {
    binary: String,
    timeout: Duration,
}

impl EspeakBackend {
    pub fn new(timeout: Duration) -> Self {
        Self::with_binary("espeak-ng", timeout)
    }

    pub fn with_binary(binary: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.to_string(),
            timeout,
        }
    }
}

impl SpeechBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak-ng"
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let text = sanitize_for_speech(text);
        if text.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "No text to speak"));
        }

        let mut child = Command::new(&self.binary)
            .arg("--stdout")
            .arg("-v")
            .arg(language)
            .arg(&text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stdout while waiting, a WAV easily exceeds the pipe buffer.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::new(ErrorKind::Other, "espeak stdout unavailable"))?;
        let reader = std::thread::spawn(move || {
            let mut audio = Vec::new();
            stdout.read_to_end(&mut audio).map(|_| audio)
        });

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let audio = reader
                    .join()
                    .map_err(|_| Error::new(ErrorKind::Other, "espeak reader panicked"))??;
                if status.success() {
                    check_wav(&audio)?;
                    Ok(audio)
                } else {
                    let mut err_msg = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        let _ = stderr.read_to_string(&mut err_msg);
                    }
                    Err(Error::new(
                        ErrorKind::Other,
                        format!("espeak error: {}", err_msg.trim()),
                    ))
                }
            }
            None => {
                // Timeout occurred, kill the process
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::new(
                    ErrorKind::TimedOut,
                    format!("Backend timed out after {:?}", self.timeout),
                ))
            }
        }
    }
}
