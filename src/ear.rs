use crate::config_loader::Settings;
use crate::error::RecognitionError;
use crate::recognizers::{CapturedAudio, Transcriber, TARGET_SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Utterance used when speech was captured but not understood.
pub const UNINTELLIGIBLE_REPLY: &str = "Sorry, I couldn't understand.";
/// Utterance used when the recognizer (or the microphone) is unavailable.
pub const UNREACHABLE_REPLY: &str =
    "Could not request results. Please check your internet connection.";

const FRAME_MS: u64 = 50;
const PREROLL_MS: u64 = 300;
/// Ambient energy is scaled by this to get the speech threshold.
const DYNAMIC_RATIO: f32 = 1.5;
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ListenSettings {
    /// How long to wait for speech to start.
    pub listen_timeout: Duration,
    /// Hard cap on the length of one phrase.
    pub phrase_limit: Duration,
    pub calibration: Duration,
    /// Minimum RMS energy (16-bit scale) counted as speech.
    pub energy_threshold: f32,
    /// Silence that ends a phrase.
    pub pause: Duration,
}

impl ListenSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            listen_timeout: Duration::from_secs(settings.listen_timeout_secs),
            phrase_limit: Duration::from_secs(settings.phrase_limit_secs),
            calibration: Duration::from_millis(settings.ambient_calibration_ms),
            energy_threshold: settings.energy_threshold,
            pause: Duration::from_millis(settings.pause_duration_ms),
        }
    }
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Where phrases come from. Blocking.
pub trait AudioSource: Send + Sync {
    fn capture(&self, settings: &ListenSettings) -> Result<CapturedAudio, RecognitionError>;
}

/// RMS energy of a frame, on the 16-bit sample scale.
pub fn rms_energy(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_square = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_square.sqrt() * 32768.0
}

pub fn dynamic_threshold(base: f32, ambient_energy: f32) -> f32 {
    base.max(ambient_energy * DYNAMIC_RATIO)
}

pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Simple linear interpolation resampling
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx = src_idx as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < input.len() {
            input[idx] * (1.0 - frac) + input[idx + 1] * frac
        } else {
            input[idx.min(input.len() - 1)]
        };
        output.push(sample);
    }
    output
}

pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    Continue,
    /// The phrase ended (pause or length cap).
    Done,
    /// No speech started within the listen timeout.
    TimedOut,
}

/// Energy-based start/end detection over fixed-length frames.
pub struct PhraseDetector {
    threshold: f32,
    timeout_frames: usize,
    pause_frames: usize,
    limit_frames: usize,
    preroll_frames: usize,
    waited: usize,
    silent: usize,
    started: bool,
    preroll: VecDeque<Vec<f32>>,
    recorded: Vec<Vec<f32>>,
}

impl PhraseDetector {
    pub fn new(threshold: f32, settings: &ListenSettings) -> Self {
        let frames = |d: Duration| ((d.as_millis() as u64 / FRAME_MS) as usize).max(1);
        Self {
            threshold,
            timeout_frames: frames(settings.listen_timeout),
            pause_frames: frames(settings.pause),
            limit_frames: frames(settings.phrase_limit),
            preroll_frames: frames(Duration::from_millis(PREROLL_MS)),
            waited: 0,
            silent: 0,
            started: false,
            preroll: VecDeque::new(),
            recorded: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: Vec<f32>) -> FrameVerdict {
        let loud = rms_energy(&frame) > self.threshold;

        if !self.started {
            if !loud {
                self.preroll.push_back(frame);
                if self.preroll.len() > self.preroll_frames {
                    self.preroll.pop_front();
                }
                self.waited += 1;
                return if self.waited >= self.timeout_frames {
                    FrameVerdict::TimedOut
                } else {
                    FrameVerdict::Continue
                };
            }
            self.started = true;
            self.recorded.extend(self.preroll.drain(..));
        }

        self.recorded.push(frame);
        self.silent = if loud { 0 } else { self.silent + 1 };

        if self.silent >= self.pause_frames || self.recorded.len() >= self.limit_frames {
            FrameVerdict::Done
        } else {
            FrameVerdict::Continue
        }
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.recorded.into_iter().flatten().collect()
    }
}

/// The default input device, through cpal.
pub struct Microphone;

impl Microphone {
    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        channels: usize,
        tx: Sender<Vec<f32>>,
    ) -> Result<cpal::Stream, RecognitionError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
                    let _ = tx.send(downmix(&samples, channels));
                },
                move |err| error!("an error occurred on stream: {}", err),
                None,
            )
            .map_err(|e| RecognitionError::Capture(format!("Error building stream: {}", e)))
    }

    fn next_frame(
        rx: &Receiver<Vec<f32>>,
        pending: &mut Vec<f32>,
        frame_len: usize,
    ) -> Result<Vec<f32>, RecognitionError> {
        while pending.len() < frame_len {
            match rx.recv_timeout(STALL_TIMEOUT) {
                Ok(chunk) => pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(RecognitionError::Capture("Audio stream stalled".to_string()))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RecognitionError::Capture("Audio stream closed".to_string()))
                }
            }
        }
        Ok(pending.drain(..frame_len).collect())
    }

    fn record_phrase(
        rx: &Receiver<Vec<f32>>,
        sample_rate: u32,
        settings: &ListenSettings,
    ) -> Result<Vec<f32>, RecognitionError> {
        let frame_len = ((sample_rate as u64 * FRAME_MS / 1000) as usize).max(1);
        let mut pending = Vec::new();

        // Calibrate for ambient noise
        let calibration_frames = (settings.calibration.as_millis() as u64 / FRAME_MS) as usize;
        let mut ambient = 0.0;
        for _ in 0..calibration_frames {
            ambient += rms_energy(&Self::next_frame(rx, &mut pending, frame_len)?);
        }
        if calibration_frames > 0 {
            ambient /= calibration_frames as f32;
        }
        let threshold = dynamic_threshold(settings.energy_threshold, ambient);
        debug!(ambient, threshold, "Ear: calibrated");

        let mut detector = PhraseDetector::new(threshold, settings);
        loop {
            let frame = Self::next_frame(rx, &mut pending, frame_len)?;
            match detector.push(frame) {
                FrameVerdict::Continue => {}
                FrameVerdict::Done => return Ok(detector.into_samples()),
                FrameVerdict::TimedOut => return Err(RecognitionError::Unintelligible),
            }
        }
    }
}

impl AudioSource for Microphone {
    fn capture(&self, settings: &ListenSettings) -> Result<CapturedAudio, RecognitionError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| RecognitionError::Capture("No input device found".to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| RecognitionError::Capture(format!("Error getting config: {}", e)))?;

        let channels = config.channels() as usize;
        let sample_rate: u32 = config.sample_rate();
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();
        debug!(?stream_config, "Ear: input config");

        let (tx, rx) = channel::<Vec<f32>>();
        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &stream_config, channels, tx)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &stream_config, channels, tx)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &stream_config, channels, tx)?
            }
            other => {
                return Err(RecognitionError::Capture(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };
        stream
            .play()
            .map_err(|e| RecognitionError::Capture(format!("Error playing stream: {}", e)))?;

        let recorded = Self::record_phrase(&rx, sample_rate, settings);
        drop(stream); // Stop recording

        let samples = recorded?;
        Ok(CapturedAudio {
            samples: to_pcm16(&resample(&samples, sample_rate, TARGET_SAMPLE_RATE)),
            sample_rate: TARGET_SAMPLE_RATE,
        })
    }
}

/// Speech input: capture one phrase and turn it into an utterance.
pub struct Ear {
    source: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    settings: ListenSettings,
}

impl Ear {
    pub fn new(
        source: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        settings: ListenSettings,
    ) -> Self {
        Self {
            source,
            transcriber,
            settings,
        }
    }

    /// Always yields text: recognition failures become fixed messages that
    /// are used as the next utterance.
    pub async fn listen(&self) -> String {
        Self::utterance_for(self.recognize().await)
    }

    pub async fn recognize(&self) -> Result<String, RecognitionError> {
        let source = self.source.clone();
        let settings = self.settings.clone();

        info!(backend = self.transcriber.id(), "Ear: Starting to listen...");
        let audio = tokio::task::spawn_blocking(move || source.capture(&settings))
            .await
            .map_err(|e| RecognitionError::Capture(format!("Error joining audio task: {}", e)))??;
        debug!(duration = ?audio.duration(), samples = audio.samples.len(), "Ear: captured phrase");

        self.transcriber.transcribe(&audio).await
    }

    pub fn utterance_for(result: Result<String, RecognitionError>) -> String {
        match result {
            Ok(text) => {
                info!(%text, "Ear: recognized");
                text
            }
            Err(RecognitionError::Unintelligible) => {
                info!("Ear: speech not understood");
                UNINTELLIGIBLE_REPLY.to_string()
            }
            Err(e) => {
                warn!("Ear: {}", e);
                UNREACHABLE_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const LOUD: f32 = 0.5;

    fn settings() -> ListenSettings {
        ListenSettings {
            listen_timeout: Duration::from_millis(500),
            phrase_limit: Duration::from_millis(1000),
            calibration: Duration::ZERO,
            energy_threshold: 300.0,
            pause: Duration::from_millis(150),
        }
    }

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 800]
    }

    struct FixedSource(Result<Vec<i16>, fn() -> RecognitionError>);

    impl AudioSource for FixedSource {
        fn capture(&self, _settings: &ListenSettings) -> Result<CapturedAudio, RecognitionError> {
            match &self.0 {
                Ok(samples) => Ok(CapturedAudio {
                    samples: samples.clone(),
                    sample_rate: TARGET_SAMPLE_RATE,
                }),
                Err(make) => Err(make()),
            }
        }
    }

    struct EchoTranscriber(fn(&CapturedAudio) -> Result<String, RecognitionError>);

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio: &CapturedAudio) -> Result<String, RecognitionError> {
            (self.0)(audio)
        }
        fn id(&self) -> &'static str {
            "echo"
        }
    }

    fn ear(
        source: Result<Vec<i16>, fn() -> RecognitionError>,
        transcribe: fn(&CapturedAudio) -> Result<String, RecognitionError>,
    ) -> Ear {
        Ear::new(
            Arc::new(FixedSource(source)),
            Arc::new(EchoTranscriber(transcribe)),
            settings(),
        )
    }

    #[test]
    fn test_rms_energy_scale() {
        assert_eq!(rms_energy(&[]), 0.0);
        assert!((rms_energy(&[0.5, -0.5]) - 16384.0).abs() < 1.0);
    }

    #[test]
    fn test_dynamic_threshold_tracks_noisy_rooms() {
        assert_eq!(dynamic_threshold(300.0, 100.0), 300.0);
        assert_eq!(dynamic_threshold(300.0, 1000.0), 1500.0);
    }

    #[test]
    fn test_downmix_and_pcm() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(to_pcm16(&[1.0, -2.0, 0.0]), vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn test_resample() {
        let input = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(resample(&input, 8000, 16000).len(), 8);
        assert_eq!(resample(&input, 32000, 16000), vec![1.0, 3.0]);
        assert_eq!(resample(&input, 16000, 16000), input);
    }

    #[test]
    fn test_detector_times_out_on_silence() {
        let mut detector = PhraseDetector::new(300.0, &settings());
        let verdicts: Vec<_> = (0..10).map(|_| detector.push(frame(0.0))).collect();
        assert_eq!(verdicts[8], FrameVerdict::Continue);
        assert_eq!(verdicts[9], FrameVerdict::TimedOut);
    }

    #[test]
    fn test_detector_ends_phrase_after_pause() {
        let mut detector = PhraseDetector::new(300.0, &settings());
        assert_eq!(detector.push(frame(0.0)), FrameVerdict::Continue);
        assert_eq!(detector.push(frame(LOUD)), FrameVerdict::Continue);
        assert_eq!(detector.push(frame(LOUD)), FrameVerdict::Continue);
        assert_eq!(detector.push(frame(0.0)), FrameVerdict::Continue);
        assert_eq!(detector.push(frame(0.0)), FrameVerdict::Continue);
        assert_eq!(detector.push(frame(0.0)), FrameVerdict::Done);

        // pre-roll frame + 2 loud + 3 silent
        assert_eq!(detector.into_samples().len(), 6 * 800);
    }

    #[test]
    fn test_detector_caps_phrase_length() {
        let mut detector = PhraseDetector::new(300.0, &settings());
        let verdicts: Vec<_> = (0..20).map(|_| detector.push(frame(LOUD))).collect();
        assert_eq!(verdicts[18], FrameVerdict::Continue);
        assert_eq!(verdicts[19], FrameVerdict::Done);
    }

    #[tokio::test]
    async fn test_listen_returns_transcript() {
        let ear = ear(Ok(vec![5; 160]), |audio| {
            assert_eq!(audio.samples.len(), 160);
            Ok("I am so happy today".to_string())
        });
        assert_eq!(ear.listen().await, "I am so happy today");
    }

    #[tokio::test]
    async fn test_unintelligible_speech_becomes_fixed_text() {
        let ear = ear(Ok(vec![5; 160]), |_| Err(RecognitionError::Unintelligible));
        assert_eq!(ear.listen().await, UNINTELLIGIBLE_REPLY);
    }

    #[tokio::test]
    async fn test_silence_timeout_is_unintelligible() {
        let ear = ear(Err(|| RecognitionError::Unintelligible), |_| {
            panic!("nothing to transcribe")
        });
        assert_eq!(ear.listen().await, UNINTELLIGIBLE_REPLY);
    }

    #[tokio::test]
    async fn test_unreachable_service_becomes_fixed_text() {
        let ear = ear(Ok(vec![5; 160]), |_| {
            Err(RecognitionError::Unavailable("connection refused".into()))
        });
        assert_eq!(ear.listen().await, UNREACHABLE_REPLY);
    }

    #[tokio::test]
    async fn test_missing_microphone_is_reported_as_unreachable() {
        let ear = ear(
            Err(|| RecognitionError::Capture("No input device found".into())),
            |_| panic!("nothing to transcribe"),
        );
        assert_eq!(ear.listen().await, UNREACHABLE_REPLY);
    }
}
