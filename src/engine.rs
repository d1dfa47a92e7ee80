use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use tracing::{debug, error, warn};

/// Plays synthesized replies on the host's default output device.
#[derive(Clone)]
pub struct AudioEngine {
    tx: Sender<Vec<u8>>,
}

impl AudioEngine {
    pub fn new(volume: f32) -> Self {
        let (tx, rx) = channel::<Vec<u8>>();

        thread::spawn(move || {
            // Audio stream must live on this thread
            let (_stream, stream_handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    error!("No audio output device found, host playback disabled: {}", e);
                    return;
                }
            };

            while let Ok(audio) = rx.recv() {
                debug!("Audio Thread: playing {} bytes", audio.len());
                let sink = match Sink::try_new(&stream_handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        error!("Failed to create sink: {}", e);
                        continue;
                    }
                };
                match Decoder::new(Cursor::new(audio)) {
                    Ok(source) => {
                        sink.set_volume(volume);
                        sink.append(source);
                        // Let it finish on its own; the stream stays alive in this loop.
                        sink.detach();
                    }
                    Err(e) => error!("Failed to decode: {}", e),
                }
            }
        });

        Self { tx }
    }

    pub fn play(&self, audio: Vec<u8>) {
        if self.tx.send(audio).is_err() {
            warn!("Host playback unavailable, skipping");
        }
    }
}
