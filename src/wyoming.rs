//! Minimal client for the Wyoming protocol (JSON header line, optional
//! data block, optional binary payload), enough to run one transcription.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{Error, ErrorKind, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const SAMPLE_WIDTH: u32 = 2;
const CHUNK_SAMPLES: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct WyomingEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub data_length: Option<usize>,
    #[serde(default)]
    pub payload_length: Option<usize>,
}

pub struct WyomingClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl WyomingClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect(format!("{}:{}", host, port)).await?;
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        // Handshake: describe -> info
        client.write_event("describe", None, &[]).await?;
        let _info = client.read_event().await?;

        Ok(client)
    }

    /// Sends a whole utterance of 16-bit mono PCM and waits for its transcript.
    pub async fn transcribe(&mut self, samples: &[i16], rate: u32, language: &str) -> Result<String> {
        self.write_event("transcribe", Some(json!({ "language": language })), &[])
            .await?;
        self.write_event("audio-start", Some(Self::audio_format(rate)), &[])
            .await?;
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            let payload: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
            self.write_event("audio-chunk", Some(Self::audio_format(rate)), &payload)
                .await?;
        }
        self.write_event("audio-stop", None, &[]).await?;
        self.wait_for_transcript().await
    }

    async fn wait_for_transcript(&mut self) -> Result<String> {
        loop {
            let event = self.read_event().await?;
            if event.event_type == "transcript" {
                let text = event
                    .data
                    .as_ref()
                    .and_then(|d| d["text"].as_str())
                    .unwrap_or("")
                    .to_string();
                return Ok(text);
            }
        }
    }

    fn audio_format(rate: u32) -> serde_json::Value {
        json!({ "rate": rate, "width": SAMPLE_WIDTH, "channels": 1 })
    }

    async fn write_event(
        &mut self,
        event_type: &str,
        data: Option<serde_json::Value>,
        payload: &[u8],
    ) -> Result<()> {
        let mut header = json!({ "type": event_type, "data": data });
        if !payload.is_empty() {
            header["payload_length"] = json!(payload.len());
        }

        self.writer.write_all(header.to_string().as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.write_all(payload).await?;
        Ok(())
    }

    async fn read_event(&mut self) -> Result<WyomingEvent> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(Error::new(
                ErrorKind::UnexpectedEof,
                "Wyoming server closed the connection",
            ));
        }

        let mut event: WyomingEvent =
            serde_json::from_str(&line).map_err(|e| Error::new(ErrorKind::InvalidData, e))?;

        if let Some(len) = event.data_length.filter(|l| *l > 0) {
            let mut data = vec![0u8; len];
            self.reader.read_exact(&mut data).await?;
            event.data = Some(
                serde_json::from_slice(&data).map_err(|e| Error::new(ErrorKind::InvalidData, e))?,
            );
        }
        if let Some(len) = event.payload_length.filter(|l| *l > 0) {
            let mut payload = vec![0u8; len];
            self.reader.read_exact(&mut payload).await?;
        }
        Ok(event)
    }
}
