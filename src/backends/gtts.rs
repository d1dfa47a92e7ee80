//! Google Translate text-to-speech, the same endpoint the `gTTS` tool uses.
//!
//! Text is split into chunks of at most 100 characters; each chunk is one
//! `batchexecute` RPC whose answer carries base64-encoded MP3. The chunks'
//! MP3 frames are concatenated into a single stream.

use super::{AudioFormat, SpeechBackend};
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Error, ErrorKind, Result};
use std::time::Duration;

const RPC_ID: &str = "jQ1olc";
const MAX_CHARS: usize = 100;
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

lazy_static! {
    static ref AUDIO_PAYLOAD: Regex = Regex::new(r#"jQ1olc","\[\\"(.*)\\"]"#).unwrap();
}

pub struct GttsBackend {
    base_url: String,
    timeout: Duration,
}

impl GttsBackend {
    pub fn new(tld: &str, timeout: Duration) -> Self {
        Self::with_base_url(&format!("https://translate.google.{}", tld), timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn rpc_body(text: &str, language: &str) -> String {
        // Second element is the speed flag: null means normal speed.
        let parameter = serde_json::json!([text, language, null, "null"]).to_string();
        serde_json::json!([[[RPC_ID, parameter, null, "generic"]]]).to_string()
    }

    fn fetch_chunk(
        &self,
        client: &reqwest::blocking::Client,
        text: &str,
        language: &str,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}/_/TranslateWebserverUi/data/batchexecute",
            self.base_url
        );
        let response = client
            .post(url)
            .header("Referer", format!("{}/", self.base_url))
            .header("User-Agent", USER_AGENT)
            .form(&[("f.req", Self::rpc_body(text, language))])
            .send()
            .map_err(|e| Error::new(ErrorKind::Other, format!("gTTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::new(
                ErrorKind::Other,
                format!("gTTS returned HTTP {}", status),
            ));
        }

        let body = response
            .text()
            .map_err(|e| Error::new(ErrorKind::InvalidData, e))?;
        decode_audio(&body)
    }
}

/// Extracts and decodes the MP3 payload from a `batchexecute` answer.
fn decode_audio(body: &str) -> Result<Vec<u8>> {
    let encoded = body
        .lines()
        .filter(|line| line.contains(RPC_ID))
        .find_map(|line| AUDIO_PAYLOAD.captures(line))
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "No audio in gTTS response"))?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_str())
        .map_err(|e| Error::new(ErrorKind::InvalidData, e))
}

/// Greedy word packing into chunks of at most `max` characters.
/// Words longer than `max` are split hard.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(word.drain(..max).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl SpeechBackend for GttsBackend {
    fn id(&self) -> &'static str {
        "gtts"
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let chunks = chunk_text(text, MAX_CHARS);
        if chunks.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "No text to speak"));
        }

        // Built per call: the blocking client must not live on the async executor.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::new(ErrorKind::Other, e))?;

        let mut audio = Vec::new();
        for chunk in &chunks {
            audio.extend(self.fetch_chunk(&client, chunk, language)?);
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batchexecute_body(payload: &str) -> String {
        format!(
            ")]}}'\n\n104\n[[\"wrb.fr\",\"jQ1olc\",\"[\\\"{}\\\"]\",null,null,null,\"generic\"]]\n58\n[[\"di\",42]]\n",
            payload
        )
    }

    #[test]
    fn test_chunk_text_packs_words() {
        let chunks = chunk_text("one two three four", 9);
        assert_eq!(chunks, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_chunk_text_splits_long_words() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_short_reply_is_one_chunk() {
        let chunks = chunk_text("I'm glad to hear that! 😊", MAX_CHARS);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_rpc_body_escapes_parameter() {
        let body = GttsBackend::rpc_body("hi \"there\"", "en");
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        let inner: serde_json::Value =
            serde_json::from_str(parsed[0][0][1].as_str().unwrap()).unwrap();
        assert_eq!(inner[0], "hi \"there\"");
        assert_eq!(inner[1], "en");
        assert_eq!(parsed[0][0][0], RPC_ID);
    }

    #[test]
    fn test_decode_audio() {
        let body = batchexecute_body("SUQzAwA=");
        assert_eq!(decode_audio(&body).unwrap(), b"ID3\x03\x00".to_vec());
        assert!(decode_audio("[[\"di\",42]]").is_err());
    }

    #[test]
    fn test_synthesize_against_mock_server() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/_/TranslateWebserverUi/data/batchexecute")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("application/x-www-form-urlencoded".to_string()),
            )
            .match_body(mockito::Matcher::Regex("f.req=".to_string()))
            .with_body(batchexecute_body("SUQzAwA="))
            .create();

        let backend = GttsBackend::with_base_url(&server.url(), Duration::from_secs(5));
        let audio = backend.synthesize("Hello there", "en").unwrap();

        mock.assert();
        assert_eq!(&audio[..3], b"ID3");
    }

    #[test]
    fn test_synthesize_reports_http_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/_/TranslateWebserverUi/data/batchexecute")
            .with_status(429)
            .create();

        let backend = GttsBackend::with_base_url(&server.url(), Duration::from_secs(5));
        assert!(backend.synthesize("Hello", "en").is_err());
    }
}
