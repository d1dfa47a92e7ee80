use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use emotion_chatbot::backends::{AudioFormat, SpeechBackend};
use emotion_chatbot::controller::{PageController, RerunPolicy};
use emotion_chatbot::ear::{AudioSource, Ear, ListenSettings};
use emotion_chatbot::emotion::{EmotionClassifier, EmotionDetector, Prediction};
use emotion_chatbot::error::{ClassifierError, RecognitionError};
use emotion_chatbot::rate_limiter::RateLimiter;
use emotion_chatbot::recognizers::{CapturedAudio, Transcriber};
use emotion_chatbot::server::{router, AppState};
use emotion_chatbot::session::SessionStore;
use emotion_chatbot::speaker::Speaker;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const FAKE_MP3: &[u8] = b"ID3 fake mp3";

/// Everything containing "happy" is joy, the rest is sadness.
struct KeywordClassifier;

#[async_trait::async_trait]
impl EmotionClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<Prediction>, ClassifierError> {
        let label = if text.contains("happy") { "joy" } else { "sadness" };
        Ok(vec![Prediction {
            label: label.to_string(),
            score: 0.9,
        }])
    }

    fn id(&self) -> &'static str {
        "keyword"
    }
}

struct CannedBackend;

impl SpeechBackend for CannedBackend {
    fn synthesize(&self, _text: &str, _language: &str) -> std::io::Result<Vec<u8>> {
        Ok(FAKE_MP3.to_vec())
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn id(&self) -> &'static str {
        "canned"
    }
}

struct QuietMic;

impl AudioSource for QuietMic {
    fn capture(&self, _settings: &ListenSettings) -> Result<CapturedAudio, RecognitionError> {
        Ok(CapturedAudio {
            samples: vec![0; 8_000],
            sample_rate: 16_000,
        })
    }
}

struct ScriptedTranscriber(&'static str);

#[async_trait::async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &CapturedAudio) -> Result<String, RecognitionError> {
        Ok(self.0.to_string())
    }

    fn id(&self) -> &'static str {
        "scripted"
    }
}

fn app(audio_dir: &std::path::Path) -> Router {
    let controller = PageController::new(
        EmotionDetector::new(Arc::new(KeywordClassifier)),
        Speaker::new(Arc::new(CannedBackend), audio_dir, "en"),
        Ear::new(
            Arc::new(QuietMic),
            Arc::new(ScriptedTranscriber("I feel happy")),
            ListenSettings::default(),
        ),
        RerunPolicy::OnChange,
        Arc::new(RateLimiter::default()),
    );
    let state = AppState::new(controller, SessionStore::new(Duration::from_secs(3600)));
    router(Arc::new(state))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `chatbot_session=<id>` from a response's Set-Cookie header.
fn session_pair(response: &axum::response::Response) -> String {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("new sessions get a cookie")
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

fn submit_request(cookie: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/submit")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_first_visit_creates_session() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_pair(&response).starts_with("chatbot_session="));
    let html = body_text(response).await;
    assert!(html.contains("Voice-Enabled Emotion-Aware Chatbot"));
    assert!(!html.contains("Chatbot:</label>"));
}

#[tokio::test]
async fn test_submit_renders_reply_and_serves_audio() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let first = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_pair(&first);
    let session_id = cookie.trim_start_matches("chatbot_session=").to_string();

    let response = app
        .clone()
        .oneshot(submit_request(&cookie, "text=I+am+so+happy+today"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let html = body_text(response).await;
    assert!(html.contains("value=\"I am so happy today\""));
    assert!(html.contains("I&#39;m glad to hear that! 😊"));
    assert!(html.contains(&format!("src=\"/audio/{}?v=", session_id)));

    let audio = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/audio/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(audio.status(), StatusCode::OK);
    assert_eq!(audio.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(audio.headers()[header::CACHE_CONTROL], "no-store");
    let bytes = audio.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], FAKE_MP3);
}

#[tokio::test]
async fn test_speak_shows_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/speak")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let html = body_text(response).await;
    assert!(html.contains("You said: I feel happy"));
    assert!(html.contains("I&#39;m glad to hear that! 😊"));
}

#[tokio::test]
async fn test_audio_for_unknown_or_bad_ids_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    for uri in [
        "/audio/not-a-uuid".to_string(),
        "/audio/..%2F..%2Fetc%2Fpasswd".to_string(),
        format!("/audio/{}", uuid::Uuid::new_v4()),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}
