//! HTTP surface: one page per browser session plus the audio it plays.

use crate::backends::build_backend;
use crate::config_loader::Settings;
use crate::controller::{PageAction, PageController, RerunPolicy};
use crate::ear::{Ear, ListenSettings, Microphone};
use crate::emotion::{build_classifier, EmotionDetector};
use crate::engine::AudioEngine;
use crate::error::ServerError;
use crate::page;
use crate::rate_limiter::RateLimiter;
use crate::recognizers::build_transcriber;
use crate::session::{SessionId, SessionStore};
use crate::speaker::Speaker;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const SESSION_COOKIE: &str = "chatbot_session";

pub struct AppState {
    pub controller: PageController,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(controller: PageController, sessions: SessionStore) -> Self {
        Self {
            controller,
            sessions,
        }
    }

    /// Wires every adapter named in the settings. Fails only on
    /// configuration problems; unreachable services are handled per turn.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        let policy: RerunPolicy = settings
            .rerun_policy
            .parse()
            .map_err(ServerError::Config)?;

        let detector = EmotionDetector::new(build_classifier(settings)?);

        let mut speaker = Speaker::new(
            build_backend(settings)?,
            &settings.audio_dir,
            &settings.tts_language,
        );
        if settings.enable_host_playback {
            speaker = speaker.with_playback(AudioEngine::new(settings.playback_volume));
        }
        std::fs::create_dir_all(speaker.audio_dir())?;

        let ear = Ear::new(
            Arc::new(Microphone),
            build_transcriber(settings)?,
            ListenSettings::from_settings(settings),
        );

        let limiter = Arc::new(RateLimiter::new(
            settings.rate_limit_turns,
            settings.rate_limit_listen,
        ));

        info!(
            classifier = %settings.classifier_backend,
            tts = %settings.tts_backend,
            stt = %settings.stt_backend,
            ?policy,
            "Chatbot configured"
        );

        Ok(Self::new(
            PageController::new(detector, speaker, ear, policy, limiter),
            SessionStore::new(Duration::from_secs(settings.session_idle_secs)),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    text: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/submit", post(submit))
        .route("/speak", post(speak))
        .route("/audio/{session_id}", get(audio))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    render_page(&state, &headers, PageAction::Redraw).await
}

async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SubmitForm>,
) -> Response {
    render_page(&state, &headers, PageAction::Submit { text: form.text }).await
}

async fn speak(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    render_page(&state, &headers, PageAction::Speak).await
}

async fn health() -> &'static str {
    "ok"
}

async fn audio(State(state): State<Arc<AppState>>, Path(raw_id): Path<String>) -> Response {
    let Some(session) = SessionId::parse(&raw_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let speaker = state.controller.speaker();
    let Some(path) = speaker.current_artifact(&session) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, speaker.format().mime_type()),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(path = %path.display(), "Failed to read audio artifact: {}", e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn render_page(state: &AppState, headers: &HeaderMap, action: PageAction) -> Response {
    let (id, session, created) = state.sessions.get_or_create(session_from_headers(headers));
    if created {
        debug!(session = %id, "New session");
    }

    // Held for the whole turn: requests from one session are serialized.
    let view = {
        let mut guard = session.lock().await;
        state.controller.handle(&mut guard, action).await
    };

    let mut response = Html(page::render(&view)).into_response();
    if created {
        if let Ok(cookie) = HeaderValue::from_str(&session_cookie(&id)) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

pub fn session_cookie(id: &SessionId) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}

/// Session id from the request's `Cookie` headers, if one is well-formed.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| SessionId::parse(value))
}

/// Periodically drops idle sessions along with their rate-limit buckets and
/// audio files.
pub fn spawn_eviction(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let evicted = state.sessions.evict_idle();
            if evicted.is_empty() {
                continue;
            }
            info!(count = evicted.len(), "Evicting idle sessions");
            state.controller.limiter().forget(&evicted);
            for id in &evicted {
                state.controller.speaker().discard(id).await;
            }
        }
    })
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Chatbot listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_headers() {
        let id = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap(),
        );
        assert_eq!(session_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_malformed_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("chatbot_session=../../etc/passwd"),
        );
        assert_eq!(session_from_headers(&headers), None);
        assert_eq!(session_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = SessionId::new();
        let cookie = session_cookie(&id);
        assert!(cookie.starts_with(&format!("chatbot_session={}", id)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
    }
}
