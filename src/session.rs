//! Per-browser-session state that survives page redraws.

use crate::emotion::EmotionLabel;
use crate::speaker::AudioArtifact;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts only well-formed UUIDs, so ids are safe to use in file names.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// What became of the spoken version of a reply.
#[derive(Debug, Clone)]
pub enum AudioOutcome {
    Ready(AudioArtifact),
    Failed(String),
}

/// One completed classify → reply → speak cycle.
#[derive(Debug, Clone)]
pub struct Turn {
    pub utterance: String,
    pub label: EmotionLabel,
    pub reply: String,
    pub audio: AudioOutcome,
}

#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    /// Most recent utterance, typed or transcribed.
    pub utterance: String,
    pub last_turn: Option<Turn>,
    last_seen: Instant,
}

impl SessionState {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            utterance: String::new(),
            last_turn: None,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

pub type SharedSession = Arc<tokio::sync::Mutex<SessionState>>;

/// All live sessions. Each session has its own lock, so a slow turn in one
/// session never blocks another.
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, SharedSession>>,
    max_idle: Duration,
}

impl SessionStore {
    pub fn new(max_idle: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_idle,
        }
    }

    /// Returns the session for `requested`, creating a fresh one when the id
    /// is absent or unknown. The flag is true when a session was created.
    pub fn get_or_create(&self, requested: Option<SessionId>) -> (SessionId, SharedSession, bool) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = requested {
            if let Some(session) = sessions.get(&id) {
                // Touched under the store lock so eviction cannot pick it
                // between this lookup and the request locking it. A locked
                // session is busy and never evicted anyway.
                if let Ok(mut state) = session.try_lock() {
                    state.touch();
                }
                return (id, session.clone(), false);
            }
        }

        let id = SessionId::new();
        let session = Arc::new(tokio::sync::Mutex::new(SessionState::new(id)));
        sessions.insert(id, session.clone());
        (id, session, true)
    }

    /// Drops sessions idle for longer than the limit. Sessions in the middle
    /// of a turn are locked and therefore kept. Returns the evicted ids.
    pub fn evict_idle(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut evicted = Vec::new();

        sessions.retain(|id, session| match session.try_lock() {
            Ok(state) if state.idle_for() >= self.max_idle => {
                evicted.push(*id);
                false
            }
            _ => true,
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
