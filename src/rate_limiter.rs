use crate::session::SessionId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Token bucket for rate limiting
struct TokenBucket {
    tokens: f32,
    max_tokens: f32,
    refill_rate: f32, // tokens per second
    last_update: Instant,
}

impl TokenBucket {
    fn new(tokens_per_minute: f32) -> Self {
        Self {
            tokens: tokens_per_minute,
            max_tokens: tokens_per_minute,
            refill_rate: tokens_per_minute / 60.0,
            last_update: Instant::now(),
        }
    }

    fn try_consume(&mut self, tokens: f32) -> bool {
        self.refill();

        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_update = now;
    }
}

/// What a session is spending: external calls cost money and latency.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum LimitType {
    Turn,   // classify -> reply -> synthesize
    Listen, // microphone capture + recognition
}

/// Per-session rate limiter
pub struct RateLimiter {
    buckets: Mutex<HashMap<(SessionId, LimitType), TokenBucket>>,
    turns_per_minute: f32,
    listens_per_minute: f32,
}

impl RateLimiter {
    pub fn new(turns: u32, listens: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            turns_per_minute: turns as f32,
            listens_per_minute: listens as f32,
        }
    }

    /// Check if request is allowed, consuming a token if so
    pub fn check(&self, session: SessionId, limit_type: LimitType) -> bool {
        let limit = match limit_type {
            LimitType::Turn => self.turns_per_minute,
            LimitType::Listen => self.listens_per_minute,
        };

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry((session, limit_type))
            .or_insert_with(|| TokenBucket::new(limit))
            .try_consume(1.0)
    }

    /// Forget sessions that have ended.
    pub fn forget(&self, sessions: &[SessionId]) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|(session, _), _| !sessions.contains(session));
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30, 10)
    }
}
