//! Page controller: applies a user action to the session and runs the
//! classify -> reply -> speak pipeline when there is something to react to.

use crate::ear::Ear;
use crate::emotion::EmotionDetector;
use crate::rate_limiter::{LimitType, RateLimiter};
use crate::responses::reply_for;
use crate::session::{AudioOutcome, SessionId, SessionState, Turn};
use crate::speaker::Speaker;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Inline notice shown in place of the audio player.
pub const SPEECH_ERROR_NOTICE: &str = "Error in generating speech.";
pub const RATE_LIMITED_NOTICE: &str = "You're going a little fast. Please wait a moment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// Plain page load.
    Redraw,
    /// The text field was submitted.
    Submit { text: String },
    /// The speak button was pressed.
    Speak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerunPolicy {
    /// Run the pipeline only when the stored utterance changed.
    OnChange,
    /// Run the pipeline on every redraw.
    Always,
}

impl FromStr for RerunPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_change" => Ok(RerunPolicy::OnChange),
            "always" => Ok(RerunPolicy::Always),
            other => Err(format!("unknown rerun policy '{}'", other)),
        }
    }
}

/// Everything the page needs to draw itself.
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub text_value: String,
    /// Transcript from this request's voice capture.
    pub heard: Option<String>,
    pub turn: Option<Turn>,
    pub notice: Option<String>,
}

pub struct PageController {
    detector: EmotionDetector,
    speaker: Speaker,
    ear: Ear,
    policy: RerunPolicy,
    limiter: Arc<RateLimiter>,
}

impl PageController {
    pub fn new(
        detector: EmotionDetector,
        speaker: Speaker,
        ear: Ear,
        policy: RerunPolicy,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            detector,
            speaker,
            ear,
            policy,
            limiter,
        }
    }

    pub fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn handle(&self, state: &mut SessionState, action: PageAction) -> PageView {
        state.touch();
        let mut view = PageView::default();

        match action {
            PageAction::Redraw => {}
            PageAction::Submit { text } => {
                // An empty field keeps what is stored.
                if !text.is_empty() {
                    state.utterance = text;
                }
            }
            PageAction::Speak => {
                if self.limiter.check(state.id, LimitType::Listen) {
                    let voice = self.ear.listen().await;
                    if !voice.is_empty() {
                        state.utterance = voice.clone();
                        view.heard = Some(voice);
                    }
                } else {
                    warn!(session = %state.id, "Listen rate limited");
                    view.notice = Some(RATE_LIMITED_NOTICE.to_string());
                }
            }
        }

        view.text_value = state.utterance.clone();
        if state.utterance.trim().is_empty() {
            state.last_turn = None;
            return view;
        }

        let changed = state
            .last_turn
            .as_ref()
            .map_or(true, |turn| turn.utterance != state.utterance);
        if changed || self.policy == RerunPolicy::Always {
            if self.limiter.check(state.id, LimitType::Turn) {
                state.last_turn = Some(self.run_turn(&state.id, &state.utterance).await);
            } else {
                warn!(session = %state.id, "Turn rate limited");
                view.notice = Some(RATE_LIMITED_NOTICE.to_string());
            }
        }

        // A rate-limited change must not show the previous utterance's reply.
        view.turn = state
            .last_turn
            .clone()
            .filter(|turn| turn.utterance == state.utterance);
        view
    }

    /// classify -> look up -> synthesize. Never fails: a synthesis error
    /// becomes an inline notice next to the reply.
    pub async fn run_turn(&self, session: &SessionId, utterance: &str) -> Turn {
        let label = self.detector.detect(utterance).await;
        let reply = reply_for(&label);
        info!(session = %session, %label, reply, "Replying");

        let audio = match self.speaker.speak(session, reply).await {
            Ok(artifact) => AudioOutcome::Ready(artifact),
            Err(e) => {
                warn!(session = %session, "Speech synthesis failed: {}", e);
                AudioOutcome::Failed(SPEECH_ERROR_NOTICE.to_string())
            }
        };

        Turn {
            utterance: utterance.to_string(),
            label,
            reply: reply.to_string(),
            audio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerun_policy_from_str() {
        assert_eq!("on_change".parse(), Ok(RerunPolicy::OnChange));
        assert_eq!("always".parse(), Ok(RerunPolicy::Always));
        assert!("sometimes".parse::<RerunPolicy>().is_err());
    }
}
