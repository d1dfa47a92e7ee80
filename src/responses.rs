//! Canned replies keyed by emotion label.

use crate::emotion::EmotionLabel;

/// Reply for any label the table does not know.
pub const FALLBACK_REPLY: &str = "That’s an interesting point! Could you elaborate? 🤖";

const RESPONSES: &[(&str, &str)] = &[
    ("joy", "I'm glad to hear that! 😊"),
    ("sadness", "I'm here for you. Things will get better. 💙"),
    (
        "anger",
        "I understand. Take a deep breath. Let's talk about it. 😌",
    ),
    ("enthusiasm", "I love your energy! Let's go! 🚀"),
    ("neutral", "That's interesting. I’d love to hear more! 🤖"),
    ("fear", "I'm here if you want to talk. Stay strong! 💪"),
    ("surprise", "Wow, that’s surprising! Tell me more! 😲"),
];

/// Looks up the reply for `label`. Total over all labels.
pub fn reply_for(label: &EmotionLabel) -> &'static str {
    RESPONSES
        .iter()
        .find(|(key, _)| *key == label.as_str())
        .map(|(_, reply)| *reply)
        .unwrap_or(FALLBACK_REPLY)
}

/// Labels that have a dedicated reply.
pub fn known_labels() -> impl Iterator<Item = &'static str> {
    RESPONSES.iter().map(|(key, _)| *key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_every_table_label_gets_its_reply() {
        for (key, reply) in RESPONSES {
            assert_eq!(reply_for(&EmotionLabel::new(key)), *reply);
        }
    }

    #[test]
    fn test_unknown_label_falls_back() {
        assert_eq!(reply_for(&EmotionLabel::new("love")), FALLBACK_REPLY);
        assert_eq!(reply_for(&EmotionLabel::new("")), FALLBACK_REPLY);
    }

    #[test]
    fn test_surprise_and_neutral_invite_more() {
        assert!(reply_for(&EmotionLabel::new("surprise")).contains("Tell me more"));
        assert!(reply_for(&EmotionLabel::new("neutral")).contains("hear more"));
    }

    #[test]
    fn test_known_labels() {
        let labels: Vec<_> = known_labels().collect();
        assert_eq!(labels.len(), 7);
        assert!(labels.contains(&"enthusiasm"));
    }

    proptest! {
        #[test]
        fn any_label_maps_to_a_reply(raw in ".{0,40}") {
            let label = EmotionLabel::new(&raw);
            let reply = reply_for(&label);
            if known_labels().any(|k| k == label.as_str()) {
                prop_assert_ne!(reply, FALLBACK_REPLY);
            } else {
                prop_assert_eq!(reply, FALLBACK_REPLY);
            }
        }
    }
}
