//! Talk entries shown to the user.
//!
//! Entries are append-only. The only mutable field is `arrived` on a user
//! talk, which flips from `false` to `true` at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a user talk within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TalkId(pub u64);

/// A message typed by one of the two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTalk {
    pub id: TalkId,
    pub time: DateTime<Utc>,
    pub talker_id: String,
    pub content: String,
    /// Whether the relay confirmed delivery (always true for received talks).
    pub arrived: bool,
}

/// A protocol status notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTalk {
    pub time: DateTime<Utc>,
    pub content: String,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Talk {
    User(UserTalk),
    System(SystemTalk),
}

impl Talk {
    /// Create a system notice stamped now.
    pub fn system(content: impl Into<String>) -> Self {
        Talk::System(SystemTalk {
            time: Utc::now(),
            content: content.into(),
        })
    }

    /// Text of the entry.
    pub fn content(&self) -> &str {
        match self {
            Talk::User(talk) => &talk.content,
            Talk::System(talk) => &talk.content,
        }
    }

    /// Creation time of the entry.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Talk::User(talk) => talk.time,
            Talk::System(talk) => talk.time,
        }
    }

    /// Whether this is a system notice.
    pub fn is_system(&self) -> bool {
        matches!(self, Talk::System(_))
    }
}

/// Append-only list of talks as the presentation layer sees them.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    talks: Vec<Talk>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, talk: Talk) {
        self.talks.push(talk);
    }

    /// Mark the user talk with `id` as arrived.
    ///
    /// Returns `true` only when the flag actually flipped.
    pub fn mark_arrived(&mut self, id: TalkId) -> bool {
        for talk in &mut self.talks {
            if let Talk::User(user) = talk {
                if user.id == id {
                    if user.arrived {
                        return false;
                    }
                    user.arrived = true;
                    return true;
                }
            }
        }
        false
    }

    /// All entries in order.
    pub fn talks(&self) -> &[Talk] {
        &self.talks
    }

    /// The user talk with `id`, if present.
    pub fn user_talk(&self, id: TalkId) -> Option<&UserTalk> {
        self.talks.iter().find_map(|talk| match talk {
            Talk::User(user) if user.id == id => Some(user),
            _ => None,
        })
    }

    /// Contents of all system notices in order.
    pub fn system_notices(&self) -> Vec<&str> {
        self.talks
            .iter()
            .filter(|talk| talk.is_system())
            .map(Talk::content)
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.talks.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.talks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, content: &str) -> Talk {
        Talk::User(UserTalk {
            id: TalkId(id),
            time: Utc::now(),
            talker_id: "alice".to_string(),
            content: content.to_string(),
            arrived: false,
        })
    }

    #[test]
    fn test_mark_arrived_matches_identity_not_content() {
        let mut transcript = Transcript::new();
        transcript.push(user(0, "same"));
        transcript.push(user(1, "same"));

        assert!(transcript.mark_arrived(TalkId(1)));
        assert!(!transcript.user_talk(TalkId(0)).unwrap().arrived);
        assert!(transcript.user_talk(TalkId(1)).unwrap().arrived);
    }

    #[test]
    fn test_mark_arrived_flips_once() {
        let mut transcript = Transcript::new();
        transcript.push(user(3, "hi"));

        assert!(transcript.mark_arrived(TalkId(3)));
        assert!(!transcript.mark_arrived(TalkId(3)));
        assert!(!transcript.mark_arrived(TalkId(99)));
    }

    #[test]
    fn test_system_notices() {
        let mut transcript = Transcript::new();
        transcript.push(Talk::system("Your public key sent."));
        transcript.push(user(0, "hello"));
        transcript.push(Talk::system("Peer's public key received."));

        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript.system_notices(),
            vec!["Your public key sent.", "Peer's public key received."]
        );
    }

    #[test]
    fn test_talk_serialization_tag() {
        let json = serde_json::to_value(user(1, "hi")).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["talkerId"], "alice");
        assert_eq!(json["arrived"], false);
    }
}
