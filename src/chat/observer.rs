//! Notifications from a session to the presentation layer.

use tokio::sync::mpsc;

use crate::chat::talk::{Talk, TalkId, Transcript};
use crate::crypto::JsonWebKey;

/// Receives session notifications. All methods default to doing nothing.
///
/// Calls are made in the order the session produces them and never while
/// session state is locked, so an observer may call back into the session.
pub trait SessionObserver: Send + Sync {
    /// The shared session id was derived.
    fn on_session_id(&self, _session_id: &str) {}

    /// Our encryption key pair exists; `public_jwk` is its public half.
    fn on_encrypt_key_pair_ready(&self, _public_jwk: &JsonWebKey) {}

    /// The peer's encryption public key was received.
    fn on_peer_encryption_key(&self, _public_jwk: &JsonWebKey) {}

    /// The channel is established. Fires at most once per session.
    fn on_established(&self) {}

    /// A talk entry was appended.
    fn on_talk(&self, _talk: &Talk) {}

    /// The relay confirmed delivery of our talk `id`.
    fn on_talk_arrived(&self, _id: TalkId) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Session notifications as values, for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionId(String),
    EncryptKeyPairReady(JsonWebKey),
    PeerEncryptionKey(JsonWebKey),
    Established,
    Talk(Talk),
    TalkArrived(TalkId),
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_session_id(&self, session_id: &str) {
        let _ = self.send(SessionEvent::SessionId(session_id.to_string()));
    }

    fn on_encrypt_key_pair_ready(&self, public_jwk: &JsonWebKey) {
        let _ = self.send(SessionEvent::EncryptKeyPairReady(public_jwk.clone()));
    }

    fn on_peer_encryption_key(&self, public_jwk: &JsonWebKey) {
        let _ = self.send(SessionEvent::PeerEncryptionKey(public_jwk.clone()));
    }

    fn on_established(&self) {
        let _ = self.send(SessionEvent::Established);
    }

    fn on_talk(&self, talk: &Talk) {
        let _ = self.send(SessionEvent::Talk(talk.clone()));
    }

    fn on_talk_arrived(&self, id: TalkId) {
        let _ = self.send(SessionEvent::TalkArrived(id));
    }
}

impl Transcript {
    /// Fold a session event into the transcript.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Talk(talk) => self.push(talk.clone()),
            SessionEvent::TalkArrived(id) => {
                self.mark_arrived(*id);
            }
            _ => {}
        }
    }
}
