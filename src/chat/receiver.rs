//! Receive loop as an explicit step function.
//!
//! Each [`ReceiveLoop::step`] performs one GET on the inbound path and handles
//! the parcel. The first failure is terminal: the loop latches its
//! [`StopReason`] and every later step returns it without touching the relay.

use thiserror::Error;
use tracing::{debug, error};

use crate::chat::error::ChatError;
use crate::chat::session::ChatSession;

/// Why the receive loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StopReason {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid parcel: {0}")]
    Validation(String),

    #[error("decryption failed")]
    Decryption,

    #[error("peer's public key is not received yet")]
    PeerKeyUnknown,

    #[error("{0}")]
    Other(String),
}

impl From<&ChatError> for StopReason {
    fn from(error: &ChatError) -> Self {
        match error {
            ChatError::Network(message) => StopReason::Network(message.clone()),
            ChatError::Validation(message) => StopReason::Validation(message.clone()),
            ChatError::Decryption => StopReason::Decryption,
            ChatError::PeerKeyUnknown => StopReason::PeerKeyUnknown,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveStep {
    /// A parcel was handled; the loop may continue.
    Continue,
    /// The loop is over.
    Stopped(StopReason),
}

/// Drives inbound delivery for one session.
pub struct ReceiveLoop {
    session: ChatSession,
    stopped: Option<StopReason>,
}

impl ReceiveLoop {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session,
            stopped: None,
        }
    }

    /// The latched stop reason, if the loop has ended.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stopped.as_ref()
    }

    /// Receive and handle one parcel.
    pub async fn step(&mut self) -> ReceiveStep {
        if let Some(reason) = &self.stopped {
            return ReceiveStep::Stopped(reason.clone());
        }

        match self.session.receive_once().await {
            Ok(()) => ReceiveStep::Continue,
            Err(e) => {
                let reason = StopReason::from(&e);
                error!(peer_id = %self.session.peer_id(), error = %e, "Receive loop stopped");
                self.session.notice(format!("Receiving stopped: {}", reason));
                self.stopped = Some(reason.clone());
                ReceiveStep::Stopped(reason)
            }
        }
    }

    /// Step until the loop stops.
    pub async fn run(mut self) -> StopReason {
        debug!(peer_id = %self.session.peer_id(), "Receive loop started");
        loop {
            if let ReceiveStep::Stopped(reason) = self.step().await {
                return reason;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_from_error() {
        assert_eq!(
            StopReason::from(&ChatError::Network("down".into())),
            StopReason::Network("down".into())
        );
        assert_eq!(StopReason::from(&ChatError::Decryption), StopReason::Decryption);
        assert_eq!(
            StopReason::from(&ChatError::PeerKeyUnknown),
            StopReason::PeerKeyUnknown
        );
        assert!(matches!(
            StopReason::from(&ChatError::Signing("bad key".into())),
            StopReason::Other(_)
        ));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(
            StopReason::Validation("unknown kind".into()).to_string(),
            "invalid parcel: unknown kind"
        );
    }
}
