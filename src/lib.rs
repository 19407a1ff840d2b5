//! # piping-chat - encrypted chat over an untrusted relay
//!
//! Two peers talk through a Piping Server style relay: a POST to a path
//! delivers one body to the next GET on the same path. The relay never sees
//! plaintext and only learns opaque SHA-256 path names.
//!
//! ## Overview
//!
//! - Each side sends its two ephemeral P-256 public keys in a plaintext
//!   `key_exchange` parcel
//! - Both derive the same **session id** from ECDH and show it to the user
//! - Optionally each side signs the session id with a long-term RSA key
//! - Every later parcel travels in an AES-128-GCM envelope
//! - Sends and receives are each serialized, so the single-slot relay pipe
//!   never sees two concurrent writers or readers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use piping_chat::{ChatSession, SessionConfig, SessionEvent};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), piping_chat::ChatError> {
//! let (events, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
//! let config = SessionConfig::new("https://ppng.io", "alice", "bob");
//! let session = ChatSession::connect_http(config, Arc::new(events))?;
//!
//! let receiver = session.connect_to_peer();
//! while let Some(event) = rx.recv().await {
//!     if event == SessionEvent::Established {
//!         session.send_talk("hi");
//!     }
//! }
//! let _reason = receiver.await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`chat`]: session state machine, parcels, envelope and relay transports
//! - [`crypto`]: JWK handling, ECDH, RSA signatures and randomness

pub mod chat;
pub mod crypto;

pub use chat::{
    channel_path, ChatError, ChatProfile, ChatSession, KeyExchangePolicy, Parcel, ReceiveLoop,
    ReceiveStep, SessionConfig, SessionEvent, SessionObserver, StopReason, Talk, TalkId,
    Transcript,
};
pub use crypto::{CryptoProvider, JsonWebKey, OsCryptoProvider, SeededCryptoProvider};
