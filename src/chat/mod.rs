//! # Relay chat
//!
//! End-to-end encrypted two-party chat over an untrusted Piping Server style
//! relay.
//!
//! ## Security Model
//!
//! - **Ephemeral P-256 keys** per session, never persisted
//! - **AES-128-GCM envelope** with a fresh IV for every parcel after the key exchange
//! - **Session id** derived identically by both peers and shown to the user
//! - **Optional RSA signatures** over the session id bind it to long-term identities
//! - **Opaque relay paths**: the relay only sees SHA-256 hashes of the id pair

mod config;
mod error;
mod observer;
pub mod protocol;
mod receiver;
mod sequential;
mod session;
mod talk;
pub mod transport;

pub use config::{ChatProfile, KeyExchangePolicy, SessionConfig, DEFAULT_RELAY_URL};
pub use error::ChatError;
pub use observer::{NoopObserver, SessionEvent, SessionObserver};
pub use protocol::{KeyExchangeContent, Parcel};
pub use receiver::{ReceiveLoop, ReceiveStep, StopReason};
pub use sequential::SequentialContext;
pub use session::{ChatSession, SessionFlags, SessionPhase};
pub use talk::{SystemTalk, Talk, TalkId, Transcript, UserTalk};
pub use transport::{channel_path, HttpRelay, MemoryRelay, RelayBody, RelayResponse, RelayTransport};
