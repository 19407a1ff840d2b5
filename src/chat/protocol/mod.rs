//! Chat protocol types and operations.
//!
//! - **Parcels**: the three message shapes (key exchange, signature, talk)
//! - **Key exchange**: ephemeral P-256 pairs and the shared session id
//! - **Envelope**: AES-GCM with a random IV for everything after the bootstrap

pub mod envelope;
mod key_exchange;
mod parcel;

pub use envelope::{IV_LEN, TAG_LEN};
pub use key_exchange::{EphemeralKeys, PeerKeys};
pub use parcel::{KeyExchangeContent, Parcel};
