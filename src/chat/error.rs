//! Chat error types.

use thiserror::Error;

/// Errors that can occur during chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// A parcel did not match any known shape.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// AES-GCM tag verification failed (tampered body or wrong key).
    #[error("Decryption failed")]
    Decryption,

    /// The relay could not be reached or answered with a failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The peer's session id signature did not verify.
    #[error("Peer authentication failed")]
    AuthenticationFailure,

    /// An encrypted body arrived before the peer's public key.
    #[error("Peer's public key is not received yet")]
    PeerKeyUnknown,

    /// A JWK or PEM key could not be imported.
    #[error("Key error: {0}")]
    Key(String),

    /// Signing the session id failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Invalid session configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
