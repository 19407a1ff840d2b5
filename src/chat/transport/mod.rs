//! Transport layer for the relay.
//!
//! The relay is a store-and-forward byte pipe: a POST to a path delivers one
//! body to the next GET on that same path. This module defines the async
//! transport trait, channel path addressing and two implementations.

mod http;
mod memory;

pub use http::HttpRelay;
pub use memory::MemoryRelay;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::chat::error::ChatError;

/// Content type marking the plaintext bootstrap parcel.
pub const TEXT_PLAIN: &str = "text/plain";

/// Content type of encrypted envelopes.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Derive the one-way relay path for messages from `from` to `to`.
pub fn channel_path(from: &str, to: &str) -> String {
    hex::encode(Sha256::digest(format!("{}-to-{}", from, to).as_bytes()))
}

/// A body to POST to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBody {
    /// JSON text, sent as `text/plain`.
    Text(String),
    /// Encrypted envelope bytes.
    Binary(Vec<u8>),
}

impl RelayBody {
    /// Content type header for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            RelayBody::Text(_) => TEXT_PLAIN,
            RelayBody::Binary(_) => OCTET_STREAM,
        }
    }

    /// Body length in bytes.
    pub(crate) fn len(&self) -> usize {
        match self {
            RelayBody::Text(text) => text.len(),
            RelayBody::Binary(bytes) => bytes.len(),
        }
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RelayBody::Text(text) => text.into_bytes(),
            RelayBody::Binary(bytes) => bytes,
        }
    }
}

/// A body received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    /// Value of the `content-type` header, if any.
    pub content_type: Option<String>,
    /// The full body.
    pub body: Vec<u8>,
}

impl RelayResponse {
    /// Whether the body is the plaintext bootstrap parcel.
    ///
    /// Compares the media type only, ignoring parameters such as `charset`.
    pub fn is_plaintext(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|essence| essence.trim().eq_ignore_ascii_case(TEXT_PLAIN))
            .unwrap_or(false)
    }
}

/// Trait for the relay's POST/GET primitive.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Deliver one body to `path`. Resolves once the relay's response has been
    /// fully drained, which is the delivery confirmation.
    async fn post(&self, path: &str, body: RelayBody) -> Result<(), ChatError>;

    /// Take the next body posted to `path`.
    async fn get(&self, path: &str) -> Result<RelayResponse, ChatError>;
}
