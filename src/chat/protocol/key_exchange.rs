//! Ephemeral key pairs and session id derivation.
//!
//! Each session owns two independent P-256 key pairs: one only feeds the
//! session id, the other only feeds the AES-GCM key of the envelope.
//!
//! ## Session id
//!
//! 1. ECDH between our session-id secret and the peer's session-id public key
//! 2. The leading 128 bits become an AES-GCM key (WebCrypto `deriveKey`)
//! 3. The id is the RFC 7638 SHA-256 thumbprint of that key's `oct` JWK, in hex
//!
//! Both peers compute the same string, which is what gets displayed and signed.

use p256::{PublicKey, SecretKey};

use crate::chat::error::ChatError;
use crate::chat::protocol::parcel::{KeyExchangeContent, Parcel};
use crate::crypto::{derive_aes_key, public_key_from_jwk, public_key_to_jwk, CryptoProvider, JsonWebKey};

/// Our two ephemeral key pairs. Never persisted.
pub struct EphemeralKeys {
    session_id_secret: SecretKey,
    encrypt_secret: SecretKey,
}

impl EphemeralKeys {
    /// Generate both key pairs from the provider.
    pub fn generate(crypto: &dyn CryptoProvider) -> Self {
        Self {
            session_id_secret: crypto.generate_p256(),
            encrypt_secret: crypto.generate_p256(),
        }
    }

    /// Public half of the session-id key pair as a JWK.
    pub fn session_id_public_jwk(&self) -> JsonWebKey {
        public_key_to_jwk(&self.session_id_secret.public_key())
    }

    /// Public half of the encryption key pair as a JWK.
    pub fn encrypt_public_jwk(&self) -> JsonWebKey {
        public_key_to_jwk(&self.encrypt_secret.public_key())
    }

    /// Secret used by the envelope.
    pub fn encrypt_secret(&self) -> &SecretKey {
        &self.encrypt_secret
    }

    /// Build the bootstrap parcel announcing both public keys.
    pub fn key_exchange_parcel(&self) -> Parcel {
        Parcel::KeyExchange(KeyExchangeContent {
            session_id_public_jwk: self.session_id_public_jwk(),
            encrypt_public_jwk: self.encrypt_public_jwk(),
        })
    }

    /// Derive the shared session id from the peer's session-id public key.
    pub fn derive_session_id(&self, peer_session_id_public: &PublicKey) -> Result<String, ChatError> {
        let key = derive_aes_key(&self.session_id_secret, peer_session_id_public);
        JsonWebKey::aes_gcm(key.as_slice()).thumbprint_hex()
    }
}

/// The peer's imported public keys.
#[derive(Debug, Clone)]
pub struct PeerKeys {
    pub session_id_public: PublicKey,
    pub encrypt_public: PublicKey,
    /// The encryption key as received, for the presentation layer.
    pub encrypt_public_jwk: JsonWebKey,
}

impl PeerKeys {
    /// Import both keys from a `key_exchange` parcel.
    pub fn import(content: &KeyExchangeContent) -> Result<Self, ChatError> {
        Ok(Self {
            session_id_public: public_key_from_jwk(&content.session_id_public_jwk)?,
            encrypt_public: public_key_from_jwk(&content.encrypt_public_jwk)?,
            encrypt_public_jwk: content.encrypt_public_jwk.clone(),
        })
    }
}
