//! Cryptographic building blocks.
//!
//! This module provides:
//! - JSON Web Key interchange and RFC 7638 thumbprints
//! - P-256 ECDH with WebCrypto-compatible AES key derivation
//! - RSA PKCS#1 v1.5 session id signatures
//! - An injectable randomness provider

pub mod ecdh;
pub mod jwk;
pub mod provider;
pub mod signing;

pub use ecdh::{derive_aes_key, public_key_from_jwk, public_key_to_jwk, AES_KEY_LEN};
pub use jwk::{JsonWebKey, RsaOtherPrimesInfo};
pub use provider::{CryptoProvider, OsCryptoProvider, SeededCryptoProvider};
pub use signing::{PeerVerifier, SessionSigner, SigningKeyPair, DEFAULT_RSA_BITS};
