//! AES-GCM envelope for every parcel after the key exchange.
//!
//! Wire format:
//!   [ iv (12 bytes) | ciphertext + tag (16 bytes) ]
//!
//! The key is derived by ECDH between our encryption secret and the peer's
//! encryption public key on every call, so a stale key can never be used.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use p256::{PublicKey, SecretKey};

use crate::chat::error::ChatError;
use crate::chat::protocol::parcel::Parcel;
use crate::crypto::{derive_aes_key, CryptoProvider};

/// Initialization vector size.
pub const IV_LEN: usize = 12;

/// Authentication tag size.
pub const TAG_LEN: usize = 16;

/// Encrypt a parcel for the peer, prefixing a fresh random IV.
pub fn encrypt(
    parcel: &Parcel,
    own_secret: &SecretKey,
    peer_public: &PublicKey,
    crypto: &dyn CryptoProvider,
) -> Result<Vec<u8>, ChatError> {
    let plaintext = parcel.to_bytes()?;

    let mut iv = [0u8; IV_LEN];
    crypto.fill_random(&mut iv);

    let key = derive_aes_key(own_secret, peer_public);
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_slice()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| ChatError::Validation("AES-GCM encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and validate a parcel from the peer.
///
/// Tag mismatch (tampering, wrong key, truncated body) fails with
/// [`ChatError::Decryption`]; a plaintext that is not a parcel fails with
/// [`ChatError::Validation`].
pub fn decrypt(
    data: &[u8],
    own_secret: &SecretKey,
    peer_public: &PublicKey,
) -> Result<Parcel, ChatError> {
    if data.len() < IV_LEN + TAG_LEN {
        return Err(ChatError::Decryption);
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);

    let key = derive_aes_key(own_secret, peer_public);
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_slice()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| ChatError::Decryption)?;

    Parcel::from_bytes(&plaintext)
}
