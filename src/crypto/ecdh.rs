//! P-256 key agreement with WebCrypto-compatible key derivation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh, PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::chat::ChatError;
use crate::crypto::jwk::JsonWebKey;

/// AES-GCM key length in bytes (128-bit keys).
pub const AES_KEY_LEN: usize = 16;

/// Length of one affine coordinate of a P-256 point.
const COORDINATE_LEN: usize = 32;

/// Export a P-256 public key as the JWK WebCrypto produces for an ECDH key.
pub fn public_key_to_jwk(public: &PublicKey) -> JsonWebKey {
    let point = public.to_encoded_point(false);
    JsonWebKey {
        crv: Some("P-256".to_string()),
        ext: Some(true),
        key_ops: Some(Vec::new()),
        kty: Some("EC".to_string()),
        x: point.x().map(|x| BASE64URL.encode(x)),
        y: point.y().map(|y| BASE64URL.encode(y)),
        ..Default::default()
    }
}

/// Import a P-256 public key from its JWK form.
pub fn public_key_from_jwk(jwk: &JsonWebKey) -> Result<PublicKey, ChatError> {
    if jwk.kty.as_deref() != Some("EC") {
        return Err(ChatError::Key(format!(
            "Expected kty 'EC', got {:?}",
            jwk.kty
        )));
    }
    if jwk.crv.as_deref() != Some("P-256") {
        return Err(ChatError::Key(format!(
            "Expected crv 'P-256', got {:?}",
            jwk.crv
        )));
    }

    let x = decode_coordinate("x", jwk.x.as_deref())?;
    let y = decode_coordinate("y", jwk.y.as_deref())?;

    let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);

    PublicKey::from_sec1_bytes(&sec1)
        .map_err(|_| ChatError::Key("Point is not on the P-256 curve".to_string()))
}

fn decode_coordinate(name: &str, value: Option<&str>) -> Result<Vec<u8>, ChatError> {
    let value = value.ok_or_else(|| ChatError::Key(format!("JWK is missing '{}'", name)))?;
    let bytes = BASE64URL
        .decode(value)
        .map_err(|e| ChatError::Key(format!("Invalid '{}' coordinate: {}", name, e)))?;
    if bytes.len() != COORDINATE_LEN {
        return Err(ChatError::Key(format!(
            "Invalid '{}' coordinate length: expected {}, got {}",
            name,
            COORDINATE_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Derive a 128-bit AES-GCM key from ECDH.
///
/// Matches WebCrypto `deriveKey({name: "ECDH"}, ..., {name: "AES-GCM", length: 128})`:
/// the key is the leading 16 bytes of the shared x-coordinate.
pub fn derive_aes_key(secret: &SecretKey, peer: &PublicKey) -> Zeroizing<[u8; AES_KEY_LEN]> {
    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    key.copy_from_slice(&shared.raw_secret_bytes()[..AES_KEY_LEN]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::{CryptoProvider, SeededCryptoProvider};

    #[test]
    fn test_jwk_roundtrip() {
        let provider = SeededCryptoProvider::new([1u8; 32]);
        let public = provider.generate_p256().public_key();

        let jwk = public_key_to_jwk(&public);
        assert_eq!(jwk.kty.as_deref(), Some("EC"));
        assert_eq!(jwk.crv.as_deref(), Some("P-256"));
        assert_eq!(jwk.key_ops, Some(Vec::new()));
        assert!(jwk.d.is_none());

        let imported = public_key_from_jwk(&jwk).unwrap();
        assert_eq!(imported, public);
    }

    #[test]
    fn test_import_rejects_wrong_curve_and_bad_points() {
        let provider = SeededCryptoProvider::new([2u8; 32]);
        let jwk = public_key_to_jwk(&provider.generate_p256().public_key());

        let mut wrong_curve = jwk.clone();
        wrong_curve.crv = Some("P-384".to_string());
        assert!(matches!(public_key_from_jwk(&wrong_curve), Err(ChatError::Key(_))));

        let mut missing_y = jwk.clone();
        missing_y.y = None;
        assert!(matches!(public_key_from_jwk(&missing_y), Err(ChatError::Key(_))));

        let mut off_curve = jwk;
        off_curve.y = off_curve.x.clone();
        assert!(matches!(public_key_from_jwk(&off_curve), Err(ChatError::Key(_))));
    }

    #[test]
    fn test_derived_key_is_symmetric() {
        let provider = SeededCryptoProvider::new([4u8; 32]);
        let alice = provider.generate_p256();
        let bob = provider.generate_p256();
        let eve = provider.generate_p256();

        let ab = derive_aes_key(&alice, &bob.public_key());
        let ba = derive_aes_key(&bob, &alice.public_key());
        let ae = derive_aes_key(&alice, &eve.public_key());

        assert_eq!(*ab, *ba);
        assert_ne!(*ab, *ae);
    }
}
