//! Parcel types for the chat protocol.
//!
//! These types define what actually gets sent through the relay. On the wire
//! a parcel is a JSON object `{"kind": ..., "content": ...}`.

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;
use crate::crypto::{public_key_from_jwk, JsonWebKey};

/// Public keys announced during the key exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeyExchangeContent {
    /// Public key for session ID generation.
    pub session_id_public_jwk: JsonWebKey,
    /// Public key for encryption.
    pub encrypt_public_jwk: JsonWebKey,
}

/// The minimal message unit exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "content",
    rename_all = "snake_case",
    deny_unknown_fields
)]
pub enum Parcel {
    /// Bootstrap: both ephemeral public keys. The only parcel sent in plaintext.
    KeyExchange(KeyExchangeContent),
    /// Base64 RSA signature over the session id.
    SessionIdSignature(String),
    /// Application text.
    Talk(String),
}

impl Parcel {
    /// Wire name of the parcel kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Parcel::KeyExchange(_) => "key_exchange",
            Parcel::SessionIdSignature(_) => "session_id_signature",
            Parcel::Talk(_) => "talk",
        }
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string(self)
            .map_err(|e| ChatError::Validation(format!("Cannot encode {}: {}", self.kind(), e)))
    }

    /// Serialize to UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChatError> {
        self.to_json().map(String::into_bytes)
    }

    /// Parse and validate JSON text.
    pub fn from_json(text: &str) -> Result<Self, ChatError> {
        let parcel: Parcel = serde_json::from_str(text)
            .map_err(|e| ChatError::Validation(format!("Malformed parcel: {}", e)))?;
        parcel.validate()?;
        Ok(parcel)
    }

    /// Parse and validate UTF-8 JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChatError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ChatError::Validation(format!("Parcel is not UTF-8: {}", e)))?;
        Self::from_json(text)
    }

    /// Structural checks serde cannot express: announced keys must be usable
    /// P-256 public keys.
    fn validate(&self) -> Result<(), ChatError> {
        if let Parcel::KeyExchange(content) = self {
            for (name, jwk) in [
                ("sessionIdPublicJwk", &content.session_id_public_jwk),
                ("encryptPublicJwk", &content.encrypt_public_jwk),
            ] {
                public_key_from_jwk(jwk)
                    .map_err(|e| ChatError::Validation(format!("{}: {}", name, e)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{public_key_to_jwk, CryptoProvider, SeededCryptoProvider};

    fn key_exchange_parcel() -> Parcel {
        let provider = SeededCryptoProvider::new([9u8; 32]);
        Parcel::KeyExchange(KeyExchangeContent {
            session_id_public_jwk: public_key_to_jwk(&provider.generate_p256().public_key()),
            encrypt_public_jwk: public_key_to_jwk(&provider.generate_p256().public_key()),
        })
    }

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            Parcel::Talk("hi".to_string()).to_json().unwrap(),
            r#"{"kind":"talk","content":"hi"}"#
        );
        assert_eq!(
            Parcel::SessionIdSignature("c2ln".to_string()).to_json().unwrap(),
            r#"{"kind":"session_id_signature","content":"c2ln"}"#
        );

        let json = key_exchange_parcel().to_json().unwrap();
        assert!(json.starts_with(r#"{"kind":"key_exchange","content":{"sessionIdPublicJwk":{"#));
        assert!(json.contains(r#""encryptPublicJwk":{"crv":"P-256","ext":true,"key_ops":[],"kty":"EC""#));
    }

    #[test]
    fn test_roundtrip_each_kind() {
        for parcel in [
            key_exchange_parcel(),
            Parcel::SessionIdSignature("AAEC".to_string()),
            Parcel::Talk("héllo 👋".to_string()),
        ] {
            let decoded = Parcel::from_bytes(&parcel.to_bytes().unwrap()).unwrap();
            assert_eq!(decoded, parcel);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = Parcel::from_json(r#"{"kind":"file","content":"x"}"#);
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[test]
    fn test_wrong_content_type_rejected() {
        assert!(matches!(
            Parcel::from_json(r#"{"kind":"talk","content":42}"#),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            Parcel::from_json(r#"{"kind":"talk"}"#),
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            Parcel::from_json(r#"{"kind":"talk","content":"hi","extra":true}"#),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn test_key_exchange_requires_both_keys() {
        let json = key_exchange_parcel().to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["content"]
            .as_object_mut()
            .unwrap()
            .remove("encryptPublicJwk");

        let result = Parcel::from_json(&value.to_string());
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[test]
    fn test_key_exchange_requires_usable_keys() {
        let json = key_exchange_parcel().to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["content"]["sessionIdPublicJwk"]
            .as_object_mut()
            .unwrap()
            .remove("x");

        match Parcel::from_json(&value.to_string()) {
            Err(ChatError::Validation(msg)) => assert!(msg.starts_with("sessionIdPublicJwk")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_utf8_rejected() {
        let result = Parcel::from_bytes(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }
}
