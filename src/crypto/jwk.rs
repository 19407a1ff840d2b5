//! JSON Web Key interchange format.
//!
//! Public keys travel inside `key_exchange` parcels as JWKs, mirroring what a
//! WebCrypto peer exports. Every member is optional so that keys carrying only
//! the fields of their algorithm round-trip unchanged.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chat::ChatError;

/// Additional RSA prime information (`oth` member).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaOtherPrimesInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// A JSON Web Key. Members are declared in lexicographic order so the
/// serialized form matches WebCrypto's `exportKey("jwk")` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oth: Option<Vec<RsaOtherPrimesInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl JsonWebKey {
    /// Builds the `oct` JWK WebCrypto exports for an extractable AES-GCM key.
    pub fn aes_gcm(key: &[u8]) -> Self {
        Self {
            alg: Some(format!("A{}GCM", key.len() * 8)),
            ext: Some(true),
            k: Some(BASE64URL.encode(key)),
            key_ops: Some(vec!["encrypt".to_string(), "decrypt".to_string()]),
            kty: Some("oct".to_string()),
            ..Default::default()
        }
    }

    /// Computes the RFC 7638 thumbprint (SHA-256) as lowercase hex.
    ///
    /// Only the members required for the key type take part, serialized
    /// without whitespace in lexicographic order.
    pub fn thumbprint_hex(&self) -> Result<String, ChatError> {
        let kty = self
            .kty
            .as_deref()
            .ok_or_else(|| ChatError::Key("JWK has no 'kty'".to_string()))?;

        let required: &[(&str, &Option<String>)] = match kty {
            "EC" => &[("crv", &self.crv), ("x", &self.x), ("y", &self.y)],
            "RSA" => &[("e", &self.e), ("n", &self.n)],
            "oct" => &[("k", &self.k)],
            other => {
                return Err(ChatError::Key(format!(
                    "Unsupported JWK key type for thumbprint: {}",
                    other
                )))
            }
        };

        let mut members = BTreeMap::new();
        members.insert("kty", kty);
        for (name, value) in required {
            let value = value
                .as_deref()
                .ok_or_else(|| ChatError::Key(format!("JWK is missing '{}'", name)))?;
            members.insert(name, value);
        }

        let canonical = serde_json::to_string(&members)
            .map_err(|e| ChatError::Key(format!("JWK thumbprint input: {}", e)))?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7638_example_thumbprint() {
        // Example key from RFC 7638 section 3.1.
        let jwk = JsonWebKey {
            kty: Some("RSA".to_string()),
            e: Some("AQAB".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(concat!(
                "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECP",
                "ebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY",
                "368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0f",
                "M4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw"
            ).to_string()),
            ..Default::default()
        };

        let thumbprint = jwk.thumbprint_hex().unwrap();
        // NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs in hex.
        assert_eq!(
            thumbprint,
            "3736cbb1787cb8309c77ee8c3705c5e16ffb9e859715901f1e4c59b11182f57b"
        );
    }

    #[test]
    fn test_oct_thumbprint_ignores_optional_members() {
        let key = [7u8; 16];
        let full = JsonWebKey::aes_gcm(&key);
        let minimal = JsonWebKey {
            kty: Some("oct".to_string()),
            k: full.k.clone(),
            ..Default::default()
        };

        assert_eq!(full.thumbprint_hex().unwrap(), minimal.thumbprint_hex().unwrap());
        assert_eq!(full.thumbprint_hex().unwrap().len(), 64);
    }

    #[test]
    fn test_thumbprint_requires_members() {
        let jwk = JsonWebKey {
            kty: Some("EC".to_string()),
            crv: Some("P-256".to_string()),
            x: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(jwk.thumbprint_hex(), Err(ChatError::Key(_))));
        assert!(matches!(JsonWebKey::default().thumbprint_hex(), Err(ChatError::Key(_))));
    }

    #[test]
    fn test_serialized_member_names() {
        let jwk = JsonWebKey::aes_gcm(&[1u8; 16]);
        let json = serde_json::to_string(&jwk).unwrap();
        assert_eq!(
            json,
            r#"{"alg":"A128GCM","ext":true,"k":"AQEBAQEBAQEBAQEBAQEBAQ","key_ops":["encrypt","decrypt"],"kty":"oct"}"#
        );

        let with_use: JsonWebKey = serde_json::from_str(r#"{"kty":"RSA","use":"sig"}"#).unwrap();
        assert_eq!(with_use.key_use.as_deref(), Some("sig"));
    }
}
