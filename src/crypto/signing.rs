//! Peer authentication with long-term RSA signing keys.
//!
//! Each side signs the session id (RSASSA-PKCS1-v1_5 over SHA-256) with its
//! private key; the peer verifies it against a public key it already trusts.
//! These keys are independent of the ephemeral ECDH key pairs.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::chat::ChatError;

/// Default modulus size for generated signing keys.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Signs session ids with the local private key.
#[derive(Clone)]
pub struct SessionSigner {
    key: SigningKey<Sha256>,
}

impl SessionSigner {
    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, ChatError> {
        Ok(Self {
            key: SigningKey::new(decode_private_key_pem(pem)?),
        })
    }

    /// Sign the session id, returning the signature as standard base64.
    pub fn sign(&self, session_id: &str) -> Result<String, ChatError> {
        let signature = self
            .key
            .try_sign(session_id.as_bytes())
            .map_err(|e| ChatError::Signing(e.to_string()))?;
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

/// Verifies the peer's session id signatures.
#[derive(Clone)]
pub struct PeerVerifier {
    key: VerifyingKey<Sha256>,
}

impl PeerVerifier {
    /// Parse an SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, ChatError> {
        Ok(Self {
            key: VerifyingKey::new(decode_public_key_pem(pem)?),
        })
    }

    /// Check a base64 signature over the session id.
    ///
    /// Malformed base64 or signature bytes count as a failed verification.
    pub fn verify(&self, session_id: &str, signature_b64: &str) -> Result<(), ChatError> {
        let bytes = BASE64
            .decode(signature_b64.trim())
            .map_err(|_| ChatError::AuthenticationFailure)?;
        let signature =
            Signature::try_from(bytes.as_slice()).map_err(|_| ChatError::AuthenticationFailure)?;

        self.key
            .verify(session_id.as_bytes(), &signature)
            .map_err(|_| ChatError::AuthenticationFailure)
    }
}

/// An RSA key pair in PEM form, as written by `keygen`.
pub struct SigningKeyPair {
    private_pem: String,
    public_pem: String,
}

impl SigningKeyPair {
    /// Generate a new key pair with the given modulus size.
    pub fn generate(bits: usize) -> Result<Self, ChatError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ChatError::Key(format!("RSA key generation failed: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| ChatError::Key(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ChatError::Key(e.to_string()))?;

        Ok(Self {
            private_pem: private_pem.to_string(),
            public_pem,
        })
    }

    /// Returns the PKCS#8 private key PEM.
    pub fn private_pem(&self) -> &str {
        &self.private_pem
    }

    /// Returns the SPKI public key PEM.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Saves the key pair to files.
    ///
    /// Creates `{base_path}.sign.pub` for public key and `{base_path}.sign.key` for private key.
    pub fn save_to_files(&self, base_path: &Path) -> Result<(PathBuf, PathBuf), ChatError> {
        let pub_path = add_sign_extension(base_path, "pub");
        let key_path = add_sign_extension(base_path, "key");

        fs::write(&pub_path, &self.public_pem)?;
        fs::write(&key_path, &self.private_pem)?;

        // Set restrictive permissions on private key (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&key_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&key_path, perms)?;
        }

        Ok((pub_path, key_path))
    }

    /// Loads a key pair from files written by [`SigningKeyPair::save_to_files`].
    pub fn load_from_files(base_path: &Path) -> Result<Self, ChatError> {
        let private_pem = fs::read_to_string(add_sign_extension(base_path, "key"))?;
        let public_pem = fs::read_to_string(add_sign_extension(base_path, "pub"))?;

        // Reject files that do not parse before handing them out.
        decode_private_key_pem(&private_pem)?;
        decode_public_key_pem(&public_pem)?;

        Ok(Self {
            private_pem,
            public_pem,
        })
    }
}

/// Helper to create paths like "alice.sign.pub" from "alice"
pub fn add_sign_extension(base_path: &Path, ext: &str) -> PathBuf {
    let mut path = base_path.as_os_str().to_os_string();
    path.push(".sign.");
    path.push(ext);
    PathBuf::from(path)
}

fn decode_private_key_pem(pem: &str) -> Result<RsaPrivateKey, ChatError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs1_pem(pem).ok())
        .ok_or_else(|| ChatError::Key("Invalid RSA private key PEM".to_string()))
}

fn decode_public_key_pem(pem: &str) -> Result<RsaPublicKey, ChatError> {
    RsaPublicKey::from_public_key_pem(pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(pem).ok())
        .ok_or_else(|| ChatError::Key("Invalid RSA public key PEM".to_string()))
}
