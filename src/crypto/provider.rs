//! Source of randomness for key generation and initialization vectors.
//!
//! The session never reaches for a global RNG; it asks the provider it was
//! constructed with. Tests substitute [`SeededCryptoProvider`] to get
//! reproducible key pairs.

use std::sync::Mutex;

use p256::SecretKey;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Capability object supplying cryptographic randomness.
pub trait CryptoProvider: Send + Sync {
    /// Fill `buf` with random bytes.
    fn fill_random(&self, buf: &mut [u8]);

    /// Generate a fresh P-256 secret key.
    fn generate_p256(&self) -> SecretKey;
}

/// Provider backed by the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCryptoProvider;

impl CryptoProvider for OsCryptoProvider {
    fn fill_random(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }

    fn generate_p256(&self) -> SecretKey {
        SecretKey::random(&mut OsRng)
    }
}

/// Deterministic provider seeded with a fixed 32-byte value.
pub struct SeededCryptoProvider {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededCryptoProvider {
    /// Create a provider from a seed.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }
}

impl CryptoProvider for SeededCryptoProvider {
    fn fill_random(&self, buf: &mut [u8]) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.fill_bytes(buf);
    }

    fn generate_p256(&self) -> SecretKey {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        SecretKey::random(&mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_provider_is_reproducible() {
        let a = SeededCryptoProvider::new([3u8; 32]);
        let b = SeededCryptoProvider::new([3u8; 32]);

        assert_eq!(a.generate_p256().to_bytes(), b.generate_p256().to_bytes());

        let mut buf_a = [0u8; 12];
        let mut buf_b = [0u8; 12];
        a.fill_random(&mut buf_a);
        b.fill_random(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn test_os_provider_generates_distinct_keys() {
        let provider = OsCryptoProvider;
        assert_ne!(
            provider.generate_p256().to_bytes(),
            provider.generate_p256().to_bytes()
        );

        let mut iv_a = [0u8; 12];
        let mut iv_b = [0u8; 12];
        provider.fill_random(&mut iv_a);
        provider.fill_random(&mut iv_b);
        assert_ne!(iv_a, iv_b);
    }
}
