//! Chat configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chat::error::ChatError;

/// Default relay (public Piping Server).
pub const DEFAULT_RELAY_URL: &str = "https://ppng.io";

/// What to do when the peer sends a second `key_exchange` parcel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExchangePolicy {
    /// Ignore it and keep the first session id and peer key.
    #[default]
    Reject,
    /// Re-run derivation and overwrite the session id and peer key.
    Rederive,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay base URL.
    pub relay_url: String,

    /// Our connect id.
    pub self_id: String,

    /// The peer's connect id.
    pub peer_id: String,

    /// Require the peer to sign the session id.
    #[serde(default)]
    pub enable_signature: bool,

    /// Our RSA private key (PEM), used when signatures are enabled.
    #[serde(default)]
    pub private_sign_pem: Option<String>,

    /// The peer's RSA public key (PEM), used when signatures are enabled.
    #[serde(default)]
    pub peer_public_sign_pem: Option<String>,

    /// Handling of a repeated key exchange.
    #[serde(default)]
    pub key_exchange_policy: KeyExchangePolicy,

    /// Retry a failed relay request once.
    #[serde(default = "default_retry")]
    pub retry_failed_task: bool,
}

fn default_retry() -> bool {
    true
}

impl SessionConfig {
    /// Create a config without signatures.
    pub fn new(
        relay_url: impl Into<String>,
        self_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            relay_url: relay_url.into(),
            self_id: self_id.into(),
            peer_id: peer_id.into(),
            enable_signature: false,
            private_sign_pem: None,
            peer_public_sign_pem: None,
            key_exchange_policy: KeyExchangePolicy::default(),
            retry_failed_task: default_retry(),
        }
    }

    /// Enable session id signatures with the given PEM keys.
    pub fn with_signature(
        mut self,
        private_sign_pem: impl Into<String>,
        peer_public_sign_pem: impl Into<String>,
    ) -> Self {
        self.enable_signature = true;
        self.private_sign_pem = Some(private_sign_pem.into());
        self.peer_public_sign_pem = Some(peer_public_sign_pem.into());
        self
    }

    /// Set the repeated key exchange policy.
    pub fn with_key_exchange_policy(mut self, policy: KeyExchangePolicy) -> Self {
        self.key_exchange_policy = policy;
        self
    }

    /// Enable or disable the single retry of failed relay requests.
    pub fn with_retry_failed_task(mut self, retry: bool) -> Self {
        self.retry_failed_task = retry;
        self
    }

    /// Check the config before building a session.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.self_id.is_empty() || self.peer_id.is_empty() {
            return Err(ChatError::Config("Connect ids must not be empty".to_string()));
        }
        if self.self_id == self.peer_id {
            return Err(ChatError::Config(
                "Own id and peer id must differ".to_string(),
            ));
        }
        if self.enable_signature
            && (self.private_sign_pem.is_none() || self.peer_public_sign_pem.is_none())
        {
            return Err(ChatError::Config(
                "Signatures need both a private key and the peer's public key".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persistent user defaults stored in `~/.config/piping-chat/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatProfile {
    /// Relay base URL.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Our connect id.
    #[serde(default)]
    pub connect_id: Option<String>,

    /// Path to our RSA private key PEM.
    #[serde(default)]
    pub private_sign_key: Option<PathBuf>,

    /// Require signatures by default.
    #[serde(default)]
    pub enable_signature: bool,
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

impl Default for ChatProfile {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            connect_id: None,
            private_sign_key: None,
            enable_signature: false,
        }
    }
}

impl ChatProfile {
    /// Load the profile from the default location (`profile` selects `chat-<profile>.toml`).
    pub fn load(profile: Option<&str>) -> Result<Self, ChatError> {
        Self::load_from(&Self::config_path(profile)?)
    }

    /// Save the profile to the default location.
    pub fn save(&self, profile: Option<&str>) -> Result<PathBuf, ChatError> {
        let path = Self::config_path(profile)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Load from a file; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ChatError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("Failed to serialize profile: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path(profile: Option<&str>) -> Result<PathBuf, ChatError> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or_else(|| ChatError::Config("Could not find config directory".to_string()))?;

        let filename = match profile {
            Some(profile) => format!("chat-{}.toml", profile),
            None => "config.toml".to_string(),
        };

        Ok(config_dir.join("piping-chat").join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::new(DEFAULT_RELAY_URL, "alice", "bob");
        assert!(!config.enable_signature);
        assert_eq!(config.key_exchange_policy, KeyExchangePolicy::Reject);
        assert!(config.retry_failed_task);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ids() {
        assert!(SessionConfig::new(DEFAULT_RELAY_URL, "", "bob").validate().is_err());
        assert!(SessionConfig::new(DEFAULT_RELAY_URL, "alice", "alice").validate().is_err());
    }

    #[test]
    fn test_validate_signature_needs_keys() {
        let mut config = SessionConfig::new(DEFAULT_RELAY_URL, "alice", "bob");
        config.enable_signature = true;
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));

        let config = SessionConfig::new(DEFAULT_RELAY_URL, "alice", "bob").with_signature("a", "b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            relay_url = "https://ppng.io"
            self_id = "alice"
            peer_id = "bob"
            key_exchange_policy = "rederive"
            "#,
        )
        .unwrap();

        assert!(config.retry_failed_task);
        assert!(!config.enable_signature);
        assert_eq!(config.key_exchange_policy, KeyExchangePolicy::Rederive);
    }

    #[test]
    fn test_profile_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let profile = ChatProfile::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(profile, ChatProfile::default());
        assert_eq!(profile.relay_url, DEFAULT_RELAY_URL);
    }

    #[test]
    fn test_profile_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let profile = ChatProfile {
            relay_url: "http://localhost:8080".to_string(),
            connect_id: Some("alice".to_string()),
            private_sign_key: Some(PathBuf::from("/keys/alice.sign.key")),
            enable_signature: true,
        };
        profile.save_to(&path).unwrap();

        assert_eq!(ChatProfile::load_from(&path).unwrap(), profile);
    }

    #[test]
    fn test_profile_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "relay_url = [").unwrap();
        assert!(matches!(ChatProfile::load_from(&path), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_profile_path_names() {
        let default = ChatProfile::config_path(None).unwrap();
        let named = ChatProfile::config_path(Some("work")).unwrap();
        assert!(default.ends_with("piping-chat/config.toml"));
        assert!(named.ends_with("piping-chat/chat-work.toml"));
    }
}
