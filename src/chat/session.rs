//! Chat session state machine.
//!
//! A `ChatSession` owns the two ephemeral key pairs, the monotonic session
//! flags and the two sequential contexts (one per relay direction). It is a
//! cheap `Clone` handle so that spawned send tasks and the receive loop can
//! share it.
//!
//! Phases: `Initializing -> KeysExchanging -> (Authenticating) -> Established`.
//! There is no way back out of `Established`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::config::{KeyExchangePolicy, SessionConfig};
use crate::chat::error::ChatError;
use crate::chat::observer::SessionObserver;
use crate::chat::protocol::{envelope, EphemeralKeys, KeyExchangeContent, Parcel, PeerKeys};
use crate::chat::receiver::{ReceiveLoop, StopReason};
use crate::chat::sequential::SequentialContext;
use crate::chat::talk::{Talk, TalkId, UserTalk};
use crate::chat::transport::{
    channel_path, HttpRelay, RelayBody, RelayResponse, RelayTransport,
};
use crate::crypto::{CryptoProvider, OsCryptoProvider, PeerVerifier, SessionSigner};

const NOTICE_PUBLIC_KEY_SENT: &str = "Your public key sent.";
const NOTICE_PEER_KEY_RECEIVED: &str = "Peer's public key received.";
const NOTICE_PEER_VERIFIED: &str = "Peer was verified!";
const NOTICE_PEER_NOT_VERIFIED: &str = "Error: Peer was not verified.";
const NOTICE_NOT_ESTABLISHED: &str = "Error: Connection was not established.";
const NOTICE_PEER_KEY_MISSING: &str = "Peer's public key is not received yet.";
const NOTICE_SEND_FAILED: &str = "Unexpected error: send-body is null.";
const NOTICE_REPEATED_KEY_EXCHANGE: &str = "Ignored repeated key exchange from peer.";
const NOTICE_NEW_KEY_UNVERIFIED: &str = "Peer's new public key is not verified yet.";
const NOTICE_UNVERIFIED_TALK: &str = "Ignored talk from unverified peer.";

/// Monotonic session flags. Each one only ever goes from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub public_key_sent: bool,
    pub peer_public_key_received: bool,
    /// Only meaningful when signatures are enabled.
    pub peer_verified: bool,
    pub established: bool,
}

impl SessionFlags {
    /// Whether the establishment condition holds.
    pub fn ready(&self, signature_required: bool) -> bool {
        self.public_key_sent
            && self.peer_public_key_received
            && (!signature_required || self.peer_verified)
    }

    /// Phase derived from the flags.
    pub fn phase(&self) -> SessionPhase {
        if self.established {
            SessionPhase::Established
        } else if self.public_key_sent && self.peer_public_key_received {
            SessionPhase::Authenticating
        } else if self.public_key_sent || self.peer_public_key_received {
            SessionPhase::KeysExchanging
        } else {
            SessionPhase::Initializing
        }
    }
}

/// Coarse state of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    KeysExchanging,
    /// Both keys exchanged, waiting for the peer's signature.
    Authenticating,
    Established,
}

struct Authentication {
    signer: SessionSigner,
    verifier: PeerVerifier,
}

#[derive(Default)]
struct SessionState {
    flags: SessionFlags,
    session_id: Option<String>,
    peer_keys: Option<PeerKeys>,
    /// The session id the peer's signature was checked against.
    verified_session_id: Option<String>,
    /// Latched after a failed verification; later signatures are ignored.
    peer_rejected: bool,
    next_talk_id: u64,
}

struct SessionInner {
    config: SessionConfig,
    outbound_path: String,
    inbound_path: String,
    keys: EphemeralKeys,
    auth: Option<Authentication>,
    relay: Arc<dyn RelayTransport>,
    crypto: Arc<dyn CryptoProvider>,
    observer: Arc<dyn SessionObserver>,
    send_ctx: SequentialContext,
    recv_ctx: SequentialContext,
    state: Mutex<SessionState>,
}

/// End-to-end encrypted chat with one peer over a relay.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Create a session using the operating system RNG.
    pub fn new(
        config: SessionConfig,
        relay: Arc<dyn RelayTransport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ChatError> {
        Self::with_crypto_provider(config, relay, observer, Arc::new(OsCryptoProvider))
    }

    /// Create a session drawing all randomness from `crypto`.
    ///
    /// Generates both ephemeral key pairs and reports the encryption public
    /// key through [`SessionObserver::on_encrypt_key_pair_ready`].
    pub fn with_crypto_provider(
        config: SessionConfig,
        relay: Arc<dyn RelayTransport>,
        observer: Arc<dyn SessionObserver>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<Self, ChatError> {
        config.validate()?;

        let auth = match (
            config.enable_signature,
            &config.private_sign_pem,
            &config.peer_public_sign_pem,
        ) {
            (true, Some(private_pem), Some(peer_public_pem)) => Some(Authentication {
                signer: SessionSigner::from_pem(private_pem)?,
                verifier: PeerVerifier::from_pem(peer_public_pem)?,
            }),
            _ => None,
        };

        let keys = EphemeralKeys::generate(crypto.as_ref());
        let outbound_path = channel_path(&config.self_id, &config.peer_id);
        let inbound_path = channel_path(&config.peer_id, &config.self_id);
        debug!(
            self_id = %config.self_id,
            peer_id = %config.peer_id,
            outbound = %outbound_path,
            inbound = %inbound_path,
            "Session created"
        );

        let retry = config.retry_failed_task;
        let inner = SessionInner {
            config,
            outbound_path,
            inbound_path,
            keys,
            auth,
            relay,
            crypto,
            observer,
            send_ctx: SequentialContext::new("send").with_retry(retry),
            recv_ctx: SequentialContext::new("receive").with_retry(retry),
            state: Mutex::new(SessionState::default()),
        };
        inner
            .observer
            .on_encrypt_key_pair_ready(&inner.keys.encrypt_public_jwk());

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Create a session talking to the HTTP relay named in the config.
    pub fn connect_http(
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, ChatError> {
        let relay = HttpRelay::new(config.relay_url.clone())?;
        Self::new(config, Arc::new(relay), observer)
    }

    pub fn self_id(&self) -> &str {
        &self.inner.config.self_id
    }

    pub fn peer_id(&self) -> &str {
        &self.inner.config.peer_id
    }

    /// Relay path we POST to.
    pub fn outbound_path(&self) -> &str {
        &self.inner.outbound_path
    }

    /// Relay path we GET from.
    pub fn inbound_path(&self) -> &str {
        &self.inner.inbound_path
    }

    /// The shared session id, once the peer's key has arrived.
    pub fn session_id(&self) -> Option<String> {
        self.inner.state().session_id.clone()
    }

    /// Snapshot of the session flags.
    pub fn flags(&self) -> SessionFlags {
        self.inner.state().flags
    }

    pub fn phase(&self) -> SessionPhase {
        self.flags().phase()
    }

    pub fn is_established(&self) -> bool {
        self.flags().established
    }

    /// Send our public keys in plaintext to the peer.
    ///
    /// Resolves once the relay delivered the body.
    pub async fn initiate(&self) -> Result<(), ChatError> {
        let delivery = self.inner.send_public_key()?;
        self.inner.public_key_delivered(delivery.await)
    }

    /// Queue a talk for the peer.
    ///
    /// The local entry is reported immediately with `arrived == false`; once
    /// the relay confirms delivery, `on_talk_arrived` fires with the returned
    /// id. Must be called from within a Tokio runtime.
    pub fn send_talk(&self, text: impl Into<String>) -> TalkId {
        let inner = &self.inner;
        let content = text.into();

        let (id, peer_public, rekey_unverified) = {
            let mut state = inner.state();
            let id = state.allocate_talk_id();
            (
                id,
                state.peer_keys.as_ref().map(|keys| keys.encrypt_public),
                inner.auth.is_some() && state.rekey_unverified(),
            )
        };

        inner.observer.on_talk(&Talk::User(UserTalk {
            id,
            time: Utc::now(),
            talker_id: inner.config.self_id.clone(),
            content: content.clone(),
            arrived: false,
        }));

        let Some(peer_public) = peer_public else {
            inner.notice(NOTICE_PEER_KEY_MISSING);
            return id;
        };
        if rekey_unverified {
            warn!(talk = id.0, "Not sending to an unverified peer key");
            inner.notice(NOTICE_NEW_KEY_UNVERIFIED);
            return id;
        }

        let body = match envelope::encrypt(
            &Parcel::Talk(content),
            inner.keys.encrypt_secret(),
            &peer_public,
            inner.crypto.as_ref(),
        ) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encrypt talk");
                inner.notice(NOTICE_SEND_FAILED);
                return id;
            }
        };

        // Registered with the send context now, so talks keep call order.
        let delivery = inner.post(RelayBody::Binary(body));
        let session = Arc::clone(inner);
        tokio::spawn(async move {
            match delivery.await {
                Ok(()) => {
                    debug!(talk = id.0, "Talk arrived");
                    session.observer.on_talk_arrived(id);
                }
                Err(e) => {
                    warn!(talk = id.0, error = %e, "Failed to send talk");
                    session.notice(NOTICE_SEND_FAILED);
                }
            }
        });
        id
    }

    /// Receive and handle one body from the peer.
    pub async fn receive_once(&self) -> Result<(), ChatError> {
        let inner = &self.inner;
        let relay = Arc::clone(&inner.relay);
        let path = inner.inbound_path.clone();

        debug!(path = %path, "Waiting for peer");
        let response = inner
            .recv_ctx
            .run(move || {
                let relay = Arc::clone(&relay);
                let path = path.clone();
                async move { relay.get(&path).await }
            })
            .await?;

        let parcel = inner.decode_inbound(response)?;
        debug!(kind = parcel.kind(), "Parcel received");
        inner.handle_parcel(parcel)
    }

    /// Send our public key and start receiving in a background task.
    ///
    /// The handle resolves with the reason the receive loop stopped.
    pub fn connect_to_peer(&self) -> JoinHandle<StopReason> {
        // Queued before the loop starts, so the key exchange is always our first POST.
        match self.inner.send_public_key() {
            Ok(delivery) => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    // Failures are already reported as notices.
                    let _ = inner.public_key_delivered(delivery.await);
                });
            }
            Err(e) => warn!(error = %e, "Failed to encode key exchange"),
        }

        tokio::spawn(ReceiveLoop::new(self.clone()).run())
    }

    /// Report a system notice to the observer.
    pub(crate) fn notice(&self, content: impl Into<String>) {
        self.inner.notice(content);
    }
}

impl SessionState {
    fn allocate_talk_id(&mut self) -> TalkId {
        let id = TalkId(self.next_talk_id);
        self.next_talk_id += 1;
        id
    }

    /// Whether the current session id carries a valid peer signature.
    fn current_id_verified(&self) -> bool {
        self.session_id.is_some() && self.verified_session_id == self.session_id
    }

    /// A verified handshake was replaced by one that is not verified yet.
    fn rekey_unverified(&self) -> bool {
        self.verified_session_id.is_some() && !self.current_id_verified()
    }
}

impl SessionInner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notice(&self, content: impl Into<String>) {
        let talk = Talk::system(content);
        debug!(notice = talk.content(), "System notice");
        self.observer.on_talk(&talk);
    }

    /// Submit a POST to the outbound path on the send context.
    fn post(&self, body: RelayBody) -> impl Future<Output = Result<(), ChatError>> + Send + 'static {
        let relay = Arc::clone(&self.relay);
        let path = self.outbound_path.clone();
        self.send_ctx.run(move || {
            let relay = Arc::clone(&relay);
            let path = path.clone();
            let body = body.clone();
            async move { relay.post(&path, body).await }
        })
    }

    /// Queue the plaintext key exchange on the send context.
    fn send_public_key(
        &self,
    ) -> Result<impl Future<Output = Result<(), ChatError>> + Send + 'static, ChatError> {
        self.notice(format!(
            "Sending your public key to \"{}\"...",
            self.config.peer_id
        ));
        let body = self.keys.key_exchange_parcel().to_json()?;
        Ok(self.post(RelayBody::Text(body)))
    }

    fn public_key_delivered(&self, result: Result<(), ChatError>) -> Result<(), ChatError> {
        if let Err(e) = result {
            warn!(error = %e, "Failed to send public key");
            self.notice(NOTICE_SEND_FAILED);
            return Err(e);
        }

        info!(peer_id = %self.config.peer_id, "Public key sent");
        self.notice(NOTICE_PUBLIC_KEY_SENT);
        self.state().flags.public_key_sent = true;
        self.establish_if_needed();
        Ok(())
    }

    /// Fire the established side effects the first time the condition holds.
    fn establish_if_needed(&self) {
        let fire = {
            let mut state = self.state();
            if !state.flags.established && state.flags.ready(self.auth.is_some()) {
                state.flags.established = true;
                true
            } else {
                false
            }
        };

        if fire {
            info!(peer_id = %self.config.peer_id, "Connection established");
            self.notice(format!(
                "Connection established with \"{}\"!",
                self.config.peer_id
            ));
            self.observer.on_established();
        }
    }

    fn decode_inbound(&self, response: RelayResponse) -> Result<Parcel, ChatError> {
        if response.is_plaintext() {
            let parcel = Parcel::from_bytes(&response.body)?;
            return match parcel {
                Parcel::KeyExchange(_) => Ok(parcel),
                other => Err(ChatError::Validation(format!(
                    "Unexpected plaintext parcel: {}",
                    other.kind()
                ))),
            };
        }

        let peer_public = self
            .state()
            .peer_keys
            .as_ref()
            .map(|keys| keys.encrypt_public)
            .ok_or(ChatError::PeerKeyUnknown)?;
        envelope::decrypt(&response.body, self.keys.encrypt_secret(), &peer_public)
    }

    fn handle_parcel(&self, parcel: Parcel) -> Result<(), ChatError> {
        match parcel {
            Parcel::KeyExchange(content) => self.on_key_exchange(&content),
            Parcel::SessionIdSignature(signature) => {
                self.on_signature(&signature);
                Ok(())
            }
            Parcel::Talk(content) => {
                self.on_peer_talk(content);
                Ok(())
            }
        }
    }

    fn on_key_exchange(&self, content: &KeyExchangeContent) -> Result<(), ChatError> {
        let repeated = self.state().peer_keys.is_some();
        if repeated && self.config.key_exchange_policy == KeyExchangePolicy::Reject {
            warn!(peer_id = %self.config.peer_id, "Ignoring repeated key exchange");
            self.notice(NOTICE_REPEATED_KEY_EXCHANGE);
            return Ok(());
        }

        let peer_keys = PeerKeys::import(content)?;
        let session_id = self.keys.derive_session_id(&peer_keys.session_id_public)?;
        let peer_encrypt_jwk = peer_keys.encrypt_public_jwk.clone();
        let peer_encrypt_public = peer_keys.encrypt_public;
        {
            let mut state = self.state();
            state.session_id = Some(session_id.clone());
            state.peer_keys = Some(peer_keys);
            state.flags.peer_public_key_received = true;
        }

        info!(session_id = %session_id, rederived = repeated, "Session id derived");
        self.observer.on_session_id(&session_id);
        self.observer.on_peer_encryption_key(&peer_encrypt_jwk);
        self.notice(NOTICE_PEER_KEY_RECEIVED);

        if let Some(auth) = &self.auth {
            let signature = auth.signer.sign(&session_id)?;
            let body = envelope::encrypt(
                &Parcel::SessionIdSignature(signature),
                self.keys.encrypt_secret(),
                &peer_encrypt_public,
                self.crypto.as_ref(),
            )?;
            self.send_signature(body);
        }

        self.establish_if_needed();
        Ok(())
    }

    /// Post our signature without holding up the receive loop.
    fn send_signature(&self, body: Vec<u8>) {
        let delivery = self.post(RelayBody::Binary(body));
        let observer = Arc::clone(&self.observer);
        tokio::spawn(async move {
            match delivery.await {
                Ok(()) => debug!("Session id signature sent"),
                Err(e) => {
                    warn!(error = %e, "Failed to send session id signature");
                    observer.on_talk(&Talk::system(NOTICE_SEND_FAILED));
                }
            }
        });
    }

    fn on_signature(&self, signature: &str) {
        let Some(auth) = &self.auth else {
            debug!("Ignoring signature, signatures are disabled");
            return;
        };

        let session_id = {
            let state = self.state();
            if state.peer_rejected {
                debug!("Ignoring signature, peer was rejected");
                return;
            }
            if state.current_id_verified() {
                debug!("Ignoring signature, session id already verified");
                return;
            }
            match &state.session_id {
                Some(id) => id.clone(),
                None => {
                    warn!("Signature received before the session id exists");
                    return;
                }
            }
        };

        match auth.verifier.verify(&session_id, signature) {
            Ok(()) => {
                info!(peer_id = %self.config.peer_id, session_id = %session_id, "Peer verified");
                {
                    let mut state = self.state();
                    state.flags.peer_verified = true;
                    state.verified_session_id = Some(session_id);
                }
                self.notice(NOTICE_PEER_VERIFIED);
                self.establish_if_needed();
            }
            Err(e) => {
                warn!(peer_id = %self.config.peer_id, error = %e, "Peer verification failed");
                self.state().peer_rejected = true;
                self.notice(NOTICE_PEER_NOT_VERIFIED);
                self.notice(NOTICE_NOT_ESTABLISHED);
            }
        }
    }

    fn on_peer_talk(&self, content: String) {
        let id = {
            let mut state = self.state();
            if self.auth.is_some() && !state.current_id_verified() {
                drop(state);
                warn!(peer_id = %self.config.peer_id, "Ignoring talk under an unverified session id");
                self.notice(NOTICE_UNVERIFIED_TALK);
                return;
            }
            state.allocate_talk_id()
        };
        self.observer.on_talk(&Talk::User(UserTalk {
            id,
            time: Utc::now(),
            talker_id: self.config.peer_id.clone(),
            content,
            arrived: true,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::observer::{NoopObserver, SessionEvent};
    use crate::chat::transport::{MemoryRelay, TEXT_PLAIN};
    use crate::crypto::SeededCryptoProvider;
    use tokio::sync::mpsc;

    fn session(
        self_id: &str,
        peer_id: &str,
        relay: &MemoryRelay,
    ) -> (ChatSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ChatSession::new(
            SessionConfig::new("http://relay.test", self_id, peer_id),
            Arc::new(relay.clone()),
            Arc::new(tx),
        )
        .unwrap();
        (session, rx)
    }

    #[test]
    fn test_flags_phase() {
        let mut flags = SessionFlags::default();
        assert_eq!(flags.phase(), SessionPhase::Initializing);

        flags.public_key_sent = true;
        assert_eq!(flags.phase(), SessionPhase::KeysExchanging);
        assert!(!flags.ready(false));

        flags.peer_public_key_received = true;
        assert_eq!(flags.phase(), SessionPhase::Authenticating);
        assert!(flags.ready(false));
        assert!(!flags.ready(true));

        flags.peer_verified = true;
        assert!(flags.ready(true));

        flags.established = true;
        assert_eq!(flags.phase(), SessionPhase::Established);
    }

    #[test]
    fn test_verification_follows_session_id() {
        let mut state = SessionState::default();
        assert!(!state.current_id_verified());
        assert!(!state.rekey_unverified());

        state.session_id = Some("first".to_string());
        state.verified_session_id = Some("first".to_string());
        assert!(state.current_id_verified());
        assert!(!state.rekey_unverified());

        state.session_id = Some("second".to_string());
        assert!(!state.current_id_verified());
        assert!(state.rekey_unverified());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let relay = MemoryRelay::new();
        let result = ChatSession::new(
            SessionConfig::new("http://relay.test", "alice", "alice"),
            Arc::new(relay),
            Arc::new(NoopObserver),
        );
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[test]
    fn test_new_rejects_bad_signing_pem() {
        let relay = MemoryRelay::new();
        let config = SessionConfig::new("http://relay.test", "alice", "bob")
            .with_signature("not a pem", "not a pem either");
        let result = ChatSession::new(config, Arc::new(relay), Arc::new(NoopObserver));
        assert!(matches!(result, Err(ChatError::Key(_))));
    }

    #[test]
    fn test_paths_and_key_pair_event() {
        let relay = MemoryRelay::new();
        let (alice, mut events) = session("alice", "bob", &relay);

        assert_eq!(alice.outbound_path(), channel_path("alice", "bob"));
        assert_eq!(alice.inbound_path(), channel_path("bob", "alice"));
        assert_eq!(alice.phase(), SessionPhase::Initializing);
        assert!(alice.session_id().is_none());

        match events.try_recv().unwrap() {
            SessionEvent::EncryptKeyPairReady(jwk) => {
                assert_eq!(jwk.kty.as_deref(), Some("EC"));
                assert!(jwk.d.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_seeded_sessions_are_reproducible() {
        let relay = MemoryRelay::new();
        let make = || {
            let (tx, mut rx) = mpsc::unbounded_channel();
            ChatSession::with_crypto_provider(
                SessionConfig::new("http://relay.test", "alice", "bob"),
                Arc::new(relay.clone()),
                Arc::new(tx),
                Arc::new(SeededCryptoProvider::new([1u8; 32])),
            )
            .unwrap();
            rx.try_recv().unwrap()
        };
        assert_eq!(make(), make());
    }

    #[tokio::test]
    async fn test_plaintext_talk_is_rejected() {
        let relay = MemoryRelay::new();
        let (alice, _events) = session("alice", "bob", &relay);

        let response = RelayResponse {
            content_type: Some(TEXT_PLAIN.to_string()),
            body: br#"{"kind":"talk","content":"hi"}"#.to_vec(),
        };
        assert!(matches!(
            alice.inner.decode_inbound(response),
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_before_peer_key_is_rejected() {
        let relay = MemoryRelay::new();
        let (alice, _events) = session("alice", "bob", &relay);

        let response = RelayResponse {
            content_type: Some("application/octet-stream".to_string()),
            body: vec![0u8; 64],
        };
        assert!(matches!(
            alice.inner.decode_inbound(response),
            Err(ChatError::PeerKeyUnknown)
        ));
    }

    #[tokio::test]
    async fn test_talk_ids_are_unique() {
        let relay = MemoryRelay::new();
        let (alice, _events) = session("alice", "bob", &relay);

        let first = alice.send_talk("same");
        let second = alice.send_talk("same");
        assert_ne!(first, second);
    }
}
