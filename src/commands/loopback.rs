//! Loopback command - exercise the full protocol without a network.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tokio::sync::mpsc;

use piping_chat::chat::{
    ChatSession, MemoryRelay, SessionConfig, SessionEvent, Talk, Transcript, DEFAULT_RELAY_URL,
};
use piping_chat::crypto::{SigningKeyPair, DEFAULT_RSA_BITS};

use super::CommandExecutor;

/// Run "alice" and "bob" against an in-memory relay and print both transcripts.
#[derive(Args, Debug)]
pub struct LoopbackCommand {
    /// Messages alice sends once the channel is established
    #[arg(short, long, default_values_t = vec!["hi".to_string()])]
    pub message: Vec<String>,

    /// Authenticate both sides with freshly generated RSA keys
    #[arg(short, long)]
    pub sign: bool,

    /// Seconds to wait before giving up
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

impl CommandExecutor for LoopbackCommand {
    fn execute(&self) -> Result<()> {
        let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        rt.block_on(async {
            tokio::time::timeout(Duration::from_secs(self.timeout), self.run())
                .await
                .context("Loopback timed out")?
        })
    }
}

/// One side of the loopback with its event stream folded into a transcript.
struct Peer {
    session: ChatSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    transcript: Transcript,
    session_id: Option<String>,
    established: bool,
}

impl Peer {
    fn new(config: SessionConfig, relay: &MemoryRelay) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let session = ChatSession::new(config, Arc::new(relay.clone()), Arc::new(tx))?;
        Ok(Self {
            session,
            events,
            transcript: Transcript::new(),
            session_id: None,
            established: false,
        })
    }

    /// Consume events until `done` holds.
    async fn wait_until(&mut self, done: impl Fn(&Peer) -> bool) -> Result<()> {
        while !done(self) {
            let Some(event) = self.events.recv().await else {
                bail!("Session of {} closed", self.session.self_id());
            };
            match &event {
                SessionEvent::SessionId(id) => self.session_id = Some(id.clone()),
                SessionEvent::Established => self.established = true,
                _ => {}
            }
            self.transcript.apply(&event);
        }
        Ok(())
    }

    fn received_from_peer(&self) -> usize {
        let peer_id = self.session.peer_id();
        self.transcript
            .talks()
            .iter()
            .filter(|talk| matches!(talk, Talk::User(user) if user.talker_id == peer_id))
            .count()
    }

    fn arrived_own(&self) -> usize {
        let self_id = self.session.self_id();
        self.transcript
            .talks()
            .iter()
            .filter(|talk| matches!(talk, Talk::User(user) if user.talker_id == self_id && user.arrived))
            .count()
    }

    fn print(&self) {
        println!("=== {} ===", self.session.self_id());
        for talk in self.transcript.talks() {
            match talk {
                Talk::System(system) => println!("  * {}", system.content),
                Talk::User(user) => println!(
                    "  {}: {}{}",
                    user.talker_id,
                    user.content,
                    if user.arrived { "" } else { " (not delivered)" }
                ),
            }
        }
        println!();
    }
}

impl LoopbackCommand {
    async fn run(&self) -> Result<()> {
        let relay = MemoryRelay::new();
        let mut alice_config = SessionConfig::new(DEFAULT_RELAY_URL, "alice", "bob");
        let mut bob_config = SessionConfig::new(DEFAULT_RELAY_URL, "bob", "alice");

        if self.sign {
            println!("Generating RSA keys...");
            let alice_keys = SigningKeyPair::generate(DEFAULT_RSA_BITS)?;
            let bob_keys = SigningKeyPair::generate(DEFAULT_RSA_BITS)?;
            alice_config = alice_config.with_signature(alice_keys.private_pem(), bob_keys.public_pem());
            bob_config = bob_config.with_signature(bob_keys.private_pem(), alice_keys.public_pem());
        }

        let mut alice = Peer::new(alice_config, &relay)?;
        let mut bob = Peer::new(bob_config, &relay)?;

        let alice_loop = alice.session.connect_to_peer();
        let bob_loop = bob.session.connect_to_peer();

        alice.wait_until(|peer| peer.established).await?;
        bob.wait_until(|peer| peer.established).await?;

        if alice.session_id != bob.session_id {
            bail!("Session ids differ");
        }

        for message in &self.message {
            alice.session.send_talk(message.as_str());
        }
        let expected = self.message.len();
        bob.wait_until(|peer| peer.received_from_peer() == expected).await?;
        alice.wait_until(|peer| peer.arrived_own() == expected).await?;

        alice_loop.abort();
        bob_loop.abort();

        if let Some(id) = &alice.session_id {
            println!("Session ID: {}", id);
            println!();
        }
        alice.print();
        bob.print();

        Ok(())
    }
}
