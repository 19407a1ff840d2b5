//! Chat command for encrypted messaging through a Piping Server.
//!
//! Reads lines from stdin and sends each as a talk; prints the peer's talks
//! and system notices as they arrive.
//!
//! ## Usage
//!
//! - `chat --peer bob` - Chat with "bob" using the id from your profile
//! - `chat --me alice --peer bob --relay http://localhost:8080` - Explicit ids and relay
//! - `chat --peer bob --sign-key me.sign.key --peer-sign-pub bob.sign.pub` - Authenticated

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use piping_chat::chat::{ChatProfile, ChatSession, KeyExchangePolicy, SessionConfig, SessionEvent, Talk};

use super::CommandExecutor;

/// Chat with a peer through the relay.
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Peer's connect id
    #[arg(short, long)]
    pub peer: String,

    /// Your connect id (defaults to the profile's, or a random one)
    #[arg(short, long)]
    pub me: Option<String>,

    /// Relay URL (defaults to the profile's, or https://ppng.io)
    #[arg(short, long)]
    pub relay: Option<String>,

    /// Your RSA private key PEM for signing the session id
    #[arg(long)]
    pub sign_key: Option<PathBuf>,

    /// Peer's RSA public key PEM; enables peer authentication
    #[arg(long)]
    pub peer_sign_pub: Option<PathBuf>,

    /// Accept a repeated key exchange and re-derive the session id
    #[arg(long)]
    pub rederive: bool,

    /// Profile name (uses chat-<profile>.toml)
    #[arg(long)]
    pub profile: Option<String>,

    /// Store the id and relay used for this chat in the profile
    #[arg(long)]
    pub save: bool,
}

impl CommandExecutor for ChatCommand {
    fn execute(&self) -> Result<()> {
        let profile_name = self.profile.as_deref();
        let mut profile = ChatProfile::load(profile_name).context("Failed to load chat profile")?;
        let config = self.session_config(&profile)?;

        if self.save {
            profile.connect_id = Some(config.self_id.clone());
            profile.relay_url = config.relay_url.clone();
            if let Some(sign_key) = &self.sign_key {
                profile.private_sign_key = Some(sign_key.clone());
            }
            let path = profile.save(profile_name).context("Failed to save chat profile")?;
            println!("Profile saved to {}", path.display());
        }

        let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
        let result = rt.block_on(run_chat(config));
        // A pending stdin read would otherwise hold the runtime open.
        rt.shutdown_timeout(Duration::from_millis(100));
        result
    }
}

impl ChatCommand {
    /// Merge command line arguments over the profile.
    fn session_config(&self, profile: &ChatProfile) -> Result<SessionConfig> {
        let self_id = self
            .me
            .clone()
            .or_else(|| profile.connect_id.clone())
            .unwrap_or_else(random_connect_id);
        let relay_url = self.relay.clone().unwrap_or_else(|| profile.relay_url.clone());

        let mut config = SessionConfig::new(relay_url, self_id, self.peer.clone());
        if self.rederive {
            config = config.with_key_exchange_policy(KeyExchangePolicy::Rederive);
        }

        let sign_key = self.sign_key.as_ref().or(profile.private_sign_key.as_ref());
        match (&self.peer_sign_pub, sign_key) {
            (Some(peer_pub), Some(sign_key)) => {
                config = config.with_signature(read_pem(sign_key)?, read_pem(peer_pub)?);
            }
            (Some(_), None) => bail!("--peer-sign-pub needs your private key (--sign-key)"),
            (None, _) if profile.enable_signature => {
                bail!("The profile requires signatures; pass --peer-sign-pub")
            }
            (None, _) => {}
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn random_connect_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

async fn run_chat(config: SessionConfig) -> Result<()> {
    let (events, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    let self_id = config.self_id.clone();
    let peer_id = config.peer_id.clone();
    let session = ChatSession::connect_http(config, Arc::new(events))?;

    println!("You are \"{}\", chatting with \"{}\".", self_id, peer_id);
    println!("Type a message and press Enter. /quit or Ctrl+D to leave.");
    println!();

    let mut receiver = session.connect_to_peer();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.context("Failed to read from stdin")?;
                match line.as_deref().map(str::trim) {
                    None | Some("/quit") => break,
                    Some("") => {}
                    Some(text) => {
                        session.send_talk(text);
                    }
                }
            }
            Some(event) = rx.recv() => print_event(&event, &self_id),
            reason = &mut receiver => {
                match reason {
                    Ok(reason) => eprintln!("Connection closed: {}", reason),
                    Err(e) => eprintln!("Receive task failed: {}", e),
                }
                break;
            }
        }
    }

    receiver.abort();
    while let Ok(event) = rx.try_recv() {
        print_event(&event, &self_id);
    }
    Ok(())
}

fn print_event(event: &SessionEvent, self_id: &str) {
    match event {
        SessionEvent::SessionId(id) => println!("* Session ID: {}", id),
        SessionEvent::Talk(Talk::System(talk)) => {
            println!("* [{}] {}", talk.time.format("%H:%M:%S"), talk.content)
        }
        SessionEvent::Talk(Talk::User(talk)) if talk.talker_id != self_id => {
            println!("[{}] {}: {}", talk.time.format("%H:%M:%S"), talk.talker_id, talk.content)
        }
        SessionEvent::TalkArrived(id) => println!("  (delivered #{})", id.0),
        _ => {}
    }
}
