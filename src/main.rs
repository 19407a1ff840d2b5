//! piping-chat - encrypted chat over an untrusted relay
//!
//! A CLI for end-to-end encrypted two-party chat through a Piping Server.
//! The relay only ever sees hashed path names and ciphertext.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ChatCommand, CommandExecutor, KeygenCommand, LoopbackCommand, PathCommand};

/// piping-chat - encrypted chat over an untrusted relay
///
/// Both peers exchange ephemeral P-256 keys through the relay, derive the same
/// session id and encrypt every message with AES-GCM. Optional RSA signatures
/// over the session id authenticate the peer.
#[derive(Parser)]
#[command(name = "piping-chat")]
#[command(version)]
#[command(about = "End-to-end encrypted chat over a Piping Server relay")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a peer through the relay
    Chat(ChatCommand),

    /// Print the relay path used for messages from one id to another
    Path(PathCommand),

    /// Generate an RSA signing key pair for peer authentication
    Keygen(KeygenCommand),

    /// Run two sessions against an in-memory relay and print the transcript
    Loopback(LoopbackCommand),
}

impl Commands {
    fn executor(&self) -> &dyn CommandExecutor {
        match self {
            Commands::Chat(cmd) => cmd,
            Commands::Path(cmd) => cmd,
            Commands::Keygen(cmd) => cmd,
            Commands::Loopback(cmd) => cmd,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("piping_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.executor().execute()
}
