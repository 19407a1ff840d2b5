//! Path command - show the relay path between two ids.

use anyhow::{bail, Result};
use clap::Args;

use piping_chat::channel_path;

use super::CommandExecutor;

/// Print the relay path carrying messages from one id to another.
///
/// The path is the hex SHA-256 of "<from>-to-<to>", so swapping the ids
/// gives the path of the opposite direction.
#[derive(Args, Debug)]
pub struct PathCommand {
    /// Sender connect id
    pub from: String,

    /// Receiver connect id
    pub to: String,

    /// Also print the path of the opposite direction
    #[arg(short, long)]
    pub both: bool,
}

impl CommandExecutor for PathCommand {
    fn execute(&self) -> Result<()> {
        if self.from.is_empty() || self.to.is_empty() {
            bail!("Connect ids must not be empty");
        }

        if self.both {
            println!("{} -> {}: {}", self.from, self.to, channel_path(&self.from, &self.to));
            println!("{} -> {}: {}", self.to, self.from, channel_path(&self.to, &self.from));
        } else {
            println!("{}", channel_path(&self.from, &self.to));
        }

        Ok(())
    }
}
