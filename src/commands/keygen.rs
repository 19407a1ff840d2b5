//! Key generation command.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use piping_chat::crypto::{SigningKeyPair, DEFAULT_RSA_BITS};

use super::CommandExecutor;

/// Generate an RSA signing key pair for session id signatures.
#[derive(Args, Debug)]
pub struct KeygenCommand {
    /// Output path for keys (creates .sign.pub and .sign.key files)
    #[arg(short, long, default_value = "piping-chat")]
    pub output: PathBuf,

    /// RSA modulus size in bits
    #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
    pub bits: usize,
}

impl CommandExecutor for KeygenCommand {
    fn execute(&self) -> Result<()> {
        if self.bits < 2048 {
            bail!("Refusing to generate RSA keys shorter than 2048 bits");
        }

        let keypair = SigningKeyPair::generate(self.bits).context("Failed to generate signing key pair")?;
        let (pub_path, key_path) = keypair
            .save_to_files(&self.output)
            .context("Failed to save signing key pair")?;

        println!("Signing key pair generated successfully:");
        println!();
        println!("  Public key:  {}", pub_path.display());
        println!("  Private key: {}", key_path.display());
        println!();
        println!("Give your public key (.sign.pub) to your peer; they pass it as --peer-sign-pub.");
        println!("Keep your private key (.sign.key) secret; pass it as --sign-key.");

        Ok(())
    }
}
