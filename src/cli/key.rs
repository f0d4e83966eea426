use clap::Parser;
use step_osis::{
    module::{obfuscate_key, reveal_key},
    Secret,
};
use tracing::instrument;

fn parse_secret(s: &str) -> Result<Secret, String> {
    Secret::new(s.to_string()).map_err(|_| "the key must not be empty".to_string())
}

#[derive(Debug, Parser)]
pub struct ObfuscateKey {
    /// Password the cipher key is masked with
    #[arg(long, env = "STEP_OBFUSCATION_KEY", hide_env_values = true, value_parser = parse_secret)]
    obfuscation_key: Secret,

    /// Key the module text is encrypted with
    #[arg(
        long,
        env = "STEP_CIPHER_KEY",
        hide_env_values = true,
        value_parser = parse_secret,
        required_unless_present = "reveal"
    )]
    cipher_key: Option<Secret>,

    /// Recover the cipher key from a masked value instead
    #[arg(long, value_name = "MASKED", conflicts_with = "cipher_key")]
    reveal: Option<String>,
}

impl ObfuscateKey {
    #[instrument(level = "debug")]
    pub fn run(self) -> anyhow::Result<()> {
        match (self.reveal, self.cipher_key) {
            (Some(masked), _) => println!("{}", reveal_key(&masked, &self.obfuscation_key)?),
            (None, Some(cipher_key)) => println!(
                "CipherKey={}",
                obfuscate_key(&cipher_key, &self.obfuscation_key)?
            ),
            (None, None) => anyhow::bail!("either --cipher-key or --reveal is required"),
        }
        Ok(())
    }
}
