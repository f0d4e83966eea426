use std::path::{Path, PathBuf};

mod config;
mod convert;
mod files;
mod key;
mod reposition;
mod terminal;

use anyhow::anyhow;
use clap::ArgAction;
use config::ConfigCommand;
use convert::Convert;
use files::Files;
use key::ObfuscateKey;
use reposition::Reposition;
use step_osis::{Config, ConfigurationError, Dialect};

/// Parse a dialect token. Tokens are lowercase, as in the library.
fn parse_dialect(s: &str) -> Result<Dialect, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The configuration file
    #[arg(long, default_value = "xml2osis.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);
        self.command.run(&self.config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Convert a directory of book files into one OSIS document
    ///
    /// The files are merged in file name order, transformed with the
    /// dialect's stylesheet, and written to the output file. With
    /// --compile the result is also packaged as an encrypted module.
    Convert(Box<Convert>),

    /// List the files a conversion would merge, in merge order
    Files(Files),

    /// Move pre-verse material in front of its verse in an OSIS file
    Reposition(Reposition),

    /// Print the masked cipher key for a module configuration file
    ObfuscateKey(ObfuscateKey),

    /// Show or modify configuration settings
    Config(ConfigCommand),
}

impl Command {
    fn run(self, config_path: &Path) -> anyhow::Result<()> {
        let config = Config::load_or_default(config_path).map_err(|e| anyhow!("{e}"))?;
        match self {
            Self::Convert(command) => (*command).run(&config)?,
            Self::Files(command) => command.run(&config)?,
            Self::Reposition(command) => command.run()?,
            Self::ObfuscateKey(command) => command.run()?,
            Self::Config(command) => command.run(config_path, config)?,
        }
        Ok(())
    }
}

/// Where the source files are and what they contain.
#[derive(Debug, clap::Args)]
pub struct Sources {
    /// Directory of Old Testament book files
    #[arg(long, value_name = "DIR")]
    old_testament: PathBuf,

    /// Directory of New Testament book files
    #[arg(long, value_name = "DIR")]
    new_testament: Option<PathBuf>,

    /// Source dialect (biblica, usx). Defaults to the configured dialect.
    #[arg(long, short, value_parser = parse_dialect)]
    dialect: Option<Dialect>,
}

impl Sources {
    /// The dialect from the command line, falling back to the configuration.
    fn dialect(&self, config: &Config) -> Result<Dialect, ConfigurationError> {
        self.dialect
            .or_else(|| config.dialect())
            .ok_or(ConfigurationError::MissingDialect)
    }
}
