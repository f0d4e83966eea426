use std::path::{Path, PathBuf};

use anyhow::anyhow;
use step_osis::{Config, Dialect};
use tracing::instrument;

use super::{parse_dialect, terminal::Colorize};

const KEYS: &str = "dialect, stylesheet_dir, compiler, module_dir, compile_module";

#[derive(Debug, clap::Parser)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: Action,
}

#[derive(Debug, clap::Parser)]
enum Action {
    /// Show the effective configuration
    Show,

    /// Set a configuration value
    ///
    /// An empty value clears the setting.
    Set {
        /// Configuration key to set
        key: String,

        /// Value to set
        value: String,
    },
}

impl ConfigCommand {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, path: &Path, mut config: Config) -> anyhow::Result<()> {
        match self.command {
            Action::Show => show(path, &config),
            Action::Set { key, value } => {
                set(&mut config, &key, &value)?;
                config.save(path).map_err(|e| anyhow!("{e}"))?;
                println!("{}", format!("Set {key} in {}", path.display()).success());
            }
        }
        Ok(())
    }
}

fn show(path: &Path, config: &Config) {
    let unset = || "(unset)".dim();
    let path_or_unset = |p: Option<&Path>| p.map_or_else(unset, |p| p.display().to_string());

    println!("Configuration ({})", path.display().to_string().dim());
    println!(
        "  dialect: {}",
        config.dialect().map_or_else(unset, |d| d.to_string())
    );
    println!(
        "  stylesheet_dir: {}",
        config
            .stylesheet_dir()
            .map_or_else(|| "(bundled)".dim(), |p| p.display().to_string())
    );
    println!("  compiler: {}", path_or_unset(config.compiler()));
    println!("  module_dir: {}", path_or_unset(config.module_dir()));
    println!("  compile_module: {}", config.compile_module);
}

fn set(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    let path = || (!value.is_empty()).then(|| PathBuf::from(value));
    match key {
        "dialect" => {
            let dialect: Option<Dialect> = if value.is_empty() {
                None
            } else {
                Some(parse_dialect(value).map_err(|e| anyhow!(e))?)
            };
            config.set_dialect(dialect);
        }
        "stylesheet_dir" => config.set_stylesheet_dir(path()),
        "compiler" => config.set_compiler(path()),
        "module_dir" => config.set_module_dir(path()),
        "compile_module" => {
            config.compile_module = value
                .parse()
                .map_err(|_| anyhow!("Value must be 'true' or 'false'"))?;
        }
        _ => {
            return Err(anyhow!(
                "Unknown configuration key: '{key}'\nSupported keys: {KEYS}"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn set_updates_known_keys() {
        let mut config = Config::default();
        set(&mut config, "dialect", "usx").unwrap();
        set(&mut config, "compiler", "/opt/sword/osis2mod").unwrap();
        set(&mut config, "compile_module", "true").unwrap();

        assert_eq!(config.dialect(), Some(Dialect::Usx));
        assert_eq!(config.compiler(), Some(Path::new("/opt/sword/osis2mod")));
        assert!(config.compile_module);

        set(&mut config, "compiler", "").unwrap();
        assert_eq!(config.compiler(), None);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(set(&mut config, "colour", "blue").is_err());
        assert!(set(&mut config, "compile_module", "maybe").is_err());
        assert!(set(&mut config, "dialect", "klingon").is_err());
        assert!(set(&mut config, "dialect", "USX").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn set_persists_the_configuration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xml2osis.toml");

        let command = ConfigCommand {
            command: Action::Set {
                key: "module_dir".to_string(),
                value: "modules".to_string(),
            },
        };
        command.run(&path, Config::default()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.module_dir(), Some(Path::new("modules")));
    }
}
