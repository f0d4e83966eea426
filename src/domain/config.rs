use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Dialect;

/// Defaults for conversion runs.
///
/// Command line flags take precedence over every value held here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Dialect used when none is given on the command line.
    dialect: Option<Dialect>,

    /// Directory holding `transform-<dialect>.xsl` files.
    ///
    /// When unset, the stylesheets bundled with the tool are used.
    stylesheet_dir: Option<PathBuf>,

    /// Path of the `osis2mod` executable.
    compiler: Option<PathBuf>,

    /// Directory the compiled module is written to.
    module_dir: Option<PathBuf>,

    /// Whether to run the module compiler after the document is written.
    pub compile_module: bool,
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Loads the configuration, falling back to defaults if there is no file
    /// at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// The default dialect, if configured.
    #[must_use]
    pub const fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// The stylesheet override directory, if configured.
    #[must_use]
    pub fn stylesheet_dir(&self) -> Option<&Path> {
        self.stylesheet_dir.as_deref()
    }

    /// The module compiler executable, if configured.
    #[must_use]
    pub fn compiler(&self) -> Option<&Path> {
        self.compiler.as_deref()
    }

    /// The module output directory, if configured.
    #[must_use]
    pub fn module_dir(&self) -> Option<&Path> {
        self.module_dir.as_deref()
    }

    /// Sets the default dialect.
    pub const fn set_dialect(&mut self, dialect: Option<Dialect>) {
        self.dialect = dialect;
    }

    /// Sets the stylesheet override directory.
    pub fn set_stylesheet_dir(&mut self, dir: Option<PathBuf>) {
        self.stylesheet_dir = dir;
    }

    /// Sets the module compiler executable.
    pub fn set_compiler(&mut self, compiler: Option<PathBuf>) {
        self.compiler = compiler;
    }

    /// Sets the module output directory.
    pub fn set_module_dir(&mut self, dir: Option<PathBuf>) {
        self.module_dir = dir;
    }
}

/// The serialized versions of the configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dialect: Option<Dialect>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        stylesheet_dir: Option<PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        compiler: Option<PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        module_dir: Option<PathBuf>,

        #[serde(default)]
        compile_module: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                dialect,
                stylesheet_dir,
                compiler,
                module_dir,
                compile_module,
            } => Self {
                dialect,
                stylesheet_dir,
                compiler,
                module_dir,
                compile_module,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            dialect: config.dialect,
            stylesheet_dir: config.stylesheet_dir,
            compiler: config.compiler,
            module_dir: config.module_dir,
            compile_module: config.compile_module,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\ndialect = \"usx\"\nstylesheet_dir = \"xsl\"\ncompiler = \"/usr/bin/osis2mod\"\nmodule_dir = \"modules/rom\"\ncompile_module = true\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.dialect(), Some(Dialect::Usx));
        assert_eq!(config.stylesheet_dir(), Some(Path::new("xsl")));
        assert_eq!(config.compiler(), Some(Path::new("/usr/bin/osis2mod")));
        assert_eq!(config.module_dir(), Some(Path::new("modules/rom")));
        assert!(config.compile_module);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
        assert_eq!(Config::load_or_default(&missing).unwrap(), Config::default());
    }

    #[test]
    fn invalid_file_is_not_replaced_by_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ndialect = \"klingon\"\n")
            .unwrap();

        let error = Config::load_or_default(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn unknown_dialect_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ndialect = \"klingon\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
        assert!(!actual.compile_module);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("xml2osis.toml");

        let mut config = Config::default();
        config.set_dialect(Some(Dialect::Biblica));
        config.set_compiler(Some(PathBuf::from("osis2mod")));
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
