use std::{
    fmt,
    path::{Path, PathBuf},
};

use non_empty_string::NonEmptyString;

use super::{ConfigurationError, Dialect};

/// A key that must never be written to logs.
///
/// `Debug` and `Display` are redacted; the plaintext is only reachable
/// through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(NonEmptyString);

impl Secret {
    /// Wraps a key, rejecting empty strings.
    ///
    /// # Errors
    ///
    /// Returns the original string if it is empty.
    pub fn new(value: String) -> Result<Self, String> {
        NonEmptyString::new(value).map(Self)
    }

    /// The plaintext key.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Settings for packaging the assembled document with the module compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    /// Path of the `osis2mod` executable.
    pub compiler: PathBuf,
    /// Directory the compiled module is written to.
    pub module_dir: PathBuf,
    /// Key the module text is encrypted with.
    pub cipher_key: Secret,
    /// Password used to mask the cipher key for the module configuration.
    pub obfuscation_key: Secret,
}

impl ModuleSettings {
    /// Builds module settings from raw key strings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyKey`] if either key is empty.
    pub fn new(
        compiler: PathBuf,
        module_dir: PathBuf,
        cipher_key: String,
        obfuscation_key: String,
    ) -> Result<Self, ConfigurationError> {
        let cipher_key =
            Secret::new(cipher_key).map_err(|_| ConfigurationError::EmptyKey("cipher key"))?;
        let obfuscation_key = Secret::new(obfuscation_key)
            .map_err(|_| ConfigurationError::EmptyKey("obfuscation key"))?;
        Ok(Self {
            compiler,
            module_dir,
            cipher_key,
            obfuscation_key,
        })
    }
}

/// The immutable parameters of one conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    old_testament: PathBuf,
    new_testament: Option<PathBuf>,
    output: PathBuf,
    dialect: Dialect,
    module: Option<ModuleSettings>,
}

impl ConversionRequest {
    /// Creates a request that scans a single source directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSource`] if the source path is
    /// blank.
    pub fn new(
        old_testament: PathBuf,
        output: PathBuf,
        dialect: Dialect,
    ) -> Result<Self, ConfigurationError> {
        if is_blank(&old_testament) {
            return Err(ConfigurationError::MissingSource);
        }
        Ok(Self {
            old_testament,
            new_testament: None,
            output,
            dialect,
            module: None,
        })
    }

    /// Parses the dialect token and creates a request.
    ///
    /// # Errors
    ///
    /// Fails with [`ConfigurationError::UnknownDialect`] before touching the
    /// filesystem if the token is not recognised.
    pub fn parse(
        old_testament: PathBuf,
        output: PathBuf,
        dialect: &str,
    ) -> Result<Self, ConfigurationError> {
        Self::new(old_testament, output, dialect.parse()?)
    }

    /// Adds the optional second source directory. Blank paths are ignored.
    #[must_use]
    pub fn with_new_testament(mut self, path: Option<PathBuf>) -> Self {
        self.new_testament = path.filter(|p| !is_blank(p));
        self
    }

    /// Enables packaging with the module compiler.
    #[must_use]
    pub fn with_module(mut self, module: ModuleSettings) -> Self {
        self.module = Some(module);
        self
    }

    /// The first source directory.
    #[must_use]
    pub fn old_testament(&self) -> &Path {
        &self.old_testament
    }

    /// The second source directory, if any.
    #[must_use]
    pub fn new_testament(&self) -> Option<&Path> {
        self.new_testament.as_deref()
    }

    /// All source directories, in scan order.
    pub fn source_dirs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.old_testament.as_path()).chain(self.new_testament())
    }

    /// Where the assembled OSIS document is written.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The source dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Module compilation settings, when packaging is enabled.
    #[must_use]
    pub const fn module(&self) -> Option<&ModuleSettings> {
        self.module.as_ref()
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
