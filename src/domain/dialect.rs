use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The attribute a stylesheet places on elements that must be moved in front
/// of the next verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Attribute name, e.g. `step`.
    pub attribute: &'static str,
    /// Attribute value that flags the element, e.g. `pre-verse`.
    pub value: &'static str,
}

/// The pre-verse marker emitted by the bundled stylesheets.
pub const PRE_VERSE: Marker = Marker {
    attribute: "step",
    value: "pre-verse",
};

/// Tag name of the verse boundary element in OSIS output.
pub const VERSE_TAG: &str = "verse";

/// A supported source schema.
///
/// Each dialect fixes the file extension that is scanned for, the path of the
/// node that book content is concatenated under, and the stylesheet used to
/// produce OSIS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dialect {
    /// The proprietary Biblica scripture schema.
    Biblica,
    /// Unified Scripture XML.
    Usx,
}

impl Dialect {
    /// All dialects, in token order.
    pub const ALL: [Self; 2] = [Self::Biblica, Self::Usx];

    /// The token used to select this dialect on the command line.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Biblica => "biblica",
            Self::Usx => "usx",
        }
    }

    /// File extension (without the dot) of source files.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Biblica => "xml",
            Self::Usx => "usx",
        }
    }

    /// Absolute path of the node that all book content is merged under.
    #[must_use]
    pub const fn anchor_path(self) -> &'static str {
        match self {
            Self::Biblica => "/biblicaDocument/scripture",
            Self::Usx => "/usx",
        }
    }

    /// Resource name of the stylesheet that turns this dialect into OSIS.
    #[must_use]
    pub fn stylesheet_name(self) -> String {
        format!("transform-{}.xsl", self.token())
    }

    /// Marker carried by elements that belong in front of the next verse.
    #[must_use]
    pub const fn pre_verse_marker(self) -> Marker {
        match self {
            Self::Biblica | Self::Usx => PRE_VERSE,
        }
    }

    /// Tag name of the verse boundary element in the transformed output.
    #[must_use]
    pub const fn verse_tag(self) -> &'static str {
        match self {
            Self::Biblica | Self::Usx => VERSE_TAG,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Dialect {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dialect| dialect.token() == s)
            .ok_or_else(|| ConfigurationError::UnknownDialect(s.to_string()))
    }
}

impl TryFrom<String> for Dialect {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dialect> for String {
    fn from(dialect: Dialect) -> Self {
        dialect.token().to_string()
    }
}

/// The conversion request could not be built.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The dialect token names no supported schema.
    #[error("Conversion type not supported: '{0}' (expected one of: biblica, usx)")]
    UnknownDialect(String),

    /// No dialect was given and none is configured.
    #[error("no conversion type given (expected one of: biblica, usx)")]
    MissingDialect,

    /// No old testament directory was given.
    #[error("a source directory is required")]
    MissingSource,

    /// A required key was empty.
    #[error("the {0} must not be empty")]
    EmptyKey(&'static str),

    /// Module compilation was requested without the settings it needs.
    #[error("module compilation requires {0}")]
    IncompleteModule(&'static str),
}
