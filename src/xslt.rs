//! An XSLT 1.0 engine covering the subset of the language that scripture
//! conversion stylesheets use.
//!
//! Stylesheets are compiled once with [`Stylesheet::parse`] and applied to
//! a [`Document`](crate::xml::Document) with [`Stylesheet::transform`],
//! which produces a new, fully mutable result tree.

use std::{io, path::PathBuf};

mod engine;
mod eval;
mod expr;
mod pattern;

mod stylesheet;
pub use stylesheet::Stylesheet;

/// Errors raised while loading, compiling or applying a stylesheet.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// No stylesheet with this name exists where it was looked up.
    #[error("stylesheet {name} not found in {searched}")]
    StylesheetNotFound {
        /// The stylesheet resource name.
        name: String,
        /// Where the lookup happened.
        searched: String,
    },

    /// A stylesheet file exists but could not be read.
    #[error("failed to read stylesheet {}", path.display())]
    Read {
        /// The stylesheet path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The stylesheet is not well-formed XML.
    #[error("malformed stylesheet: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The root element is not `xsl:stylesheet` or `xsl:transform`.
    #[error("document is not an XSLT stylesheet")]
    NotAStylesheet,

    /// The stylesheet uses a construct outside the supported subset.
    #[error("unsupported stylesheet construct: {0}")]
    Unsupported(String),

    /// An instruction lacks a required attribute.
    #[error("xsl:{instruction} requires a '{attribute}' attribute")]
    MissingAttribute {
        /// The instruction's local name.
        instruction: String,
        /// The missing attribute.
        attribute: &'static str,
    },

    /// An XPath expression or pattern does not parse.
    #[error("invalid expression '{expression}': {message}")]
    Syntax {
        /// The offending expression.
        expression: String,
        /// What went wrong.
        message: String,
    },

    /// Evaluation failed while the stylesheet was being applied.
    #[error("transformation failed: {0}")]
    Runtime(String),

    /// Templates nested deeper than the engine allows.
    #[error("template recursion exceeded {0} levels")]
    RecursionLimit(usize),
}
