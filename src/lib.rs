//! Scripture XML to OSIS conversion
//!
//! Book files in a supported source dialect are merged into one document,
//! transformed into OSIS with an XSLT stylesheet, tidied so that section
//! headings sit directly in front of their verse, and optionally packaged
//! into an encrypted SWORD module.

pub mod domain;
pub use domain::{Config, ConfigurationError, ConversionRequest, Dialect, ModuleSettings, Secret};

pub mod pipeline;
pub use pipeline::{Assembler, ConversionError, ConversionReport, StylesheetSource};

pub mod module;

pub mod xml;

pub mod xslt;
