//! Domain models for scripture conversion.
//!
//! This module contains the source dialects, the parameters of a conversion
//! run, and persisted configuration.

mod config;
pub use config::Config;

/// Source dialects and their conversion conventions.
pub mod dialect;
pub use dialect::{ConfigurationError, Dialect, Marker, PRE_VERSE, VERSE_TAG};

mod request;
pub use request::{ConversionRequest, ModuleSettings, Secret};
