//! Packaging an assembled OSIS document as an encrypted SWORD module.
//!
//! The module compiler is an external program, reached through the
//! [`ModuleCompiler`] trait so that it can be replaced in tests. The cipher
//! key the module is encrypted with is also masked with
//! [`obfuscate_key`] for copying into the module's configuration file.

mod compiler;
pub use compiler::{CompileJob, ModuleCompiler, Osis2Mod, SubprocessError};

mod key;
pub use key::{obfuscate_key, reveal_key, KeyError};
