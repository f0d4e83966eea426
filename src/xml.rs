//! A small mutable XML tree.
//!
//! Documents are parsed with `roxmltree` and copied into an arena so that
//! nodes can be moved between parents (and between documents) while
//! assembling and rearranging scripture text.

mod document;
pub use document::{local_part, Attribute, Document, Element, HierarchyError, NodeId, NodeKind};

mod parse;
pub(crate) use parse::{qualified_name, XML_NAMESPACE};
pub use parse::ParseError;

mod path;
pub use path::{AnchorPath, PathError};

mod serialize;
