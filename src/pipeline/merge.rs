use std::path::{Path, PathBuf};

use nonempty::NonEmpty;

use super::{load, ConversionError};
use crate::xml::{AnchorPath, Document, NodeId, PathError};

/// Errors raised while combining source files into one document.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Discovery found nothing to merge.
    #[error("no source files found")]
    NoSources,

    /// A source file is not well-formed XML.
    #[error("failed to parse {}", path.display())]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The parser error.
        #[source]
        source: roxmltree::Error,
    },

    /// A source file has no node at the anchor path.
    #[error("{} has no node at {anchor}", path.display())]
    MissingAnchor {
        /// The offending file.
        path: PathBuf,
        /// The anchor path that failed to resolve.
        anchor: String,
    },

    /// The anchor path itself is malformed.
    #[error(transparent)]
    InvalidAnchor(#[from] PathError),
}

/// Wraps a discovered file list, rejecting an empty one.
///
/// # Errors
///
/// Returns [`MergeError::NoSources`] if `files` is empty.
pub fn sources(files: Vec<PathBuf>) -> Result<NonEmpty<PathBuf>, MergeError> {
    NonEmpty::from_vec(files).ok_or(MergeError::NoSources)
}

/// Concatenates the anchor children of every file under the anchor of the
/// first.
///
/// The first file is the base document. Each later file is parsed in turn
/// and its anchor children are moved, in order, to the end of the base
/// anchor. The base document's own prolog and any content outside the
/// anchor are kept; that of later files is discarded.
///
/// # Errors
///
/// Fails on the first file that cannot be read, does not parse, or lacks
/// the anchor. No partial document is returned.
pub fn merge(files: &NonEmpty<PathBuf>, anchor: &AnchorPath) -> Result<Document, ConversionError> {
    let mut base = load(&files.head)?;
    let base_anchor = resolve(&base, &files.head, anchor)?;
    tracing::debug!("Merge base is {}", files.head.display());

    for path in &files.tail {
        let mut source = load(path)?;
        let source_anchor = resolve(&source, path, anchor)?;

        let children = source.children(source_anchor).to_vec();
        for &child in &children {
            let moved = base.import(&source, child);
            base.append(base_anchor, moved)?;
            source.detach(child);
        }
        tracing::debug!("Merged {} node(s) from {}", children.len(), path.display());
    }

    Ok(base)
}

fn resolve(
    document: &Document,
    path: &Path,
    anchor: &AnchorPath,
) -> Result<NodeId, MergeError> {
    anchor
        .resolve(document)
        .ok_or_else(|| MergeError::MissingAnchor {
            path: path.to_path_buf(),
            anchor: anchor.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn biblica(book: &str, chapters: usize) -> String {
        let chapters: String = (1..=chapters)
            .map(|n| format!(r#"<chapter number="{n}"/>"#))
            .collect();
        format!(
            r#"<?xml version="1.0"?>
<biblicaDocument>
  <header><title>{book}</title></header>
  <scripture><book id="{book}">{chapters}</book><colophon/></scripture>
</biblicaDocument>"#
        )
    }

    fn anchor() -> AnchorPath {
        "/biblicaDocument/scripture".parse().unwrap()
    }

    #[test]
    fn concatenates_anchor_children_in_file_order() {
        let tmp = TempDir::new().unwrap();
        let files = NonEmpty::from((
            write(tmp.path(), "GEN.xml", &biblica("Gen", 2)),
            vec![
                write(tmp.path(), "EXO.xml", &biblica("Exod", 1)),
                write(tmp.path(), "LEV.xml", &biblica("Lev", 3)),
            ],
        ));

        let doc = merge(&files, &anchor()).unwrap();
        let scripture = anchor().resolve(&doc).unwrap();

        // Each file contributes a book and a colophon.
        assert_eq!(doc.children(scripture).len(), 6);
        let books: Vec<&str> = doc
            .child_elements(scripture)
            .filter_map(|node| doc.attribute(node, "id"))
            .collect();
        assert_eq!(books, ["Gen", "Exod", "Lev"]);

        // Only the base document's header survives.
        let root = doc.document_element().unwrap();
        assert_eq!(doc.child_elements(root).count(), 2);
    }

    #[test]
    fn a_single_file_is_returned_unchanged() {
        let tmp = TempDir::new().unwrap();
        let content = biblica("Gen", 1);
        let path = write(tmp.path(), "GEN.xml", &content);

        let doc = merge(&NonEmpty::new(path), &anchor()).unwrap();
        assert_eq!(
            doc.to_xml_string(),
            Document::parse(&content).unwrap().to_xml_string()
        );
    }

    #[test]
    fn missing_anchor_in_a_later_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let files = NonEmpty::from((
            write(tmp.path(), "GEN.xml", &biblica("Gen", 1)),
            vec![write(tmp.path(), "EXO.xml", "<biblicaDocument/>")],
        ));

        let err = merge(&files, &anchor()).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Merge(MergeError::MissingAnchor { ref path, ref anchor })
                if path.ends_with("EXO.xml") && anchor == "/biblicaDocument/scripture"
        ));
    }

    #[test]
    fn missing_anchor_in_the_base_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let files = NonEmpty::new(write(tmp.path(), "GEN.xml", "<usx/>"));

        let err = merge(&files, &anchor()).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Merge(MergeError::MissingAnchor { .. })
        ));
    }

    #[test]
    fn malformed_files_are_parse_errors() {
        let tmp = TempDir::new().unwrap();
        let files = NonEmpty::from((
            write(tmp.path(), "GEN.xml", &biblica("Gen", 1)),
            vec![write(tmp.path(), "EXO.xml", "<biblicaDocument>")],
        ));

        let err = merge(&files, &anchor()).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Merge(MergeError::Parse { ref path, .. }) if path.ends_with("EXO.xml")
        ));
    }

    #[test]
    fn unreadable_files_are_io_errors() {
        let tmp = TempDir::new().unwrap();
        let files = NonEmpty::new(tmp.path().join("absent.xml"));

        let err = merge(&files, &anchor()).unwrap_err();
        assert!(matches!(err, ConversionError::Io { .. }));
    }

    #[test]
    fn empty_file_lists_are_rejected() {
        assert!(matches!(sources(Vec::new()), Err(MergeError::NoSources)));
        assert_eq!(sources(vec![PathBuf::from("a.xml")]).unwrap().len(), 1);
    }
}
