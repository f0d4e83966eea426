use std::{fs, io, path::Path};

use super::{Document, NodeId};

pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A document could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The content is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] roxmltree::Error),
}

impl Document {
    /// Parses a document from a string.
    ///
    /// Whitespace-only text is dropped from elements whose content is
    /// element-only, so indentation never reaches the tree. In mixed content
    /// it is kept, since it separates words. Namespace declarations are kept
    /// as `xmlns` attributes on the element that declares them.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not well-formed.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let source = roxmltree::Document::parse_with_options(text, options)?;

        let mut document = Self::new();
        let root = document.root();
        for child in source.root().children() {
            document.copy_from(child, root, false);
        }
        Ok(document)
    }

    /// Reads and parses a document from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not well-formed.
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn copy_from(&mut self, node: roxmltree::Node<'_, '_>, parent: NodeId, mixed: bool) {
        let id = match node.node_type() {
            roxmltree::NodeType::Element => {
                let element = self.create_element(qualified_name(
                    node,
                    node.tag_name().namespace(),
                    node.tag_name().name(),
                ));
                for (name, uri) in declared_namespaces(node) {
                    self.set_attribute(element, name, uri);
                }
                for attribute in node.attributes() {
                    let name = qualified_name(node, attribute.namespace(), attribute.name());
                    self.set_attribute(element, name, attribute.value());
                }
                element
            }
            roxmltree::NodeType::Text => {
                let text = node.text().unwrap_or_default();
                if !mixed && text.trim().is_empty() {
                    return;
                }
                self.create_text(text)
            }
            roxmltree::NodeType::Comment => self.create_comment(node.text().unwrap_or_default()),
            roxmltree::NodeType::PI => match node.pi() {
                Some(pi) => {
                    self.create_processing_instruction(pi.target, pi.value.map(str::to_string))
                }
                None => return,
            },
            roxmltree::NodeType::Root => return,
        };

        // Freshly created nodes are detached, so appending cannot fail.
        if self.append(parent, id).is_err() {
            return;
        }
        let mixed = node
            .children()
            .any(|child| child.is_text() && !child.text().unwrap_or_default().trim().is_empty());
        for child in node.children() {
            self.copy_from(child, id, mixed);
        }
    }
}

/// Rebuilds a `prefix:local` name from a resolved namespace.
pub(crate) fn qualified_name(
    node: roxmltree::Node<'_, '_>,
    namespace: Option<&str>,
    local: &str,
) -> String {
    match namespace {
        Some(XML_NAMESPACE) => format!("xml:{local}"),
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        },
        None => local.to_string(),
    }
}

/// Namespace declarations introduced by this element, as `xmlns` attribute
/// name and URI pairs.
fn declared_namespaces(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    node.namespaces()
        .filter(|ns| ns.uri() != XML_NAMESPACE)
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| {
            let name = ns
                .name()
                .map_or_else(|| "xmlns".to_string(), |prefix| format!("xmlns:{prefix}"));
            (name, ns.uri().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_between_elements_is_dropped() {
        let doc = Document::parse("<usx>\n  <para>\n    <verse/>\n  </para>\n</usx>").unwrap();

        let usx = doc.document_element().unwrap();
        assert_eq!(doc.children(usx).len(), 1);
        let para = doc.children(usx)[0];
        assert_eq!(doc.children(para).len(), 1);
    }

    #[test]
    fn whitespace_in_mixed_content_is_kept() {
        let doc = Document::parse(
            r#"<para><verse/><char style="wj">For</char> <char style="wj">God</char> <char style="add">so</char> loved</para>"#,
        )
        .unwrap();

        let para = doc.document_element().unwrap();
        assert_eq!(doc.children(para).len(), 7);
        assert_eq!(doc.text_content(para), "For God so loved");
    }

    #[test]
    fn namespaces_and_attributes_are_preserved() {
        let doc = Document::parse(
            r#"<osis xmlns="http://www.bibletechnologies.net/2003/OSIS/namespace" xmlns:x="urn:x"><x:a xml:lang="en" x:b="1"/></osis>"#,
        )
        .unwrap();

        let osis = doc.document_element().unwrap();
        assert_eq!(
            doc.attribute(osis, "xmlns"),
            Some("http://www.bibletechnologies.net/2003/OSIS/namespace")
        );
        assert_eq!(doc.attribute(osis, "xmlns:x"), Some("urn:x"));

        let child = doc.children(osis)[0];
        assert_eq!(doc.name(child), Some("x:a"));
        assert_eq!(doc.attribute(child, "xml:lang"), Some("en"));
        assert_eq!(doc.attribute(child, "x:b"), Some("1"));
        assert_eq!(doc.attribute(child, "xmlns:x"), None);
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(matches!(
            Document::parse("<usx><para></usx>"),
            Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            Document::load(&tmp.path().join("missing.xml")),
            Err(ParseError::Io(_))
        ));
    }
}
