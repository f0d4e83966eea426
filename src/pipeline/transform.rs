use std::{borrow::Cow, fs, path::PathBuf};

use crate::{
    domain::Dialect,
    xslt::{Stylesheet, TransformError},
};

/// Stylesheets compiled into the binary, by resource name.
const BUNDLED: [(&str, &str); 2] = [
    (
        "transform-biblica.xsl",
        include_str!("../../stylesheets/transform-biblica.xsl"),
    ),
    (
        "transform-usx.xsl",
        include_str!("../../stylesheets/transform-usx.xsl"),
    ),
];

/// Where dialect stylesheets are loaded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StylesheetSource {
    /// The copies compiled into the binary.
    #[default]
    Bundled,
    /// A directory holding `transform-<dialect>.xsl` files.
    Directory(PathBuf),
}

impl StylesheetSource {
    /// Uses `dir` when given, the bundled stylesheets otherwise.
    #[must_use]
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        dir.map_or(Self::Bundled, Self::Directory)
    }

    /// Loads and compiles the stylesheet for `dialect`.
    ///
    /// # Errors
    ///
    /// Fails if the stylesheet does not exist, cannot be read, or does not
    /// compile.
    pub fn load(&self, dialect: Dialect) -> Result<Stylesheet, TransformError> {
        let name = dialect.stylesheet_name();
        let text = match self {
            Self::Bundled => BUNDLED
                .iter()
                .find(|(resource, _)| *resource == name)
                .map(|(_, text)| Cow::Borrowed(*text))
                .ok_or_else(|| TransformError::StylesheetNotFound {
                    name: name.clone(),
                    searched: "bundled stylesheets".to_string(),
                })?,
            Self::Directory(dir) => {
                let path = dir.join(&name);
                if !path.is_file() {
                    return Err(TransformError::StylesheetNotFound {
                        name,
                        searched: dir.display().to_string(),
                    });
                }
                let text = fs::read_to_string(&path)
                    .map_err(|source| TransformError::Read { path, source })?;
                Cow::Owned(text)
            }
        };
        tracing::debug!("Compiling stylesheet {name}");
        Stylesheet::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::xml::Document;

    #[test]
    fn bundled_stylesheets_compile() {
        for dialect in Dialect::ALL {
            let sheet = StylesheetSource::Bundled.load(dialect).unwrap();
            assert!(sheet.template_count() > 0, "{dialect}");
        }
    }

    #[test]
    fn a_directory_overrides_the_bundled_copy() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("transform-usx.xsl"),
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:template match="/"><custom/></xsl:template>
               </xsl:stylesheet>"#,
        )
        .unwrap();

        let source = StylesheetSource::from_dir(Some(tmp.path().to_path_buf()));
        let sheet = source.load(Dialect::Usx).unwrap();
        let out = sheet.transform(&Document::parse("<usx/>").unwrap()).unwrap();
        assert_eq!(out.node_to_string(out.root()), "<custom/>");
    }

    #[test]
    fn missing_override_is_reported() {
        let tmp = TempDir::new().unwrap();
        let source = StylesheetSource::Directory(tmp.path().to_path_buf());

        let err = source.load(Dialect::Biblica).unwrap_err();
        assert!(matches!(
            err,
            TransformError::StylesheetNotFound { ref name, .. } if name == "transform-biblica.xsl"
        ));
    }

    #[test]
    fn bundled_biblica_maps_onto_osis() {
        let source = Document::parse(
            r#"<biblicaDocument work="NIV" lang="en" title="New International Version">
                 <scripture>
                   <book id="Gen">
                     <chapter number="1">
                       <heading>The Beginning</heading>
                       <para><verse number="1">In the beginning <jesus>x</jesus></verse></para>
                     </chapter>
                   </book>
                 </scripture>
               </biblicaDocument>"#,
        )
        .unwrap();
        let sheet = StylesheetSource::Bundled.load(Dialect::Biblica).unwrap();
        let out = sheet.transform(&source).unwrap();
        let xml = out.to_xml_string();

        assert!(xml.contains(
            r#"<osis xmlns="http://www.bibletechnologies.net/2003/OSIS/namespace">"#
        ));
        assert!(xml.contains(r#"<osisText osisIDWork="NIV" osisRefWork="Bible" xml:lang="en">"#));
        assert!(xml.contains(r#"<div type="book" osisID="Gen"><chapter osisID="Gen.1">"#));
        assert!(xml.contains(r#"<title type="section" step="pre-verse">The Beginning</title>"#));
        assert!(xml.contains(
            r#"<p><verse osisID="Gen.1.1">In the beginning <q who="Jesus" marker="">x</q></verse></p>"#
        ));
    }

    #[test]
    fn bundled_usx_builds_ids_from_milestones() {
        let source = Document::parse(
            r#"<usx version="3.0">
                 <book code="GEN" style="id">Genesis</book>
                 <para style="h">Genesis</para>
                 <chapter number="1" style="c" sid="GEN 1"/>
                 <para style="s1">The Beginning</para>
                 <para style="p"><verse number="1" style="v" sid="GEN 1:1"/>In the beginning<verse eid="GEN 1:1"/></para>
                 <chapter eid="GEN 1"/>
               </usx>"#,
        )
        .unwrap();
        let sheet = StylesheetSource::Bundled.load(Dialect::Usx).unwrap();
        let out = sheet.transform(&source).unwrap();
        let xml = out.to_xml_string();

        assert!(xml.contains(r#"<div type="book" osisID="GEN" sID="GEN"/>"#));
        assert!(xml.contains(r#"<chapter n="1" osisID="GEN.1"/>"#));
        assert!(xml.contains(r#"<title type="section" step="pre-verse">The Beginning</title>"#));
        assert!(xml.contains(r#"<p><verse n="1" osisID="GEN.1.1"/>In the beginning</p>"#));
        assert!(!xml.contains(">Genesis<"));
    }

    #[test]
    fn usx_keeps_the_spaces_between_inline_elements() {
        let source = Document::parse(
            r#"<usx><book code="JHN"/><chapter number="3"/><para style="p"><verse number="16"/><char style="wj">For</char> <char style="wj">God</char> <char style="add">so</char></para></usx>"#,
        )
        .unwrap();
        let sheet = StylesheetSource::Bundled.load(Dialect::Usx).unwrap();
        let out = sheet.transform(&source).unwrap();

        let osis = out.document_element().unwrap();
        assert_eq!(out.text_content(osis), "For God so");
    }

    /// A whole bible keeps every book, chapter and verse marker as a sibling
    /// under one node.
    fn flat_usx(books: usize, chapters: usize, verses: usize) -> String {
        let mut xml = String::from(r#"<usx version="3.0">"#);
        for b in 1..=books {
            xml.push_str(&format!(r#"<book code="B{b}"/>"#));
            for c in 1..=chapters {
                xml.push_str(&format!(r#"<chapter number="{c}"/><para style="s1">Heading</para>"#));
                for v in 1..=verses {
                    xml.push_str(&format!(r#"<para style="p"><verse number="{v}"/>text</para>"#));
                }
            }
        }
        xml.push_str("</usx>");
        xml
    }

    #[test]
    fn usx_ids_resolve_across_many_siblings() {
        let source = Document::parse(&flat_usx(20, 10, 20)).unwrap();
        let sheet = StylesheetSource::Bundled.load(Dialect::Usx).unwrap();
        let xml = sheet.transform(&source).unwrap().to_xml_string();

        assert_eq!(xml.matches("<verse ").count(), 20 * 10 * 20);
        assert!(xml.contains(r#"<verse n="1" osisID="B1.1.1"/>"#));
        assert!(xml.contains(r#"<chapter n="10" osisID="B20.10"/>"#));
        assert!(xml.contains(r#"<verse n="20" osisID="B20.10.20"/>"#));
    }
}
