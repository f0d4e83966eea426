use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use super::{Document, NodeId, NodeKind};

impl Document {
    /// Writes the document without added indentation, preceded by an XML
    /// declaration.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        for &child in self.children(self.root()) {
            self.write_node(child, writer)?;
        }
        Ok(())
    }

    /// Writes a single node and its subtree, without an XML declaration.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the writer.
    pub fn write_node<W: Write>(&self, node: NodeId, writer: &mut W) -> io::Result<()> {
        match self.kind(node) {
            NodeKind::Document => {
                for &child in self.children(node) {
                    self.write_node(child, writer)?;
                }
            }
            NodeKind::Element(element) => {
                write!(writer, "<{}", element.name)?;
                for attribute in &element.attributes {
                    write!(
                        writer,
                        " {}=\"{}\"",
                        attribute.name,
                        escape(&attribute.value, true)
                    )?;
                }
                let children = self.children(node);
                if children.is_empty() {
                    writer.write_all(b"/>")?;
                } else {
                    writer.write_all(b">")?;
                    for &child in children {
                        self.write_node(child, writer)?;
                    }
                    write!(writer, "</{}>", element.name)?;
                }
            }
            NodeKind::Text(text) => writer.write_all(escape(text, false).as_bytes())?,
            NodeKind::Comment(text) => write!(writer, "<!--{text}-->")?,
            NodeKind::ProcessingInstruction { target, data } => match data {
                Some(data) => write!(writer, "<?{target} {data}?>")?,
                None => write!(writer, "<?{target}?>")?,
            },
        }
        Ok(())
    }

    /// Serializes the document to a string.
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        let mut buffer = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Serializes a single node to a string.
    #[must_use]
    pub fn node_to_string(&self, node: NodeId) -> String {
        let mut buffer = Vec::new();
        let _ = self.write_node(node, &mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Writes the document to a file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}
