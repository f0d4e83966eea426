//! Compiles stylesheet XML into templates and instructions.

use super::{
    expr::{parse_expr, Avt, Expr},
    pattern::Pattern,
    TransformError,
};
use crate::xml::{qualified_name, XML_NAMESPACE};

const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// A compiled XSLT 1.0 stylesheet.
///
/// Only the subset of XSLT needed to map scripture markup onto OSIS is
/// understood; anything else is rejected when the stylesheet is parsed
/// rather than silently ignored during a transformation.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    pub(super) templates: Vec<Template>,
}

#[derive(Debug, Clone)]
pub(super) struct Template {
    pub pattern: Option<Pattern>,
    pub name: Option<String>,
    pub mode: Option<String>,
    pub priority: Option<f64>,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub(super) enum Instruction {
    Text(String),
    LiteralElement {
        name: String,
        namespaces: Vec<(String, String)>,
        attributes: Vec<(String, Avt)>,
        body: Vec<Instruction>,
    },
    ApplyTemplates {
        select: Option<Expr>,
        mode: Option<String>,
    },
    CallTemplate(String),
    ValueOf(Expr),
    Copy(Vec<Instruction>),
    CopyOf(Expr),
    Element {
        name: Avt,
        body: Vec<Instruction>,
    },
    Attribute {
        name: Avt,
        body: Vec<Instruction>,
    },
    Comment(Vec<Instruction>),
    If {
        test: Expr,
        body: Vec<Instruction>,
    },
    Choose {
        branches: Vec<(Expr, Vec<Instruction>)>,
        otherwise: Vec<Instruction>,
    },
    ForEach {
        select: Expr,
        body: Vec<Instruction>,
    },
}

impl Stylesheet {
    /// Parses and compiles a stylesheet.
    ///
    /// # Errors
    ///
    /// Fails if the text is not well-formed XML, the root element is not
    /// `xsl:stylesheet` or `xsl:transform`, an expression does not parse,
    /// or the stylesheet uses an unsupported construct.
    pub fn parse(text: &str) -> Result<Self, TransformError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(text, options)?;
        let root = doc.root_element();
        if !matches!(xsl_name(root), Some("stylesheet" | "transform")) {
            return Err(TransformError::NotAStylesheet);
        }

        let compiler = Compiler {
            excluded: excluded_namespaces(root),
        };
        let mut templates = Vec::new();
        for child in root.children().filter(roxmltree::Node::is_element) {
            match xsl_name(child) {
                Some("template") => templates.push(compiler.template(child)?),
                Some("output" | "strip-space" | "preserve-space") => {}
                Some(other) => return Err(TransformError::Unsupported(format!("xsl:{other}"))),
                // Foreign top-level elements carry no behaviour.
                None => {}
            }
        }
        Ok(Self { templates })
    }

    /// The number of templates in the stylesheet.
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub(super) fn named(&self, name: &str) -> Option<&Template> {
        self.templates
            .iter()
            .rev()
            .find(|template| template.name.as_deref() == Some(name))
    }
}

fn xsl_name<'i>(node: roxmltree::Node<'_, 'i>) -> Option<&'i str> {
    (node.is_element() && node.tag_name().namespace() == Some(XSLT_NAMESPACE))
        .then(|| node.tag_name().name())
}

/// Namespace URIs that literal result elements do not copy to the output.
fn excluded_namespaces(root: roxmltree::Node<'_, '_>) -> Vec<String> {
    let mut excluded = vec![XSLT_NAMESPACE.to_string()];
    if let Some(prefixes) = root.attribute("exclude-result-prefixes") {
        for prefix in prefixes.split_whitespace() {
            let prefix = (prefix != "#default").then_some(prefix);
            if let Some(uri) = root.lookup_namespace_uri(prefix) {
                excluded.push(uri.to_string());
            }
        }
    }
    excluded
}

struct Compiler {
    excluded: Vec<String>,
}

impl Compiler {
    fn template(&self, node: roxmltree::Node<'_, '_>) -> Result<Template, TransformError> {
        let pattern = node.attribute("match").map(Pattern::parse).transpose()?;
        let name = node.attribute("name").map(str::to_string);
        if pattern.is_none() && name.is_none() {
            return Err(missing("template", "match"));
        }
        let priority = node
            .attribute("priority")
            .map(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| TransformError::Syntax {
                        expression: value.to_string(),
                        message: "priority must be a number".to_string(),
                    })
            })
            .transpose()?;
        Ok(Template {
            pattern,
            name,
            mode: node.attribute("mode").map(str::to_string),
            priority,
            body: self.body(node)?,
        })
    }

    fn body(&self, node: roxmltree::Node<'_, '_>) -> Result<Vec<Instruction>, TransformError> {
        let mut body = Vec::new();
        for child in node.children() {
            if let Some(instruction) = self.instruction(child)? {
                body.push(instruction);
            }
        }
        Ok(body)
    }

    fn instruction(
        &self,
        node: roxmltree::Node<'_, '_>,
    ) -> Result<Option<Instruction>, TransformError> {
        if node.is_text() {
            let text = node.text().unwrap_or_default();
            return Ok((!text.trim().is_empty()).then(|| Instruction::Text(text.to_string())));
        }
        if !node.is_element() {
            return Ok(None);
        }
        let Some(name) = xsl_name(node) else {
            return self.literal(node).map(Some);
        };

        let instruction = match name {
            "apply-templates" => {
                expect_empty(node, name)?;
                Instruction::ApplyTemplates {
                    select: node.attribute("select").map(parse_expr).transpose()?,
                    mode: node.attribute("mode").map(str::to_string),
                }
            }
            "call-template" => {
                expect_empty(node, name)?;
                Instruction::CallTemplate(required(node, name, "name")?.to_string())
            }
            "value-of" => Instruction::ValueOf(parse_expr(required(node, name, "select")?)?),
            "text" => {
                let text: String = node.children().filter_map(|child| child.text()).collect();
                if text.is_empty() {
                    return Ok(None);
                }
                Instruction::Text(text)
            }
            "copy" => Instruction::Copy(self.body(node)?),
            "copy-of" => Instruction::CopyOf(parse_expr(required(node, name, "select")?)?),
            "element" => Instruction::Element {
                name: Avt::parse(required(node, name, "name")?)?,
                body: self.body(node)?,
            },
            "attribute" => Instruction::Attribute {
                name: Avt::parse(required(node, name, "name")?)?,
                body: self.body(node)?,
            },
            "comment" => Instruction::Comment(self.body(node)?),
            "if" => Instruction::If {
                test: parse_expr(required(node, name, "test")?)?,
                body: self.body(node)?,
            },
            "choose" => self.choose(node)?,
            "for-each" => Instruction::ForEach {
                select: parse_expr(required(node, name, "select")?)?,
                body: self.body(node)?,
            },
            other => return Err(TransformError::Unsupported(format!("xsl:{other}"))),
        };
        Ok(Some(instruction))
    }

    fn choose(&self, node: roxmltree::Node<'_, '_>) -> Result<Instruction, TransformError> {
        let mut branches = Vec::new();
        let mut otherwise = Vec::new();
        for child in node.children().filter(roxmltree::Node::is_element) {
            match xsl_name(child) {
                Some("when") => branches.push((
                    parse_expr(required(child, "when", "test")?)?,
                    self.body(child)?,
                )),
                Some("otherwise") => otherwise = self.body(child)?,
                _ => {
                    return Err(TransformError::Unsupported(format!(
                        "{} inside xsl:choose",
                        child.tag_name().name()
                    )))
                }
            }
        }
        if branches.is_empty() {
            return Err(TransformError::Unsupported(
                "xsl:choose without xsl:when".to_string(),
            ));
        }
        Ok(Instruction::Choose {
            branches,
            otherwise,
        })
    }

    fn literal(&self, node: roxmltree::Node<'_, '_>) -> Result<Instruction, TransformError> {
        let name = qualified_name(node, node.tag_name().namespace(), node.tag_name().name());
        let namespaces = node
            .namespaces()
            .filter(|ns| ns.uri() != XML_NAMESPACE)
            .filter(|ns| !self.excluded.iter().any(|uri| uri == ns.uri()))
            .map(|ns| {
                let name = ns
                    .name()
                    .map_or_else(|| "xmlns".to_string(), |prefix| format!("xmlns:{prefix}"));
                (name, ns.uri().to_string())
            })
            .collect();
        let attributes = node
            .attributes()
            .filter(|attribute| attribute.namespace() != Some(XSLT_NAMESPACE))
            .map(|attribute| {
                let name = qualified_name(node, attribute.namespace(), attribute.name());
                Ok((name, Avt::parse(attribute.value())?))
            })
            .collect::<Result<Vec<_>, TransformError>>()?;
        Ok(Instruction::LiteralElement {
            name,
            namespaces,
            attributes,
            body: self.body(node)?,
        })
    }
}

fn required<'a>(
    node: roxmltree::Node<'a, '_>,
    instruction: &str,
    attribute: &'static str,
) -> Result<&'a str, TransformError> {
    node.attribute(attribute)
        .ok_or_else(|| missing(instruction, attribute))
}

fn missing(instruction: &str, attribute: &'static str) -> TransformError {
    TransformError::MissingAttribute {
        instruction: instruction.to_string(),
        attribute,
    }
}

fn expect_empty(node: roxmltree::Node<'_, '_>, instruction: &str) -> Result<(), TransformError> {
    match node.children().find(roxmltree::Node::is_element) {
        Some(child) => Err(TransformError::Unsupported(format!(
            "{} inside xsl:{instruction}",
            child.tag_name().name()
        ))),
        None => Ok(()),
    }
}
