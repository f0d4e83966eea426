//! Applies a compiled stylesheet to a source tree.

use super::{
    eval::{Context, Evaluator, Item, Value},
    expr::{Avt, AvtPart, Expr},
    stylesheet::{Instruction, Stylesheet, Template},
    TransformError,
};
use crate::xml::{Document, NodeId, NodeKind};

/// How deeply templates may nest before the transformation is abandoned.
///
/// Scripture markup nests a handful of levels deep; the limit stays well
/// inside a 2 MiB thread stack in unoptimised builds.
const RECURSION_LIMIT: usize = 64;

impl Stylesheet {
    /// Applies the stylesheet to `source`, producing a new document.
    ///
    /// Processing starts by applying templates to the document root in the
    /// default mode. The source is left untouched.
    ///
    /// # Errors
    ///
    /// Fails if an expression cannot be evaluated, a named template does not
    /// exist, an attribute is added outside an element, or templates recurse
    /// too deeply.
    pub fn transform(&self, source: &Document) -> Result<Document, TransformError> {
        let mut engine = Engine {
            stylesheet: self,
            eval: Evaluator::new(source),
            out: Document::new(),
            depth: 0,
        };
        let root = engine.out.root();
        engine.apply(&[Item::Node(source.root())], None, root)?;
        Ok(engine.out)
    }
}

struct Engine<'s, 'd> {
    stylesheet: &'s Stylesheet,
    eval: Evaluator<'d>,
    out: Document,
    depth: usize,
}

impl<'s, 'd> Engine<'s, 'd> {
    fn apply(
        &mut self,
        items: &[Item],
        mode: Option<&str>,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let size = items.len();
        for (index, &item) in items.iter().enumerate() {
            let ctx = Context {
                item,
                position: index + 1,
                size,
            };
            self.enter()?;
            let result = match self.find_template(item, mode)? {
                Some(template) => self.execute(&template.body, ctx, parent),
                None => self.built_in(item, mode, parent),
            };
            self.depth -= 1;
            result?;
        }
        Ok(())
    }

    fn enter(&mut self) -> Result<(), TransformError> {
        if self.depth >= RECURSION_LIMIT {
            return Err(TransformError::RecursionLimit(RECURSION_LIMIT));
        }
        self.depth += 1;
        Ok(())
    }

    /// The matching template with the highest priority; later templates win
    /// ties.
    fn find_template(
        &self,
        item: Item,
        mode: Option<&str>,
    ) -> Result<Option<&'s Template>, TransformError> {
        let mut best: Option<(f64, &'s Template)> = None;
        for template in &self.stylesheet.templates {
            if template.mode.as_deref() != mode {
                continue;
            }
            let Some(pattern) = &template.pattern else {
                continue;
            };
            let Some(default) = pattern.match_priority(&self.eval, item)? else {
                continue;
            };
            let priority = template.priority.unwrap_or(default);
            if best.is_none_or(|(current, _)| priority >= current) {
                best = Some((priority, template));
            }
        }
        Ok(best.map(|(_, template)| template))
    }

    fn built_in(
        &mut self,
        item: Item,
        mode: Option<&str>,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let source = self.eval.document();
        match item {
            Item::Attribute(..) => {
                let value = self.eval.string_value(item);
                self.out.append_text(parent, &value);
            }
            Item::Node(node) => match source.kind(node) {
                NodeKind::Document | NodeKind::Element(_) => {
                    let children: Vec<Item> =
                        source.children(node).iter().copied().map(Item::Node).collect();
                    self.apply(&children, mode, parent)?;
                }
                NodeKind::Text(text) => self.out.append_text(parent, text),
                NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
            },
        }
        Ok(())
    }

    fn execute(
        &mut self,
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        for instruction in body {
            match instruction {
                Instruction::Text(text) => self.out.append_text(parent, text),
                Instruction::LiteralElement {
                    name,
                    namespaces,
                    attributes,
                    body,
                } => self.literal_element(name, namespaces, attributes, body, ctx, parent)?,
                Instruction::ApplyTemplates { select, mode } => {
                    self.apply_templates(select.as_ref(), mode.as_deref(), ctx, parent)?;
                }
                Instruction::CallTemplate(name) => self.call_template(name, ctx, parent)?,
                Instruction::ValueOf(select) => {
                    let value = self.eval.evaluate(select, ctx)?;
                    let text = self.eval.string(&value);
                    self.out.append_text(parent, &text);
                }
                Instruction::Copy(body) => self.copy(body, ctx, parent)?,
                Instruction::CopyOf(select) => self.copy_of(select, ctx, parent)?,
                Instruction::Element { name, body } => self.element(name, body, ctx, parent)?,
                Instruction::Attribute { name, body } => self.attribute(name, body, ctx, parent)?,
                Instruction::Comment(body) => {
                    let text = self.render_text(body, ctx)?;
                    let comment = self.out.create_comment(text);
                    self.attach(parent, comment)?;
                }
                Instruction::If { test, body } => {
                    if self.test(test, ctx)? {
                        self.execute(body, ctx, parent)?;
                    }
                }
                Instruction::Choose {
                    branches,
                    otherwise,
                } => {
                    let chosen = self.choose(branches, otherwise, ctx)?;
                    self.execute(chosen, ctx, parent)?;
                }
                Instruction::ForEach { select, body } => self.for_each(select, body, ctx, parent)?,
            }
        }
        Ok(())
    }

    fn literal_element(
        &mut self,
        name: &str,
        namespaces: &[(String, String)],
        attributes: &[(String, Avt)],
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let element = self.out.create_element(name);
        self.attach(parent, element)?;
        for (declaration, uri) in namespaces {
            if !self.out.declares_namespace(parent, declaration, uri) {
                self.out
                    .set_attribute(element, declaration.clone(), uri.clone());
            }
        }
        for (attribute, value) in attributes {
            let value = self.avt(value, ctx)?;
            self.out.set_attribute(element, attribute.clone(), value);
        }
        self.execute(body, ctx, element)
    }

    fn apply_templates(
        &mut self,
        select: Option<&Expr>,
        mode: Option<&str>,
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let items = match select {
            Some(expr) => self.eval.select(expr, ctx)?,
            None => self.children(ctx.item),
        };
        self.apply(&items, mode, parent)
    }

    fn call_template(
        &mut self,
        name: &str,
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let stylesheet = self.stylesheet;
        let template = stylesheet
            .named(name)
            .ok_or_else(|| TransformError::Runtime(format!("no template named '{name}'")))?;
        self.enter()?;
        let result = self.execute(&template.body, ctx, parent);
        self.depth -= 1;
        result
    }

    fn element(
        &mut self,
        name: &Avt,
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let name = self.avt(name, ctx)?;
        if name.is_empty() {
            return Err(TransformError::Runtime(
                "xsl:element produced an empty name".to_string(),
            ));
        }
        let element = self.out.create_element(name);
        self.attach(parent, element)?;
        self.execute(body, ctx, element)
    }

    fn attribute(
        &mut self,
        name: &Avt,
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let name = self.avt(name, ctx)?;
        let value = self.render_text(body, ctx)?;
        if name.is_empty() || !self.out.set_attribute(parent, name.clone(), value) {
            return Err(TransformError::Runtime(format!(
                "cannot add attribute '{name}' here"
            )));
        }
        Ok(())
    }

    fn choose(
        &self,
        branches: &'s [(Expr, Vec<Instruction>)],
        otherwise: &'s [Instruction],
        ctx: Context,
    ) -> Result<&'s [Instruction], TransformError> {
        for (test, body) in branches {
            if self.test(test, ctx)? {
                return Ok(body.as_slice());
            }
        }
        Ok(otherwise)
    }

    fn for_each(
        &mut self,
        select: &Expr,
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let items = self.eval.select(select, ctx)?;
        let size = items.len();
        for (index, item) in items.into_iter().enumerate() {
            let ctx = Context {
                item,
                position: index + 1,
                size,
            };
            self.execute(body, ctx, parent)?;
        }
        Ok(())
    }

    fn test(&self, test: &Expr, ctx: Context) -> Result<bool, TransformError> {
        let value = self.eval.evaluate(test, ctx)?;
        Ok(self.eval.boolean(&value))
    }

    fn children(&self, item: Item) -> Vec<Item> {
        match item {
            Item::Node(node) => self
                .eval
                .document()
                .children(node)
                .iter()
                .copied()
                .map(Item::Node)
                .collect(),
            Item::Attribute(..) => Vec::new(),
        }
    }

    fn attach(&mut self, parent: NodeId, node: NodeId) -> Result<(), TransformError> {
        self.out
            .append(parent, node)
            .map_err(|err| TransformError::Runtime(err.to_string()))
    }

    fn avt(&self, avt: &Avt, ctx: Context) -> Result<String, TransformError> {
        let mut out = String::new();
        for part in &avt.0 {
            match part {
                AvtPart::Literal(text) => out.push_str(text),
                AvtPart::Expr(expr) => {
                    let value = self.eval.evaluate(expr, ctx)?;
                    out.push_str(&self.eval.string(&value));
                }
            }
        }
        Ok(out)
    }

    /// Instantiates `body` into a scratch fragment and returns its text.
    fn render_text(
        &mut self,
        body: &'s [Instruction],
        ctx: Context,
    ) -> Result<String, TransformError> {
        let fragment = self.out.create_fragment();
        self.execute(body, ctx, fragment)?;
        Ok(self.out.text_content(fragment))
    }

    fn copy(
        &mut self,
        body: &'s [Instruction],
        ctx: Context,
        parent: NodeId,
    ) -> Result<(), TransformError> {
        let source = self.eval.document();
        match ctx.item {
            Item::Attribute(owner, index) => {
                let attribute = &source.attributes(owner)[index];
                self.out
                    .set_attribute(parent, attribute.name.clone(), attribute.value.clone());
            }
            Item::Node(node) => match source.kind(node) {
                NodeKind::Document => self.execute(body, ctx, parent)?,
                NodeKind::Element(element) => {
                    let copy = self.out.create_element(element.name.clone());
                    self.attach(parent, copy)?;
                    let declarations = element
                        .attributes
                        .iter()
                        .filter(|a| a.name == "xmlns" || a.name.starts_with("xmlns:"));
                    for declaration in declarations {
                        if !self
                            .out
                            .declares_namespace(parent, &declaration.name, &declaration.value)
                        {
                            self.out.set_attribute(
                                copy,
                                declaration.name.clone(),
                                declaration.value.clone(),
                            );
                        }
                    }
                    self.execute(body, ctx, copy)?;
                }
                NodeKind::Text(text) => self.out.append_text(parent, text),
                NodeKind::Comment(text) => {
                    let comment = self.out.create_comment(text.clone());
                    self.attach(parent, comment)?;
                }
                NodeKind::ProcessingInstruction { target, data } => {
                    let pi = self
                        .out
                        .create_processing_instruction(target.clone(), data.clone());
                    self.attach(parent, pi)?;
                }
            },
        }
        Ok(())
    }

    fn copy_of(&mut self, select: &Expr, ctx: Context, parent: NodeId) -> Result<(), TransformError> {
        let source = self.eval.document();
        let items = match self.eval.evaluate(select, ctx)? {
            Value::Nodes(items) => items,
            other => {
                let text = self.eval.string(&other);
                self.out.append_text(parent, &text);
                return Ok(());
            }
        };
        for item in items {
            match item {
                Item::Attribute(owner, index) => {
                    let attribute = &source.attributes(owner)[index];
                    self.out
                        .set_attribute(parent, attribute.name.clone(), attribute.value.clone());
                }
                Item::Node(node) => match source.kind(node) {
                    NodeKind::Text(text) => self.out.append_text(parent, text),
                    NodeKind::Document => {
                        for &child in source.children(node) {
                            let copy = self.out.import(source, child);
                            self.attach(parent, copy)?;
                        }
                    }
                    _ => {
                        let copy = self.out.import(source, node);
                        self.attach(parent, copy)?;
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(templates: &str, source: &str) -> Result<String, TransformError> {
        let sheet = Stylesheet::parse(&format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{templates}</xsl:stylesheet>"#
        ))?;
        let source = Document::parse(source).unwrap();
        let out = sheet.transform(&source)?;
        Ok(out.node_to_string(out.root()))
    }

    #[test]
    fn built_in_templates_copy_text() {
        assert_eq!(run("", "<a>one<b>two</b></a>").unwrap(), "onetwo");
    }

    #[test]
    fn literal_elements_and_value_of() {
        let out = run(
            r#"<xsl:template match="/"><out><xsl:apply-templates select="//verse"/></out></xsl:template>
               <xsl:template match="verse"><v n="{@number}"><xsl:value-of select="concat(@number, ':')"/></v></xsl:template>"#,
            r#"<usx><para><verse number="1"/><verse number="2"/></para></usx>"#,
        )
        .unwrap();
        assert_eq!(out, r#"<out><v n="1">1:</v><v n="2">2:</v></out>"#);
    }

    #[test]
    fn higher_priority_wins_and_later_templates_break_ties() {
        let out = run(
            r#"<xsl:template match="para">generic</xsl:template>
               <xsl:template match="para[@style='s1']">heading</xsl:template>
               <xsl:template match="para" priority="-1">never</xsl:template>
               <xsl:template match="b">first</xsl:template>
               <xsl:template match="b">second</xsl:template>"#,
            r#"<usx><para style="s1"/><para style="p"/><b/></usx>"#,
        )
        .unwrap();
        assert_eq!(out, "headinggenericsecond");
    }

    #[test]
    fn modes_select_templates() {
        let out = run(
            r#"<xsl:template match="/"><xsl:apply-templates select="//b" mode="x"/><xsl:apply-templates select="//b"/></xsl:template>
               <xsl:template match="b" mode="x">[x]</xsl:template>
               <xsl:template match="b">[default]</xsl:template>"#,
            "<a><b/></a>",
        )
        .unwrap();
        assert_eq!(out, "[x][default]");
    }

    #[test]
    fn conditionals_and_loops() {
        let out = run(
            r#"<xsl:template match="/">
                 <xsl:for-each select="//n">
                   <xsl:choose>
                     <xsl:when test="position() = last()"><xsl:value-of select="."/></xsl:when>
                     <xsl:otherwise><xsl:value-of select="."/>,</xsl:otherwise>
                   </xsl:choose>
                 </xsl:for-each>
                 <xsl:if test="count(//n) &gt; 2">!</xsl:if>
                 <xsl:if test="not(//n)">?</xsl:if>
               </xsl:template>"#,
            "<a><n>1</n><n>2</n><n>3</n></a>",
        )
        .unwrap();
        assert_eq!(out, "1,2,3!");
    }

    #[test]
    fn copy_and_copy_of() {
        let out = run(
            r#"<xsl:template match="node()"><xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy></xsl:template>
               <xsl:template match="@*"><xsl:copy/></xsl:template>
               <xsl:template match="keep"><xsl:copy-of select="."/></xsl:template>"#,
            r#"<a x="1"><keep y="2"><z/>t</keep><!--c--></a>"#,
        )
        .unwrap();
        assert_eq!(out, r#"<a x="1"><keep y="2"><z/>t</keep><!--c--></a>"#);
    }

    #[test]
    fn computed_elements_attributes_and_comments() {
        let out = run(
            r#"<xsl:template match="para">
                 <xsl:element name="{@style}">
                   <xsl:attribute name="n"><xsl:value-of select="string-length(.)"/></xsl:attribute>
                   <xsl:comment>from <xsl:value-of select="name()"/></xsl:comment>
                 </xsl:element>
               </xsl:template>"#,
            r#"<usx><para style="q1">abc</para></usx>"#,
        )
        .unwrap();
        assert_eq!(out, r#"<q1 n="3"><!--from para--></q1>"#);
    }

    #[test]
    fn named_templates_see_the_current_node() {
        let out = run(
            r#"<xsl:template match="b"><xsl:call-template name="label"/></xsl:template>
               <xsl:template name="label">&lt;<xsl:value-of select="@id"/>&gt;</xsl:template>"#,
            r#"<a><b id="x"/></a>"#,
        )
        .unwrap();
        assert_eq!(out, "&lt;x&gt;");

        let err = run(
            r#"<xsl:template match="/"><xsl:call-template name="absent"/></xsl:template>"#,
            "<a/>",
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Runtime(_)));
    }

    #[test]
    fn namespaces_are_declared_once() {
        let sheet = Stylesheet::parse(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns="urn:osis">
                 <xsl:template match="/"><osis><osisText/></osis></xsl:template>
               </xsl:stylesheet>"#,
        )
        .unwrap();
        let out = sheet.transform(&Document::parse("<a/>").unwrap()).unwrap();
        assert_eq!(
            out.node_to_string(out.root()),
            r#"<osis xmlns="urn:osis"><osisText/></osis>"#
        );
    }

    #[test]
    fn attributes_outside_elements_are_rejected() {
        let err = run(
            r#"<xsl:template match="/"><xsl:attribute name="a">1</xsl:attribute></xsl:template>"#,
            "<a/>",
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::Runtime(_)));
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let err = run(
            r#"<xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
               <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>"#,
            "<a/>",
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::RecursionLimit(RECURSION_LIMIT)));
    }

    #[test]
    fn nesting_below_the_limit_is_transformed() {
        let depth = RECURSION_LIMIT - 8;
        let source = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let out = run(
            r#"<xsl:template match="a"><b><xsl:apply-templates/></b></xsl:template>"#,
            &source,
        )
        .unwrap();
        assert_eq!(out.matches("<b>").count(), depth);
    }

    #[test]
    fn the_source_is_not_modified() {
        let source = Document::parse("<a><b/></a>").unwrap();
        let before = source.node_to_string(source.root());
        let sheet = Stylesheet::parse(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:template match="b"><c/></xsl:template>
               </xsl:stylesheet>"#,
        )
        .unwrap();
        sheet.transform(&source).unwrap();
        assert_eq!(source.node_to_string(source.root()), before);
    }
}
