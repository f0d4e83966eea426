//! Arena backed XML tree.
//!
//! Nodes live in a single `Vec` owned by the [`Document`] and are addressed
//! by [`NodeId`]. Detaching a node only unlinks it from its parent, so ids
//! stay valid for the lifetime of the document and a detached subtree can be
//! re-inserted anywhere.

/// Handle to a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) const fn index(self) -> usize {
        self.0
    }
}

/// An attribute of an element, stored with its qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name, e.g. `osisID` or `xml:lang`.
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

/// Name and attributes of an element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name, e.g. `verse` or `xsl:template`.
    pub name: String,
    /// Attributes in document order. Namespace declarations are kept as
    /// ordinary `xmlns` attributes.
    pub attributes: Vec<Attribute>,
}

impl Element {
    /// The value of an attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// The part of the name after any prefix.
    #[must_use]
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }
}

/// The payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node; always [`Document::root`].
    Document,
    /// An element.
    Element(Element),
    /// Character data.
    Text(String),
    /// A comment.
    Comment(String),
    /// A processing instruction.
    ProcessingInstruction {
        /// The instruction target.
        target: String,
        /// Everything after the target.
        data: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document holding only the document node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Number of nodes ever created, attached or not.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Creates a detached fragment that serializes as its children.
    pub(crate) fn create_fragment(&mut self) -> NodeId {
        self.push(NodeKind::Document)
    }

    /// The document node.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if any.
    #[must_use]
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_elements(self.root()).next()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Creates a detached element with no attributes.
    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.push(NodeKind::Element(Element {
            name: name.into(),
            attributes: Vec::new(),
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    /// Creates a detached comment.
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Comment(text.into()))
    }

    /// Creates a detached processing instruction.
    pub fn create_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: Option<String>,
    ) -> NodeId {
        self.push(NodeKind::ProcessingInstruction {
            target: target.into(),
            data,
        })
    }

    /// The payload of a node.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    /// The element payload, if the node is an element.
    #[must_use]
    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Whether the node is an element.
    #[must_use]
    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    /// The qualified name of an element, or `None` for other node kinds.
    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.name.as_str())
    }

    /// The text of a text node.
    #[must_use]
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// An attribute of an element.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|e| e.attribute(name))
    }

    /// The attributes of an element; empty for other node kinds.
    #[must_use]
    pub fn attributes(&self, node: NodeId) -> &[Attribute] {
        self.element(node).map_or(&[], |e| e.attributes.as_slice())
    }

    /// Sets an attribute, replacing any existing value.
    ///
    /// Returns `false` if the node is not an element.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        let name = name.into();
        let value = value.into();
        let Some(element) = self.element_mut(node) else {
            return false;
        };
        if let Some(existing) = element.attributes.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            element.attributes.push(Attribute { name, value });
        }
        true
    }

    /// Removes an attribute, returning its value.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        let element = self.element_mut(node)?;
        let position = element.attributes.iter().position(|a| a.name == name)?;
        Some(element.attributes.remove(position).value)
    }

    /// The parent of a node, or `None` for the root and detached nodes.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// The children of a node, in document order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// The element children of a node, in document order.
    pub fn child_elements(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Unlinks a node from its parent. The subtree stays intact.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|&child| child != node);
        }
    }

    fn check_insert(&self, parent: NodeId, node: NodeId) -> Result<(), HierarchyError> {
        if node == self.root() || self.is_ancestor_or_self(node, parent) {
            return Err(HierarchyError { node, parent });
        }
        Ok(())
    }

    /// Moves `node` to be the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Fails if `node` is the document node or an ancestor of `parent`.
    pub fn append(&mut self, parent: NodeId, node: NodeId) -> Result<(), HierarchyError> {
        self.check_insert(parent, node)?;
        self.detach(node);
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
        Ok(())
    }

    /// Moves `node` to be the sibling immediately before `reference`.
    ///
    /// # Errors
    ///
    /// Fails if `reference` is detached, or if `node` is the document node or
    /// an ancestor of `reference`.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), HierarchyError> {
        let parent = self.parent(reference).ok_or(HierarchyError {
            node,
            parent: reference,
        })?;
        if node == reference {
            return Err(HierarchyError { node, parent });
        }
        self.check_insert(parent, node)?;
        self.detach(node);
        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|&child| child == reference)
            .ok_or(HierarchyError { node, parent })?;
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(position, node);
        Ok(())
    }

    /// Appends text to `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        let node = self.create_text(text);
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
    }

    /// Deep-copies a node from another document into this one.
    ///
    /// The copy is detached; the source is left untouched. Importing a
    /// document node yields a fragment that serializes as its children.
    pub fn import(&mut self, source: &Self, node: NodeId) -> NodeId {
        let copy = self.push(source.kind(node).clone());
        for &child in source.children(node) {
            let child_copy = self.import(source, child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Document | NodeKind::Element(_) => {
                for &child in self.children(node) {
                    self.collect_text(child, out);
                }
            }
            NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => {}
        }
    }

    /// The node and all of its descendants, in document order.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Whether a namespace declaration with this name and value is in scope
    /// at `node`.
    #[must_use]
    pub fn declares_namespace(&self, node: NodeId, name: &str, uri: &str) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(value) = self.attribute(id, name) {
                return value == uri;
            }
            current = self.parent(id);
        }
        false
    }
}

/// Returns the local part of a qualified name.
#[must_use]
pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// A node could not be placed without breaking the tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot insert node {node:?} under {parent:?}")]
pub struct HierarchyError {
    /// The node being moved.
    pub node: NodeId,
    /// The intended parent.
    pub parent: NodeId,
}
