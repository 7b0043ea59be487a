//! Owned XML tree.
//!
//! Documents are parsed with `roxmltree` and copied into an arena owned by
//! an [`XmlTree`], so cached documents outlive the input buffer and node
//! handles are plain `(Arc, index)` pairs. The same arena is the target of
//! [`TreeBuilder`], which turns buffered output events (result tree
//! fragments) into a document node.
//!
//! Arena ids are allocated in document order: element, then its namespace
//! nodes, then attributes, then children. Each tree draws a process-unique
//! serial, which makes cross-document ordering arbitrary but stable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::XML_NAMESPACE;
use crate::datasource::{NodeKind, SourceNode};
use crate::error::XdmError;
use crate::name::{ExpandedName, QName};

static TREE_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    /// Lexical name; `None` for document, text and comment nodes and for
    /// the default-namespace node.
    name: Option<QName>,
    /// Namespace URI of the name, where applicable.
    uri: Option<String>,
    /// Content for text/comment/pi/attribute/namespace nodes.
    value: String,
    parent: Option<u32>,
    children: Vec<u32>,
    attributes: Vec<u32>,
    namespaces: Vec<u32>,
}

impl NodeData {
    fn leaf(kind: NodeKind, name: Option<QName>, value: String, parent: Option<u32>) -> Self {
        Self {
            kind,
            name,
            uri: None,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        }
    }
}

/// An immutable document tree. Always handled through `Arc`.
#[derive(Debug)]
pub struct XmlTree {
    serial: u64,
    nodes: Vec<NodeData>,
    base_uri: Option<String>,
    document_uri: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ParseOptions {
    pub base_uri: Option<String>,
    pub document_uri: Option<String>,
}

impl XmlTree {
    pub fn parse(text: &str) -> Result<Arc<XmlTree>, XdmError> {
        Self::parse_with(text, ParseOptions::default(), None)
    }

    /// Parses with a base URI and an optional whitespace-stripping rule.
    /// The rule receives the expanded name of the parent element of a
    /// whitespace-only text node; `xml:space="preserve"` always wins.
    pub fn parse_with(
        text: &str,
        options: ParseOptions,
        strip: Option<&dyn Fn(&ExpandedName) -> bool>,
    ) -> Result<Arc<XmlTree>, XdmError> {
        let doc = roxmltree::Document::parse(text)?;
        let mut builder = TreeBuilder::new();
        builder.base_uri = options.base_uri;
        builder.document_uri = options.document_uri;
        for child in doc.root().children() {
            replay(&doc, child, &mut builder, strip, false)?;
        }
        builder.finish()
    }

    /// Parses a fragment: the input is wrapped in a synthetic root element
    /// and the resulting document holds the fragment's own nodes.
    pub fn parse_fragment(text: &str) -> Result<Arc<XmlTree>, XdmError> {
        let wrapped = format!("<stilo-fragment>{}</stilo-fragment>", text);
        let doc = roxmltree::Document::parse(&wrapped)?;
        let mut builder = TreeBuilder::new();
        let wrapper = doc.root_element();
        for child in wrapper.children() {
            replay(&doc, child, &mut builder, None, false)?;
        }
        builder.finish()
    }

    pub fn root(self: &Arc<Self>) -> XmlNode {
        XmlNode {
            tree: Arc::clone(self),
            id: 0,
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    fn data(&self, id: u32) -> &NodeData {
        &self.nodes[id as usize]
    }
}

/// Handle to a node in an [`XmlTree`]. Cheap to clone; equality is node
/// identity.
#[derive(Clone)]
pub struct XmlNode {
    tree: Arc<XmlTree>,
    id: u32,
}

impl std::fmt::Debug for XmlNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.tree.data(self.id);
        write!(f, "XmlNode({:?}", data.kind)?;
        if let Some(name) = &data.name {
            write!(f, " {}", name)?;
        }
        write!(f, " #{}:{})", self.tree.serial, self.id)
    }
}

impl PartialEq for XmlNode {
    fn eq(&self, other: &Self) -> bool {
        self.tree.serial == other.tree.serial && self.id == other.id
    }
}

impl Eq for XmlNode {}

impl std::hash::Hash for XmlNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tree.serial.hash(state);
        self.id.hash(state);
    }
}

impl XmlNode {
    fn wrap(&self, id: u32) -> XmlNode {
        XmlNode {
            tree: Arc::clone(&self.tree),
            id,
        }
    }

    fn wrap_all(&self, ids: &[u32]) -> Vec<XmlNode> {
        ids.iter().map(|id| self.wrap(*id)).collect()
    }

    pub fn tree(&self) -> &Arc<XmlTree> {
        &self.tree
    }
}

impl SourceNode for XmlNode {
    fn node_kind(&self) -> NodeKind {
        self.tree.data(self.id).kind
    }

    fn name(&self) -> Option<QName> {
        self.tree.data(self.id).name.clone()
    }

    fn expanded_name(&self) -> Option<ExpandedName> {
        let data = self.tree.data(self.id);
        data.name.as_ref().map(|name| ExpandedName {
            uri: data.uri.clone(),
            local: name.local.clone(),
        })
    }

    fn string_value(&self) -> String {
        let data = self.tree.data(self.id);
        match data.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                collect_text(&self.tree, self.id, &mut out);
                out
            }
            _ => data.value.clone(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.wrap_all(&self.tree.data(self.id).attributes).into_iter())
    }

    fn namespace_nodes(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.wrap_all(&self.tree.data(self.id).namespaces).into_iter())
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.wrap_all(&self.tree.data(self.id).children).into_iter())
    }

    fn parent(&self) -> Option<Self> {
        self.tree.data(self.id).parent.map(|id| self.wrap(id))
    }

    fn document_order(&self) -> u64 {
        ((self.tree.serial & 0xffff_ffff) << 32) | u64::from(self.id)
    }

    fn base_uri(&self) -> Option<String> {
        let mut segments: Vec<String> = Vec::new();
        let mut node = Some(self.clone());
        while let Some(current) = node {
            for attr in current.attributes() {
                if let Some(name) = attr.expanded_name() {
                    if name.local == "base" && name.uri.as_deref() == Some(XML_NAMESPACE) {
                        segments.push(attr.string_value());
                    }
                }
            }
            node = current.parent();
        }
        let mut base = self.tree.base_uri.clone();
        for segment in segments.into_iter().rev() {
            base = Some(match &base {
                Some(b) => resolve_uri(&segment, b),
                None => segment,
            });
        }
        base
    }

    fn document_uri(&self) -> Option<String> {
        if self.id == 0 {
            self.tree.document_uri.clone()
        } else {
            None
        }
    }
}

fn collect_text(tree: &Arc<XmlTree>, id: u32, out: &mut String) {
    let data = tree.data(id);
    match data.kind {
        NodeKind::Text => out.push_str(&data.value),
        NodeKind::Document | NodeKind::Element => {
            for child in &data.children {
                collect_text(tree, *child, out);
            }
        }
        _ => {}
    }
}

/// Resolves a URI reference against a base, handling the absolute and
/// relative-path cases document loading needs.
pub fn resolve_uri(reference: &str, base: &str) -> String {
    if reference.is_empty() {
        return base.to_string();
    }
    if reference.contains("://") || reference.starts_with("file:") {
        return reference.to_string();
    }
    if reference.starts_with('/') {
        if let Some(scheme_end) = base.find("://") {
            if let Some(path_start) = base[scheme_end + 3..].find('/') {
                return format!("{}{}", &base[..scheme_end + 3 + path_start], reference);
            }
            return format!("{}{}", base, reference);
        }
        return reference.to_string();
    }
    match base.rfind('/') {
        Some(pos) => format!("{}/{}", &base[..pos], reference),
        None => reference.to_string(),
    }
}

/// Push-style tree construction: the consumer side of the output event
/// stream. Events must arrive well-formed (attributes and namespaces before
/// the first child of the open element).
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
    /// Open element ids, innermost last; the document node is always open.
    stack: Vec<u32>,
    /// In-scope `(prefix, uri)` bindings per open element.
    scope_stack: Vec<Vec<(Option<String>, String)>>,
    /// Bindings declared since the last `start_element`, applied to it.
    pending_namespaces: Vec<(Option<String>, String)>,
    base_uri: Option<String>,
    document_uri: Option<String>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let document = NodeData::leaf(NodeKind::Document, None, String::new(), None);
        Self {
            nodes: vec![document],
            stack: vec![0],
            scope_stack: vec![vec![(Some("xml".to_string()), XML_NAMESPACE.to_string())]],
            pending_namespaces: Vec::new(),
            base_uri: None,
            document_uri: None,
        }
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    fn alloc(&mut self, data: NodeData) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(data);
        id
    }

    fn open(&self) -> u32 {
        *self.stack.last().expect("document node is always open")
    }

    /// Declares a prefix mapping for the next element.
    pub fn namespace(&mut self, prefix: Option<&str>, uri: &str) {
        self.pending_namespaces
            .push((prefix.map(str::to_string), uri.to_string()));
    }

    pub fn start_element(&mut self, name: QName, uri: Option<&str>) {
        let parent = self.open();
        let id = self.alloc(NodeData {
            kind: NodeKind::Element,
            name: Some(name),
            uri: uri.map(str::to_string),
            value: String::new(),
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        });
        self.nodes[parent as usize].children.push(id);

        let mut scope = self.scope_stack.last().cloned().unwrap_or_default();
        for (prefix, uri) in self.pending_namespaces.drain(..) {
            scope.retain(|(p, _)| *p != prefix);
            scope.push((prefix, uri));
        }
        let mut ns_ids = Vec::new();
        for (prefix, uri) in &scope {
            let ns_id = self.nodes.len() as u32;
            self.nodes.push(NodeData::leaf(
                NodeKind::Namespace,
                prefix.as_ref().map(QName::new),
                uri.clone(),
                Some(id),
            ));
            ns_ids.push(ns_id);
        }
        self.nodes[id as usize].namespaces = ns_ids;
        self.scope_stack.push(scope);
        self.stack.push(id);
    }

    pub fn attribute(&mut self, name: QName, uri: Option<&str>, value: &str) {
        let element = self.open();
        debug_assert!(self.nodes[element as usize].kind == NodeKind::Element);
        let id = self.alloc(NodeData {
            kind: NodeKind::Attribute,
            name: Some(name),
            uri: uri.map(str::to_string),
            value: value.to_string(),
            parent: Some(element),
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        });
        self.nodes[element as usize].attributes.push(id);
    }

    pub fn text(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        let parent = self.open();
        // adjacent text events merge into one node
        if let Some(&last) = self.nodes[parent as usize].children.last() {
            if self.nodes[last as usize].kind == NodeKind::Text {
                self.nodes[last as usize].value.push_str(content);
                return;
            }
        }
        let id = self.alloc(NodeData::leaf(
            NodeKind::Text,
            None,
            content.to_string(),
            Some(parent),
        ));
        self.nodes[parent as usize].children.push(id);
    }

    pub fn comment(&mut self, content: &str) {
        let parent = self.open();
        let id = self.alloc(NodeData::leaf(
            NodeKind::Comment,
            None,
            content.to_string(),
            Some(parent),
        ));
        self.nodes[parent as usize].children.push(id);
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) {
        let parent = self.open();
        let id = self.alloc(NodeData::leaf(
            NodeKind::ProcessingInstruction,
            Some(QName::new(target)),
            data.to_string(),
            Some(parent),
        ));
        self.nodes[parent as usize].children.push(id);
    }

    pub fn end_element(&mut self) -> Result<(), XdmError> {
        if self.stack.len() <= 1 {
            return Err(XdmError::Builder("end_element without start_element".into()));
        }
        self.stack.pop();
        self.scope_stack.pop();
        Ok(())
    }

    pub fn finish(self) -> Result<Arc<XmlTree>, XdmError> {
        if self.stack.len() != 1 {
            return Err(XdmError::Builder(format!(
                "{} unclosed element(s)",
                self.stack.len() - 1
            )));
        }
        Ok(Arc::new(XmlTree {
            serial: TREE_SERIAL.fetch_add(1, AtomicOrdering::Relaxed),
            nodes: self.nodes,
            base_uri: self.base_uri,
            document_uri: self.document_uri,
        }))
    }
}

/// Replays a parsed `roxmltree` node into a [`TreeBuilder`].
fn replay(
    doc: &roxmltree::Document,
    node: roxmltree::Node,
    builder: &mut TreeBuilder,
    strip: Option<&dyn Fn(&ExpandedName) -> bool>,
    preserve_space: bool,
) -> Result<(), XdmError> {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            for ns in node.namespaces() {
                builder.namespace(ns.name(), ns.uri());
            }
            let tag = node.tag_name();
            let prefix = tag.namespace().and_then(|uri| node.lookup_prefix(uri));
            let name = match prefix {
                Some(p) if !p.is_empty() => QName::with_prefix(p, tag.name()),
                _ => QName::new(tag.name()),
            };
            builder.start_element(name, tag.namespace());

            let mut preserve = preserve_space;
            for attr in node.attributes() {
                let prefix = attr
                    .namespace()
                    .and_then(|uri| node.lookup_prefix(uri))
                    .filter(|p| !p.is_empty());
                let attr_name = match prefix {
                    Some(p) => QName::with_prefix(p, attr.name()),
                    None => QName::new(attr.name()),
                };
                if attr.namespace() == Some(XML_NAMESPACE) && attr.name() == "space" {
                    preserve = attr.value() == "preserve";
                }
                builder.attribute(attr_name, attr.namespace(), attr.value());
            }

            let element_name = ExpandedName {
                uri: tag.namespace().map(str::to_string),
                local: tag.name().to_string(),
            };
            for child in node.children() {
                if let roxmltree::NodeType::Text = child.node_type() {
                    let text = child.text().unwrap_or("");
                    let strippable = !preserve
                        && text.chars().all(char::is_whitespace)
                        && strip.map(|f| f(&element_name)).unwrap_or(false);
                    if strippable {
                        continue;
                    }
                }
                replay(doc, child, builder, strip, preserve)?;
            }
            builder.end_element()
        }
        roxmltree::NodeType::Text => {
            builder.text(node.text().unwrap_or(""));
            Ok(())
        }
        roxmltree::NodeType::Comment => {
            builder.comment(node.text().unwrap_or(""));
            Ok(())
        }
        roxmltree::NodeType::PI => {
            if let Some(pi) = node.pi() {
                builder.processing_instruction(pi.target, pi.value.unwrap_or(""));
            }
            Ok(())
        }
        roxmltree::NodeType::Root => {
            for child in node.children() {
                replay(doc, child, builder, strip, preserve_space)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::Axis;

    fn sample() -> Arc<XmlTree> {
        XmlTree::parse(
            r#"<doc id="d1"><a>one</a><b lang="en">two<c/>three</b><!--note--><?pi data?></doc>"#,
        )
        .unwrap()
    }

    fn element(root: &XmlNode, name: &str) -> XmlNode {
        root.descendants_or_self()
            .find(|n| {
                n.node_kind() == NodeKind::Element
                    && n.expanded_name().map(|e| e.local == name).unwrap_or(false)
            })
            .unwrap()
    }

    #[test]
    fn parse_builds_document_rooted_tree() {
        let tree = sample();
        let root = tree.root();
        assert_eq!(root.node_kind(), NodeKind::Document);
        let doc = element(&root, "doc");
        assert_eq!(doc.parent(), Some(root.clone()));
        assert_eq!(doc.children().count(), 4);
    }

    #[test]
    fn string_value_concatenates_descendant_text() {
        let tree = sample();
        let root = tree.root();
        assert_eq!(root.string_value(), "onetwothree");
        assert_eq!(element(&root, "b").string_value(), "twothree");
    }

    #[test]
    fn attributes_are_nodes_with_identity() {
        let tree = sample();
        let doc = element(&tree.root(), "doc");
        let attr = doc.attributes().next().unwrap();
        assert_eq!(attr.node_kind(), NodeKind::Attribute);
        assert_eq!(attr.string_value(), "d1");
        assert_eq!(attr.parent(), Some(doc.clone()));
        let again = doc.attributes().next().unwrap();
        assert!(attr.is_same_node(&again));
    }

    #[test]
    fn document_order_is_monotone() {
        let tree = sample();
        let root = tree.root();
        let orders: Vec<u64> = root
            .descendants_or_self()
            .map(|n| n.document_order())
            .collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
    }

    #[test]
    fn cross_document_order_is_stable() {
        let first = XmlTree::parse("<a/>").unwrap();
        let second = XmlTree::parse("<b/>").unwrap();
        assert!(first.root().document_order() < second.root().document_order());
    }

    #[test]
    fn axes_respect_direction() {
        let tree = sample();
        let root = tree.root();
        let c = element(&root, "c");
        let following: Vec<String> = c
            .axis(Axis::Following)
            .filter_map(|n| match n.node_kind() {
                NodeKind::Text => Some(n.string_value()),
                _ => None,
            })
            .collect();
        assert_eq!(following, vec!["three"]);

        let preceding: Vec<u64> = c.axis(Axis::Preceding).map(|n| n.document_order()).collect();
        let mut sorted = preceding.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(preceding, sorted, "preceding yields reverse document order");
    }

    #[test]
    fn fragment_parse_splices_out_the_wrapper() {
        let tree = XmlTree::parse_fragment("<x>1</x><y>2</y>").unwrap();
        let root = tree.root();
        assert_eq!(root.node_kind(), NodeKind::Document);
        let names: Vec<String> = root
            .children()
            .filter_map(|n| n.expanded_name().map(|e| e.local))
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn builder_round_trips_events() {
        let mut builder = TreeBuilder::new();
        builder.namespace(Some("p"), "http://x");
        builder.start_element(QName::with_prefix("p", "root"), Some("http://x"));
        builder.attribute(QName::new("k"), None, "v");
        builder.text("hel");
        builder.text("lo");
        builder.comment("c");
        builder.end_element().unwrap();
        let tree = builder.finish().unwrap();
        let root = tree.root();
        let elem = root.children().next().unwrap();
        assert_eq!(
            elem.expanded_name(),
            Some(ExpandedName::new("http://x", "root"))
        );
        // adjacent text events merged
        let texts: Vec<String> = elem
            .children()
            .filter(|n| n.node_kind() == NodeKind::Text)
            .map(|n| n.string_value())
            .collect();
        assert_eq!(texts, vec!["hello"]);
        assert!(
            elem.in_scope_namespaces()
                .iter()
                .any(|(p, u)| p == "p" && u == "http://x")
        );
    }

    #[test]
    fn whitespace_stripping_honors_xml_space() {
        let text = "<doc><keep xml:space=\"preserve\"> </keep><drop> </drop></doc>";
        let strip_all = |_: &ExpandedName| true;
        let tree =
            XmlTree::parse_with(text, ParseOptions::default(), Some(&strip_all)).unwrap();
        let root = tree.root();
        let keep = element(&root, "keep");
        let drop = element(&root, "drop");
        assert_eq!(keep.children().count(), 1);
        assert_eq!(drop.children().count(), 0);
    }

    #[test]
    fn base_uri_applies_xml_base() {
        let tree = XmlTree::parse_with(
            "<doc xml:base=\"http://example.com/a/b.xml\"><child xml:base=\"c.xml\"/></doc>",
            ParseOptions::default(),
            None,
        )
        .unwrap();
        let child = element(&tree.root(), "child");
        assert_eq!(
            child.base_uri(),
            Some("http://example.com/a/c.xml".to_string())
        );
    }

    #[test]
    fn language_walks_ancestors() {
        let tree =
            XmlTree::parse("<doc xml:lang=\"en-US\"><a><b/></a></doc>").unwrap();
        let b = element(&tree.root(), "b");
        assert_eq!(b.language(), Some("en-US".to_string()));
    }
}
