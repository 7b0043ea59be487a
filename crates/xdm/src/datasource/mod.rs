//! The core abstraction for a navigable, read-only source tree.
//!
//! The evaluator and the transformation runtime are written exclusively
//! against [`SourceNode`], so any tree shape that can answer the capability
//! set below (kind, name, string value, parent/children/attributes, document
//! order, base URI) plugs in. Nodes are shared handles; the engine never
//! mutates them, and `==` is node identity.

pub mod xml;

use crate::name::{ExpandedName, QName};

/// The kind of a node, aligned with the XPath data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

/// The thirteen XPath axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
    SelfAxis,
}

impl Axis {
    /// Reverse axes produce nodes in reverse document order.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

/// The universal contract for a node in a read-only source tree.
///
/// Required methods cover the raw capability set; the axis methods are
/// provided on top of them. Forward axes yield document order, reverse axes
/// (`ancestor*`, `preceding*`) reverse document order. Iterators are finite
/// and single-use.
pub trait SourceNode: std::fmt::Debug + Clone + PartialEq + Eq + std::hash::Hash + Sized + 'static {
    fn node_kind(&self) -> NodeKind;

    /// Lexical name. `None` for kinds without names; for a
    /// processing-instruction this is its target, for a namespace node the
    /// bound prefix.
    fn name(&self) -> Option<QName>;

    /// Namespace-URI + local-name identity of the node, if named.
    fn expanded_name(&self) -> Option<ExpandedName>;

    /// XPath string value: text content for leaves, concatenated descendant
    /// text for elements and documents.
    fn string_value(&self) -> String;

    fn attributes(&self) -> Box<dyn Iterator<Item = Self>>;

    fn namespace_nodes(&self) -> Box<dyn Iterator<Item = Self>>;

    fn children(&self) -> Box<dyn Iterator<Item = Self>>;

    fn parent(&self) -> Option<Self>;

    /// Monotone 64-bit key: total document order within one document,
    /// stable (per-run) ordering across documents.
    fn document_order(&self) -> u64;

    fn base_uri(&self) -> Option<String>;

    /// URI the containing document was loaded from, if any.
    fn document_uri(&self) -> Option<String> {
        None
    }

    fn is_same_node(&self, other: &Self) -> bool {
        self == other
    }

    fn root(&self) -> Self {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    fn descendants(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        Box::new(out.into_iter())
    }

    fn descendants_or_self(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = vec![self.clone()];
        collect_descendants(self, &mut out);
        Box::new(out.into_iter())
    }

    fn ancestors(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = Vec::new();
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            out.push(parent.clone());
            node = parent;
        }
        Box::new(out.into_iter())
    }

    fn ancestors_or_self(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = vec![self.clone()];
        out.extend(self.ancestors());
        Box::new(out.into_iter())
    }

    fn following_siblings(&self) -> Box<dyn Iterator<Item = Self>> {
        match self.node_kind() {
            NodeKind::Attribute | NodeKind::Namespace => return Box::new(std::iter::empty()),
            _ => {}
        }
        let me = self.clone();
        match self.parent() {
            Some(parent) => {
                let out: Vec<Self> = parent
                    .children()
                    .skip_while(move |n| *n != me)
                    .skip(1)
                    .collect();
                Box::new(out.into_iter())
            }
            None => Box::new(std::iter::empty()),
        }
    }

    fn preceding_siblings(&self) -> Box<dyn Iterator<Item = Self>> {
        match self.node_kind() {
            NodeKind::Attribute | NodeKind::Namespace => return Box::new(std::iter::empty()),
            _ => {}
        }
        let me = self.clone();
        match self.parent() {
            Some(parent) => {
                let mut out: Vec<Self> =
                    parent.children().take_while(move |n| *n != me).collect();
                out.reverse();
                Box::new(out.into_iter())
            }
            None => Box::new(std::iter::empty()),
        }
    }

    /// Nodes after this one in document order, excluding descendants and
    /// attribute/namespace nodes.
    fn following(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = Vec::new();
        for anchor in self.ancestors_or_self() {
            for sibling in anchor.following_siblings() {
                out.push(sibling.clone());
                collect_descendants(&sibling, &mut out);
            }
        }
        out.sort_by_key(SourceNode::document_order);
        Box::new(out.into_iter())
    }

    /// Nodes before this one in document order, excluding ancestors and
    /// attribute/namespace nodes; yielded in reverse document order.
    fn preceding(&self) -> Box<dyn Iterator<Item = Self>> {
        let mut out = Vec::new();
        for anchor in self.ancestors_or_self() {
            for sibling in anchor.preceding_siblings() {
                out.push(sibling.clone());
                collect_descendants(&sibling, &mut out);
            }
        }
        out.sort_by_key(SourceNode::document_order);
        out.reverse();
        Box::new(out.into_iter())
    }

    fn axis(&self, axis: Axis) -> Box<dyn Iterator<Item = Self>> {
        match axis {
            Axis::Child => self.children(),
            Axis::Descendant => self.descendants(),
            Axis::DescendantOrSelf => self.descendants_or_self(),
            Axis::Parent => match self.parent() {
                Some(p) => Box::new(std::iter::once(p)),
                None => Box::new(std::iter::empty()),
            },
            Axis::Ancestor => self.ancestors(),
            Axis::AncestorOrSelf => self.ancestors_or_self(),
            Axis::FollowingSibling => self.following_siblings(),
            Axis::PrecedingSibling => self.preceding_siblings(),
            Axis::Following => self.following(),
            Axis::Preceding => self.preceding(),
            Axis::Attribute => self.attributes(),
            Axis::Namespace => self.namespace_nodes(),
            Axis::SelfAxis => Box::new(std::iter::once(self.clone())),
        }
    }

    /// In-scope namespace bindings as `(prefix, uri)` pairs, derived from
    /// the namespace axis.
    fn in_scope_namespaces(&self) -> Vec<(String, String)> {
        self.namespace_nodes()
            .map(|ns| {
                let prefix = ns.name().map(|q| q.local).unwrap_or_default();
                (prefix, ns.string_value())
            })
            .collect()
    }

    /// Nearest ancestor-or-self `xml:lang` value.
    fn language(&self) -> Option<String> {
        for node in self.ancestors_or_self() {
            for attr in node.attributes() {
                if let Some(name) = attr.expanded_name() {
                    if name.local == "lang" && name.uri.as_deref() == Some(crate::XML_NAMESPACE) {
                        return Some(attr.string_value());
                    }
                }
            }
        }
        None
    }
}

fn collect_descendants<N: SourceNode>(node: &N, out: &mut Vec<N>) {
    for child in node.children() {
        out.push(child.clone());
        collect_descendants(&child, out);
    }
}
