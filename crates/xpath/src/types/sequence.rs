//! Items and sequences.
//!
//! A sequence is finite, ordered and flat: it never contains another
//! sequence, and a single item is interchangeable with the singleton
//! sequence holding it. Node-set constructors enforce document order and
//! identity-deduplication so every consumer can rely on both.

use std::collections::HashSet;

use rust_decimal::Decimal;

use stilo_xdm::SourceNode;

use crate::error::{Result, XPathError};
use crate::types::array::XdmArray;
use crate::types::atomic::AtomicValue;
use crate::types::function::XdmFunction;
use crate::types::map::XdmMap;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(AtomicValue),
    Map(XdmMap<N>),
    Array(XdmArray<N>),
    Function(XdmFunction<N>),
}

impl<N: SourceNode> XdmItem<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&XdmMap<N>> {
        match self {
            XdmItem::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&XdmArray<N>> {
        match self {
            XdmItem::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&XdmFunction<N>> {
        match self {
            XdmItem::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            XdmItem::Node(_) => "node()".to_string(),
            XdmItem::Atomic(a) => a.type_name().to_string(),
            XdmItem::Map(_) => "map(*)".to_string(),
            XdmItem::Array(_) => "array(*)".to_string(),
            XdmItem::Function(f) => format!("function(*)#{}", f.arity()),
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.to_string_value(),
            XdmItem::Map(_) => String::new(),
            XdmItem::Array(a) => a.string_value(),
            XdmItem::Function(_) => String::new(),
        }
    }

    /// Typed value of one item as a list of atomics. Nodes are untyped, so
    /// they atomize to `xs:untypedAtomic`; arrays flatten; maps and
    /// functions have no typed value.
    pub fn atomized(&self) -> Result<Vec<AtomicValue>> {
        match self {
            XdmItem::Node(n) => Ok(vec![AtomicValue::UntypedAtomic(n.string_value())]),
            XdmItem::Atomic(a) => Ok(vec![a.clone()]),
            XdmItem::Array(a) => {
                let mut out = Vec::new();
                for member in a.members() {
                    out.extend(member.atomized()?);
                }
                Ok(out)
            }
            XdmItem::Map(_) | XdmItem::Function(_) => Err(XPathError::type_error(format!(
                "{} cannot be atomized",
                self.type_name()
            ))),
        }
    }
}

/// A flat sequence of items.
#[derive(Debug, Clone, PartialEq)]
pub struct XdmValue<N> {
    items: Vec<XdmItem<N>>,
}

impl<N> Default for XdmValue<N> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<N: SourceNode> XdmValue<N> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_item(item: XdmItem<N>) -> Self {
        Self { items: vec![item] }
    }

    pub fn from_items(items: Vec<XdmItem<N>>) -> Self {
        Self { items }
    }

    pub fn from_atomic(value: AtomicValue) -> Self {
        Self::from_item(XdmItem::Atomic(value))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self::from_atomic(AtomicValue::String(value.into()))
    }

    pub fn from_boolean(value: bool) -> Self {
        Self::from_atomic(AtomicValue::Boolean(value))
    }

    pub fn from_integer(value: i64) -> Self {
        Self::from_atomic(AtomicValue::Integer(value))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self::from_atomic(AtomicValue::Decimal(value))
    }

    pub fn from_double(value: f64) -> Self {
        Self::from_atomic(AtomicValue::Double(value))
    }

    pub fn from_node(node: N) -> Self {
        Self::from_item(XdmItem::Node(node))
    }

    /// Builds a node-set: document order, duplicates removed by identity.
    pub fn from_nodes(nodes: Vec<N>) -> Self {
        Self {
            items: sort_dedup_nodes(nodes)
                .into_iter()
                .map(XdmItem::Node)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&XdmItem<N>> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&XdmItem<N>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, XdmItem<N>> {
        self.items.iter()
    }

    pub fn items(&self) -> &[XdmItem<N>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<XdmItem<N>> {
        self.items
    }

    pub fn push(&mut self, item: XdmItem<N>) {
        self.items.push(item);
    }

    /// Sequence concatenation; flattening holds by construction because
    /// sequences are never items.
    pub fn extend(&mut self, other: XdmValue<N>) {
        self.items.extend(other.items);
    }

    /// String value of the first item; empty string for the empty sequence.
    pub fn to_string_value(&self) -> String {
        self.items
            .first()
            .map(XdmItem::string_value)
            .unwrap_or_default()
    }

    pub fn to_double(&self) -> f64 {
        match self.items.first() {
            Some(XdmItem::Atomic(a)) => a.to_double(),
            Some(XdmItem::Node(n)) => {
                AtomicValue::UntypedAtomic(n.string_value()).to_double()
            }
            _ => f64::NAN,
        }
    }

    /// Effective boolean value.
    pub fn effective_boolean_value(&self) -> Result<bool> {
        match self.items.len() {
            0 => Ok(false),
            _ => {
                if self.items[0].is_node() {
                    // a sequence whose first item is a node is true
                    return Ok(true);
                }
                if self.items.len() > 1 {
                    return Err(XPathError::NoEffectiveBoolean {
                        type_name: "a sequence of atomic values".to_string(),
                    });
                }
                match &self.items[0] {
                    XdmItem::Atomic(a) => match a {
                        AtomicValue::Boolean(b) => Ok(*b),
                        AtomicValue::String(s)
                        | AtomicValue::UntypedAtomic(s)
                        | AtomicValue::AnyUri(s) => Ok(!s.is_empty()),
                        AtomicValue::Integer(_)
                        | AtomicValue::Decimal(_)
                        | AtomicValue::Double(_) => Ok(a.to_boolean()),
                        other => Err(XPathError::NoEffectiveBoolean {
                            type_name: other.type_name().to_string(),
                        }),
                    },
                    other => Err(XPathError::NoEffectiveBoolean {
                        type_name: other.type_name(),
                    }),
                }
            }
        }
    }

    pub fn atomized(&self) -> Result<Vec<AtomicValue>> {
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            out.extend(item.atomized()?);
        }
        Ok(out)
    }

    /// All items as nodes, or `None` if any item is not a node.
    pub fn nodes(&self) -> Option<Vec<N>> {
        self.items
            .iter()
            .map(|item| item.as_node().cloned())
            .collect()
    }

    pub fn is_node_set(&self) -> bool {
        self.items.iter().all(XdmItem::is_node)
    }
}

/// Document order with identity dedup; the shape every node-set must have.
pub fn sort_dedup_nodes<N: SourceNode>(mut nodes: Vec<N>) -> Vec<N> {
    nodes.sort_by_key(SourceNode::document_order);
    let mut seen = HashSet::new();
    nodes.retain(|n| seen.insert(n.clone()));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{SourceNode, XmlTree};

    #[test]
    fn node_sets_deduplicate_and_order() {
        let tree = XmlTree::parse("<r><a/><b/><c/></r>").unwrap();
        let root = tree.root();
        let kids: Vec<_> = root.children().next().unwrap().children().collect();
        let scrambled = vec![
            kids[2].clone(),
            kids[0].clone(),
            kids[2].clone(),
            kids[1].clone(),
        ];
        let value = XdmValue::from_nodes(scrambled);
        assert_eq!(value.len(), 3);
        let orders: Vec<u64> = value
            .iter()
            .map(|i| i.as_node().unwrap().document_order())
            .collect();
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ebv_rules() {
        type V = XdmValue<stilo_xdm::XmlNode>;
        assert!(!V::empty().effective_boolean_value().unwrap());
        assert!(V::from_boolean(true).effective_boolean_value().unwrap());
        assert!(!V::from_double(0.0).effective_boolean_value().unwrap());
        assert!(!V::from_double(f64::NAN).effective_boolean_value().unwrap());
        assert!(!V::from_string("").effective_boolean_value().unwrap());
        assert!(V::from_string("x").effective_boolean_value().unwrap());
        let err = V::from_atomic(AtomicValue::Date(
            crate::types::datetime::DateValue::parse("2024-01-01").unwrap(),
        ))
        .effective_boolean_value()
        .unwrap_err();
        assert_eq!(err.code(), "FORG0006");
    }

    #[test]
    fn ebv_of_node_set_is_nonempty() {
        let tree = XmlTree::parse("<r/>").unwrap();
        let value = XdmValue::from_node(tree.root());
        assert!(value.effective_boolean_value().unwrap());
    }

    #[test]
    fn atomizing_a_node_yields_untyped_string_value() {
        let tree = XmlTree::parse("<r>42</r>").unwrap();
        let value = XdmValue::from_node(tree.root());
        assert_eq!(
            value.atomized().unwrap(),
            vec![AtomicValue::UntypedAtomic("42".to_string())]
        );
    }

    #[test]
    fn concatenation_preserves_flatness() {
        type V = XdmValue<stilo_xdm::XmlNode>;
        let mut a = V::from_integer(1);
        let mut b = V::from_integer(2);
        b.extend(V::from_integer(3));
        a.extend(b);
        assert_eq!(a.len(), 3);
        assert!(a.iter().all(|i| i.as_atomic().is_some()));
    }
}
