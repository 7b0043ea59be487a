//! Sequence types: the `as="…"` grammar, matching, and the function
//! conversion rules.
//!
//! Coercion applies atomization, untyped-to-target casting and numeric
//! promotion, then re-checks the match; failure is the coercion error,
//! downgraded to a warning (or swallowed) when the context error mode asks
//! for recovery.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    sequence::delimited,
};

use stilo_xdm::{ExpandedName, Namespaces, NodeKind, QName, SourceNode, XS_NAMESPACE};

use crate::ast::NameTest;
use crate::context::{ErrorMode, EvaluationContext};
use crate::error::{Result, XPathError};
use crate::types::cast::cast_atomic;
use crate::types::{AtomicType, AtomicValue, XdmItem, XdmValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// exactly one
    One,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Occurrence {
    fn accepts(&self, len: usize) -> bool {
        match self {
            Occurrence::One => len == 1,
            Occurrence::Optional => len <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => len >= 1,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::Optional => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// `item()`
    Item,
    /// `node()`
    Node,
    Element(Option<NameTest>),
    Attribute(Option<NameTest>),
    Text,
    Comment,
    ProcessingInstruction,
    Document,
    Atomic(AtomicType),
    MapAny,
    ArrayAny,
    FunctionAny,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceType {
    /// `None` is `empty-sequence()`.
    pub item: Option<ItemKind>,
    pub occurrence: Occurrence,
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            None => write!(f, "empty-sequence()"),
            Some(kind) => {
                let name = match kind {
                    ItemKind::Item => "item()".to_string(),
                    ItemKind::Node => "node()".to_string(),
                    ItemKind::Element(_) => "element()".to_string(),
                    ItemKind::Attribute(_) => "attribute()".to_string(),
                    ItemKind::Text => "text()".to_string(),
                    ItemKind::Comment => "comment()".to_string(),
                    ItemKind::ProcessingInstruction => "processing-instruction()".to_string(),
                    ItemKind::Document => "document-node()".to_string(),
                    ItemKind::Atomic(t) => t.name().to_string(),
                    ItemKind::MapAny => "map(*)".to_string(),
                    ItemKind::ArrayAny => "array(*)".to_string(),
                    ItemKind::FunctionAny => "function(*)".to_string(),
                };
                write!(f, "{}{}", name, self.occurrence.symbol())
            }
        }
    }
}

impl SequenceType {
    pub fn any() -> Self {
        SequenceType {
            item: Some(ItemKind::Item),
            occurrence: Occurrence::ZeroOrMore,
        }
    }

    pub fn one(kind: ItemKind) -> Self {
        SequenceType {
            item: Some(kind),
            occurrence: Occurrence::One,
        }
    }

    /// Parses an `as` attribute value, resolving type-name prefixes against
    /// `namespaces`.
    pub fn parse(input: &str, namespaces: &Namespaces) -> Result<SequenceType> {
        match seq_type(input.trim()) {
            Ok(("", parsed)) => parsed.resolve(input, namespaces),
            Ok((rest, _)) => Err(XPathError::parse(
                input,
                format!("unparsed input remaining: '{}'", rest),
            )),
            Err(e) => Err(XPathError::parse(input, e.to_string())),
        }
    }

    pub fn matches<N: SourceNode>(&self, value: &XdmValue<N>) -> bool {
        match &self.item {
            None => value.is_empty(),
            Some(kind) => {
                self.occurrence.accepts(value.len())
                    && value.iter().all(|item| item_matches(kind, item))
            }
        }
    }

    /// Function conversion rules with the context's error-handling mode.
    pub fn coerce<N: SourceNode>(
        &self,
        value: XdmValue<N>,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<XdmValue<N>> {
        match self.try_coerce(&value, ctx) {
            Ok(coerced) => Ok(coerced),
            Err(err) => match ctx.error_mode {
                ErrorMode::Strict => Err(err),
                ErrorMode::Recover => {
                    log::warn!("recovering from coercion failure: {}", err);
                    Ok(value)
                }
                ErrorMode::Silent => Ok(value),
            },
        }
    }

    fn try_coerce<N: SourceNode>(
        &self,
        value: &XdmValue<N>,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<XdmValue<N>> {
        if self.matches(value) {
            return Ok(value.clone());
        }
        let coerced = match &self.item {
            Some(ItemKind::Atomic(target)) => {
                let mut items = Vec::new();
                for atomic in value.atomized()? {
                    items.push(XdmItem::Atomic(coerce_atomic(
                        &atomic,
                        *target,
                        ctx,
                        self,
                    )?));
                }
                XdmValue::from_items(items)
            }
            _ => value.clone(),
        };
        if self.matches(&coerced) {
            Ok(coerced)
        } else {
            Err(self.mismatch(value))
        }
    }

    fn mismatch<N: SourceNode>(&self, value: &XdmValue<N>) -> XPathError {
        let supplied = match value.first() {
            Some(item) => format!(
                "{} (length {})",
                item.type_name(),
                value.len()
            ),
            None => "empty-sequence()".to_string(),
        };
        XPathError::Coercion {
            message: "value does not match the required sequence type".to_string(),
            required: self.to_string(),
            supplied,
        }
    }
}

fn coerce_atomic<N: SourceNode>(
    atomic: &AtomicValue,
    target: AtomicType,
    ctx: &EvaluationContext<'_, N>,
    seq_type: &SequenceType,
) -> Result<AtomicValue> {
    let source = atomic.atomic_type();
    if source.derives_from(&target) {
        return Ok(atomic.clone());
    }
    let promotable = matches!(atomic, AtomicValue::UntypedAtomic(_))
        || (source.derives_from(&AtomicType::Decimal)
            && matches!(target, AtomicType::Double | AtomicType::Float | AtomicType::Decimal))
        || (source == AtomicType::Decimal && matches!(target, AtomicType::Double | AtomicType::Float))
        || (source == AtomicType::Float && target == AtomicType::Double)
        || (source == AtomicType::AnyUri && target == AtomicType::String);
    if !promotable {
        return Err(XPathError::Coercion {
            message: "argument type is not promotable to the required type".to_string(),
            required: seq_type.to_string(),
            supplied: source.name().to_string(),
        });
    }
    cast_atomic(atomic, target, Some(ctx.namespaces())).map_err(|_| XPathError::Coercion {
        message: "value cannot be converted to the required type".to_string(),
        required: seq_type.to_string(),
        supplied: atomic.to_string_value(),
    })
}

fn item_matches<N: SourceNode>(kind: &ItemKind, item: &XdmItem<N>) -> bool {
    match kind {
        ItemKind::Item => true,
        ItemKind::Node => item.is_node(),
        ItemKind::Element(test) => match item.as_node() {
            Some(n) => {
                n.node_kind() == NodeKind::Element
                    && test
                        .as_ref()
                        .map(|t| t.matches(n.expanded_name().as_ref()))
                        .unwrap_or(true)
            }
            None => false,
        },
        ItemKind::Attribute(test) => match item.as_node() {
            Some(n) => {
                n.node_kind() == NodeKind::Attribute
                    && test
                        .as_ref()
                        .map(|t| t.matches(n.expanded_name().as_ref()))
                        .unwrap_or(true)
            }
            None => false,
        },
        ItemKind::Text => matches!(item.as_node().map(SourceNode::node_kind), Some(NodeKind::Text)),
        ItemKind::Comment => {
            matches!(item.as_node().map(SourceNode::node_kind), Some(NodeKind::Comment))
        }
        ItemKind::ProcessingInstruction => matches!(
            item.as_node().map(SourceNode::node_kind),
            Some(NodeKind::ProcessingInstruction)
        ),
        ItemKind::Document => matches!(
            item.as_node().map(SourceNode::node_kind),
            Some(NodeKind::Document)
        ),
        ItemKind::Atomic(target) => match item.as_atomic() {
            Some(a) => a.atomic_type().derives_from(target),
            None => false,
        },
        ItemKind::MapAny => item.as_map().is_some(),
        ItemKind::ArrayAny => item.as_array().is_some(),
        ItemKind::FunctionAny => item.as_function().is_some(),
    }
}

// --- parsing -----------------------------------------------------------

/// Parsed form before prefix resolution.
#[derive(Debug, Clone)]
struct RawSequenceType {
    item: Option<RawItemKind>,
    occurrence: Occurrence,
}

#[derive(Debug, Clone)]
enum RawItemKind {
    Known(ItemKind),
    Named(String),
    ElementNamed(String),
    AttributeNamed(String),
}

impl RawSequenceType {
    fn resolve(self, input: &str, namespaces: &Namespaces) -> Result<SequenceType> {
        let item = match self.item {
            None => None,
            Some(RawItemKind::Known(kind)) => Some(kind),
            Some(RawItemKind::Named(name)) => {
                let qname =
                    QName::parse(&name).map_err(|_| XPathError::parse(input, "bad type name"))?;
                let expanded = namespaces
                    .expand(&qname, false)
                    .map_err(|_| XPathError::parse(input, "unbound type prefix"))?;
                let atomic = (expanded.uri.as_deref() == Some(XS_NAMESPACE))
                    .then(|| AtomicType::from_local_name(&expanded.local))
                    .flatten()
                    .ok_or_else(|| {
                        XPathError::parse(input, format!("unknown atomic type {}", name))
                    })?;
                Some(ItemKind::Atomic(atomic))
            }
            Some(RawItemKind::ElementNamed(name)) => {
                Some(ItemKind::Element(Some(resolve_name_test(
                    &name, input, namespaces,
                )?)))
            }
            Some(RawItemKind::AttributeNamed(name)) => {
                Some(ItemKind::Attribute(Some(resolve_name_test(
                    &name, input, namespaces,
                )?)))
            }
        };
        Ok(SequenceType {
            item,
            occurrence: self.occurrence,
        })
    }
}

fn resolve_name_test(
    name: &str,
    input: &str,
    namespaces: &Namespaces,
) -> Result<NameTest> {
    let qname = QName::parse(name).map_err(|_| XPathError::parse(input, "bad name test"))?;
    let expanded = namespaces
        .expand(&qname, true)
        .map_err(|_| XPathError::parse(input, "unbound prefix in name test"))?;
    Ok(NameTest::Exact(expanded))
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == ':' || c == '_' || c == '-' || c == '.')(
        input,
    )
}

fn paren_arg(input: &str) -> IResult<&str, Option<&str>> {
    delimited(
        ws(char('(')),
        opt(ws(take_while1(|c: char| c != ')' && !c.is_whitespace()))),
        ws(char(')')),
    )
    .parse(input)
}

fn item_kind(input: &str) -> IResult<&str, RawItemKind> {
    alt((
        value(RawItemKind::Known(ItemKind::Item), (tag("item"), paren_arg)),
        value(RawItemKind::Known(ItemKind::Text), (tag("text"), paren_arg)),
        value(
            RawItemKind::Known(ItemKind::Comment),
            (tag("comment"), paren_arg),
        ),
        value(
            RawItemKind::Known(ItemKind::ProcessingInstruction),
            (tag("processing-instruction"), paren_arg),
        ),
        value(
            RawItemKind::Known(ItemKind::Document),
            (tag("document-node"), paren_arg),
        ),
        map((tag("element"), paren_arg), |(_, name)| match name {
            Some(n) if n != "*" => RawItemKind::ElementNamed(n.to_string()),
            _ => RawItemKind::Known(ItemKind::Element(None)),
        }),
        map((tag("attribute"), paren_arg), |(_, name)| match name {
            Some(n) if n != "*" => RawItemKind::AttributeNamed(n.to_string()),
            _ => RawItemKind::Known(ItemKind::Attribute(None)),
        }),
        value(RawItemKind::Known(ItemKind::Node), (tag("node"), paren_arg)),
        value(RawItemKind::Known(ItemKind::MapAny), (tag("map"), paren_arg)),
        value(
            RawItemKind::Known(ItemKind::ArrayAny),
            (tag("array"), paren_arg),
        ),
        value(
            RawItemKind::Known(ItemKind::FunctionAny),
            (tag("function"), paren_arg),
        ),
        map(type_name, |name: &str| RawItemKind::Named(name.to_string())),
    ))
    .parse(input)
}

fn occurrence(input: &str) -> IResult<&str, Occurrence> {
    map(
        opt(ws(alt((
            value(Occurrence::Optional, char('?')),
            value(Occurrence::ZeroOrMore, char('*')),
            value(Occurrence::OneOrMore, char('+')),
        )))),
        |o| o.unwrap_or(Occurrence::One),
    )
    .parse(input)
}

fn seq_type(input: &str) -> IResult<&str, RawSequenceType> {
    alt((
        value(
            RawSequenceType {
                item: None,
                occurrence: Occurrence::One,
            },
            (tag("empty-sequence"), paren_arg),
        ),
        map((ws(item_kind), occurrence), |(item, occurrence)| {
            RawSequenceType {
                item: Some(item),
                occurrence,
            }
        }),
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    fn parse(s: &str) -> SequenceType {
        SequenceType::parse(s, &Namespaces::new().bind("xs", XS_NAMESPACE)).unwrap()
    }

    type V = XdmValue<XmlNode>;

    #[test]
    fn parses_the_common_shapes() {
        assert_eq!(
            parse("xs:string"),
            SequenceType::one(ItemKind::Atomic(AtomicType::String))
        );
        assert_eq!(parse("item()*"), SequenceType::any());
        assert_eq!(
            parse("element()?"),
            SequenceType {
                item: Some(ItemKind::Element(None)),
                occurrence: Occurrence::Optional
            }
        );
        assert_eq!(
            parse("empty-sequence()"),
            SequenceType {
                item: None,
                occurrence: Occurrence::One
            }
        );
        assert_eq!(parse("xs:integer+").occurrence, Occurrence::OneOrMore);
    }

    #[test]
    fn empty_sequence_matches_only_empty() {
        let st = parse("empty-sequence()");
        assert!(st.matches(&V::empty()));
        assert!(!st.matches(&V::from_integer(1)));
    }

    #[test]
    fn occurrence_is_enforced() {
        let st = parse("xs:integer+");
        assert!(!st.matches(&V::empty()));
        let mut two = V::from_integer(1);
        two.extend(V::from_integer(2));
        assert!(st.matches(&two));
        let one = parse("xs:integer");
        assert!(!one.matches(&two));
    }

    #[test]
    fn integer_matches_decimal_via_hierarchy() {
        let st = parse("xs:decimal");
        assert!(st.matches(&V::from_integer(3)));
        assert!(!st.matches(&V::from_double(3.0)));
    }

    #[test]
    fn element_name_tests_resolve_prefixes() {
        let ns = Namespaces::new().bind("p", "http://x");
        let st = SequenceType::parse("element(p:item)", &ns).unwrap();
        match st.item {
            Some(ItemKind::Element(Some(NameTest::Exact(name)))) => {
                assert_eq!(name, ExpandedName::new("http://x", "item"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }
}
