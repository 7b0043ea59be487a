//! Sequence functions.

use std::collections::HashSet;

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{ArgType, Table, def, double_arg, optional_string_arg, string_arg};
use crate::functions::numeric::round_half_up;
use crate::types::{AtomicValue, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "count", 1, Some(1), &[ArgType::Any], fn_count);
    def(table, "empty", 1, Some(1), &[ArgType::Any], fn_empty);
    def(table, "exists", 1, Some(1), &[ArgType::Any], fn_exists);
    def(table, "head", 1, Some(1), &[ArgType::Any], fn_head);
    def(table, "tail", 1, Some(1), &[ArgType::Any], fn_tail);
    def(table, "reverse", 1, Some(1), &[ArgType::Any], fn_reverse);
    def(table, "unordered", 1, Some(1), &[ArgType::Any], fn_unordered);
    def(table, "data", 0, Some(1), &[ArgType::Any], fn_data);
    def(
        table,
        "subsequence",
        2,
        Some(3),
        &[ArgType::Any, ArgType::Numeric, ArgType::Numeric],
        fn_subsequence,
    );
    def(
        table,
        "insert-before",
        3,
        Some(3),
        &[ArgType::Any, ArgType::Numeric, ArgType::Any],
        fn_insert_before,
    );
    def(
        table,
        "remove",
        2,
        Some(2),
        &[ArgType::Any, ArgType::Numeric],
        fn_remove,
    );
    def(
        table,
        "distinct-values",
        1,
        Some(2),
        &[ArgType::Any, ArgType::String],
        fn_distinct_values,
    );
    def(
        table,
        "index-of",
        2,
        Some(3),
        &[ArgType::Any, ArgType::Any, ArgType::String],
        fn_index_of,
    );
    def(
        table,
        "deep-equal",
        2,
        Some(3),
        &[ArgType::Any, ArgType::Any, ArgType::String],
        fn_deep_equal,
    );
    def(table, "zero-or-one", 1, Some(1), &[ArgType::Any], fn_zero_or_one);
    def(table, "one-or-more", 1, Some(1), &[ArgType::Any], fn_one_or_more);
    def(table, "exactly-one", 1, Some(1), &[ArgType::Any], fn_exactly_one);
    def(table, "innermost", 1, Some(1), &[ArgType::NodeSet], fn_innermost);
    def(table, "outermost", 1, Some(1), &[ArgType::NodeSet], fn_outermost);
    def(table, "trace", 1, Some(2), &[ArgType::Any, ArgType::String], fn_trace);
    def(table, "error", 0, Some(3), &[ArgType::Any], fn_error);
}

pub fn fn_count<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_integer(args[0].len() as i64))
}

pub fn fn_empty<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(args[0].is_empty()))
}

pub fn fn_exists<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(!args[0].is_empty()))
}

pub fn fn_head<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(match args[0].first() {
        Some(item) => XdmValue::from_item(item.clone()),
        None => XdmValue::empty(),
    })
}

pub fn fn_tail<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let items = args.remove(0).into_items();
    Ok(XdmValue::from_items(items.into_iter().skip(1).collect()))
}

pub fn fn_reverse<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut items = args.remove(0).into_items();
    items.reverse();
    Ok(XdmValue::from_items(items))
}

pub fn fn_unordered<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(args.remove(0))
}

pub fn fn_data<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = match args.first() {
        Some(v) => v.clone(),
        None => match &ctx.item {
            Some(item) => XdmValue::from_item(item.clone()),
            None => return Err(XPathError::NoContextItem),
        },
    };
    Ok(XdmValue::from_items(
        value
            .atomized()?
            .into_iter()
            .map(XdmItem::Atomic)
            .collect(),
    ))
}

pub fn fn_subsequence<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let start = round_half_up(double_arg(&args, 1));
    let end = if args.len() > 2 {
        start + round_half_up(double_arg(&args, 2))
    } else {
        f64::INFINITY
    };
    if start.is_nan() || end.is_nan() {
        return Ok(XdmValue::empty());
    }
    let items = args.remove(0).into_items();
    let kept = items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| {
            let position = (*index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, item)| item)
        .collect();
    Ok(XdmValue::from_items(kept))
}

pub fn fn_insert_before<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let inserts = args.remove(2).into_items();
    let position = double_arg(&args, 1) as i64;
    let target = args.remove(0).into_items();
    let index = position.clamp(1, target.len() as i64 + 1) as usize - 1;
    let mut out = Vec::with_capacity(target.len() + inserts.len());
    out.extend_from_slice(&target[..index]);
    out.extend(inserts);
    out.extend_from_slice(&target[index..]);
    Ok(XdmValue::from_items(out))
}

pub fn fn_remove<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let position = double_arg(&args, 1) as i64;
    let items = args.remove(0).into_items();
    let kept = items
        .into_iter()
        .enumerate()
        .filter(|(index, _)| (*index as i64 + 1) != position)
        .map(|(_, item)| item)
        .collect();
    Ok(XdmValue::from_items(kept))
}

pub fn fn_distinct_values<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let collation = ctx.resolve_collation(optional_string_arg(&args, 1).as_deref())?;
    let atomics = args[0].atomized()?;
    let mut kept: Vec<AtomicValue> = Vec::new();
    let mut seen_nan = false;
    for value in atomics {
        if value.is_nan() {
            // NaN is distinct from everything but one NaN is kept
            if !seen_nan {
                seen_nan = true;
                kept.push(value);
            }
            continue;
        }
        if !kept
            .iter()
            .any(|existing| existing.eq_with(&value, &collation, ctx.implicit_timezone))
        {
            kept.push(value);
        }
    }
    Ok(XdmValue::from_items(
        kept.into_iter().map(XdmItem::Atomic).collect(),
    ))
}

pub fn fn_index_of<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let collation = ctx.resolve_collation(optional_string_arg(&args, 2).as_deref())?;
    let needle = args[1].atomized()?;
    if needle.len() != 1 {
        return Err(XPathError::Cardinality {
            expected: "exactly one atomic value".to_string(),
            actual: needle.len(),
        });
    }
    let mut out = XdmValue::empty();
    for (index, atomic) in args[0].atomized()?.iter().enumerate() {
        if atomic.eq_with(&needle[0], &collation, ctx.implicit_timezone) {
            out.push(XdmItem::Atomic(AtomicValue::Integer(index as i64 + 1)));
        }
    }
    Ok(out)
}

fn items_deep_equal<N: SourceNode>(
    a: &XdmItem<N>,
    b: &XdmItem<N>,
    collation: &stilo_xdm::Collation,
    ctx: &EvaluationContext<'_, N>,
) -> Result<bool> {
    match (a, b) {
        (XdmItem::Atomic(x), XdmItem::Atomic(y)) => {
            Ok(x.eq_with(y, collation, ctx.implicit_timezone) || (x.is_nan() && y.is_nan()))
        }
        (XdmItem::Node(x), XdmItem::Node(y)) => Ok(nodes_deep_equal(x, y, collation)),
        (XdmItem::Map(x), XdmItem::Map(y)) => {
            if x.size() != y.size() {
                return Ok(false);
            }
            for (key, value) in x.entries() {
                match y.get(key) {
                    Some(other) => {
                        if !values_deep_equal(value, other, collation, ctx)? {
                            return Ok(false);
                        }
                    }
                    None => return Ok(false),
                }
            }
            Ok(true)
        }
        (XdmItem::Array(x), XdmItem::Array(y)) => {
            if x.size() != y.size() {
                return Ok(false);
            }
            for (m1, m2) in x.members().iter().zip(y.members()) {
                if !values_deep_equal(m1, m2, collation, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn values_deep_equal<N: SourceNode>(
    a: &XdmValue<N>,
    b: &XdmValue<N>,
    collation: &stilo_xdm::Collation,
    ctx: &EvaluationContext<'_, N>,
) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !items_deep_equal(x, y, collation, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn nodes_deep_equal<N: SourceNode>(a: &N, b: &N, collation: &stilo_xdm::Collation) -> bool {
    use stilo_xdm::NodeKind;
    if a.node_kind() != b.node_kind() {
        return false;
    }
    match a.node_kind() {
        NodeKind::Text | NodeKind::Comment | NodeKind::Attribute
        | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
            a.expanded_name() == b.expanded_name()
                && collation.eq(&a.string_value(), &b.string_value())
        }
        NodeKind::Element => {
            if a.expanded_name() != b.expanded_name() {
                return false;
            }
            let mut attrs_a: Vec<_> = a
                .attributes()
                .map(|at| (at.expanded_name(), at.string_value()))
                .collect();
            let mut attrs_b: Vec<_> = b
                .attributes()
                .map(|at| (at.expanded_name(), at.string_value()))
                .collect();
            attrs_a.sort();
            attrs_b.sort();
            if attrs_a != attrs_b {
                return false;
            }
            children_deep_equal(a, b, collation)
        }
        NodeKind::Document => children_deep_equal(a, b, collation),
    }
}

fn children_deep_equal<N: SourceNode>(a: &N, b: &N, collation: &stilo_xdm::Collation) -> bool {
    use stilo_xdm::NodeKind;
    let significant = |n: &N| {
        matches!(n.node_kind(), NodeKind::Element | NodeKind::Text)
    };
    let kids_a: Vec<N> = a.children().filter(significant).collect();
    let kids_b: Vec<N> = b.children().filter(significant).collect();
    kids_a.len() == kids_b.len()
        && kids_a
            .iter()
            .zip(&kids_b)
            .all(|(x, y)| nodes_deep_equal(x, y, collation))
}

pub fn fn_deep_equal<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let collation = ctx.resolve_collation(optional_string_arg(&args, 2).as_deref())?;
    values_deep_equal(&args[0], &args[1], &collation, ctx).map(XdmValue::from_boolean)
}

pub fn fn_zero_or_one<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = args.remove(0);
    if value.len() > 1 {
        return Err(XPathError::Cardinality {
            expected: "zero or one items".to_string(),
            actual: value.len(),
        });
    }
    Ok(value)
}

pub fn fn_one_or_more<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = args.remove(0);
    if value.is_empty() {
        return Err(XPathError::Cardinality {
            expected: "one or more items".to_string(),
            actual: 0,
        });
    }
    Ok(value)
}

pub fn fn_exactly_one<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = args.remove(0);
    if value.len() != 1 {
        return Err(XPathError::Cardinality {
            expected: "exactly one item".to_string(),
            actual: value.len(),
        });
    }
    Ok(value)
}

/// Nodes that have no ancestor in the set.
pub fn fn_outermost<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let nodes = args[0].nodes().ok_or_else(|| {
        XPathError::type_error("outermost requires a sequence of nodes")
    })?;
    let set: HashSet<N> = nodes.iter().cloned().collect();
    let kept: Vec<N> = nodes
        .into_iter()
        .filter(|node| node.ancestors().all(|ancestor| !set.contains(&ancestor)))
        .collect();
    Ok(XdmValue::from_nodes(kept))
}

/// Nodes that have no descendant in the set.
pub fn fn_innermost<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let nodes = args[0].nodes().ok_or_else(|| {
        XPathError::type_error("innermost requires a sequence of nodes")
    })?;
    let set: HashSet<N> = nodes.iter().cloned().collect();
    let kept: Vec<N> = nodes
        .into_iter()
        .filter(|node| node.descendants().all(|descendant| !set.contains(&descendant)))
        .collect();
    Ok(XdmValue::from_nodes(kept))
}

pub fn fn_trace<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let label = optional_string_arg(&args, 1).unwrap_or_default();
    let value = args.remove(0);
    log::info!("trace [{}]: {}", label, value.to_string_value());
    Ok(value)
}

pub fn fn_error<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let code = args
        .first()
        .filter(|v| !v.is_empty())
        .map(XdmValue::to_string_value)
        .unwrap_or_else(|| "FOER0000".to_string());
    let message = string_arg(&args, 1);
    Err(XPathError::Raised { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{SourceNode, XmlNode, XmlTree};

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    fn ints(values: &[i64]) -> V {
        let mut out = V::empty();
        for v in values {
            out.push(XdmItem::Atomic(AtomicValue::Integer(*v)));
        }
        out
    }

    #[test]
    fn subsequence_rounds_and_clamps() {
        let ctx = Ctx::new();
        let out = fn_subsequence(
            vec![ints(&[1, 2, 3, 4, 5]), V::from_double(1.5), V::from_double(2.6)],
            &ctx,
        )
        .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn distinct_values_unifies_numerics_and_keeps_one_nan() {
        let ctx = Ctx::new();
        let mut seq = V::from_integer(1);
        seq.extend(V::from_double(1.0));
        seq.extend(V::from_double(f64::NAN));
        seq.extend(V::from_double(f64::NAN));
        seq.extend(V::from_string("x"));
        let out = fn_distinct_values(vec![seq], &ctx).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn index_of_returns_every_position() {
        let ctx = Ctx::new();
        let out = fn_index_of(vec![ints(&[5, 1, 5]), V::from_integer(5)], &ctx).unwrap();
        let positions: Vec<f64> = out
            .iter()
            .map(|i| i.as_atomic().unwrap().to_double())
            .collect();
        assert_eq!(positions, vec![1.0, 3.0]);
    }

    #[test]
    fn deep_equal_compares_structure() {
        let ctx = Ctx::new();
        let a = XmlTree::parse("<r><a k=\"1\">x</a></r>").unwrap();
        let b = XmlTree::parse("<r><a k=\"1\">x</a></r>").unwrap();
        let c = XmlTree::parse("<r><a k=\"2\">x</a></r>").unwrap();
        let out = fn_deep_equal(
            vec![V::from_node(a.root()), V::from_node(b.root())],
            &ctx,
        )
        .unwrap();
        assert!(out.effective_boolean_value().unwrap());
        let out = fn_deep_equal(
            vec![V::from_node(a.root()), V::from_node(c.root())],
            &ctx,
        )
        .unwrap();
        assert!(!out.effective_boolean_value().unwrap());
    }

    #[test]
    fn innermost_and_outermost_filter_by_ancestry() {
        let ctx = Ctx::new();
        let tree = XmlTree::parse("<r><a><b/></a></r>").unwrap();
        let root = tree.root();
        let all: Vec<XmlNode> = root.descendants_or_self().collect();
        let out = fn_outermost(vec![V::from_nodes(all.clone())], &ctx).unwrap();
        assert_eq!(out.len(), 1);
        let out = fn_innermost(vec![V::from_nodes(all)], &ctx).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn error_carries_its_code() {
        let ctx = Ctx::new();
        let err = fn_error(vec![V::from_string("err:MY001"), V::from_string("boom")], &ctx)
            .unwrap_err();
        assert_eq!(err.code(), "err:MY001");
    }
}
