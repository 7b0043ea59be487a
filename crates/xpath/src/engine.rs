//! The tree-walking evaluator.
//!
//! [`evaluate`] walks an [`Expression`] to completion under an
//! [`EvaluationContext`]; there is no suspension inside expression
//! evaluation. Path steps produce nodes in document order with identity
//! deduplication; predicates see a focus of (candidate, position-in-axis,
//! axis-size), with reverse axes numbering positions in reverse document
//! order.

use stilo_xdm::{Axis, NodeKind, SourceNode};

use crate::ast::*;
use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{self, hof};
use crate::operators;
use crate::types::cast::cast_atomic;
use crate::types::{
    AtomicValue, XdmArray, XdmFunction, XdmItem, XdmMap, XdmValue, sort_dedup_nodes,
};

pub fn evaluate<N: SourceNode>(
    expr: &Expression,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match expr {
        Expression::Literal(lit) => Ok(XdmValue::from_atomic(match lit {
            Literal::Integer(i) => AtomicValue::Integer(*i),
            Literal::Decimal(d) => AtomicValue::Decimal(*d),
            Literal::Double(d) => AtomicValue::Double(*d),
            Literal::String(s) => AtomicValue::String(s.clone()),
        })),

        Expression::VarRef(name) => ctx
            .variable(name)
            .cloned()
            .ok_or_else(|| XPathError::UnknownVariable { name: name.clone() }),

        Expression::ContextItem => match &ctx.item {
            Some(item) => Ok(XdmValue::from_item(item.clone())),
            None => Err(XPathError::NoContextItem),
        },

        Expression::Sequence(exprs) => {
            let mut out = XdmValue::empty();
            for e in exprs {
                out.extend(evaluate(e, ctx)?);
            }
            Ok(out)
        }

        Expression::Range { from, to } => evaluate_range(from, to, ctx),

        Expression::Binary { op, left, right } => match op {
            BinaryOp::Or => {
                if evaluate(left, ctx)?.effective_boolean_value()? {
                    return Ok(XdmValue::from_boolean(true));
                }
                Ok(XdmValue::from_boolean(
                    evaluate(right, ctx)?.effective_boolean_value()?,
                ))
            }
            BinaryOp::And => {
                if !evaluate(left, ctx)?.effective_boolean_value()? {
                    return Ok(XdmValue::from_boolean(false));
                }
                Ok(XdmValue::from_boolean(
                    evaluate(right, ctx)?.effective_boolean_value()?,
                ))
            }
            _ => {
                let l = evaluate(left, ctx)?;
                let r = evaluate(right, ctx)?;
                operators::evaluate_binary(*op, l, r, ctx)
            }
        },

        Expression::Unary { op, expr } => evaluate_unary(*op, expr, ctx),

        Expression::StringConcat { left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(XdmValue::from_string(format!(
                "{}{}",
                l.to_string_value(),
                r.to_string_value()
            )))
        }

        Expression::SimpleMap { left, right } => {
            let input = evaluate(left, ctx)?;
            let size = input.len();
            let mut out = XdmValue::empty();
            for (index, item) in input.into_items().into_iter().enumerate() {
                let inner = ctx.with_focus(item, index + 1, size);
                out.extend(evaluate(right, &inner)?);
            }
            Ok(out)
        }

        Expression::Path { start, steps } => evaluate_path(start, steps, ctx),

        Expression::Filter {
            primary,
            predicates,
        } => {
            let input = evaluate(primary, ctx)?;
            apply_predicates_to_sequence(input, predicates, ctx)
        }

        Expression::Let { bindings, body } => {
            let mut scope = ctx.clone();
            for (name, bound) in bindings {
                let value = evaluate(bound, &scope)?;
                scope = scope.bind_variable(name.clone(), value);
            }
            evaluate(body, &scope)
        }

        Expression::For { bindings, body } => {
            let mut out = XdmValue::empty();
            evaluate_for(bindings, body, ctx, &mut out)?;
            Ok(out)
        }

        Expression::If {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, ctx)?.effective_boolean_value()? {
                evaluate(then_branch, ctx)
            } else {
                evaluate(else_branch, ctx)
            }
        }

        Expression::Quantified {
            quantifier,
            bindings,
            satisfies,
        } => evaluate_quantified(*quantifier, bindings, satisfies, ctx),

        Expression::FunctionCall { name, args } => {
            if args.iter().any(|a| matches!(a, Arg::Placeholder)) {
                return build_partial(
                    XdmFunction::named(name.clone(), args.len()),
                    args,
                    ctx,
                );
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                match arg {
                    Arg::Value(e) => values.push(evaluate(e, ctx)?),
                    Arg::Placeholder => unreachable!("checked above"),
                }
            }
            functions::call_function(name, values, ctx)
        }

        Expression::NamedFunctionRef { name, arity } => Ok(XdmValue::from_item(
            XdmItem::Function(XdmFunction::named(name.clone(), *arity)),
        )),

        Expression::InlineFunction { params, body } => Ok(XdmValue::from_item(
            XdmItem::Function(XdmFunction::inline(
                params.clone(),
                (**body).clone(),
                ctx.visible_variables(),
            )),
        )),

        Expression::DynamicCall { target, args } => {
            let callee = evaluate(target, ctx)?;
            evaluate_dynamic_call(&callee, args, ctx)
        }

        Expression::MapConstructor(entries) => {
            let mut map = XdmMap::new();
            for (key_expr, value_expr) in entries {
                let key = singleton_atomic(evaluate(key_expr, ctx)?)?;
                let value = evaluate(value_expr, ctx)?;
                if map.contains(&key) {
                    return Err(XPathError::dynamic(
                        "XQDY0137",
                        format!("duplicate map key '{}'", key.to_string_value()),
                    ));
                }
                map.put(key, value)?;
            }
            Ok(XdmValue::from_item(XdmItem::Map(map)))
        }

        Expression::SquareArray(members) => {
            let mut out = Vec::with_capacity(members.len());
            for member in members {
                out.push(evaluate(member, ctx)?);
            }
            Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(out))))
        }

        Expression::CurlyArray(inner) => {
            let value = evaluate(inner, ctx)?;
            let members = value
                .into_items()
                .into_iter()
                .map(XdmValue::from_item)
                .collect();
            Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
        }

        Expression::Lookup { target, key } => {
            let base = evaluate(target, ctx)?;
            evaluate_lookup(&base, key, ctx)
        }

        Expression::UnaryLookup(key) => {
            let base = match &ctx.item {
                Some(item) => XdmValue::from_item(item.clone()),
                None => return Err(XPathError::NoContextItem),
            };
            evaluate_lookup(&base, key, ctx)
        }

        Expression::InstanceOf { expr, seq_type } => {
            let value = evaluate(expr, ctx)?;
            Ok(XdmValue::from_boolean(seq_type.matches(&value)))
        }

        Expression::TreatAs { expr, seq_type } => {
            let value = evaluate(expr, ctx)?;
            if seq_type.matches(&value) {
                Ok(value)
            } else {
                Err(XPathError::dynamic(
                    "XPDY0050",
                    format!("value does not match treat type {}", seq_type),
                ))
            }
        }

        Expression::CastAs {
            expr,
            target,
            optional,
        } => {
            let atomics = evaluate(expr, ctx)?.atomized()?;
            match atomics.len() {
                0 if *optional => Ok(XdmValue::empty()),
                1 => Ok(XdmValue::from_atomic(cast_atomic(
                    &atomics[0],
                    *target,
                    Some(ctx.namespaces()),
                )?)),
                n => Err(XPathError::Cardinality {
                    expected: "exactly one atomic value".to_string(),
                    actual: n,
                }),
            }
        }

        Expression::CastableAs {
            expr,
            target,
            optional,
        } => {
            let atomics = evaluate(expr, ctx)?.atomized()?;
            let ok = match atomics.len() {
                0 => *optional,
                1 => cast_atomic(&atomics[0], *target, Some(ctx.namespaces())).is_ok(),
                _ => false,
            };
            Ok(XdmValue::from_boolean(ok))
        }
    }
}

fn singleton_atomic<N: SourceNode>(value: XdmValue<N>) -> Result<AtomicValue> {
    let mut atomics = value.atomized()?;
    if atomics.len() != 1 {
        return Err(XPathError::Cardinality {
            expected: "exactly one atomic value".to_string(),
            actual: atomics.len(),
        });
    }
    Ok(atomics.remove(0))
}

fn evaluate_range<N: SourceNode>(
    from: &Expression,
    to: &Expression,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let low = evaluate(from, ctx)?;
    let high = evaluate(to, ctx)?;
    if low.is_empty() || high.is_empty() {
        return Ok(XdmValue::empty());
    }
    let low = singleton_atomic(low)?.to_double();
    let high = singleton_atomic(high)?.to_double();
    if low.is_nan() || high.is_nan() {
        return Err(XPathError::type_error("range bounds must be numeric"));
    }
    let (low, high) = (low as i64, high as i64);
    let mut out = XdmValue::empty();
    for i in low..=high {
        out.push(XdmItem::Atomic(AtomicValue::Integer(i)));
    }
    Ok(out)
}

fn evaluate_unary<N: SourceNode>(
    op: UnaryOp,
    expr: &Expression,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let atomics = evaluate(expr, ctx)?.atomized()?;
    if atomics.is_empty() {
        return Ok(XdmValue::empty());
    }
    if atomics.len() > 1 {
        return Err(XPathError::type_error("unary operator requires a singleton"));
    }
    let value = &atomics[0];
    let negated = match (op, value) {
        (UnaryOp::Plus, AtomicValue::Integer(_))
        | (UnaryOp::Plus, AtomicValue::Decimal(_))
        | (UnaryOp::Plus, AtomicValue::Double(_)) => value.clone(),
        (UnaryOp::Minus, AtomicValue::Integer(i)) => AtomicValue::Integer(-i),
        (UnaryOp::Minus, AtomicValue::Decimal(d)) => AtomicValue::Decimal(-d),
        (UnaryOp::Minus, AtomicValue::Double(d)) => AtomicValue::Double(-d),
        _ => {
            let d = value.to_double();
            AtomicValue::Double(if op == UnaryOp::Minus { -d } else { d })
        }
    };
    Ok(XdmValue::from_atomic(negated))
}

fn evaluate_for<N: SourceNode>(
    bindings: &[(String, Expression)],
    body: &Expression,
    ctx: &EvaluationContext<'_, N>,
    out: &mut XdmValue<N>,
) -> Result<()> {
    match bindings.split_first() {
        None => {
            out.extend(evaluate(body, ctx)?);
            Ok(())
        }
        Some(((name, source), rest)) => {
            let items = evaluate(source, ctx)?;
            for item in items.into_items() {
                let inner = ctx.bind_variable(name.clone(), XdmValue::from_item(item));
                evaluate_for(rest, body, &inner, out)?;
            }
            Ok(())
        }
    }
}

fn evaluate_quantified<N: SourceNode>(
    quantifier: Quantifier,
    bindings: &[(String, Expression)],
    satisfies: &Expression,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    fn walk<N: SourceNode>(
        quantifier: Quantifier,
        bindings: &[(String, Expression)],
        satisfies: &Expression,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<bool> {
        match bindings.split_first() {
            None => evaluate(satisfies, ctx)?.effective_boolean_value(),
            Some(((name, source), rest)) => {
                let items = evaluate(source, ctx)?;
                for item in items.into_items() {
                    let inner = ctx.bind_variable(name.clone(), XdmValue::from_item(item));
                    let inner_result = walk(quantifier, rest, satisfies, &inner)?;
                    match quantifier {
                        Quantifier::Some if inner_result => return Ok(true),
                        Quantifier::Every if !inner_result => return Ok(false),
                        _ => {}
                    }
                }
                Ok(quantifier == Quantifier::Every)
            }
        }
    }
    walk(quantifier, bindings, satisfies, ctx).map(XdmValue::from_boolean)
}

fn build_partial<N: SourceNode>(
    base: XdmFunction<N>,
    args: &[Arg],
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut bound = Vec::with_capacity(args.len());
    for arg in args {
        bound.push(match arg {
            Arg::Placeholder => None,
            Arg::Value(e) => Some(evaluate(e, ctx)?),
        });
    }
    Ok(XdmValue::from_item(XdmItem::Function(
        XdmFunction::Partial {
            base: Box::new(base),
            bound,
        },
    )))
}

fn evaluate_dynamic_call<N: SourceNode>(
    callee: &XdmValue<N>,
    args: &[Arg],
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if callee.len() != 1 {
        return Err(XPathError::type_error(
            "dynamic call target must be a single item",
        ));
    }
    match callee.first().unwrap() {
        XdmItem::Function(f) => {
            if args.iter().any(|a| matches!(a, Arg::Placeholder)) {
                return build_partial(f.clone(), args, ctx);
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                if let Arg::Value(e) = arg {
                    values.push(evaluate(e, ctx)?);
                }
            }
            hof::invoke_function(f, values, ctx)
        }
        XdmItem::Map(map) => {
            let key = single_call_arg(args, ctx)?;
            Ok(map.get(&key).cloned().unwrap_or_else(XdmValue::empty))
        }
        XdmItem::Array(array) => {
            let key = single_call_arg(args, ctx)?;
            match key {
                AtomicValue::Integer(i) => array.get(i).map(XdmValue::clone),
                other => Err(XPathError::type_mismatch(
                    "array index must be an integer",
                    "xs:integer",
                    other.type_name(),
                )),
            }
        }
        other => Err(XPathError::type_mismatch(
            "dynamic call requires a function, map, or array",
            "function(*)",
            other.type_name(),
        )),
    }
}

fn single_call_arg<N: SourceNode>(
    args: &[Arg],
    ctx: &EvaluationContext<'_, N>,
) -> Result<AtomicValue> {
    match args {
        [Arg::Value(e)] => singleton_atomic(evaluate(e, ctx)?),
        _ => Err(XPathError::type_error(
            "map and array calls take exactly one argument",
        )),
    }
}

fn evaluate_lookup<N: SourceNode>(
    base: &XdmValue<N>,
    key: &LookupKey,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut out = XdmValue::empty();
    for item in base.iter() {
        match item {
            XdmItem::Map(map) => match key {
                LookupKey::Wildcard => {
                    for (_, value) in map.entries() {
                        out.extend(value.clone());
                    }
                }
                _ => {
                    let key = lookup_key_atomic(key, ctx)?;
                    if let Some(value) = map.get(&key) {
                        out.extend(value.clone());
                    }
                }
            },
            XdmItem::Array(array) => match key {
                LookupKey::Wildcard => {
                    for member in array.members() {
                        out.extend(member.clone());
                    }
                }
                _ => match lookup_key_atomic(key, ctx)? {
                    AtomicValue::Integer(i) => out.extend(array.get(i)?.clone()),
                    other => {
                        return Err(XPathError::type_mismatch(
                            "array lookup requires an integer",
                            "xs:integer",
                            other.type_name(),
                        ));
                    }
                },
            },
            other => {
                return Err(XPathError::type_mismatch(
                    "lookup requires a map or array",
                    "map(*) or array(*)",
                    other.type_name(),
                ));
            }
        }
    }
    Ok(out)
}

fn lookup_key_atomic<N: SourceNode>(
    key: &LookupKey,
    ctx: &EvaluationContext<'_, N>,
) -> Result<AtomicValue> {
    match key {
        LookupKey::Name(name) => Ok(AtomicValue::String(name.clone())),
        LookupKey::Integer(i) => Ok(AtomicValue::Integer(*i)),
        LookupKey::Expr(e) => singleton_atomic(evaluate(e, ctx)?),
        LookupKey::Wildcard => unreachable!("wildcard handled by the caller"),
    }
}

// --- paths --------------------------------------------------------------

fn evaluate_path<N: SourceNode>(
    start: &PathStart,
    steps: &[Step],
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut current: Vec<N> = match start {
        PathStart::Root => {
            let root = ctx.context_node()?.root();
            if root.node_kind() != NodeKind::Document {
                return Err(XPathError::dynamic(
                    "XPDY0050",
                    "the context node is not in a document tree",
                ));
            }
            vec![root]
        }
        PathStart::Context => match &ctx.item {
            Some(XdmItem::Node(n)) => vec![n.clone()],
            Some(_) => return Err(XPathError::PathOnNonNode),
            None => return Err(XPathError::NoContextItem),
        },
        PathStart::Source(expr) => {
            let value = evaluate(expr, ctx)?;
            if steps.is_empty() {
                return Ok(value);
            }
            value.nodes().ok_or(XPathError::PathOnNonNode)?
        }
    };

    if steps.is_empty() {
        return Ok(XdmValue::from_nodes(current));
    }

    for step in steps {
        let mut produced: Vec<N> = Vec::new();
        for origin in &current {
            let candidates: Vec<N> = origin
                .axis(step.axis)
                .filter(|node| test_matches(&step.test, node, step.axis))
                .collect();
            let selected = apply_step_predicates(candidates, &step.predicates, ctx)?;
            produced.extend(selected);
        }
        current = sort_dedup_nodes(produced);
    }
    Ok(XdmValue::from_nodes(current))
}

/// The principal node kind of an axis decides what a bare name test selects.
fn principal_kind(axis: Axis) -> NodeKind {
    match axis {
        Axis::Attribute => NodeKind::Attribute,
        Axis::Namespace => NodeKind::Namespace,
        _ => NodeKind::Element,
    }
}

pub fn test_matches<N: SourceNode>(test: &NodeTest, node: &N, axis: Axis) -> bool {
    match test {
        NodeTest::Name(name_test) => {
            node.node_kind() == principal_kind(axis)
                && name_test.matches(node.expanded_name().as_ref())
        }
        NodeTest::Kind(kind) => kind_test_matches(kind, node),
    }
}

pub fn kind_test_matches<N: SourceNode>(kind: &KindTest, node: &N) -> bool {
    match kind {
        KindTest::AnyKind => true,
        KindTest::Text => node.node_kind() == NodeKind::Text,
        KindTest::Comment => node.node_kind() == NodeKind::Comment,
        KindTest::NamespaceNode => node.node_kind() == NodeKind::Namespace,
        KindTest::Document => node.node_kind() == NodeKind::Document,
        KindTest::ProcessingInstruction(target) => {
            node.node_kind() == NodeKind::ProcessingInstruction
                && target
                    .as_ref()
                    .map(|t| node.name().map(|q| q.local == *t).unwrap_or(false))
                    .unwrap_or(true)
        }
        KindTest::Element(name_test) => {
            node.node_kind() == NodeKind::Element
                && name_test
                    .as_ref()
                    .map(|t| t.matches(node.expanded_name().as_ref()))
                    .unwrap_or(true)
        }
        KindTest::Attribute(name_test) => {
            node.node_kind() == NodeKind::Attribute
                && name_test
                    .as_ref()
                    .map(|t| t.matches(node.expanded_name().as_ref()))
                    .unwrap_or(true)
        }
    }
}

fn apply_step_predicates<N: SourceNode>(
    candidates: Vec<N>,
    predicates: &[Expression],
    ctx: &EvaluationContext<'_, N>,
) -> Result<Vec<N>> {
    let mut current = candidates;
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in current.into_iter().enumerate() {
            let focus = ctx.with_focus(XdmItem::Node(node.clone()), index + 1, size);
            if predicate_holds(predicate, index + 1, &focus)? {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}

fn apply_predicates_to_sequence<N: SourceNode>(
    input: XdmValue<N>,
    predicates: &[Expression],
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut current = input.into_items();
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::with_capacity(size);
        for (index, item) in current.into_iter().enumerate() {
            let focus = ctx.with_focus(item.clone(), index + 1, size);
            if predicate_holds(predicate, index + 1, &focus)? {
                kept.push(item);
            }
        }
        current = kept;
    }
    Ok(XdmValue::from_items(current))
}

/// A numeric predicate is a position test; anything else is an EBV test.
fn predicate_holds<N: SourceNode>(
    predicate: &Expression,
    position: usize,
    focus: &EvaluationContext<'_, N>,
) -> Result<bool> {
    let value = evaluate(predicate, focus)?;
    if value.len() == 1 {
        if let Some(atomic) = value.first().and_then(XdmItem::as_atomic) {
            if atomic.is_numeric() {
                return Ok(atomic.to_double() == position as f64);
            }
        }
    }
    value.effective_boolean_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use stilo_xdm::{XmlNode, XmlTree};

    fn eval_str(expr: &str) -> XdmValue<XmlNode> {
        let parsed = parse_expression(expr).unwrap();
        evaluate(&parsed, &EvaluationContext::new()).unwrap()
    }

    fn eval_doc(xml: &str, expr: &str) -> XdmValue<XmlNode> {
        let tree = XmlTree::parse(xml).unwrap();
        let ctx = EvaluationContext::new().with_context_node(tree.root());
        let parsed = parse_expression(expr).unwrap();
        evaluate(&parsed, &ctx).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_str("1 + 2 * 3").to_double(), 7.0);
        assert_eq!(eval_str("(1 + 2) * 3").to_double(), 9.0);
        assert_eq!(eval_str("10 idiv 3").to_double(), 3.0);
        assert_eq!(eval_str("7 mod 3").to_double(), 1.0);
    }

    #[test]
    fn range_and_sequences() {
        assert_eq!(eval_str("1 to 4").len(), 4);
        assert_eq!(eval_str("(1, 2, (3, 4))").len(), 4);
        assert!(eval_str("2 to 1").is_empty());
    }

    #[test]
    fn let_for_if_quantified() {
        assert_eq!(eval_str("let $x := 5 return $x * 2").to_double(), 10.0);
        assert_eq!(
            eval_str("for $x in 1 to 3 return $x * $x").len(),
            3
        );
        assert_eq!(eval_str("if (1 = 1) then 'y' else 'n'").to_string_value(), "y");
        assert!(
            eval_str("some $x in (1, 2, 3) satisfies $x > 2")
                .effective_boolean_value()
                .unwrap()
        );
        assert!(
            !eval_str("every $x in (1, 2, 3) satisfies $x > 2")
                .effective_boolean_value()
                .unwrap()
        );
    }

    #[test]
    fn paths_select_in_document_order() {
        let out = eval_doc(
            "<doc><a><b>1</b></a><b>2</b><a><b>3</b></a></doc>",
            "//b",
        );
        let texts: Vec<String> = out.iter().map(XdmItem::string_value).collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }

    #[test]
    fn predicates_use_axis_position() {
        let out = eval_doc("<doc><i>a</i><i>b</i><i>c</i></doc>", "/doc/i[2]");
        assert_eq!(out.to_string_value(), "b");
        let out = eval_doc("<doc><i>a</i><i>b</i><i>c</i></doc>", "/doc/i[last()]");
        assert_eq!(out.to_string_value(), "c");
    }

    #[test]
    fn reverse_axis_positions_count_backwards() {
        let out = eval_doc(
            "<doc><i>a</i><i>b</i><mark/><i>c</i></doc>",
            "/doc/mark/preceding-sibling::i[1]",
        );
        assert_eq!(out.to_string_value(), "b");
    }

    #[test]
    fn attribute_axis_and_name_tests() {
        let out = eval_doc(r#"<doc a="1" b="2"/>"#, "/doc/@b");
        assert_eq!(out.to_string_value(), "2");
        let out = eval_doc(r#"<doc a="1" b="2"/>"#, "count(/doc/@*)");
        assert_eq!(out.to_double(), 2.0);
    }

    #[test]
    fn filter_on_non_path_primary() {
        assert_eq!(eval_str("(10, 20, 30)[2]").to_double(), 20.0);
        assert_eq!(eval_str("(10, 20, 30)[. > 15]").len(), 2);
    }

    #[test]
    fn inline_function_captures_its_scope() {
        let out = eval_str("let $n := 10 return function($x) { $x + $n }(5)");
        assert_eq!(out.to_double(), 15.0);
    }

    #[test]
    fn partial_application_with_placeholder() {
        let out = eval_str("let $add := function($a, $b) { $a + $b } return $add(1, ?)(41)");
        assert_eq!(out.to_double(), 42.0);
    }

    #[test]
    fn maps_and_arrays() {
        assert_eq!(
            eval_str("map { 'a': 1, 'b': 2 }?b").to_double(),
            2.0
        );
        assert_eq!(eval_str("[ 1, 2, 3 ](2)").to_double(), 2.0);
        assert_eq!(eval_str("array { 1 to 3 }(3)").to_double(), 3.0);
        assert_eq!(eval_str("map { 'k': (1, 2) }?k").len(), 2);
    }

    #[test]
    fn instance_of_and_cast() {
        assert!(
            eval_str("5 instance of xs:integer")
                .effective_boolean_value()
                .unwrap()
        );
        assert!(
            !eval_str("'x' instance of xs:integer")
                .effective_boolean_value()
                .unwrap()
        );
        assert_eq!(eval_str("'42' cast as xs:integer").to_double(), 42.0);
        assert!(
            eval_str("'nope' castable as xs:integer")
                .effective_boolean_value()
                .unwrap()
                == false
        );
    }

    #[test]
    fn general_vs_value_comparison() {
        assert!(
            eval_str("(1, 2, 3) = 2")
                .effective_boolean_value()
                .unwrap()
        );
        assert!(
            evaluate(
                &parse_expression("(1, 2) eq 2").unwrap(),
                &EvaluationContext::<XmlNode>::new()
            )
            .is_err()
        );
    }

    #[test]
    fn simple_map_operator() {
        let out = eval_str("(1, 2, 3) ! (. * 10)");
        let values: Vec<f64> = out
            .iter()
            .map(|i| i.as_atomic().unwrap().to_double())
            .collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn union_intersect_except_on_paths() {
        let xml = "<doc><a/><b/><c/></doc>";
        assert_eq!(eval_doc(xml, "count(/doc/a | /doc/b)").to_double(), 2.0);
        assert_eq!(eval_doc(xml, "count(/doc/* intersect /doc/b)").to_double(), 1.0);
        assert_eq!(eval_doc(xml, "count(/doc/* except /doc/b)").to_double(), 2.0);
    }
}
