//! Higher-order functions and the single invocation entry point for
//! function items.
//!
//! Every callable shape funnels through [`invoke_function`]: named
//! references dispatch through the registry, inline items run their body in
//! the captured scope (with an empty tunnel frame), and partials splice
//! bound arguments around the supplied ones.

use std::collections::HashMap;

use stilo_xdm::{ExpandedName, FN_NAMESPACE, SourceNode, XS_NAMESPACE};

use crate::context::EvaluationContext;
use crate::engine::evaluate;
use crate::error::{Result, XPathError};
use crate::functions::{self, ArgType, Table, def, optional_string_arg};
use crate::types::{AtomicValue, XdmFunction, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "for-each", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_for_each);
    def(table, "filter", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_filter);
    def(
        table,
        "fold-left",
        3,
        Some(3),
        &[ArgType::Any, ArgType::Any, ArgType::Any],
        fn_fold_left,
    );
    def(
        table,
        "fold-right",
        3,
        Some(3),
        &[ArgType::Any, ArgType::Any, ArgType::Any],
        fn_fold_right,
    );
    def(
        table,
        "for-each-pair",
        3,
        Some(3),
        &[ArgType::Any, ArgType::Any, ArgType::Any],
        fn_for_each_pair,
    );
    def(table, "sort", 1, Some(3), &[ArgType::Any, ArgType::String, ArgType::Any], fn_sort);
    def(table, "apply", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_apply);
    def(
        table,
        "function-lookup",
        2,
        Some(2),
        &[ArgType::Any, ArgType::Numeric],
        fn_function_lookup,
    );
    def(table, "function-name", 1, Some(1), &[ArgType::Any], fn_function_name);
    def(table, "function-arity", 1, Some(1), &[ArgType::Any], fn_function_arity);
}

/// Invokes any function item with the given arguments.
pub fn invoke_function<N: SourceNode>(
    function: &XdmFunction<N>,
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match function {
        XdmFunction::Named { name, arity } => {
            if args.len() != *arity {
                return Err(XPathError::type_error(format!(
                    "{}#{} called with {} arguments",
                    name, arity, args.len()
                )));
            }
            functions::call_function(name, args, ctx)
        }
        XdmFunction::Inline {
            params,
            body,
            captured,
        } => {
            if args.len() != params.len() {
                return Err(XPathError::type_error(format!(
                    "inline function expects {} arguments, got {}",
                    params.len(),
                    args.len()
                )));
            }
            let mut frame: HashMap<String, XdmValue<N>> = captured.iter().cloned().collect();
            for (param, arg) in params.iter().zip(args) {
                let value = match &param.seq_type {
                    Some(seq_type) => seq_type.coerce(arg, ctx)?,
                    None => arg,
                };
                frame.insert(param.name.clone(), value);
            }
            let scope = ctx.function_scope(frame);
            evaluate(body, &scope)
        }
        XdmFunction::Partial { base, bound } => {
            let mut supplied = args.into_iter();
            let mut full = Vec::with_capacity(bound.len());
            for slot in bound {
                match slot {
                    Some(value) => full.push(value.clone()),
                    None => match supplied.next() {
                        Some(value) => full.push(value),
                        None => {
                            return Err(XPathError::type_error(
                                "partial application called with too few arguments",
                            ));
                        }
                    },
                }
            }
            if supplied.next().is_some() {
                return Err(XPathError::type_error(
                    "partial application called with too many arguments",
                ));
            }
            invoke_function(base, full, ctx)
        }
    }
}

fn function_arg<N: SourceNode>(args: &[XdmValue<N>], index: usize) -> Result<XdmFunction<N>> {
    args.get(index)
        .and_then(XdmValue::first)
        .and_then(XdmItem::as_function)
        .cloned()
        .ok_or_else(|| XPathError::type_error("expected a function item"))
}

pub fn fn_for_each<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let action = function_arg(&args, 1)?;
    let input = args.remove(0);
    let mut out = XdmValue::empty();
    for item in input.into_items() {
        out.extend(invoke_function(
            &action,
            vec![XdmValue::from_item(item)],
            ctx,
        )?);
    }
    Ok(out)
}

pub fn fn_filter<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let test = function_arg(&args, 1)?;
    let input = args.remove(0);
    let mut out = XdmValue::empty();
    for item in input.into_items() {
        let keep = invoke_function(&test, vec![XdmValue::from_item(item.clone())], ctx)?
            .effective_boolean_value()?;
        if keep {
            out.push(item);
        }
    }
    Ok(out)
}

pub fn fn_fold_left<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let action = function_arg(&args, 2)?;
    let zero = args.remove(1);
    let input = args.remove(0);
    let mut accumulator = zero;
    for item in input.into_items() {
        accumulator =
            invoke_function(&action, vec![accumulator, XdmValue::from_item(item)], ctx)?;
    }
    Ok(accumulator)
}

pub fn fn_fold_right<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let action = function_arg(&args, 2)?;
    let zero = args.remove(1);
    let input = args.remove(0);
    let mut accumulator = zero;
    for item in input.into_items().into_iter().rev() {
        accumulator =
            invoke_function(&action, vec![XdmValue::from_item(item), accumulator], ctx)?;
    }
    Ok(accumulator)
}

pub fn fn_for_each_pair<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let action = function_arg(&args, 2)?;
    let second = args.remove(1).into_items();
    let first = args.remove(0).into_items();
    let mut out = XdmValue::empty();
    for (a, b) in first.into_iter().zip(second) {
        out.extend(invoke_function(
            &action,
            vec![XdmValue::from_item(a), XdmValue::from_item(b)],
            ctx,
        )?);
    }
    Ok(out)
}

/// Lexicographic comparison of sort keys under a collation; incomparable
/// pairs fall back to string comparison so the sort stays total.
pub(crate) fn compare_keys(
    a: &[AtomicValue],
    b: &[AtomicValue],
    collation: &stilo_xdm::Collation,
    implicit_tz: i32,
) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.compare(y, collation, implicit_tz).unwrap_or_else(|| {
            collation.compare(&x.to_string_value(), &y.to_string_value())
        });
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Stable sort: equal keys preserve input order.
pub fn fn_sort<N: SourceNode>(
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let key_function = if args.len() > 2 {
        Some(function_arg(&args, 2)?)
    } else {
        None
    };
    let collation = ctx.resolve_collation(optional_string_arg(&args, 1).as_deref())?;
    let input = args.remove(0);

    let mut keyed: Vec<(Vec<AtomicValue>, XdmItem<N>)> = Vec::with_capacity(input.len());
    for item in input.into_items() {
        let key = match &key_function {
            Some(f) => {
                invoke_function(f, vec![XdmValue::from_item(item.clone())], ctx)?.atomized()?
            }
            None => XdmValue::from_item(item.clone()).atomized()?,
        };
        keyed.push((key, item));
    }
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &collation, ctx.implicit_timezone));
    Ok(XdmValue::from_items(
        keyed.into_iter().map(|(_, item)| item).collect(),
    ))
}

pub fn fn_apply<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let function = function_arg(&args, 0)?;
    let array = args[1]
        .first()
        .and_then(XdmItem::as_array)
        .cloned()
        .ok_or_else(|| XPathError::type_error("apply requires an array of arguments"))?;
    invoke_function(&function, array.into_members(), ctx)
}

pub fn fn_function_lookup<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = match args[0].first().and_then(XdmItem::as_atomic) {
        Some(AtomicValue::QName { uri, local, .. }) => ExpandedName {
            uri: uri.clone(),
            local: local.clone(),
        },
        _ => return Err(XPathError::type_error("function-lookup requires xs:QName")),
    };
    let arity = args[1].to_double() as usize;
    let available = match name.uri.as_deref() {
        None | Some(FN_NAMESPACE) => ctx.registry().core_contains(&name.local, arity),
        Some(XS_NAMESPACE) => arity == 1,
        Some(_) => {
            ctx.hooks
                .map(|h| h.user_function_available(&name, arity))
                .unwrap_or(false)
                || ctx.registry().core_contains(&name.local, arity)
        }
    };
    if available {
        Ok(XdmValue::from_item(XdmItem::Function(XdmFunction::named(
            name, arity,
        ))))
    } else {
        Ok(XdmValue::empty())
    }
}

pub fn fn_function_name<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let function = function_arg(&args, 0)?;
    Ok(match function.name() {
        Some(name) => XdmValue::from_atomic(AtomicValue::QName {
            prefix: None,
            uri: name.uri.clone(),
            local: name.local.clone(),
        }),
        None => XdmValue::empty(),
    })
}

pub fn fn_function_arity<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let function = function_arg(&args, 0)?;
    Ok(XdmValue::from_integer(function.arity() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluate;
    use crate::parser::parse_expression;
    use stilo_xdm::XmlNode;

    fn eval(expr: &str) -> XdmValue<XmlNode> {
        evaluate(&parse_expression(expr).unwrap(), &EvaluationContext::new()).unwrap()
    }

    #[test]
    fn fold_left_sums() {
        let out = eval("fold-left((1,2,3,4), 0, function($a,$b){$a+$b})");
        assert_eq!(out.to_double(), 10.0);
    }

    #[test]
    fn fold_left_is_left_associative() {
        let out = eval("fold-left((1,2,3), '', function($a,$b){concat($a, '-', $b)})");
        assert_eq!(out.to_string_value(), "-1-2-3");
        let out = eval("fold-right((1,2,3), '', function($a,$b){concat($b, '-', $a)})");
        assert_eq!(out.to_string_value(), "-3-2-1");
    }

    #[test]
    fn for_each_and_filter() {
        assert_eq!(eval("for-each((1,2,3), function($x){$x*2})").len(), 3);
        assert_eq!(eval("filter((1,2,3,4), function($x){$x mod 2 = 0})").len(), 2);
    }

    #[test]
    fn for_each_pair_stops_at_shorter() {
        let out = eval("for-each-pair((1,2,3), ('a','b'), function($x,$y){concat($y,$x)})");
        assert_eq!(out.len(), 2);
        assert_eq!(out.to_string_value(), "a1");
    }

    #[test]
    fn sort_is_stable() {
        let out = eval("sort((3,1,2))");
        assert_eq!(out.to_string_value(), "1");
        // equal keys keep their input order
        let out = eval(
            "string-join(sort(('b1','a1','b2','a2'), (), function($s){substring($s, 1, 1)}), ',')",
        );
        assert_eq!(out.to_string_value(), "a1,a2,b1,b2");
    }

    #[test]
    fn sort_by_key_function() {
        let out = eval("string-join(sort(('ccc','a','bb'), (), function($s){string-length($s)}), ',')");
        assert_eq!(out.to_string_value(), "a,bb,ccc");
    }

    #[test]
    fn named_function_reference_invocation() {
        let out = eval("fn:string-join#2(('a','b'), '-')");
        assert_eq!(out.to_string_value(), "a-b");
        let out = eval("for-each(('a','bb'), string-length#1)");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn apply_spreads_array_arguments() {
        let out = eval("apply(concat#3, ['a', 'b', 'c'])");
        assert_eq!(out.to_string_value(), "abc");
    }

    #[test]
    fn function_lookup_finds_core_functions() {
        let out = eval("function-lookup(xs:QName('fn:not'), 1)(true())");
        assert!(!out.effective_boolean_value().unwrap());
        assert!(eval("empty(function-lookup(xs:QName('fn:no-such'), 3))")
            .effective_boolean_value()
            .unwrap());
    }

    #[test]
    fn function_name_and_arity() {
        assert_eq!(eval("function-arity(concat#4)").to_double(), 4.0);
        assert_eq!(
            eval("local-name-from-QName(function-name(substring#2))").to_string_value(),
            "substring"
        );
        assert!(eval("empty(function-name(function($x){$x}))")
            .effective_boolean_value()
            .unwrap());
    }
}
