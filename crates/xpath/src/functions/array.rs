//! The `array:` function table.

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::hof::{compare_keys, invoke_function};
use crate::functions::{ArgType, Table, def, double_arg, optional_string_arg};
use crate::types::{AtomicValue, XdmArray, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "size", 1, Some(1), &[ArgType::Any], fn_size);
    def(table, "get", 2, Some(2), &[ArgType::Any, ArgType::Numeric], fn_get);
    def(table, "put", 3, Some(3), &[ArgType::Any, ArgType::Numeric, ArgType::Any], fn_put);
    def(table, "append", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_append);
    def(
        table,
        "subarray",
        2,
        Some(3),
        &[ArgType::Any, ArgType::Numeric, ArgType::Numeric],
        fn_subarray,
    );
    def(table, "remove", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_remove);
    def(
        table,
        "insert-before",
        3,
        Some(3),
        &[ArgType::Any, ArgType::Numeric, ArgType::Any],
        fn_insert_before,
    );
    def(table, "head", 1, Some(1), &[ArgType::Any], fn_head);
    def(table, "tail", 1, Some(1), &[ArgType::Any], fn_tail);
    def(table, "reverse", 1, Some(1), &[ArgType::Any], fn_reverse);
    def(table, "join", 1, Some(1), &[ArgType::Any], fn_join);
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
    def(table, "flatten", 1, Some(1), &[ArgType::Any], fn_flatten);
    def(table, "sort", 1, Some(3), &[ArgType::Any, ArgType::String, ArgType::Any], fn_sort);
}

fn array_arg<N: SourceNode>(args: &[XdmValue<N>], index: usize) -> Result<XdmArray<N>> {
    args.get(index)
        .and_then(XdmValue::first)
        .and_then(XdmItem::as_array)
        .cloned()
        .ok_or_else(|| XPathError::type_error("expected an array"))
}

fn function_arg<N: SourceNode>(
    args: &[XdmValue<N>],
    index: usize,
) -> Result<crate::types::XdmFunction<N>> {
    args.get(index)
        .and_then(XdmValue::first)
        .and_then(XdmItem::as_function)
        .cloned()
        .ok_or_else(|| XPathError::type_error("expected a function item"))
}

pub fn fn_size<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_integer(array_arg(&args, 0)?.size() as i64))
}

pub fn fn_get<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    array_arg(&args, 0)?
        .get(double_arg(&args, 1) as i64)
        .map(XdmValue::clone)
}

pub fn fn_put<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let updated = array_arg(&args, 0)?.put(double_arg(&args, 1) as i64, args[2].clone())?;
    Ok(XdmValue::from_item(XdmItem::Array(updated)))
}

pub fn fn_append<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let mut members = array.into_members();
    members.push(args[1].clone());
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_subarray<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let start = double_arg(&args, 1) as i64;
    let length = if args.len() > 2 {
        double_arg(&args, 2) as i64
    } else {
        array.size() as i64 - start + 1
    };
    if start < 1 || length < 0 || start + length - 1 > array.size() as i64 {
        return Err(XPathError::ArrayIndexOutOfBounds {
            index: start,
            size: array.size(),
        });
    }
    let members = array.members()[(start - 1) as usize..(start - 1 + length) as usize].to_vec();
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_remove<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let mut positions = Vec::new();
    for atomic in args[1].atomized()? {
        let p = atomic.to_double() as i64;
        if p < 1 || p > array.size() as i64 {
            return Err(XPathError::ArrayIndexOutOfBounds {
                index: p,
                size: array.size(),
            });
        }
        positions.push(p as usize);
    }
    let members = array
        .into_members()
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !positions.contains(&(index + 1)))
        .map(|(_, member)| member)
        .collect();
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_insert_before<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let position = double_arg(&args, 1) as i64;
    if position < 1 || position > array.size() as i64 + 1 {
        return Err(XPathError::ArrayIndexOutOfBounds {
            index: position,
            size: array.size(),
        });
    }
    let mut members = array.into_members();
    members.insert((position - 1) as usize, args[2].clone());
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_head<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    array_arg(&args, 0)?.get(1).map(XdmValue::clone)
}

pub fn fn_tail<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    if array.size() == 0 {
        return Err(XPathError::ArrayIndexOutOfBounds { index: 1, size: 0 });
    }
    let members = array.into_members().into_iter().skip(1).collect();
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_reverse<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut members = array_arg(&args, 0)?.into_members();
    members.reverse();
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_join<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut members = Vec::new();
    for item in args[0].iter() {
        let array = item
            .as_array()
            .ok_or_else(|| XPathError::type_error("array:join requires arrays"))?;
        members.extend(array.members().to_vec());
    }
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_for_each<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let action = function_arg(&args, 1)?;
    let mut members = Vec::with_capacity(array.size());
    for member in array.members() {
        members.push(invoke_function(&action, vec![member.clone()], ctx)?);
    }
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_filter<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let test = function_arg(&args, 1)?;
    let mut members = Vec::new();
    for member in array.members() {
        if invoke_function(&test, vec![member.clone()], ctx)?.effective_boolean_value()? {
            members.push(member.clone());
        }
    }
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

pub fn fn_fold_left<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let action = function_arg(&args, 2)?;
    let mut accumulator = args[1].clone();
    for member in array.members() {
        accumulator = invoke_function(&action, vec![accumulator, member.clone()], ctx)?;
    }
    Ok(accumulator)
}

pub fn fn_fold_right<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let action = function_arg(&args, 2)?;
    let mut accumulator = args[1].clone();
    for member in array.members().iter().rev() {
        accumulator = invoke_function(&action, vec![member.clone(), accumulator], ctx)?;
    }
    Ok(accumulator)
}

pub fn fn_for_each_pair<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let first = array_arg(&args, 0)?;
    let second = array_arg(&args, 1)?;
    let action = function_arg(&args, 2)?;
    let mut members = Vec::new();
    for (a, b) in first.members().iter().zip(second.members()) {
        members.push(invoke_function(&action, vec![a.clone(), b.clone()], ctx)?);
    }
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(members))))
}

/// Flattens arrays recursively into one sequence.
pub fn fn_flatten<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    fn walk<N: SourceNode>(value: &XdmValue<N>, out: &mut XdmValue<N>) {
        for item in value.iter() {
            match item {
                XdmItem::Array(array) => {
                    for member in array.members() {
                        walk(member, out);
                    }
                }
                other => out.push(other.clone()),
            }
        }
    }
    let mut out = XdmValue::empty();
    walk(&args[0], &mut out);
    Ok(out)
}

pub fn fn_sort<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let array = array_arg(&args, 0)?;
    let collation = ctx.resolve_collation(optional_string_arg(&args, 1).as_deref())?;
    let key_function = if args.len() > 2 {
        Some(function_arg(&args, 2)?)
    } else {
        None
    };
    let mut keyed: Vec<(Vec<AtomicValue>, XdmValue<N>)> = Vec::with_capacity(array.size());
    for member in array.members() {
        let key = match &key_function {
            Some(f) => invoke_function(f, vec![member.clone()], ctx)?.atomized()?,
            None => member.atomized()?,
        };
        keyed.push((key, member.clone()));
    }
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &collation, ctx.implicit_timezone));
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(
        keyed.into_iter().map(|(_, member)| member).collect(),
    ))))
}

#[cfg(test)]
mod tests {
    use crate::engine::evaluate;
    use crate::parser::parse_expression;
    use crate::types::XdmValue;
    use stilo_xdm::XmlNode;

    fn eval(expr: &str) -> XdmValue<XmlNode> {
        evaluate(
            &parse_expression(expr).unwrap(),
            &crate::context::EvaluationContext::new(),
        )
        .unwrap()
    }

    #[test]
    fn basic_array_operations() {
        assert_eq!(eval("array:size([1, 2, 3])").to_double(), 3.0);
        assert_eq!(eval("array:get([1, 2, 3], 2)").to_double(), 2.0);
        assert_eq!(eval("array:get(array:append([1], 9), 2)").to_double(), 9.0);
        assert_eq!(
            eval("array:size(array:remove([1, 2, 3], 2))").to_double(),
            2.0
        );
        assert_eq!(
            eval("array:get(array:reverse([1, 2, 3]), 1)").to_double(),
            3.0
        );
    }

    #[test]
    fn flatten_recurses_into_members() {
        assert_eq!(eval("count(array:flatten([[1, [2, 3]], 4]))").to_double(), 4.0);
    }

    #[test]
    fn arrays_are_single_items_in_sequences() {
        assert_eq!(eval("count(([1,2,3], [4,5]))").to_double(), 2.0);
    }

    #[test]
    fn array_sort_and_fold() {
        assert_eq!(
            eval("array:get(array:sort([3, 1, 2]), 1)").to_double(),
            1.0
        );
        assert_eq!(
            eval("array:fold-left([1, 2, 3], 0, function($a, $b){$a + $b})").to_double(),
            6.0
        );
    }
}
