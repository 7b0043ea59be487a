//! The `map:` function table.

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::hof::invoke_function;
use crate::functions::{ArgType, Table, atomic_arg, def};
use crate::types::{XdmArray, XdmItem, XdmMap, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "merge", 1, Some(2), &[ArgType::Any, ArgType::Any], fn_merge);
    def(table, "size", 1, Some(1), &[ArgType::Any], fn_size);
    def(table, "keys", 1, Some(1), &[ArgType::Any], fn_keys);
    def(table, "contains", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_contains);
    def(table, "get", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_get);
    def(table, "find", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_find);
    def(table, "put", 3, Some(3), &[ArgType::Any, ArgType::Any, ArgType::Any], fn_put);
    def(table, "entry", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_entry);
    def(table, "remove", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_remove);
    def(table, "for-each", 2, Some(2), &[ArgType::Any, ArgType::Any], fn_for_each);
}

fn map_arg<N: SourceNode>(args: &[XdmValue<N>], index: usize) -> Result<XdmMap<N>> {
    args.get(index)
        .and_then(XdmValue::first)
        .and_then(XdmItem::as_map)
        .cloned()
        .ok_or_else(|| XPathError::type_error("expected a map"))
}

/// `duplicates` option: `use-first` (default), `use-last`, `reject`,
/// `combine`.
pub fn fn_merge<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let duplicates = match args.get(1).and_then(XdmValue::first).and_then(XdmItem::as_map) {
        Some(options) => {
            let key = crate::types::AtomicValue::String("duplicates".to_string());
            match options.get(&key) {
                Some(value) => value.to_string_value(),
                None => "use-first".to_string(),
            }
        }
        None => "use-first".to_string(),
    };
    if !matches!(
        duplicates.as_str(),
        "use-first" | "use-last" | "use-any" | "reject" | "combine"
    ) {
        return Err(XPathError::JsonOptions(format!(
            "bad duplicates option '{}'",
            duplicates
        )));
    }
    let mut merged = XdmMap::new();
    for item in args[0].iter() {
        let map = item
            .as_map()
            .ok_or_else(|| XPathError::type_error("map:merge requires maps"))?;
        for (key, value) in map.entries() {
            if merged.contains(key) {
                match duplicates.as_str() {
                    "use-first" | "use-any" => continue,
                    "reject" => {
                        return Err(XPathError::dynamic(
                            "FOJS0003",
                            format!("duplicate key '{}'", key.to_string_value()),
                        ));
                    }
                    "combine" => {
                        let mut combined = merged.get(key).cloned().unwrap_or_default();
                        combined.extend(value.clone());
                        merged.put(key.clone(), combined)?;
                        continue;
                    }
                    _ => {}
                }
            }
            merged.put(key.clone(), value.clone())?;
        }
    }
    Ok(XdmValue::from_item(XdmItem::Map(merged)))
}

pub fn fn_size<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_integer(map_arg(&args, 0)?.size() as i64))
}

pub fn fn_keys<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let map = map_arg(&args, 0)?;
    let mut out = XdmValue::empty();
    for key in map.keys() {
        out.push(XdmItem::Atomic(key.clone()));
    }
    Ok(out)
}

pub fn fn_contains<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let map = map_arg(&args, 0)?;
    let key = atomic_arg(&args, 1)?;
    Ok(XdmValue::from_boolean(map.contains(&key)))
}

pub fn fn_get<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let map = map_arg(&args, 0)?;
    let key = atomic_arg(&args, 1)?;
    Ok(map.get(&key).cloned().unwrap_or_else(XdmValue::empty))
}

/// Deep search for a key through maps and arrays.
pub fn fn_find<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let key = atomic_arg(&args, 1)?;
    let mut found = Vec::new();
    fn walk<N: SourceNode>(
        value: &XdmValue<N>,
        key: &crate::types::AtomicValue,
        found: &mut Vec<XdmValue<N>>,
    ) {
        for item in value.iter() {
            match item {
                XdmItem::Map(map) => {
                    if let Some(hit) = map.get(key) {
                        found.push(hit.clone());
                    }
                    for (_, nested) in map.entries() {
                        walk(nested, key, found);
                    }
                }
                XdmItem::Array(array) => {
                    for member in array.members() {
                        walk(member, key, found);
                    }
                }
                _ => {}
            }
        }
    }
    walk(&args[0], &key, &mut found);
    Ok(XdmValue::from_item(XdmItem::Array(XdmArray::new(found))))
}

pub fn fn_put<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut map = map_arg(&args, 0)?;
    let key = atomic_arg(&args, 1)?;
    map.put(key, args[2].clone())?;
    Ok(XdmValue::from_item(XdmItem::Map(map)))
}

pub fn fn_entry<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut map = XdmMap::new();
    map.put(atomic_arg(&args, 0)?, args[1].clone())?;
    Ok(XdmValue::from_item(XdmItem::Map(map)))
}

pub fn fn_remove<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut map = map_arg(&args, 0)?;
    for key in args[1].atomized()? {
        map.remove(&key);
    }
    Ok(XdmValue::from_item(XdmItem::Map(map)))
}

pub fn fn_for_each<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let map = map_arg(&args, 0)?;
    let action = args[1]
        .first()
        .and_then(XdmItem::as_function)
        .cloned()
        .ok_or_else(|| XPathError::type_error("map:for-each requires a function"))?;
    let mut out = XdmValue::empty();
    for (key, value) in map.entries() {
        out.extend(invoke_function(
            &action,
            vec![XdmValue::from_atomic(key.clone()), value.clone()],
            ctx,
        )?);
    }
    Ok(out)
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
    fn merge_use_first_keeps_earlier_entries() {
        let out = eval("map:get(map:merge((map{'a':1}, map{'a':2, 'b':3})), 'a')");
        assert_eq!(out.to_double(), 1.0);
    }

    #[test]
    fn merge_reject_raises() {
        let parsed =
            parse_expression("map:merge((map{'a':1}, map{'a':2}), map{'duplicates':'reject'})")
                .unwrap();
        let err = evaluate(
            &parsed,
            &crate::context::EvaluationContext::<XmlNode>::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "FOJS0003");
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let out = eval("string-join(map:keys(map{'c':1,'a':2,'b':3}), '')");
        assert_eq!(out.to_string_value(), "cab");
    }

    #[test]
    fn put_get_remove_contains() {
        assert_eq!(
            eval("map:get(map:put(map{}, 'x', 9), 'x')").to_double(),
            9.0
        );
        assert!(
            !eval("map:contains(map:remove(map{'x':1}, 'x'), 'x')")
                .effective_boolean_value()
                .unwrap()
        );
        assert_eq!(eval("map:size(map{'a':1,'b':2})").to_double(), 2.0);
    }

    #[test]
    fn for_each_sees_keys_and_values() {
        let out = eval("string-join(map:for-each(map{'a':1,'b':2}, function($k,$v){concat($k,$v)}), ',')");
        assert_eq!(out.to_string_value(), "a1,b2");
    }
}
