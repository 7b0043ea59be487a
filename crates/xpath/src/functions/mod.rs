//! Function registry and dispatch.
//!
//! Lookup key is `(namespace, local-name, arity)`. Resolution precedence:
//! the empty and `fn` namespaces hit the built-in core/XSLT table; `xs` is
//! the constructor layer; `math`, `map` and `array` have fixed tables; any
//! other namespace goes to the stylesheet's user functions through the
//! runtime hooks and falls through to the core table when nothing is
//! declared. Arity is checked before invocation, and declared argument
//! kinds are matched (`XPTY0004` on mismatch).

pub mod array;
pub mod boolean;
pub mod datetime;
pub mod hof;
pub mod json;
pub mod map;
pub mod math;
pub mod node;
pub mod numeric;
pub mod regex;
pub mod sequence;
pub mod string;
pub mod xslt;

use std::collections::HashMap;

use stilo_xdm::{
    ARRAY_NAMESPACE, ExpandedName, FN_NAMESPACE, MAP_NAMESPACE, MATH_NAMESPACE, SourceNode,
    XS_NAMESPACE,
};

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::types::cast::cast_atomic;
use crate::types::{AtomicType, AtomicValue, XdmItem, XdmValue};

/// Coarse argument kinds checked before invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Any,
    Numeric,
    String,
    Boolean,
    NodeSet,
    Sequence,
}

impl ArgType {
    fn accepts<N: SourceNode>(&self, value: &XdmValue<N>) -> bool {
        match self {
            ArgType::Any | ArgType::Sequence | ArgType::Boolean => true,
            ArgType::NodeSet => value.is_node_set(),
            ArgType::Numeric => value.iter().all(|item| match item {
                XdmItem::Atomic(a) => a.is_numeric() || matches!(a, AtomicValue::UntypedAtomic(_)),
                XdmItem::Node(_) => true,
                _ => false,
            }),
            ArgType::String => value
                .iter()
                .all(|item| matches!(item, XdmItem::Atomic(_) | XdmItem::Node(_))),
        }
    }
}

pub type EvalFn<N> =
    fn(Vec<XdmValue<N>>, &EvaluationContext<'_, N>) -> Result<XdmValue<N>>;

/// Descriptor of one built-in function.
pub struct FunctionDef<N: SourceNode> {
    pub min_arity: usize,
    /// `None` means variadic.
    pub max_arity: Option<usize>,
    /// Matched positionally; the final entry repeats for variadic calls.
    pub arg_types: &'static [ArgType],
    pub eval: EvalFn<N>,
}

pub(crate) type Table<N> = HashMap<&'static str, FunctionDef<N>>;

/// Registers one descriptor; a small helper every library module uses.
pub(crate) fn def<N: SourceNode>(
    table: &mut Table<N>,
    name: &'static str,
    min_arity: usize,
    max_arity: Option<usize>,
    arg_types: &'static [ArgType],
    eval: EvalFn<N>,
) {
    table.insert(
        name,
        FunctionDef {
            min_arity,
            max_arity,
            arg_types,
            eval,
        },
    );
}

/// The process-wide function tables, instantiated per node type and shared
/// by every derived context.
pub struct FunctionRegistry<N: SourceNode> {
    core: Table<N>,
    math: Table<N>,
    map: Table<N>,
    array: Table<N>,
}

impl<N: SourceNode> FunctionRegistry<N> {
    pub fn new() -> Self {
        let mut core = Table::new();
        boolean::register(&mut core);
        string::register(&mut core);
        numeric::register(&mut core);
        node::register(&mut core);
        sequence::register(&mut core);
        datetime::register(&mut core);
        hof::register(&mut core);
        regex::register(&mut core);
        json::register(&mut core);
        xslt::register(&mut core);

        let mut math_table = Table::new();
        math::register(&mut math_table);
        let mut map_table = Table::new();
        map::register(&mut map_table);
        let mut array_table = Table::new();
        array::register(&mut array_table);

        Self {
            core,
            math: math_table,
            map: map_table,
            array: array_table,
        }
    }

    pub fn core_contains(&self, local: &str, arity: usize) -> bool {
        self.core
            .get(local)
            .map(|d| arity >= d.min_arity && d.max_arity.map(|m| arity <= m).unwrap_or(true))
            .unwrap_or(false)
    }

    fn table_for_uri(&self, uri: &str) -> Option<&Table<N>> {
        match uri {
            FN_NAMESPACE => Some(&self.core),
            MATH_NAMESPACE => Some(&self.math),
            MAP_NAMESPACE => Some(&self.map),
            ARRAY_NAMESPACE => Some(&self.array),
            _ => None,
        }
    }
}

impl<N: SourceNode> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Namespace-routed function dispatch.
pub fn call_function<N: SourceNode>(
    name: &ExpandedName,
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match name.uri.as_deref() {
        None | Some(FN_NAMESPACE) => {
            call_from_table(&ctx.registry().core, name, args, ctx)
        }
        Some(XS_NAMESPACE) => call_constructor(name, args, ctx),
        Some(MATH_NAMESPACE) | Some(MAP_NAMESPACE) | Some(ARRAY_NAMESPACE) => {
            let table = ctx
                .registry()
                .table_for_uri(name.uri.as_deref().unwrap())
                .expect("fixed-table namespaces are always registered");
            call_from_table(table, name, args, ctx)
        }
        Some(_) => {
            if let Some(hooks) = ctx.hooks {
                if hooks.user_function_available(name, args.len()) {
                    return hooks
                        .call_user_function(name, args, ctx)?
                        .ok_or_else(|| XPathError::UnknownFunction {
                            name: name.clark(),
                            arity: 0,
                        });
                }
            }
            // fall through to the core library
            call_from_table(&ctx.registry().core, name, args, ctx)
        }
    }
}

fn call_from_table<N: SourceNode>(
    table: &Table<N>,
    name: &ExpandedName,
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let def = table
        .get(name.local.as_str())
        .ok_or_else(|| XPathError::UnknownFunction {
            name: name.clark(),
            arity: args.len(),
        })?;
    let arity = args.len();
    let max_ok = def.max_arity.map(|m| arity <= m).unwrap_or(true);
    if arity < def.min_arity || !max_ok {
        return Err(XPathError::UnknownFunction {
            name: name.clark(),
            arity,
        });
    }
    for (index, arg) in args.iter().enumerate() {
        let expected = def
            .arg_types
            .get(index)
            .or_else(|| def.arg_types.last())
            .copied()
            .unwrap_or(ArgType::Any);
        if !expected.accepts(arg) {
            return Err(XPathError::type_mismatch(
                format!("argument {} of {}", index + 1, name.local),
                format!("{:?}", expected),
                arg.first().map(XdmItem::type_name).unwrap_or_default(),
            ));
        }
    }
    (def.eval)(args, ctx)
}

/// The `xs:TYPE(value)` constructor layer.
fn call_constructor<N: SourceNode>(
    name: &ExpandedName,
    mut args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let target = AtomicType::from_local_name(&name.local).ok_or_else(|| {
        XPathError::UnknownFunction {
            name: name.clark(),
            arity: args.len(),
        }
    })?;
    if args.len() != 1 {
        return Err(XPathError::UnknownFunction {
            name: name.clark(),
            arity: args.len(),
        });
    }
    let atomics = args.remove(0).atomized()?;
    match atomics.len() {
        0 => Ok(XdmValue::empty()),
        1 => Ok(XdmValue::from_atomic(cast_atomic(
            &atomics[0],
            target,
            Some(ctx.namespaces()),
        )?)),
        n => Err(XPathError::Cardinality {
            expected: "at most one atomic value".to_string(),
            actual: n,
        }),
    }
}

// --- shared argument helpers -------------------------------------------

/// String value of an argument, empty string for the empty sequence.
pub(crate) fn string_arg<N: SourceNode>(args: &[XdmValue<N>], index: usize) -> String {
    args.get(index).map(XdmValue::to_string_value).unwrap_or_default()
}

/// `None` when the argument is absent or the empty sequence.
pub(crate) fn optional_string_arg<N: SourceNode>(
    args: &[XdmValue<N>],
    index: usize,
) -> Option<String> {
    args.get(index)
        .filter(|v| !v.is_empty())
        .map(XdmValue::to_string_value)
}

pub(crate) fn double_arg<N: SourceNode>(args: &[XdmValue<N>], index: usize) -> f64 {
    args.get(index).map(XdmValue::to_double).unwrap_or(f64::NAN)
}

/// Single atomic out of an argument; cardinality error otherwise.
pub(crate) fn atomic_arg<N: SourceNode>(
    args: &[XdmValue<N>],
    index: usize,
) -> Result<AtomicValue> {
    let mut atomics = args
        .get(index)
        .ok_or_else(|| XPathError::Cardinality {
            expected: "an argument".to_string(),
            actual: 0,
        })?
        .atomized()?;
    if atomics.len() != 1 {
        return Err(XPathError::Cardinality {
            expected: "exactly one atomic value".to_string(),
            actual: atomics.len(),
        });
    }
    Ok(atomics.remove(0))
}

/// Zero-or-one atomic out of an argument.
pub(crate) fn optional_atomic_arg<N: SourceNode>(
    args: &[XdmValue<N>],
    index: usize,
) -> Result<Option<AtomicValue>> {
    match args.get(index) {
        None => Ok(None),
        Some(value) => {
            let mut atomics = value.atomized()?;
            match atomics.len() {
                0 => Ok(None),
                1 => Ok(Some(atomics.remove(0))),
                n => Err(XPathError::Cardinality {
                    expected: "at most one atomic value".to_string(),
                    actual: n,
                }),
            }
        }
    }
}

/// The node a name-family function operates on: the explicit argument, or
/// the context node when called without one. `Ok(None)` for an explicit
/// empty sequence.
pub(crate) fn node_or_context<N: SourceNode>(
    args: &[XdmValue<N>],
    ctx: &EvaluationContext<'_, N>,
) -> Result<Option<N>> {
    match args.first() {
        Some(value) => {
            if value.is_empty() {
                return Ok(None);
            }
            match value.first() {
                Some(XdmItem::Node(n)) => Ok(Some(n.clone())),
                _ => Err(XPathError::type_error("expected a node argument")),
            }
        }
        None => ctx.context_node().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;

    fn call(name: &str, args: Vec<XdmValue<XmlNode>>) -> Result<XdmValue<XmlNode>> {
        call_function(&ExpandedName::local(name), args, &Ctx::new())
    }

    #[test]
    fn unknown_function_reports_name_and_arity() {
        let err = call("no-such-function", vec![]).unwrap_err();
        assert_eq!(err.code(), "XPST0017");
    }

    #[test]
    fn arity_is_checked_before_invocation() {
        let err = call("not", vec![]).unwrap_err();
        assert_eq!(err.code(), "XPST0017");
        let err = call(
            "not",
            vec![XdmValue::from_boolean(true), XdmValue::from_boolean(false)],
        )
        .unwrap_err();
        assert_eq!(err.code(), "XPST0017");
    }

    #[test]
    fn fn_namespace_routes_to_core() {
        let out = call_function(
            &ExpandedName::new(FN_NAMESPACE, "not"),
            vec![XdmValue::from_boolean(false)],
            &Ctx::new(),
        )
        .unwrap();
        assert!(out.effective_boolean_value().unwrap());
    }

    #[test]
    fn xs_namespace_routes_to_constructors() {
        let out = call_function(
            &ExpandedName::new(XS_NAMESPACE, "integer"),
            vec![XdmValue::from_string(" 42 ")],
            &Ctx::new(),
        )
        .unwrap();
        assert_eq!(out.to_double(), 42.0);
        // empty input constructs the empty sequence
        let out = call_function(
            &ExpandedName::new(XS_NAMESPACE, "integer"),
            vec![XdmValue::empty()],
            &Ctx::new(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_namespace_falls_through_to_core() {
        let out = call_function(
            &ExpandedName::new("http://example.com/ext", "not"),
            vec![XdmValue::from_boolean(true)],
            &Ctx::new(),
        )
        .unwrap();
        assert!(!out.effective_boolean_value().unwrap());
    }

    #[test]
    fn nodeset_argument_kind_is_enforced() {
        let err = call("innermost", vec![XdmValue::from_integer(1)]).unwrap_err();
        assert_eq!(err.code(), "XPTY0004");
    }
}
