//! XSLT-specific functions.
//!
//! These read the evaluation context's XSLT state (current node, groups,
//! merges, accumulators) or reach the transformation runtime through
//! [`crate::context::RuntimeHooks`]: key lookup, document loading, decimal
//! formats, system properties, unparsed text and XML parsing.

use stilo_xdm::{ExpandedName, QName, SourceNode, XS_NAMESPACE, XSL_NAMESPACE};

use crate::context::{
    CURRENT_GROUP, CURRENT_GROUPING_KEY, CURRENT_MERGE_GROUP, CURRENT_MERGE_KEY,
    EvaluationContext,
};
use crate::error::{Result, XPathError};
use crate::format::{self, DecimalFormat};
use crate::functions::{
    ArgType, Table, def, optional_atomic_arg, optional_string_arg, string_arg,
};
use crate::types::{AtomicType, AtomicValue, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "current", 0, Some(0), &[], fn_current);
    def(
        table,
        "key",
        2,
        Some(3),
        &[ArgType::String, ArgType::Any, ArgType::Any],
        fn_key,
    );
    def(table, "document", 1, Some(2), &[ArgType::Any, ArgType::NodeSet], fn_document);
    def(table, "doc", 1, Some(1), &[ArgType::String], fn_doc);
    def(table, "doc-available", 1, Some(1), &[ArgType::String], fn_doc_available);
    def(
        table,
        "format-number",
        2,
        Some(3),
        &[ArgType::Any, ArgType::String, ArgType::String],
        fn_format_number,
    );
    def(
        table,
        "format-dateTime",
        2,
        Some(5),
        &[ArgType::Any, ArgType::String, ArgType::Any, ArgType::Any, ArgType::Any],
        fn_format_datetime,
    );
    def(
        table,
        "format-date",
        2,
        Some(5),
        &[ArgType::Any, ArgType::String, ArgType::Any, ArgType::Any, ArgType::Any],
        fn_format_date,
    );
    def(
        table,
        "format-time",
        2,
        Some(5),
        &[ArgType::Any, ArgType::String, ArgType::Any, ArgType::Any, ArgType::Any],
        fn_format_time,
    );
    def(
        table,
        "system-property",
        1,
        Some(1),
        &[ArgType::String],
        fn_system_property,
    );
    def(
        table,
        "element-available",
        1,
        Some(1),
        &[ArgType::String],
        fn_element_available,
    );
    def(
        table,
        "function-available",
        1,
        Some(2),
        &[ArgType::String, ArgType::Numeric],
        fn_function_available,
    );
    def(
        table,
        "type-available",
        1,
        Some(1),
        &[ArgType::String],
        fn_type_available,
    );
    def(table, "current-group", 0, Some(0), &[], fn_current_group);
    def(
        table,
        "current-grouping-key",
        0,
        Some(0),
        &[],
        fn_current_grouping_key,
    );
    def(
        table,
        "current-merge-group",
        0,
        Some(1),
        &[ArgType::String],
        fn_current_merge_group,
    );
    def(table, "current-merge-key", 0, Some(0), &[], fn_current_merge_key);
    def(
        table,
        "accumulator-before",
        1,
        Some(1),
        &[ArgType::String],
        fn_accumulator_before,
    );
    def(
        table,
        "accumulator-after",
        1,
        Some(1),
        &[ArgType::String],
        fn_accumulator_after,
    );
    def(table, "snapshot", 0, Some(1), &[ArgType::Any], fn_snapshot);
    def(table, "stream-available", 1, Some(1), &[ArgType::String], fn_stream_available);
    def(
        table,
        "unparsed-text",
        1,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_unparsed_text,
    );
    def(
        table,
        "unparsed-text-available",
        1,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_unparsed_text_available,
    );
    def(
        table,
        "unparsed-text-lines",
        1,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_unparsed_text_lines,
    );
    def(table, "parse-xml", 1, Some(1), &[ArgType::String], fn_parse_xml);
    def(
        table,
        "parse-xml-fragment",
        1,
        Some(1),
        &[ArgType::String],
        fn_parse_xml_fragment,
    );
}

/// The node pinned by the nearest template or for-each entry, untouched by
/// predicate descent.
pub fn fn_current<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match &ctx.current_node {
        Some(node) => Ok(XdmValue::from_node(node.clone())),
        None => Err(XPathError::dynamic(
            "XTDE1360",
            "current() called with no current node",
        )),
    }
}

/// Expands a lexical QName or EQName argument, mapping failures to the
/// given constructor.
fn expand_name_arg<N: SourceNode>(
    lexical: &str,
    ctx: &EvaluationContext<'_, N>,
    on_error: impl Fn(String) -> XPathError,
) -> Result<ExpandedName> {
    let trimmed = lexical.trim();
    if trimmed.starts_with("Q{") {
        return ExpandedName::parse_eqname(trimmed).map_err(|_| on_error(lexical.to_string()));
    }
    let qname = QName::parse(trimmed).map_err(|_| on_error(lexical.to_string()))?;
    ctx.namespaces()
        .expand(&qname, false)
        .map_err(|_| on_error(lexical.to_string()))
}

pub fn fn_key<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(&string_arg(&args, 0), ctx, XPathError::UnknownKey)?;
    let hooks = ctx
        .hooks
        .ok_or_else(|| XPathError::UnknownKey(name.clark()))?;
    if !hooks.has_key(&name) {
        return Err(XPathError::UnknownKey(name.clark()));
    }
    let top = match args.get(2).and_then(XdmValue::first) {
        Some(XdmItem::Node(n)) => Some(n.clone()),
        Some(_) => return Err(XPathError::type_error("third argument of key must be a node")),
        None => None,
    };
    let root = match &top {
        Some(node) => node.root(),
        None => ctx.context_node()?.root(),
    };
    let collation = ctx.default_collation().clone();
    let mut nodes = hooks.key_nodes(&name, &args[1], &collation, &root, ctx)?;
    if let Some(top) = top {
        nodes.retain(|node| node.ancestors_or_self().any(|a| a == top));
    }
    Ok(XdmValue::from_nodes(nodes))
}

fn load_base<N: SourceNode>(
    args: &[XdmValue<N>],
    ctx: &EvaluationContext<'_, N>,
) -> Option<String> {
    match args.get(1).and_then(XdmValue::first) {
        Some(XdmItem::Node(n)) => n.base_uri(),
        _ => ctx.static_base_uri.as_ref().map(|b| b.to_string()),
    }
}

/// `document()` accepts strings and nodes; failures are swallowed to the
/// empty sequence, and the empty-string URI is the stylesheet module.
pub fn fn_document<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let hooks = match ctx.hooks {
        Some(hooks) => hooks,
        None => return Ok(XdmValue::empty()),
    };
    let default_base = load_base(&args, ctx);
    let mut nodes = Vec::new();
    for item in args[0].iter() {
        let (href, base) = match item {
            XdmItem::Node(n) => (n.string_value(), n.base_uri().or(default_base.clone())),
            other => (other.string_value(), default_base.clone()),
        };
        if href.is_empty() {
            if let Some(stylesheet) = hooks.stylesheet_document() {
                nodes.push(stylesheet);
            }
            continue;
        }
        match hooks.load_document(&href, base.as_deref()) {
            Ok(Some(root)) => nodes.push(root),
            Ok(None) => {}
            Err(err) => {
                log::debug!("document('{}') swallowed: {}", href, err);
            }
        }
    }
    Ok(XdmValue::from_nodes(nodes))
}

pub fn fn_doc<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let href = string_arg(&args, 0);
    let hooks = ctx.hooks.ok_or_else(|| XPathError::DocumentLoad {
        uri: href.clone(),
        message: "no document loader available".to_string(),
    })?;
    let base = ctx.static_base_uri.as_ref().map(|b| b.to_string());
    match hooks.load_document(&href, base.as_deref())? {
        Some(root) => Ok(XdmValue::from_node(root)),
        None => Err(XPathError::DocumentLoad {
            uri: href,
            message: "resource not retrievable".to_string(),
        }),
    }
}

/// Never raises; false on any load failure or an empty URI.
pub fn fn_doc_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let href = string_arg(&args, 0);
    if href.is_empty() || args[0].is_empty() {
        return Ok(XdmValue::from_boolean(false));
    }
    let available = match ctx.hooks {
        Some(hooks) => {
            let base = ctx.static_base_uri.as_ref().map(|b| b.to_string());
            matches!(hooks.load_document(&href, base.as_deref()), Ok(Some(_)))
        }
        None => false,
    };
    Ok(XdmValue::from_boolean(available))
}

pub fn fn_format_number<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let format = match optional_string_arg(&args, 2) {
        Some(name) => {
            let expanded = expand_name_arg(&name, ctx, XPathError::UnknownDecimalFormat)?;
            ctx.hooks
                .and_then(|hooks| hooks.decimal_format(Some(&expanded)))
                .ok_or_else(|| XPathError::UnknownDecimalFormat(expanded.clark()))?
        }
        None => ctx
            .hooks
            .and_then(|hooks| hooks.decimal_format(None))
            .unwrap_or_default(),
    };
    let value = match optional_atomic_arg(&args, 0)? {
        None => return Ok(XdmValue::from_string(format.nan.clone())),
        Some(value) => value.to_double(),
    };
    let picture = string_arg(&args, 1);
    format::format_number(value, &picture, &format).map(XdmValue::from_string)
}

fn format_calendar<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    expect: &str,
) -> Result<XdmValue<N>> {
    let picture = string_arg(&args, 1);
    let value = match optional_atomic_arg(&args, 0)? {
        None => return Ok(XdmValue::empty()),
        Some(value) => value,
    };
    let formatted = match (&value, expect) {
        (AtomicValue::DateTime(dt), "dateTime") => format::format_date_time(dt, &picture)?,
        (AtomicValue::Date(d), "date") => format::format_date(d, &picture)?,
        (AtomicValue::Time(t), "time") => format::format_time(t, &picture)?,
        _ => {
            return Err(XPathError::type_mismatch(
                "calendar formatting argument",
                format!("xs:{}", expect),
                value.type_name(),
            ));
        }
    };
    Ok(XdmValue::from_string(formatted))
}

pub fn fn_format_datetime<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    format_calendar(args, "dateTime")
}

pub fn fn_format_date<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    format_calendar(args, "date")
}

pub fn fn_format_time<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    format_calendar(args, "time")
}

/// System properties defined for the XSLT namespace. The runtime hooks add
/// the stylesheet-provided package properties.
pub fn default_system_property(name: &ExpandedName) -> Option<String> {
    if name.uri.as_deref() != Some(XSL_NAMESPACE) {
        return None;
    }
    let value = match name.local.as_str() {
        "version" => "3.0",
        "vendor" => "stilo",
        "vendor-url" => "https://github.com/stilo-xml/stilo",
        "product-name" => "stilo",
        "product-version" => env!("CARGO_PKG_VERSION"),
        "is-schema-aware" => "no",
        "supports-serialization" => "yes",
        "supports-backwards-compatibility" => "yes",
        "supports-namespace-axis" => "yes",
        "supports-streaming" => "no",
        "supports-dynamic-evaluation" => "no",
        "xpath-version" => "3.1",
        "xsd-version" => "1.1",
        _ => return None,
    };
    Some(value.to_string())
}

pub fn fn_system_property<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(&string_arg(&args, 0), ctx, XPathError::InvalidSystemProperty)?;
    let value = ctx
        .hooks
        .and_then(|hooks| hooks.system_property(&name))
        .or_else(|| default_system_property(&name))
        .unwrap_or_default();
    Ok(XdmValue::from_string(value))
}

const XSLT_INSTRUCTIONS: &[&str] = &[
    "analyze-string", "apply-imports", "apply-templates", "assert", "attribute", "break",
    "call-template", "catch", "choose", "comment", "copy", "copy-of", "document", "element",
    "evaluate", "fallback", "for-each", "for-each-group", "fork", "if", "iterate", "map",
    "map-entry", "merge", "message", "namespace", "next-iteration", "next-match", "number",
    "on-completion", "on-empty", "on-non-empty", "otherwise", "perform-sort",
    "processing-instruction", "result-document", "sequence", "sort", "source-document", "text",
    "try", "value-of", "variable", "when", "where-populated", "with-param",
];

pub fn fn_element_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(
        &string_arg(&args, 0),
        ctx,
        XPathError::InvalidAvailabilityName,
    )?;
    let available = name.uri.as_deref() == Some(XSL_NAMESPACE)
        && XSLT_INSTRUCTIONS.contains(&name.local.as_str());
    Ok(XdmValue::from_boolean(available))
}

pub fn fn_function_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(
        &string_arg(&args, 0),
        ctx,
        XPathError::InvalidAvailabilityName,
    )?;
    let arity = optional_atomic_arg(&args, 1)?.map(|a| a.to_double() as usize);
    let check_core = |local: &str| match arity {
        Some(arity) => ctx.registry().core_contains(local, arity),
        None => (0..=9).any(|a| ctx.registry().core_contains(local, a)),
    };
    let available = match name.uri.as_deref() {
        None | Some(stilo_xdm::FN_NAMESPACE) => check_core(&name.local),
        Some(XS_NAMESPACE) => AtomicType::from_local_name(&name.local).is_some(),
        Some(_) => {
            let user = ctx
                .hooks
                .map(|hooks| {
                    hooks.user_function_available(&name, arity.unwrap_or(0))
                        || (arity.is_none()
                            && (0..=9).any(|a| hooks.user_function_available(&name, a)))
                })
                .unwrap_or(false);
            user || check_core(&name.local)
        }
    };
    Ok(XdmValue::from_boolean(available))
}

pub fn fn_type_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(
        &string_arg(&args, 0),
        ctx,
        XPathError::InvalidAvailabilityName,
    )?;
    let available = name.uri.as_deref() == Some(XS_NAMESPACE)
        && AtomicType::from_local_name(&name.local).is_some();
    Ok(XdmValue::from_boolean(available))
}

pub fn fn_current_group<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(ctx.variable(CURRENT_GROUP).cloned().unwrap_or_default())
}

pub fn fn_current_grouping_key<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(ctx
        .variable(CURRENT_GROUPING_KEY)
        .cloned()
        .unwrap_or_default())
}

pub fn fn_current_merge_group<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let variable = match optional_string_arg(&args, 0) {
        Some(source) => format!("{}:{}", CURRENT_MERGE_GROUP, source),
        None => CURRENT_MERGE_GROUP.to_string(),
    };
    Ok(ctx.variable(&variable).cloned().unwrap_or_default())
}

pub fn fn_current_merge_key<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(ctx.variable(CURRENT_MERGE_KEY).cloned().unwrap_or_default())
}

fn accumulator<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
    after: bool,
) -> Result<XdmValue<N>> {
    let name = expand_name_arg(&string_arg(&args, 0), ctx, XPathError::UnknownAccumulator)?;
    let hooks = ctx
        .hooks
        .ok_or_else(|| XPathError::UnknownAccumulator(name.clark()))?;
    let node = ctx.context_node()?;
    hooks.accumulator_value(&name, &node, after, ctx)
}

pub fn fn_accumulator_before<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    accumulator(args, ctx, false)
}

pub fn fn_accumulator_after<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    accumulator(args, ctx, true)
}

/// The node model here is fully navigable and immutable, so the snapshot
/// is the node itself.
pub fn fn_snapshot<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match args.first() {
        Some(value) => Ok(value.clone()),
        None => match &ctx.item {
            Some(item) => Ok(XdmValue::from_item(item.clone())),
            None => Err(XPathError::NoContextItem),
        },
    }
}

/// Reports whether the resource loads, consistent with
/// `supports-streaming=no`.
pub fn fn_stream_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    fn_doc_available(args, ctx)
}

pub fn fn_unparsed_text<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let href = string_arg(&args, 0);
    let encoding = optional_string_arg(&args, 1);
    let hooks = ctx.hooks.ok_or_else(|| XPathError::UnparsedText {
        uri: href.clone(),
        message: "no resource loader available".to_string(),
    })?;
    let base = ctx.static_base_uri.as_ref().map(|b| b.to_string());
    hooks
        .unparsed_text(&href, encoding.as_deref(), base.as_deref())
        .map(XdmValue::from_string)
}

pub fn fn_unparsed_text_available<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let available = fn_unparsed_text(args, ctx).is_ok();
    Ok(XdmValue::from_boolean(available))
}

pub fn fn_unparsed_text_lines<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let text = fn_unparsed_text(args, ctx)?;
    if text.is_empty() {
        return Ok(XdmValue::empty());
    }
    let content = text.to_string_value();
    let mut out = XdmValue::empty();
    let mut lines: Vec<&str> = content.split(['\n']).collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    for line in lines {
        out.push(XdmItem::Atomic(AtomicValue::String(
            line.trim_end_matches('\r').to_string(),
        )));
    }
    Ok(out)
}

pub fn fn_parse_xml<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let hooks = ctx
        .hooks
        .ok_or_else(|| XPathError::XmlParse("no document factory available".to_string()))?;
    hooks.parse_xml(&string_arg(&args, 0)).map(XdmValue::from_node)
}

pub fn fn_parse_xml_fragment<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let hooks = ctx
        .hooks
        .ok_or_else(|| XPathError::XmlParse("no document factory available".to_string()))?;
    hooks
        .parse_xml_fragment(&string_arg(&args, 0))
        .map(XdmValue::from_node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    #[test]
    fn current_without_binding_is_a_dynamic_error() {
        let err = fn_current(vec![], &Ctx::new()).unwrap_err();
        assert_eq!(err.code(), "XTDE1360");
    }

    #[test]
    fn key_without_declaration_is_xtde1260() {
        let tree = stilo_xdm::XmlTree::parse("<r/>").unwrap();
        let ctx = Ctx::new().with_context_node(tree.root());
        let err = fn_key(
            vec![V::from_string("k"), V::from_string("v")],
            &ctx,
        )
        .unwrap_err();
        assert_eq!(err.code(), "XTDE1260");
        // an unbound prefix is the same error
        let err = fn_key(
            vec![V::from_string("nope:k"), V::from_string("v")],
            &ctx,
        )
        .unwrap_err();
        assert_eq!(err.code(), "XTDE1260");
    }

    #[test]
    fn system_property_validates_its_name() {
        let ctx = Ctx::new();
        let err =
            fn_system_property(vec![V::from_string("not a name")], &ctx).unwrap_err();
        assert_eq!(err.code(), "XTDE1390");
        let err = fn_system_property(vec![V::from_string("nope:x")], &ctx).unwrap_err();
        assert_eq!(err.code(), "XTDE1390");
    }

    #[test]
    fn system_property_reports_the_defined_table() {
        let ctx = Ctx::new();
        let get = |name: &str| {
            fn_system_property(vec![V::from_string(name)], &ctx)
                .unwrap()
                .to_string_value()
        };
        assert_eq!(get("xsl:version"), "3.0");
        assert_eq!(get("xsl:supports-streaming"), "no");
        assert_eq!(get("xsl:xpath-version"), "3.1");
        assert_eq!(get("xsl:is-schema-aware"), "no");
        // EQName form
        assert_eq!(
            get(&format!("Q{{{}}}xsd-version", XSL_NAMESPACE)),
            "1.1"
        );
        // unknown property is the empty string
        assert_eq!(get("xsl:who-knows"), "");
    }

    #[test]
    fn availability_checks() {
        let ctx = Ctx::new();
        assert!(
            fn_element_available(vec![V::from_string("xsl:for-each-group")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
        assert!(
            !fn_element_available(vec![V::from_string("xsl:nonesuch")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
        let err = fn_element_available(vec![V::from_string("9bad")], &ctx).unwrap_err();
        assert_eq!(err.code(), "XTDE1400");
        assert!(
            fn_function_available(vec![V::from_string("concat")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
        assert!(
            fn_type_available(vec![V::from_string("xs:dateTime")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
    }

    #[test]
    fn group_accessors_read_reserved_variables() {
        let ctx = Ctx::new().with_current_group(
            V::from_integer(7),
            Some(V::from_string("g")),
        );
        assert_eq!(fn_current_group(vec![], &ctx).unwrap().to_double(), 7.0);
        assert_eq!(
            fn_current_grouping_key(vec![], &ctx).unwrap().to_string_value(),
            "g"
        );
        // empty outside a grouping context
        assert!(fn_current_group(vec![], &Ctx::new()).unwrap().is_empty());
    }

    #[test]
    fn merge_accessors_support_sources() {
        let ctx = Ctx::new().with_merge_group(
            V::from_integer(1),
            vec![("a".to_string(), V::from_integer(2))],
            Some(V::from_string("k")),
        );
        assert_eq!(fn_current_merge_group(vec![], &ctx).unwrap().to_double(), 1.0);
        assert_eq!(
            fn_current_merge_group(vec![V::from_string("a")], &ctx)
                .unwrap()
                .to_double(),
            2.0
        );
        assert_eq!(
            fn_current_merge_key(vec![], &ctx).unwrap().to_string_value(),
            "k"
        );
    }

    #[test]
    fn snapshot_returns_the_node_itself() {
        let tree = stilo_xdm::XmlTree::parse("<r/>").unwrap();
        let ctx = Ctx::new().with_context_node(tree.root());
        let out = fn_snapshot(vec![], &ctx).unwrap();
        assert!(out.first().unwrap().as_node().unwrap().is_same_node(&tree.root()));
    }
}
