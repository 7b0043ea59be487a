//! Node-set and name functions.
//!
//! The name family uses the context node when called without an argument
//! and returns the empty string for an empty node-set argument.

use stilo_xdm::{NodeKind, QName, SourceNode};

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{ArgType, Table, def, node_or_context, optional_atomic_arg, string_arg};
use crate::types::{AtomicValue, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "position", 0, Some(0), &[], fn_position);
    def(table, "last", 0, Some(0), &[], fn_last);
    def(table, "local-name", 0, Some(1), &[ArgType::NodeSet], fn_local_name);
    def(table, "namespace-uri", 0, Some(1), &[ArgType::NodeSet], fn_namespace_uri);
    def(table, "name", 0, Some(1), &[ArgType::NodeSet], fn_name);
    def(table, "node-name", 0, Some(1), &[ArgType::NodeSet], fn_node_name);
    def(table, "root", 0, Some(1), &[ArgType::NodeSet], fn_root);
    def(table, "base-uri", 0, Some(1), &[ArgType::NodeSet], fn_base_uri);
    def(table, "document-uri", 0, Some(1), &[ArgType::NodeSet], fn_document_uri);
    def(table, "has-children", 0, Some(1), &[ArgType::NodeSet], fn_has_children);
    def(table, "path", 0, Some(1), &[ArgType::NodeSet], fn_path);
    def(table, "generate-id", 0, Some(1), &[ArgType::NodeSet], fn_generate_id);
    def(table, "id", 1, Some(2), &[ArgType::Any, ArgType::NodeSet], fn_id);
    def(
        table,
        "element-with-id",
        1,
        Some(2),
        &[ArgType::Any, ArgType::NodeSet],
        fn_id,
    );
    def(table, "idref", 1, Some(2), &[ArgType::Any, ArgType::NodeSet], fn_idref);
    def(table, "QName", 2, Some(2), &[ArgType::Any, ArgType::String], fn_qname);
    def(
        table,
        "resolve-QName",
        2,
        Some(2),
        &[ArgType::String, ArgType::NodeSet],
        fn_resolve_qname,
    );
    def(
        table,
        "prefix-from-QName",
        1,
        Some(1),
        &[ArgType::Any],
        fn_prefix_from_qname,
    );
    def(
        table,
        "local-name-from-QName",
        1,
        Some(1),
        &[ArgType::Any],
        fn_local_name_from_qname,
    );
    def(
        table,
        "namespace-uri-from-QName",
        1,
        Some(1),
        &[ArgType::Any],
        fn_namespace_uri_from_qname,
    );
    def(
        table,
        "in-scope-prefixes",
        1,
        Some(1),
        &[ArgType::NodeSet],
        fn_in_scope_prefixes,
    );
    def(
        table,
        "namespace-uri-for-prefix",
        2,
        Some(2),
        &[ArgType::Any, ArgType::NodeSet],
        fn_namespace_uri_for_prefix,
    );
}

pub fn fn_position<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if ctx.item.is_none() {
        return Err(XPathError::NoContextItem);
    }
    Ok(XdmValue::from_integer(ctx.position as i64))
}

pub fn fn_last<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if ctx.item.is_none() {
        return Err(XPathError::NoContextItem);
    }
    Ok(XdmValue::from_integer(ctx.size as i64))
}

pub fn fn_local_name<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let result = node_or_context(&args, ctx)?
        .and_then(|n| n.expanded_name())
        .map(|e| e.local)
        .unwrap_or_default();
    Ok(XdmValue::from_string(result))
}

pub fn fn_namespace_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let result = node_or_context(&args, ctx)?
        .and_then(|n| n.expanded_name())
        .and_then(|e| e.uri)
        .unwrap_or_default();
    Ok(XdmValue::from_atomic(AtomicValue::AnyUri(result)))
}

pub fn fn_name<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let result = node_or_context(&args, ctx)?
        .and_then(|n| n.name())
        .map(|q| q.to_string())
        .unwrap_or_default();
    Ok(XdmValue::from_string(result))
}

pub fn fn_node_name<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)? {
        Some(node) => match (node.name(), node.expanded_name()) {
            (Some(q), Some(e)) => Ok(XdmValue::from_atomic(AtomicValue::QName {
                prefix: q.prefix,
                uri: e.uri,
                local: e.local,
            })),
            _ => Ok(XdmValue::empty()),
        },
        None => Ok(XdmValue::empty()),
    }
}

pub fn fn_root<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)? {
        Some(node) => Ok(XdmValue::from_node(node.root())),
        None => Ok(XdmValue::empty()),
    }
}

pub fn fn_base_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)?.and_then(|n| n.base_uri()) {
        Some(uri) => Ok(XdmValue::from_atomic(AtomicValue::AnyUri(uri))),
        None => Ok(XdmValue::empty()),
    }
}

pub fn fn_document_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)?.and_then(|n| n.document_uri()) {
        Some(uri) => Ok(XdmValue::from_atomic(AtomicValue::AnyUri(uri))),
        None => Ok(XdmValue::empty()),
    }
}

pub fn fn_has_children<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)? {
        Some(node) => Ok(XdmValue::from_boolean(node.children().next().is_some())),
        None => Ok(XdmValue::from_boolean(false)),
    }
}

pub fn fn_path<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let node = match node_or_context(&args, ctx)? {
        Some(node) => node,
        None => return Ok(XdmValue::empty()),
    };
    let mut segments = Vec::new();
    let mut current = node;
    while let Some(parent) = current.parent() {
        let segment = match current.node_kind() {
            NodeKind::Element => {
                let name = current.expanded_name().expect("elements are named");
                let position = parent
                    .children()
                    .filter(|sibling| sibling.expanded_name().as_ref() == Some(&name))
                    .position(|sibling| sibling == current)
                    .map(|index| index + 1)
                    .unwrap_or(1);
                format!(
                    "/Q{{{}}}{}[{}]",
                    name.uri.as_deref().unwrap_or(""),
                    name.local,
                    position
                )
            }
            NodeKind::Attribute => match current.expanded_name() {
                Some(name) => format!(
                    "/@Q{{{}}}{}",
                    name.uri.as_deref().unwrap_or(""),
                    name.local
                ),
                None => "/@?".to_string(),
            },
            NodeKind::Text => "/text()[1]".to_string(),
            NodeKind::Comment => "/comment()[1]".to_string(),
            NodeKind::ProcessingInstruction => "/processing-instruction()[1]".to_string(),
            _ => String::new(),
        };
        segments.push(segment);
        current = parent;
    }
    segments.reverse();
    let path = if segments.is_empty() {
        "/".to_string()
    } else {
        segments.concat()
    };
    Ok(XdmValue::from_string(path))
}

/// A string unique per node identity across all documents:
/// `d{doc-hash}n{doc-order}`.
pub fn fn_generate_id<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match node_or_context(&args, ctx)? {
        Some(node) => {
            let order = node.document_order();
            Ok(XdmValue::from_string(format!(
                "d{:x}n{:x}",
                order >> 32,
                order & 0xffff_ffff
            )))
        }
        None => Ok(XdmValue::from_string("")),
    }
}

fn id_tokens<N: SourceNode>(args: &[XdmValue<N>]) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    for atomic in args[0].atomized()? {
        for token in atomic.to_string_value().split_ascii_whitespace() {
            tokens.push(token.to_string());
        }
    }
    Ok(tokens)
}

fn id_root<N: SourceNode>(
    args: &[XdmValue<N>],
    ctx: &EvaluationContext<'_, N>,
) -> Result<N> {
    let node = if args.len() > 1 {
        node_or_context(&args[1..], ctx)?.ok_or(XPathError::NoContextItem)?
    } else {
        ctx.context_node()?
    };
    Ok(node.root())
}

fn is_id_attribute<N: SourceNode>(attr: &N) -> bool {
    match attr.expanded_name() {
        Some(name) => {
            name.local == "id"
                && (name.uri.is_none() || name.uri.as_deref() == Some(stilo_xdm::XML_NAMESPACE))
        }
        None => false,
    }
}

pub fn fn_id<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let tokens = id_tokens(&args)?;
    let root = id_root(&args, ctx)?;
    let mut matched = Vec::new();
    for node in root.descendants_or_self() {
        if node.node_kind() != NodeKind::Element {
            continue;
        }
        let hit = node
            .attributes()
            .any(|attr| is_id_attribute(&attr) && tokens.contains(&attr.string_value()));
        if hit {
            matched.push(node);
        }
    }
    Ok(XdmValue::from_nodes(matched))
}

pub fn fn_idref<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let tokens = id_tokens(&args)?;
    let root = id_root(&args, ctx)?;
    let mut matched = Vec::new();
    for node in root.descendants_or_self() {
        for attr in node.attributes() {
            let is_idref = attr
                .expanded_name()
                .map(|name| name.local == "idref" || name.local == "idrefs")
                .unwrap_or(false);
            if is_idref
                && attr
                    .string_value()
                    .split_ascii_whitespace()
                    .any(|token| tokens.iter().any(|t| t == token))
            {
                matched.push(attr);
            }
        }
    }
    Ok(XdmValue::from_nodes(matched))
}

pub fn fn_qname<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let uri = match optional_atomic_arg(&args, 0)? {
        Some(value) => {
            let text = value.to_string_value();
            if text.is_empty() { None } else { Some(text) }
        }
        None => None,
    };
    let lexical = string_arg(&args, 1);
    let qname =
        QName::parse(&lexical).map_err(|_| XPathError::InvalidQName(lexical.clone()))?;
    if qname.prefix.is_some() && uri.is_none() {
        return Err(XPathError::InvalidQName(lexical));
    }
    Ok(XdmValue::from_atomic(AtomicValue::QName {
        prefix: qname.prefix,
        uri,
        local: qname.local,
    }))
}

pub fn fn_resolve_qname<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let lexical = string_arg(&args, 0);
    let qname =
        QName::parse(&lexical).map_err(|_| XPathError::InvalidQName(lexical.clone()))?;
    let element = args[1]
        .first()
        .and_then(XdmItem::as_node)
        .cloned()
        .ok_or_else(|| XPathError::type_error("resolve-QName requires an element"))?;
    let scope = element.in_scope_namespaces();
    let uri = match &qname.prefix {
        Some(prefix) => Some(
            scope
                .iter()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.clone())
                .ok_or_else(|| XPathError::NoNamespaceForPrefix(prefix.clone()))?,
        ),
        None => scope
            .iter()
            .find(|(p, _)| p.is_empty())
            .map(|(_, uri)| uri.clone()),
    };
    Ok(XdmValue::from_atomic(AtomicValue::QName {
        prefix: qname.prefix,
        uri,
        local: qname.local,
    }))
}

fn qname_arg<N: SourceNode>(args: &[XdmValue<N>]) -> Result<Option<AtomicValue>> {
    match optional_atomic_arg(args, 0)? {
        None => Ok(None),
        Some(q @ AtomicValue::QName { .. }) => Ok(Some(q)),
        Some(other) => Err(XPathError::type_mismatch(
            "expected xs:QName",
            "xs:QName",
            other.type_name(),
        )),
    }
}

pub fn fn_prefix_from_qname<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match qname_arg(&args)? {
        Some(AtomicValue::QName {
            prefix: Some(p), ..
        }) => Ok(XdmValue::from_string(p)),
        _ => Ok(XdmValue::empty()),
    }
}

pub fn fn_local_name_from_qname<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match qname_arg(&args)? {
        Some(AtomicValue::QName { local, .. }) => Ok(XdmValue::from_string(local)),
        _ => Ok(XdmValue::empty()),
    }
}

pub fn fn_namespace_uri_from_qname<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    match qname_arg(&args)? {
        Some(AtomicValue::QName { uri, .. }) => Ok(XdmValue::from_atomic(AtomicValue::AnyUri(
            uri.unwrap_or_default(),
        ))),
        _ => Ok(XdmValue::empty()),
    }
}

pub fn fn_in_scope_prefixes<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let element = args[0]
        .first()
        .and_then(XdmItem::as_node)
        .cloned()
        .ok_or_else(|| XPathError::type_error("in-scope-prefixes requires an element"))?;
    let mut out = XdmValue::empty();
    for (prefix, _) in element.in_scope_namespaces() {
        out.push(XdmItem::Atomic(AtomicValue::String(prefix)));
    }
    Ok(out)
}

pub fn fn_namespace_uri_for_prefix<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let prefix = string_arg(&args, 0);
    let element = args[1]
        .first()
        .and_then(XdmItem::as_node)
        .cloned()
        .ok_or_else(|| XPathError::type_error("namespace-uri-for-prefix requires an element"))?;
    let uri = element
        .in_scope_namespaces()
        .into_iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| uri);
    Ok(match uri {
        Some(uri) => XdmValue::from_atomic(AtomicValue::AnyUri(uri)),
        None => XdmValue::empty(),
    })
}
