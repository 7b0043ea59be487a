//! Boolean functions.

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::Result;
use crate::functions::{ArgType, Table, def, node_or_context, string_arg};
use crate::types::XdmValue;

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "true", 0, Some(0), &[], fn_true);
    def(table, "false", 0, Some(0), &[], fn_false);
    def(table, "not", 1, Some(1), &[ArgType::Any], fn_not);
    def(table, "boolean", 1, Some(1), &[ArgType::Any], fn_boolean);
    def(table, "lang", 1, Some(2), &[ArgType::Any, ArgType::NodeSet], fn_lang);
}

pub fn fn_true<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(true))
}

pub fn fn_false<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(false))
}

pub fn fn_not<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(!args[0].effective_boolean_value()?))
}

pub fn fn_boolean<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_boolean(args[0].effective_boolean_value()?))
}

/// Walks ancestor-or-self for `xml:lang`; matches exactly or on the
/// language subtag before `-`, case-insensitively.
pub fn fn_lang<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let wanted = string_arg(&args, 0).to_ascii_lowercase();
    let node = if args.len() > 1 {
        node_or_context(&args[1..], ctx)?
    } else {
        Some(ctx.context_node()?)
    };
    let actual = node
        .and_then(|n| n.language())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let matched = !actual.is_empty()
        && (actual == wanted
            || actual
                .split_once('-')
                .map(|(primary, _)| primary == wanted)
                .unwrap_or(false));
    Ok(XdmValue::from_boolean(matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{SourceNode, XmlTree};

    #[test]
    fn lang_matches_subtag_prefix() {
        let tree = XmlTree::parse("<doc xml:lang=\"en-US\"><p/></doc>").unwrap();
        let p = tree
            .root()
            .descendants()
            .find(|n| n.expanded_name().map(|e| e.local == "p").unwrap_or(false))
            .unwrap();
        let ctx = EvaluationContext::new().with_context_node(p);
        for (test, expected) in [("en", true), ("EN-us", true), ("fr", false)] {
            let out = fn_lang(vec![XdmValue::from_string(test)], &ctx).unwrap();
            assert_eq!(out.effective_boolean_value().unwrap(), expected, "{}", test);
        }
    }
}
