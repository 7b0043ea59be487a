//! Accumulator evaluation.
//!
//! Snapshots are computed on first access for a `(name, document root)`
//! pair by one document traversal. The pre-descent value of a node
//! includes its own phase=start rule; the post-descent value includes its
//! children and its phase=end rule. Rules see the running value as
//! `$value` with the matched node as focus.

use std::collections::HashMap;

use stilo_xdm::{NodeKind, SourceNode, XmlNode};
use stilo_xpath::error::Result;
use stilo_xpath::{EvaluationContext, XdmValue, evaluate};

use crate::stylesheet::{AccumulatorDecl, AccumulatorPhase, AccumulatorRule};

/// Per-node `(before, after)` values keyed by document order.
#[derive(Debug, Default)]
pub struct AccumulatorSnapshots {
    before: HashMap<u64, XdmValue<XmlNode>>,
    after: HashMap<u64, XdmValue<XmlNode>>,
}

impl AccumulatorSnapshots {
    pub fn before(&self, node: &XmlNode) -> Option<&XdmValue<XmlNode>> {
        self.before.get(&node.document_order())
    }

    pub fn after(&self, node: &XmlNode) -> Option<&XdmValue<XmlNode>> {
        self.after.get(&node.document_order())
    }
}

pub fn build_accumulator(
    declaration: &AccumulatorDecl,
    root: &XmlNode,
    ctx: &EvaluationContext<'_, XmlNode>,
) -> Result<AccumulatorSnapshots> {
    log::debug!("building accumulator '{}'", declaration.name);
    let scope = ctx.with_current_node(root.clone());
    let initial = evaluate(&declaration.initial, &scope)?;
    let mut snapshots = AccumulatorSnapshots::default();
    walk(declaration, root, initial, ctx, &mut snapshots)?;
    Ok(snapshots)
}

fn apply_rule(
    rule: &AccumulatorRule,
    node: &XmlNode,
    value: XdmValue<XmlNode>,
    ctx: &EvaluationContext<'_, XmlNode>,
) -> Result<XdmValue<XmlNode>> {
    let scope = ctx
        .with_current_node(node.clone())
        .bind_variable("value", value);
    evaluate(&rule.select, &scope)
}

fn first_matching<'d>(
    declaration: &'d AccumulatorDecl,
    node: &XmlNode,
    phase: AccumulatorPhase,
) -> Option<&'d AccumulatorRule> {
    declaration
        .rules
        .iter()
        .find(|rule| rule.phase == phase && rule.pattern.matches(node))
}

fn walk(
    declaration: &AccumulatorDecl,
    node: &XmlNode,
    mut value: XdmValue<XmlNode>,
    ctx: &EvaluationContext<'_, XmlNode>,
    snapshots: &mut AccumulatorSnapshots,
) -> Result<XdmValue<XmlNode>> {
    if let Some(rule) = first_matching(declaration, node, AccumulatorPhase::Start) {
        value = apply_rule(rule, node, value, ctx)?;
    }
    snapshots.before.insert(node.document_order(), value.clone());

    // attributes observe the element's pre-descent value
    if node.node_kind() == NodeKind::Element {
        for attribute in node.attributes() {
            snapshots
                .before
                .insert(attribute.document_order(), value.clone());
            snapshots
                .after
                .insert(attribute.document_order(), value.clone());
        }
    }

    for child in node.children() {
        value = walk(declaration, &child, value, ctx, snapshots)?;
    }

    if let Some(rule) = first_matching(declaration, node, AccumulatorPhase::End) {
        value = apply_rule(rule, node, value, ctx)?;
    }
    snapshots.after.insert(node.document_order(), value.clone());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{ExpandedName, Namespaces, XmlTree};
    use stilo_xpath::parse_expression;

    use crate::pattern::Pattern;

    fn counter() -> AccumulatorDecl {
        AccumulatorDecl {
            name: ExpandedName::local("count-items"),
            initial: parse_expression("0").unwrap(),
            rules: vec![AccumulatorRule {
                pattern: Pattern::parse("item", &Namespaces::new()).unwrap(),
                phase: AccumulatorPhase::Start,
                select: parse_expression("$value + 1").unwrap(),
            }],
        }
    }

    fn items(root: &XmlNode) -> Vec<XmlNode> {
        root.descendants()
            .filter(|n| n.expanded_name().map(|e| e.local == "item").unwrap_or(false))
            .collect()
    }

    #[test]
    fn running_count_over_document_order() {
        let tree = XmlTree::parse("<doc><item/><item/><item/></doc>").unwrap();
        let root = tree.root();
        let ctx = EvaluationContext::new().with_context_node(root.clone());
        let snapshots = build_accumulator(&counter(), &root, &ctx).unwrap();
        let items = items(&root);
        // pre-descent value includes the node's own start rule
        assert_eq!(snapshots.before(&items[0]).unwrap().to_double(), 1.0);
        assert_eq!(snapshots.before(&items[2]).unwrap().to_double(), 3.0);
        // the document node's post-descent value is the final count
        assert_eq!(snapshots.after(&root).unwrap().to_double(), 3.0);
    }

    #[test]
    fn end_phase_rules_fire_after_children() {
        let declaration = AccumulatorDecl {
            name: ExpandedName::local("depth"),
            initial: parse_expression("''").unwrap(),
            rules: vec![
                AccumulatorRule {
                    pattern: Pattern::parse("*", &Namespaces::new()).unwrap(),
                    phase: AccumulatorPhase::Start,
                    select: parse_expression("concat($value, '<')").unwrap(),
                },
                AccumulatorRule {
                    pattern: Pattern::parse("*", &Namespaces::new()).unwrap(),
                    phase: AccumulatorPhase::End,
                    select: parse_expression("concat($value, '>')").unwrap(),
                },
            ],
        };
        let tree = XmlTree::parse("<a><b/></a>").unwrap();
        let root = tree.root();
        let ctx = EvaluationContext::new().with_context_node(root.clone());
        let snapshots = build_accumulator(&declaration, &root, &ctx).unwrap();
        assert_eq!(snapshots.after(&root).unwrap().to_string_value(), "<<>>");
    }
}
