//! Key index construction.
//!
//! An index is materialized on first access for a `(key name, document
//! root)` pair and never invalidated within a run. The walk visits every
//! element and its attributes, filters by the key's match pattern, and
//! evaluates the `use` expression with the candidate pinned as the current
//! node. Values are compared through the collation's canonical key form;
//! matched nodes are deduplicated by identity in document order.

use indexmap::IndexMap;

use stilo_xdm::{Collation, NodeKind, SourceNode, XmlNode};
use stilo_xpath::error::Result;
use stilo_xpath::{EvaluationContext, evaluate};

use crate::stylesheet::KeyDefinition;

/// Collation key form of a use-expression value, mapped to the matching
/// nodes in document order.
pub type KeyIndex = IndexMap<String, Vec<XmlNode>>;

pub fn build_key_index(
    definitions: &[KeyDefinition],
    root: &XmlNode,
    collation: &Collation,
    ctx: &EvaluationContext<'_, XmlNode>,
) -> Result<KeyIndex> {
    let mut index = KeyIndex::new();
    for node in root.descendants_or_self() {
        if node.node_kind() != NodeKind::Element {
            continue;
        }
        index_candidate(&node, definitions, collation, ctx, &mut index)?;
        for attribute in node.attributes() {
            index_candidate(&attribute, definitions, collation, ctx, &mut index)?;
        }
    }
    Ok(index)
}

fn index_candidate(
    candidate: &XmlNode,
    definitions: &[KeyDefinition],
    collation: &Collation,
    ctx: &EvaluationContext<'_, XmlNode>,
    index: &mut KeyIndex,
) -> Result<()> {
    for definition in definitions {
        if !definition.pattern.matches(candidate) {
            continue;
        }
        // the candidate is both focus and current node for `use`
        let scope = ctx.with_current_node(candidate.clone());
        let values = evaluate(&definition.use_expr, &scope)?;
        for atomic in values.atomized()? {
            let key = collation.key(&atomic.to_string_value());
            let entry = index.entry(key).or_default();
            if entry.last() != Some(candidate) {
                entry.push(candidate.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{Namespaces, XmlTree};
    use stilo_xpath::parse_expression;

    use crate::pattern::Pattern;

    fn definition(pattern: &str, use_expr: &str) -> KeyDefinition {
        KeyDefinition {
            pattern: Pattern::parse(pattern, &Namespaces::new()).unwrap(),
            use_expr: parse_expression(use_expr).unwrap(),
            collation: None,
        }
    }

    #[test]
    fn index_covers_elements_and_attributes() {
        let tree = XmlTree::parse(
            r#"<doc><item id="a">x</item><item id="b">y</item><item id="a">z</item></doc>"#,
        )
        .unwrap();
        let root = tree.root();
        let ctx = EvaluationContext::new().with_context_node(root.clone());
        let index = build_key_index(
            &[definition("item", "@id")],
            &root,
            &Collation::Codepoint,
            &ctx,
        )
        .unwrap();
        assert_eq!(index.get("a").map(Vec::len), Some(2));
        assert_eq!(index.get("b").map(Vec::len), Some(1));
    }

    #[test]
    fn use_expression_sees_the_candidate_as_current() {
        let tree =
            XmlTree::parse(r#"<doc><e n="1"/><e n="2"/></doc>"#).unwrap();
        let root = tree.root();
        let ctx = EvaluationContext::new().with_context_node(root.clone());
        let index = build_key_index(
            &[definition("e", "concat('k', current()/@n)")],
            &root,
            &Collation::Codepoint,
            &ctx,
        )
        .unwrap();
        assert!(index.contains_key("k1"));
        assert!(index.contains_key("k2"));
    }

    #[test]
    fn collation_canonicalizes_keys() {
        let tree = XmlTree::parse(r#"<doc><e id="ABC"/></doc>"#).unwrap();
        let root = tree.root();
        let ctx = EvaluationContext::new().with_context_node(root.clone());
        let index = build_key_index(
            &[definition("e", "@id")],
            &root,
            &Collation::CaseBlind,
            &ctx,
        )
        .unwrap();
        assert!(index.contains_key(&Collation::CaseBlind.key("abc")));
    }
}
