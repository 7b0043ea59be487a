//! stilo: an XSLT 3.0 transformation runtime built around an XPath 3.1
//! evaluator.
//!
//! The workspace is layered: [`stilo_xdm`] holds the node model, names and
//! collations; [`stilo_xpath`] the value model, parser, evaluator and
//! function library; [`stilo_xslt`] the transformation runtime (compiled
//! stylesheet, keys, documents, accumulators, user functions, output
//! buffering). This crate re-exports the public surface and offers a
//! one-call evaluation helper.

pub use stilo_xdm as xdm;
pub use stilo_xpath as xpath;
pub use stilo_xslt as xslt;

pub use stilo_xdm::{Collation, ExpandedName, Namespaces, QName, SourceNode, XmlNode, XmlTree};
pub use stilo_xpath::{
    AtomicValue, EvaluationContext, XPathError, XdmItem, XdmValue, evaluate_xpath,
};
pub use stilo_xslt::{CompiledStylesheet, TransformContext, XsltError};

/// Parses `source` (when given), then parses and evaluates `expression`
/// against it with a bare runtime: full function library, document
/// loading from the filesystem, no stylesheet declarations.
pub fn evaluate(
    expression: &str,
    source: Option<&str>,
) -> Result<XdmValue<XmlNode>, XsltError> {
    let runtime = TransformContext::bare();
    let mut ctx = runtime.context();
    let tree;
    if let Some(xml) = source {
        tree = XmlTree::parse(xml)?;
        ctx = ctx.with_current_node(tree.root());
    }
    Ok(evaluate_xpath(expression, &ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_call_evaluation() {
        let out = evaluate("count(//item)", Some("<doc><item/><item/></doc>")).unwrap();
        assert_eq!(out.to_double(), 2.0);
        let out = evaluate("1 + 1", None).unwrap();
        assert_eq!(out.to_double(), 2.0);
    }
}
