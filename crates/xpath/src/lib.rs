//! XPath 3.1 evaluator for the stilo transformation engine.
//!
//! The crate is organised the way evaluation flows: [`parser`] (or the
//! stylesheet compiler) produces [`ast::Expression`] trees, [`engine`]
//! walks them under an [`context::EvaluationContext`], leaf operations read
//! the [`types`] value model, and function calls dispatch through
//! [`functions`]. The XSLT runtime plugs in behind
//! [`context::RuntimeHooks`].

pub mod ast;
pub mod context;
pub mod engine;
pub mod error;
pub mod format;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod seqtype;
pub mod types;

pub use context::{ErrorMode, EvaluationContext, RegexMatch, RuntimeHooks};
pub use engine::evaluate;
pub use error::XPathError;
pub use format::DecimalFormat;
pub use parser::{default_static_namespaces, parse_expression, parse_expression_with};
pub use seqtype::{ItemKind, Occurrence, SequenceType};
pub use types::{AtomicType, AtomicValue, XdmArray, XdmFunction, XdmItem, XdmMap, XdmValue};

/// Parses and evaluates an expression in one step; the convenience entry
/// point for hosts and tests.
pub fn evaluate_xpath<N: stilo_xdm::SourceNode>(
    expression: &str,
    ctx: &EvaluationContext<'_, N>,
) -> error::Result<XdmValue<N>> {
    let parsed = parser::parse_expression_with(expression, ctx.namespaces())?;
    engine::evaluate(&parsed, ctx)
}
