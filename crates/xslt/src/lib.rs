//! XSLT 3.0 transformation runtime for the stilo engine.
//!
//! The stylesheet compiler (out of tree) produces a
//! [`stylesheet::CompiledStylesheet`]; a [`transform::TransformContext`]
//! then serves one transformation run, implementing the evaluator's
//! runtime hooks: key indexes ([`keys`]), the document cache
//! ([`document`]), accumulator snapshots ([`accumulator`]), user-defined
//! functions with memoization, and system properties. Constructed content
//! buffers through [`output::RtfBuffer`] until it is read as a document
//! node.

pub mod accumulator;
pub mod document;
pub mod error;
pub mod keys;
pub mod output;
pub mod pattern;
pub mod stylesheet;
pub mod transform;

pub use document::{FileResolver, MemoryResolver, ResourceResolver};
pub use error::XsltError;
pub use output::{EventSink, OutputEvent, RtfBuffer};
pub use pattern::Pattern;
pub use stylesheet::{
    AccumulatorDecl, AccumulatorPhase, AccumulatorRule, CompiledStylesheet, FunctionParam,
    KeyDefinition, StylesheetBuilder, UserFunction,
};
pub use transform::TransformContext;
