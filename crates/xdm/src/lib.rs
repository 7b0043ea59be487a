//! Data-model foundation for the stilo transformation engine.
//!
//! This crate defines the pieces every other layer builds on: qualified and
//! expanded names, the read-only [`SourceNode`] tree contract with the
//! thirteen XPath axes, string collations, and an owned XML tree
//! implementation backed by `roxmltree` for parsing and by [`TreeBuilder`]
//! for programmatic construction (result tree fragments).

pub mod collation;
pub mod datasource;
pub mod error;
pub mod name;

pub use collation::Collation;
pub use datasource::xml::{ParseOptions, TreeBuilder, XmlNode, XmlTree};
pub use datasource::{Axis, NodeKind, SourceNode};
pub use error::XdmError;
pub use name::{ExpandedName, Namespaces, QName};

/// Namespace URI bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The XPath/XQuery functions and operators namespace (`fn`).
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
/// XML Schema datatypes namespace (`xs`).
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// Math functions namespace (`math`).
pub const MATH_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/math";
/// Map functions namespace (`map`).
pub const MAP_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/map";
/// Array functions namespace (`array`).
pub const ARRAY_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/array";
/// The XSLT namespace (`xsl`).
pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
