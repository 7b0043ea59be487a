//! The runtime-facing compiled stylesheet: the declarations the evaluator
//! consumes, exposed by lookup. Construction is builder-style since the
//! stylesheet compiler lives outside this crate.

use std::sync::Arc;

use indexmap::IndexMap;

use stilo_xdm::{ExpandedName, Namespaces, SourceNode, XmlTree};
use stilo_xpath::DecimalFormat;
use stilo_xpath::SequenceType;
use stilo_xpath::ast::{Expression, NameTest};

use crate::pattern::Pattern;

/// One `xsl:key` declaration; several may share a name.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub pattern: Pattern,
    pub use_expr: Expression,
    pub collation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionParam {
    pub name: String,
    pub seq_type: Option<SequenceType>,
}

/// A stylesheet function (`xsl:function`).
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: ExpandedName,
    pub params: Vec<FunctionParam>,
    pub return_type: Option<SequenceType>,
    /// `cache="yes"`: memoize on the string form of the arguments.
    pub cache: bool,
    pub body: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorPhase {
    Start,
    End,
}

#[derive(Debug, Clone)]
pub struct AccumulatorRule {
    pub pattern: Pattern,
    pub phase: AccumulatorPhase,
    pub select: Expression,
}

#[derive(Debug, Clone)]
pub struct AccumulatorDecl {
    pub name: ExpandedName,
    pub initial: Expression,
    pub rules: Vec<AccumulatorRule>,
}

/// Everything the runtime needs from a compiled stylesheet.
#[derive(Debug, Default)]
pub struct CompiledStylesheet {
    keys: IndexMap<ExpandedName, Vec<KeyDefinition>>,
    decimal_formats: IndexMap<Option<ExpandedName>, DecimalFormat>,
    functions: IndexMap<(ExpandedName, usize), Arc<UserFunction>>,
    accumulators: IndexMap<ExpandedName, AccumulatorDecl>,
    strip_space: Vec<NameTest>,
    preserve_space: Vec<NameTest>,
    pub package_name: Option<String>,
    pub package_version: Option<String>,
    pub base_uri: Option<String>,
    pub namespaces: Namespaces,
    stylesheet_document: Option<Arc<XmlTree>>,
}

impl CompiledStylesheet {
    pub fn builder() -> StylesheetBuilder {
        StylesheetBuilder {
            stylesheet: CompiledStylesheet::default(),
        }
    }

    pub fn key_definitions(&self, name: &ExpandedName) -> Option<&[KeyDefinition]> {
        self.keys.get(name).map(Vec::as_slice)
    }

    pub fn has_key(&self, name: &ExpandedName) -> bool {
        self.keys.contains_key(name)
    }

    pub fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<&DecimalFormat> {
        self.decimal_formats.get(&name.cloned())
    }

    pub fn function(&self, name: &ExpandedName, arity: usize) -> Option<&Arc<UserFunction>> {
        self.functions.get(&(name.clone(), arity))
    }

    pub fn accumulator(&self, name: &ExpandedName) -> Option<&AccumulatorDecl> {
        self.accumulators.get(name)
    }

    pub fn stylesheet_document(&self) -> Option<&Arc<XmlTree>> {
        self.stylesheet_document.as_ref()
    }

    /// Whether whitespace-only text under an element with this name is
    /// stripped: `strip-space` matches and `preserve-space` does not.
    pub fn should_strip(&self, element: &ExpandedName) -> bool {
        let hits = |tests: &[NameTest]| tests.iter().any(|t| t.matches(Some(element)));
        hits(&self.strip_space) && !hits(&self.preserve_space)
    }
}

pub struct StylesheetBuilder {
    stylesheet: CompiledStylesheet,
}

impl StylesheetBuilder {
    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.stylesheet.namespaces = namespaces;
        self
    }

    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.stylesheet.base_uri = Some(uri.into());
        self
    }

    pub fn package(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.stylesheet.package_name = Some(name.into());
        self.stylesheet.package_version = Some(version.into());
        self
    }

    pub fn key(mut self, name: ExpandedName, definition: KeyDefinition) -> Self {
        self.stylesheet.keys.entry(name).or_default().push(definition);
        self
    }

    pub fn decimal_format(mut self, name: Option<ExpandedName>, format: DecimalFormat) -> Self {
        self.stylesheet.decimal_formats.insert(name, format);
        self
    }

    pub fn function(mut self, function: UserFunction) -> Self {
        self.stylesheet.functions.insert(
            (function.name.clone(), function.params.len()),
            Arc::new(function),
        );
        self
    }

    pub fn accumulator(mut self, declaration: AccumulatorDecl) -> Self {
        self.stylesheet
            .accumulators
            .insert(declaration.name.clone(), declaration);
        self
    }

    pub fn strip_space(mut self, test: NameTest) -> Self {
        self.stylesheet.strip_space.push(test);
        self
    }

    pub fn preserve_space(mut self, test: NameTest) -> Self {
        self.stylesheet.preserve_space.push(test);
        self
    }

    pub fn stylesheet_document(mut self, document: Arc<XmlTree>) -> Self {
        self.stylesheet.stylesheet_document = Some(document);
        self
    }

    pub fn build(self) -> Arc<CompiledStylesheet> {
        Arc::new(self.stylesheet)
    }
}

/// Strips whitespace per the stylesheet rules when loading a document.
pub fn strip_rule(
    stylesheet: &CompiledStylesheet,
) -> impl Fn(&ExpandedName) -> bool + '_ {
    move |element| stylesheet.should_strip(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_space_honors_preserve_overrides() {
        let stylesheet = CompiledStylesheet::builder()
            .strip_space(NameTest::Any)
            .preserve_space(NameTest::Exact(ExpandedName::local("pre")))
            .build();
        assert!(stylesheet.should_strip(&ExpandedName::local("para")));
        assert!(!stylesheet.should_strip(&ExpandedName::local("pre")));
    }

    #[test]
    fn key_definitions_with_the_same_name_accumulate() {
        let ns = Namespaces::new();
        let definition = || KeyDefinition {
            pattern: Pattern::parse("item", &ns).unwrap(),
            use_expr: stilo_xpath::parse_expression("@id").unwrap(),
            collation: None,
        };
        let name = ExpandedName::new("http://x", "k");
        let stylesheet = CompiledStylesheet::builder()
            .key(name.clone(), definition())
            .key(name.clone(), definition())
            .build();
        assert_eq!(stylesheet.key_definitions(&name).unwrap().len(), 2);
    }
}
