//! The transform context: per-run state and the implementation of the
//! evaluator's runtime hooks.
//!
//! One `TransformContext` serves one transformation. It owns the compiled
//! stylesheet, the resource resolver, and the lazily built per-run caches:
//! key indexes, accumulator snapshots, and the user-function memo table.
//! Contexts are thread-confined; the document cache underneath is the only
//! process-wide piece.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use stilo_xdm::{Collation, ExpandedName, Namespaces, SourceNode, XmlNode, XmlTree};
use stilo_xpath::error::Result;
use stilo_xpath::functions::xslt::default_system_property;
use stilo_xpath::{
    DecimalFormat, EvaluationContext, RuntimeHooks, XPathError, XdmValue, evaluate,
};

use crate::accumulator::{AccumulatorSnapshots, build_accumulator};
use crate::document::{FileResolver, ResourceResolver, load_document, unparsed_text};
use crate::keys::{KeyIndex, build_key_index};
use crate::stylesheet::CompiledStylesheet;

pub struct TransformContext {
    stylesheet: Arc<CompiledStylesheet>,
    resolver: Arc<dyn ResourceResolver>,
    key_indexes: RefCell<HashMap<(ExpandedName, u64), Rc<KeyIndex>>>,
    accumulators: RefCell<HashMap<(ExpandedName, u64), Rc<AccumulatorSnapshots>>>,
    function_memo: RefCell<HashMap<String, XdmValue<XmlNode>>>,
}

impl TransformContext {
    pub fn new(stylesheet: Arc<CompiledStylesheet>) -> Self {
        Self::with_resolver(stylesheet, Arc::new(FileResolver))
    }

    /// A context with no stylesheet: plain XPath evaluation that still has
    /// document loading and tree construction.
    pub fn bare() -> Self {
        Self::new(CompiledStylesheet::builder().build())
    }

    pub fn with_resolver(
        stylesheet: Arc<CompiledStylesheet>,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            stylesheet,
            resolver,
            key_indexes: RefCell::new(HashMap::new()),
            accumulators: RefCell::new(HashMap::new()),
            function_memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn stylesheet(&self) -> &Arc<CompiledStylesheet> {
        &self.stylesheet
    }

    /// The namespace bindings evaluation starts from: the conventional
    /// prefixes overlaid with the stylesheet's own.
    fn static_namespaces(&self) -> Namespaces {
        let mut namespaces = stilo_xpath::default_static_namespaces();
        for (prefix, uri) in self.stylesheet.namespaces.bindings() {
            namespaces = namespaces.bind(prefix, uri);
        }
        if let Some(uri) = self.stylesheet.namespaces.default_element() {
            namespaces = namespaces.with_default_element(uri);
        }
        namespaces
    }

    /// A fresh evaluation context wired to this runtime.
    pub fn context(&self) -> EvaluationContext<'_, XmlNode> {
        let mut ctx = EvaluationContext::new()
            .with_namespaces(self.static_namespaces())
            .with_hooks(self);
        if let Some(base) = &self.stylesheet.base_uri {
            ctx = ctx.with_static_base_uri(base.clone());
        }
        ctx
    }

    fn root_key(root: &XmlNode) -> u64 {
        root.document_order()
    }

    fn key_index(
        &self,
        name: &ExpandedName,
        collation: &Collation,
        root: &XmlNode,
        ctx: &EvaluationContext<'_, XmlNode>,
    ) -> Result<Rc<KeyIndex>> {
        let cache_key = (name.clone(), Self::root_key(root));
        if let Some(index) = self.key_indexes.borrow().get(&cache_key) {
            return Ok(Rc::clone(index));
        }
        let definitions = self
            .stylesheet
            .key_definitions(name)
            .ok_or_else(|| XPathError::UnknownKey(name.clark()))?;
        // the key's own collation wins over the caller's
        let collation = match definitions.iter().find_map(|d| d.collation.as_deref()) {
            Some(uri) => {
                Collation::for_uri(uri).map_err(|_| XPathError::UnknownCollation(uri.to_string()))?
            }
            None => collation.clone(),
        };
        // mark in-progress across the build so a self-referential `use`
        // expression trips the cycle error
        ctx.begin_key(name)?;
        let built = build_key_index(definitions, root, &collation, ctx);
        ctx.end_key(name);
        let index = Rc::new(built?);
        self.key_indexes
            .borrow_mut()
            .insert(cache_key, Rc::clone(&index));
        Ok(index)
    }
}

impl RuntimeHooks<XmlNode> for TransformContext {
    fn key_nodes(
        &self,
        name: &ExpandedName,
        values: &XdmValue<XmlNode>,
        collation: &Collation,
        root: &XmlNode,
        ctx: &EvaluationContext<'_, XmlNode>,
    ) -> Result<Vec<XmlNode>> {
        let index = self.key_index(name, collation, root, ctx)?;
        let mut out = Vec::new();
        for atomic in values.atomized()? {
            let lookup = collation.key(&atomic.to_string_value());
            if let Some(nodes) = index.get(&lookup) {
                out.extend(nodes.iter().cloned());
            }
        }
        Ok(out)
    }

    fn has_key(&self, name: &ExpandedName) -> bool {
        self.stylesheet.has_key(name)
    }

    fn load_document(&self, href: &str, base: Option<&str>) -> Result<Option<XmlNode>> {
        let base = base.or(self.stylesheet.base_uri.as_deref());
        let stylesheet = Arc::clone(&self.stylesheet);
        let strip = move |name: &ExpandedName| stylesheet.should_strip(name);
        let tree = load_document(self.resolver.as_ref(), href, base, Some(&strip))?;
        Ok(Some(tree.root()))
    }

    fn stylesheet_document(&self) -> Option<XmlNode> {
        self.stylesheet.stylesheet_document().map(|tree| tree.root())
    }

    fn unparsed_text(
        &self,
        href: &str,
        encoding: Option<&str>,
        base: Option<&str>,
    ) -> Result<String> {
        let base = base.or(self.stylesheet.base_uri.as_deref());
        unparsed_text(self.resolver.as_ref(), href, encoding, base)
    }

    fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<DecimalFormat> {
        match self.stylesheet.decimal_format(name) {
            Some(format) => Some(format.clone()),
            // the unnamed format defaults when never declared
            None if name.is_none() => Some(DecimalFormat::default()),
            None => None,
        }
    }

    fn call_user_function(
        &self,
        name: &ExpandedName,
        args: Vec<XdmValue<XmlNode>>,
        ctx: &EvaluationContext<'_, XmlNode>,
    ) -> Result<Option<XdmValue<XmlNode>>> {
        let function = match self.stylesheet.function(name, args.len()) {
            Some(function) => Arc::clone(function),
            None => return Ok(None),
        };
        let memo_key = function.cache.then(|| {
            let mut key = format!("{}#{}", name.clark(), args.len());
            for arg in &args {
                key.push('\u{1F}');
                key.push_str(&arg.to_string_value());
            }
            key
        });
        if let Some(key) = &memo_key {
            if let Some(cached) = self.function_memo.borrow().get(key) {
                log::trace!("memoized call {}", key);
                return Ok(Some(cached.clone()));
            }
        }

        let mut frame = HashMap::new();
        for (param, arg) in function.params.iter().zip(args) {
            let value = match &param.seq_type {
                Some(seq_type) => seq_type.coerce(arg, ctx)?,
                None => arg,
            };
            frame.insert(param.name.clone(), value);
        }
        let scope = ctx.function_scope(frame);
        let result = evaluate(&function.body, &scope)?;
        let result = match &function.return_type {
            Some(seq_type) => seq_type.coerce(result, ctx)?,
            None => result,
        };
        if let Some(key) = memo_key {
            self.function_memo.borrow_mut().insert(key, result.clone());
        }
        Ok(Some(result))
    }

    fn user_function_available(&self, name: &ExpandedName, arity: usize) -> bool {
        self.stylesheet.function(name, arity).is_some()
    }

    fn accumulator_value(
        &self,
        name: &ExpandedName,
        node: &XmlNode,
        after: bool,
        ctx: &EvaluationContext<'_, XmlNode>,
    ) -> Result<XdmValue<XmlNode>> {
        let declaration = self
            .stylesheet
            .accumulator(name)
            .ok_or_else(|| XPathError::UnknownAccumulator(name.clark()))?;
        let root = node.root();
        let cache_key = (name.clone(), Self::root_key(&root));
        let snapshots = if let Some(cached) = self.accumulators.borrow().get(&cache_key) {
            Rc::clone(cached)
        } else {
            let built = Rc::new(build_accumulator(declaration, &root, ctx)?);
            self.accumulators
                .borrow_mut()
                .insert(cache_key, Rc::clone(&built));
            built
        };
        let value = if after {
            snapshots.after(node)
        } else {
            snapshots.before(node)
        };
        Ok(value.cloned().unwrap_or_default())
    }

    fn system_property(&self, name: &ExpandedName) -> Option<String> {
        if name.uri.as_deref() == Some(stilo_xdm::XSL_NAMESPACE) {
            match name.local.as_str() {
                "package-name" => return self.stylesheet.package_name.clone(),
                "package-version" => return self.stylesheet.package_version.clone(),
                _ => {}
            }
        }
        default_system_property(name)
    }

    fn parse_xml(&self, text: &str) -> Result<XmlNode> {
        let tree = XmlTree::parse(text).map_err(|err| XPathError::XmlParse(err.to_string()))?;
        Ok(tree.root())
    }

    fn parse_xml_fragment(&self, text: &str) -> Result<XmlNode> {
        let tree =
            XmlTree::parse_fragment(text).map_err(|err| XPathError::XmlParse(err.to_string()))?;
        Ok(tree.root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::Namespaces;
    use stilo_xpath::ast::NameTest;
    use stilo_xpath::{SequenceType, evaluate_xpath, parse_expression};

    use crate::pattern::Pattern;
    use crate::stylesheet::{FunctionParam, KeyDefinition, UserFunction};

    fn key_stylesheet() -> Arc<CompiledStylesheet> {
        CompiledStylesheet::builder()
            .key(
                ExpandedName::new("http://x", "k"),
                KeyDefinition {
                    pattern: Pattern::parse("item", &Namespaces::new()).unwrap(),
                    use_expr: parse_expression("@id").unwrap(),
                    collation: None,
                },
            )
            .build()
    }

    #[test]
    fn key_lookup_through_the_function_library() {
        let runtime = TransformContext::new(key_stylesheet());
        let tree = XmlTree::parse(
            r#"<doc><item id="a">1</item><item id="b">2</item><item id="a">3</item></doc>"#,
        )
        .unwrap();
        let ctx = runtime
            .context()
            .with_namespaces(
                stilo_xpath::default_static_namespaces().bind("p", "http://x"),
            )
            .with_hooks(&runtime)
            .with_context_node(tree.root());
        let out = evaluate_xpath("key('p:k', 'a')", &ctx).unwrap();
        assert_eq!(out.len(), 2);
        let out = evaluate_xpath("string-join(key('p:k', ('a', 'b')), '')", &ctx).unwrap();
        assert_eq!(out.to_string_value(), "123");
    }

    #[test]
    fn key_cycle_is_xtde0640() {
        let stylesheet = CompiledStylesheet::builder()
            .key(
                ExpandedName::new("http://x", "loop"),
                KeyDefinition {
                    pattern: Pattern::parse("item", &Namespaces::new()).unwrap(),
                    use_expr: parse_expression("key('p:loop', 'x')").unwrap(),
                    collation: None,
                },
            )
            .build();
        let runtime = TransformContext::new(stylesheet);
        let tree = XmlTree::parse(r#"<doc><item id="a"/></doc>"#).unwrap();
        let ctx = runtime
            .context()
            .with_namespaces(
                stilo_xpath::default_static_namespaces().bind("p", "http://x"),
            )
            .with_hooks(&runtime)
            .with_context_node(tree.root());
        let err = evaluate_xpath("key('p:loop', 'x')", &ctx).unwrap_err();
        assert_eq!(err.code(), "XTDE0640");
    }

    #[test]
    fn user_functions_dispatch_and_memoize() {
        let stylesheet = CompiledStylesheet::builder()
            .function(UserFunction {
                name: ExpandedName::new("http://example.com/f", "double"),
                params: vec![FunctionParam {
                    name: "n".to_string(),
                    seq_type: Some(
                        SequenceType::parse(
                            "xs:double",
                            &stilo_xpath::default_static_namespaces(),
                        )
                        .unwrap(),
                    ),
                }],
                return_type: None,
                cache: true,
                body: parse_expression("$n * 2").unwrap(),
            })
            .build();
        let runtime = TransformContext::new(stylesheet);
        let ctx = runtime
            .context()
            .with_namespaces(
                stilo_xpath::default_static_namespaces().bind("f", "http://example.com/f"),
            )
            .with_hooks(&runtime);
        let out = evaluate_xpath("f:double(21)", &ctx).unwrap();
        assert_eq!(out.to_double(), 42.0);
        // memo hit returns the same value
        let again = evaluate_xpath("f:double(21)", &ctx).unwrap();
        assert_eq!(again.to_double(), 42.0);
        assert_eq!(runtime.function_memo.borrow().len(), 1);
    }

    #[test]
    fn user_function_return_coercion_is_xtte0505() {
        let stylesheet = CompiledStylesheet::builder()
            .function(UserFunction {
                name: ExpandedName::new("http://example.com/f", "bad"),
                params: vec![],
                return_type: Some(
                    SequenceType::parse(
                        "xs:integer",
                        &stilo_xpath::default_static_namespaces(),
                    )
                    .unwrap(),
                ),
                cache: false,
                body: parse_expression("'not a number'").unwrap(),
            })
            .build();
        let runtime = TransformContext::new(stylesheet);
        let ctx = runtime
            .context()
            .with_namespaces(
                stilo_xpath::default_static_namespaces().bind("f", "http://example.com/f"),
            )
            .with_hooks(&runtime);
        let err = evaluate_xpath("f:bad()", &ctx).unwrap_err();
        assert_eq!(err.code(), "XTTE0505");
    }

    #[test]
    fn strip_space_applies_to_loaded_documents() {
        let stylesheet = CompiledStylesheet::builder()
            .strip_space(NameTest::Any)
            .build();
        let resolver = crate::document::MemoryResolver::new().with(
            "mem://transform-strip/in.xml",
            "<doc>\n  <a> keep </a>\n</doc>",
        );
        let runtime = TransformContext::with_resolver(stylesheet, Arc::new(resolver));
        let root = runtime
            .load_document("mem://transform-strip/in.xml", None)
            .unwrap()
            .unwrap();
        // whitespace-only text between elements is gone, text content kept
        let doc = root.children().next().unwrap();
        assert_eq!(doc.children().count(), 1);
        assert_eq!(doc.string_value(), " keep ");
    }

    #[test]
    fn package_properties_come_from_the_stylesheet() {
        let stylesheet = CompiledStylesheet::builder()
            .package("http://example.com/pkg", "2.1")
            .build();
        let runtime = TransformContext::new(stylesheet);
        let name = ExpandedName::new(stilo_xdm::XSL_NAMESPACE, "package-name");
        assert_eq!(
            runtime.system_property(&name).as_deref(),
            Some("http://example.com/pkg")
        );
        let version = ExpandedName::new(stilo_xdm::XSL_NAMESPACE, "product-name");
        assert_eq!(runtime.system_property(&version).as_deref(), Some("stilo"));
    }
}
