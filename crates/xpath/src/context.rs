//! The evaluation context.
//!
//! Everything an expression can observe lives here: the focus, variable and
//! tunnel-parameter frames, namespace bindings, the pinned XSLT current
//! node, the active regex match, the error-handling mode, and per-run state
//! (key-cycle detection, the current-dateTime snapshot). Contexts are
//! immutable; every derivation returns a new context sharing the prior
//! frames.
//!
//! [`RuntimeHooks`] is the seam to the transformation runtime: key indexes,
//! document loading, user functions, accumulators and system properties all
//! arrive through it. Grouping and merge state travel as reserved
//! variables, so `current-group()` is an ordinary variable read.

use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use stilo_xdm::{Collation, ExpandedName, Namespaces, SourceNode};

use crate::error::{Result, XPathError};
use crate::format::DecimalFormat;
use crate::functions::FunctionRegistry;
use crate::types::datetime::DateTimeValue;
use crate::types::{XdmItem, XdmValue};

/// Reserved variable holding the current group of `for-each-group`.
pub const CURRENT_GROUP: &str = "__current_group__";
/// Reserved variable holding the current grouping key.
pub const CURRENT_GROUPING_KEY: &str = "__current_grouping_key__";
/// Reserved variable holding the current merge group; per-source variants
/// append `:<source-name>`.
pub const CURRENT_MERGE_GROUP: &str = "__current_merge_group__";
/// Reserved variable holding the current merge key.
pub const CURRENT_MERGE_KEY: &str = "__current_merge_key__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    Strict,
    /// Type-coercion failures log a warning and keep the original value.
    Recover,
    /// Type-coercion failures are swallowed.
    Silent,
}

/// Captured groups of the innermost active regex match, for `regex-group`.
#[derive(Debug, Clone, Default)]
pub struct RegexMatch {
    pub groups: Vec<Option<String>>,
}

impl RegexMatch {
    pub fn group(&self, n: usize) -> &str {
        self.groups
            .get(n)
            .and_then(|g| g.as_deref())
            .unwrap_or("")
    }
}

/// State shared by every context derived within one transformation run.
#[derive(Debug, Default)]
pub struct RunState {
    keys_in_progress: RefCell<HashSet<ExpandedName>>,
    current_datetime: OnceCell<DateTimeValue>,
}

/// Services the XSLT runtime provides to the function library.
pub trait RuntimeHooks<N: SourceNode> {
    /// Nodes matched by a key; the full lookup pipeline including index
    /// construction. `None` collation means the default.
    fn key_nodes(
        &self,
        name: &ExpandedName,
        values: &XdmValue<N>,
        collation: &Collation,
        root: &N,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<Vec<N>>;

    fn has_key(&self, name: &ExpandedName) -> bool;

    /// Loads and caches a document; `Ok(None)` signals a swallowed failure
    /// (`document()` semantics), the caller decides whether to raise.
    fn load_document(&self, href: &str, base: Option<&str>) -> Result<Option<N>>;

    /// The stylesheet module itself, for `document('')`.
    fn stylesheet_document(&self) -> Option<N>;

    fn unparsed_text(&self, href: &str, encoding: Option<&str>, base: Option<&str>)
    -> Result<String>;

    fn decimal_format(&self, name: Option<&ExpandedName>) -> Option<DecimalFormat>;

    /// Invokes a stylesheet function; `Ok(None)` when no such function is
    /// declared, so dispatch can fall through.
    fn call_user_function(
        &self,
        name: &ExpandedName,
        args: Vec<XdmValue<N>>,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<Option<XdmValue<N>>>;

    fn user_function_available(&self, name: &ExpandedName, arity: usize) -> bool;

    /// Accumulator snapshot for a node; `after` selects the post-descent
    /// value.
    fn accumulator_value(
        &self,
        name: &ExpandedName,
        node: &N,
        after: bool,
        ctx: &EvaluationContext<'_, N>,
    ) -> Result<XdmValue<N>>;

    fn system_property(&self, name: &ExpandedName) -> Option<String>;

    /// Parses XML text into a document node of the host tree model.
    fn parse_xml(&self, text: &str) -> Result<N>;

    fn parse_xml_fragment(&self, text: &str) -> Result<N>;
}

/// The dynamic context of one evaluation.
pub struct EvaluationContext<'h, N: SourceNode> {
    pub item: Option<XdmItem<N>>,
    pub position: usize,
    pub size: usize,
    /// The XSLT current node: pinned by template/for-each entry, unchanged
    /// by predicate descent.
    pub current_node: Option<N>,
    variables: Vec<Rc<HashMap<String, XdmValue<N>>>>,
    tunnel: Vec<Rc<HashMap<String, XdmValue<N>>>>,
    namespaces: Rc<Namespaces>,
    pub static_base_uri: Option<Rc<String>>,
    default_collation: Rc<Collation>,
    pub implicit_timezone: i32,
    pub error_mode: ErrorMode,
    pub regex_match: Option<Rc<RegexMatch>>,
    run: Rc<RunState>,
    registry: Rc<FunctionRegistry<N>>,
    pub hooks: Option<&'h dyn RuntimeHooks<N>>,
}

impl<N: SourceNode> Clone for EvaluationContext<'_, N> {
    fn clone(&self) -> Self {
        Self {
            item: self.item.clone(),
            position: self.position,
            size: self.size,
            current_node: self.current_node.clone(),
            variables: self.variables.clone(),
            tunnel: self.tunnel.clone(),
            namespaces: Rc::clone(&self.namespaces),
            static_base_uri: self.static_base_uri.clone(),
            default_collation: Rc::clone(&self.default_collation),
            implicit_timezone: self.implicit_timezone,
            error_mode: self.error_mode,
            regex_match: self.regex_match.clone(),
            run: Rc::clone(&self.run),
            registry: Rc::clone(&self.registry),
            hooks: self.hooks,
        }
    }
}

impl<'h, N: SourceNode> EvaluationContext<'h, N> {
    pub fn new() -> Self {
        Self {
            item: None,
            position: 1,
            size: 1,
            current_node: None,
            variables: Vec::new(),
            tunnel: Vec::new(),
            namespaces: Rc::new(crate::parser::default_static_namespaces()),
            static_base_uri: None,
            default_collation: Rc::new(Collation::Codepoint),
            implicit_timezone: 0,
            error_mode: ErrorMode::Strict,
            regex_match: None,
            run: Rc::new(RunState::default()),
            registry: Rc::new(FunctionRegistry::new()),
            hooks: None,
        }
    }

    // --- configuration --------------------------------------------------

    pub fn with_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = Rc::new(namespaces);
        self
    }

    pub fn with_static_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.static_base_uri = Some(Rc::new(uri.into()));
        self
    }

    pub fn with_default_collation(mut self, collation: Collation) -> Self {
        self.default_collation = Rc::new(collation);
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_hooks(mut self, hooks: &'h dyn RuntimeHooks<N>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    // --- focus ----------------------------------------------------------

    pub fn with_focus(&self, item: XdmItem<N>, position: usize, size: usize) -> Self {
        let mut ctx = self.clone();
        ctx.item = Some(item);
        ctx.position = position;
        ctx.size = size;
        ctx
    }

    pub fn with_context_item(&self, item: XdmItem<N>) -> Self {
        self.with_focus(item, 1, 1)
    }

    pub fn with_context_node(&self, node: N) -> Self {
        self.with_context_item(XdmItem::Node(node))
    }

    /// Pins both the focus and the XSLT current node, the template/for-each
    /// entry derivation.
    pub fn with_current_node(&self, node: N) -> Self {
        let mut ctx = self.with_context_node(node.clone());
        ctx.current_node = Some(node);
        ctx
    }

    pub fn context_node(&self) -> Result<N> {
        match &self.item {
            Some(XdmItem::Node(n)) => Ok(n.clone()),
            Some(_) => Err(XPathError::PathOnNonNode),
            None => Err(XPathError::NoContextItem),
        }
    }

    // --- variables ------------------------------------------------------

    pub fn push_variables(&self, frame: HashMap<String, XdmValue<N>>) -> Self {
        let mut ctx = self.clone();
        ctx.variables.push(Rc::new(frame));
        ctx
    }

    pub fn bind_variable(&self, name: impl Into<String>, value: XdmValue<N>) -> Self {
        let mut frame = HashMap::new();
        frame.insert(name.into(), value);
        self.push_variables(frame)
    }

    /// Innermost-first lookup.
    pub fn variable(&self, name: &str) -> Option<&XdmValue<N>> {
        self.variables
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
    }

    /// Every visible binding, innermost shadowing outer; the capture set of
    /// an inline function item.
    pub fn visible_variables(&self) -> Vec<(String, XdmValue<N>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for frame in self.variables.iter().rev() {
            for (name, value) in frame.iter() {
                if seen.insert(name.clone()) {
                    out.push((name.clone(), value.clone()));
                }
            }
        }
        out
    }

    /// A fresh scope for a function body: only the given frame is visible
    /// and the tunnel stack starts with an empty frame.
    pub fn function_scope(&self, frame: HashMap<String, XdmValue<N>>) -> Self {
        let mut ctx = self.clone();
        ctx.variables = vec![Rc::new(frame)];
        ctx.tunnel = vec![Rc::new(HashMap::new())];
        ctx.item = None;
        ctx.current_node = None;
        ctx
    }

    // --- tunnel parameters ---------------------------------------------

    pub fn push_tunnel_frame(&self, frame: HashMap<String, XdmValue<N>>) -> Self {
        let mut ctx = self.clone();
        ctx.tunnel.push(Rc::new(frame));
        ctx
    }

    pub fn tunnel_param(&self, name: &str) -> Option<&XdmValue<N>> {
        self.tunnel.iter().rev().find_map(|frame| frame.get(name))
    }

    // --- grouping and merging ------------------------------------------

    pub fn with_current_group(
        &self,
        group: XdmValue<N>,
        key: Option<XdmValue<N>>,
    ) -> Self {
        let mut frame = HashMap::new();
        frame.insert(CURRENT_GROUP.to_string(), group);
        if let Some(key) = key {
            frame.insert(CURRENT_GROUPING_KEY.to_string(), key);
        }
        self.push_variables(frame)
    }

    pub fn with_merge_group(
        &self,
        merged: XdmValue<N>,
        per_source: Vec<(String, XdmValue<N>)>,
        key: Option<XdmValue<N>>,
    ) -> Self {
        let mut frame = HashMap::new();
        frame.insert(CURRENT_MERGE_GROUP.to_string(), merged);
        for (source, value) in per_source {
            frame.insert(format!("{}:{}", CURRENT_MERGE_GROUP, source), value);
        }
        if let Some(key) = key {
            frame.insert(CURRENT_MERGE_KEY.to_string(), key);
        }
        self.push_variables(frame)
    }

    // --- regex state ----------------------------------------------------

    pub fn with_regex_match(&self, found: RegexMatch) -> Self {
        let mut ctx = self.clone();
        ctx.regex_match = Some(Rc::new(found));
        ctx
    }

    // --- shared accessors ----------------------------------------------

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn default_collation(&self) -> &Collation {
        &self.default_collation
    }

    /// Resolves a collation URI argument; `None` means the default.
    pub fn resolve_collation(&self, uri: Option<&str>) -> Result<Collation> {
        match uri {
            None => Ok((*self.default_collation).clone()),
            Some(uri) => {
                Collation::for_uri(uri).map_err(|_| XPathError::UnknownCollation(uri.to_string()))
            }
        }
    }

    pub(crate) fn registry(&self) -> &FunctionRegistry<N> {
        &self.registry
    }

    /// Stable for the whole run; captured at first observation.
    pub fn current_datetime(&self) -> DateTimeValue {
        self.run
            .current_datetime
            .get_or_init(|| {
                let seconds = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                DateTimeValue::from_epoch_seconds(seconds, Some(0))
            })
            .clone()
    }

    // --- key cycle detection -------------------------------------------

    /// Marks a key as in-progress; re-entry is the key-cycle error.
    pub fn begin_key(&self, name: &ExpandedName) -> Result<()> {
        let mut active = self.run.keys_in_progress.borrow_mut();
        if !active.insert(name.clone()) {
            return Err(XPathError::KeyCycle(name.clark()));
        }
        Ok(())
    }

    pub fn end_key(&self, name: &ExpandedName) {
        self.run.keys_in_progress.borrow_mut().remove(name);
    }
}

impl<N: SourceNode> Default for EvaluationContext<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;

    #[test]
    fn variable_lookup_is_innermost_first() {
        let ctx = Ctx::new()
            .bind_variable("x", XdmValue::from_integer(1))
            .bind_variable("x", XdmValue::from_integer(2));
        assert_eq!(ctx.variable("x").unwrap().to_double(), 2.0);
    }

    #[test]
    fn derivations_do_not_mutate_the_parent() {
        let base = Ctx::new().bind_variable("x", XdmValue::from_integer(1));
        let derived = base.bind_variable("y", XdmValue::from_integer(2));
        assert!(base.variable("y").is_none());
        assert!(derived.variable("x").is_some());
    }

    #[test]
    fn function_scope_hides_locals_but_keeps_tunnel_empty() {
        let caller = Ctx::new()
            .bind_variable("local", XdmValue::from_integer(1))
            .push_tunnel_frame(
                [("t".to_string(), XdmValue::from_integer(9))].into_iter().collect(),
            );
        let callee = caller.function_scope(
            [("p".to_string(), XdmValue::from_integer(5))].into_iter().collect(),
        );
        assert!(callee.variable("local").is_none());
        assert_eq!(callee.variable("p").unwrap().to_double(), 5.0);
        assert!(callee.tunnel_param("t").is_none());
    }

    #[test]
    fn tunnel_params_flow_until_shadowed() {
        let ctx = Ctx::new().push_tunnel_frame(
            [("depth".to_string(), XdmValue::from_integer(1))].into_iter().collect(),
        );
        let deeper = ctx.push_tunnel_frame(
            [("depth".to_string(), XdmValue::from_integer(2))].into_iter().collect(),
        );
        assert_eq!(ctx.tunnel_param("depth").unwrap().to_double(), 1.0);
        assert_eq!(deeper.tunnel_param("depth").unwrap().to_double(), 2.0);
    }

    #[test]
    fn current_datetime_is_stable_within_a_run() {
        let ctx = Ctx::new();
        let first = ctx.current_datetime();
        let derived = ctx.bind_variable("x", XdmValue::from_integer(1));
        assert_eq!(derived.current_datetime(), first);
    }

    #[test]
    fn key_cycle_detection() {
        let ctx = Ctx::new();
        let name = ExpandedName::new("http://x", "k");
        ctx.begin_key(&name).unwrap();
        let err = ctx.begin_key(&name).unwrap_err();
        assert_eq!(err.code(), "XTDE0640");
        ctx.end_key(&name);
        assert!(ctx.begin_key(&name).is_ok());
    }

    #[test]
    fn current_group_is_a_reserved_variable() {
        let ctx = Ctx::new().with_current_group(
            XdmValue::from_integer(1),
            Some(XdmValue::from_string("k")),
        );
        assert!(ctx.variable(CURRENT_GROUP).is_some());
        assert_eq!(
            ctx.variable(CURRENT_GROUPING_KEY).unwrap().to_string_value(),
            "k"
        );
    }
}
