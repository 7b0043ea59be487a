//! Expression trees the evaluator walks.
//!
//! This is the IR the stylesheet compiler emits for `select` expressions;
//! [`crate::parser`] produces the same trees from XPath source text.
//! Namespace prefixes are resolved while building the tree, so every name
//! in here is already an [`ExpandedName`].

use stilo_xdm::{Axis, ExpandedName};

use crate::seqtype::SequenceType;
use crate::types::AtomicType;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Decimal(rust_decimal::Decimal),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    // value comparisons
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    // general comparisons
    GeneralEq,
    GeneralNe,
    GeneralLt,
    GeneralLe,
    GeneralGt,
    GeneralGe,
    // node comparisons
    Is,
    Precedes,
    Follows,
    // set operators
    Union,
    Intersect,
    Except,
    // arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// Name test of an axis step; wildcards keep their shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `*:local`
    AnyNamespace(String),
    /// `prefix:*`, with the prefix resolved to its URI
    AnyLocal(String),
    /// an exact expanded name
    Exact(ExpandedName),
}

impl NameTest {
    pub fn matches(&self, name: Option<&ExpandedName>) -> bool {
        match (self, name) {
            (NameTest::Any, Some(_)) => true,
            (NameTest::AnyNamespace(local), Some(n)) => n.local == *local,
            (NameTest::AnyLocal(uri), Some(n)) => n.uri.as_deref() == Some(uri.as_str()),
            (NameTest::Exact(expected), Some(n)) => expected == n,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTest {
    /// `node()`
    AnyKind,
    Text,
    Comment,
    /// `processing-instruction()` with optional target
    ProcessingInstruction(Option<String>),
    /// `element()` / `element(name)`
    Element(Option<NameTest>),
    /// `attribute()` / `attribute(name)`
    Attribute(Option<NameTest>),
    /// `document-node()`
    Document,
    NamespaceNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(NameTest),
    Kind(KindTest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expression>,
}

/// Where a path expression starts walking.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// Leading `/`: the root of the context node's tree.
    Root,
    /// Relative path: the context item.
    Context,
    /// A primary expression supplying the start nodes.
    Source(Box<Expression>),
}

/// Function-call argument or `?` placeholder (partial application).
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Expression),
    Placeholder,
}

/// Parameter of an inline or user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub seq_type: Option<SequenceType>,
}

/// `?key` forms.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupKey {
    Name(String),
    Integer(i64),
    Expr(Box<Expression>),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// Variable reference by Clark name.
    VarRef(String),
    ContextItem,
    /// `(e1, e2, …)` including `()`
    Sequence(Vec<Expression>),
    Range {
        from: Box<Expression>,
        to: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    StringConcat {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left ! right`
    SimpleMap {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Path {
        start: PathStart,
        steps: Vec<Step>,
    },
    /// Predicates applied to a non-path primary, `$x[2]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    Let {
        bindings: Vec<(String, Expression)>,
        body: Box<Expression>,
    },
    For {
        bindings: Vec<(String, Expression)>,
        body: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<(String, Expression)>,
        satisfies: Box<Expression>,
    },
    FunctionCall {
        name: ExpandedName,
        args: Vec<Arg>,
    },
    NamedFunctionRef {
        name: ExpandedName,
        arity: usize,
    },
    InlineFunction {
        params: Vec<Param>,
        body: Box<Expression>,
    },
    /// Dynamic call: `$f(args)`, maps and arrays included.
    DynamicCall {
        target: Box<Expression>,
        args: Vec<Arg>,
    },
    MapConstructor(Vec<(Expression, Expression)>),
    /// `[e1, e2]`
    SquareArray(Vec<Expression>),
    /// `array { e }`
    CurlyArray(Box<Expression>),
    Lookup {
        target: Box<Expression>,
        key: LookupKey,
    },
    /// Unary `?key` against the context item.
    UnaryLookup(LookupKey),
    InstanceOf {
        expr: Box<Expression>,
        seq_type: SequenceType,
    },
    TreatAs {
        expr: Box<Expression>,
        seq_type: SequenceType,
    },
    CastAs {
        expr: Box<Expression>,
        target: AtomicType,
        optional: bool,
    },
    CastableAs {
        expr: Box<Expression>,
        target: AtomicType,
        optional: bool,
    },
}

impl Expression {
    pub fn boxed(self) -> Box<Expression> {
        Box::new(self)
    }
}
