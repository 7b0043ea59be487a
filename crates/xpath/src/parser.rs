//! XPath 3.1 expression parser.
//!
//! Produces the same [`Expression`] trees the stylesheet compiler emits.
//! Prefixes are resolved against the static-context namespaces while the
//! tree is built; the evaluator never sees a lexical prefix.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, not, opt, peek, recognize, value, verify},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};

use stilo_xdm::{
    ARRAY_NAMESPACE, Axis, ExpandedName, FN_NAMESPACE, MAP_NAMESPACE, MATH_NAMESPACE, Namespaces,
    QName, XS_NAMESPACE, XSL_NAMESPACE,
};

use crate::ast::*;
use crate::error::XPathError;
use crate::seqtype::SequenceType;
use crate::types::AtomicType;

/// The namespace bindings a bare evaluation starts from: the conventional
/// prefixes of the function and schema namespaces.
pub fn default_static_namespaces() -> Namespaces {
    Namespaces::new()
        .bind("fn", FN_NAMESPACE)
        .bind("xs", XS_NAMESPACE)
        .bind("math", MATH_NAMESPACE)
        .bind("map", MAP_NAMESPACE)
        .bind("array", ARRAY_NAMESPACE)
        .bind("xsl", XSL_NAMESPACE)
}

/// Parses an expression with the default static namespaces.
pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    parse_expression_with(input, &default_static_namespaces())
}

pub fn parse_expression_with(
    input: &str,
    namespaces: &Namespaces,
) -> Result<Expression, XPathError> {
    let ctx = Ctx { namespaces };
    match terminated(|i| expr(i, &ctx), multispace0).parse(input.trim()) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rest, _)) => Err(XPathError::parse(
            input,
            format!("unparsed input remaining: '{}'", rest),
        )),
        Err(e) => Err(XPathError::parse(input, e.to_string())),
    }
}

#[derive(Clone, Copy)]
struct Ctx<'n> {
    namespaces: &'n Namespaces,
}

type PResult<'a, O> = IResult<&'a str, O>;

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// A keyword not glued to a following name character.
fn kw<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    ws(terminated(
        tag(word),
        peek(not(verify(take_while1(is_name_char), |s: &str| {
            !s.is_empty()
        }))),
    ))
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn ncname(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(is_name_start),
        take_while(is_name_char),
    ))
    .parse(input)
}

fn lexical_qname(input: &str) -> PResult<'_, QName> {
    let (input, first) = ncname(input)?;
    let (input, second) = opt(preceded(
        // a lone ':' (axis '::' excluded) joins two NCNames
        terminated(char(':'), peek(not(char(':')))),
        ncname,
    ))
    .parse(input)?;
    Ok((
        input,
        match second {
            Some(local) => QName::with_prefix(first, local),
            None => QName::new(first),
        },
    ))
}

/// `Q{uri}local` or a lexical QName.
fn eqname<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, ExpandedName> {
    if let Some(rest) = input.strip_prefix("Q{") {
        if let Some(end) = rest.find('}') {
            let uri = &rest[..end];
            let after = &rest[end + 1..];
            if let Ok((after, local)) = ncname(after) {
                let name = if uri.is_empty() {
                    ExpandedName::local(local)
                } else {
                    ExpandedName::new(uri, local)
                };
                return Ok((after, name));
            }
        }
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (input, qname) = lexical_qname(input)?;
    match ctx.namespaces.expand(&qname, false) {
        Ok(name) => Ok((input, name)),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

// --- literals ----------------------------------------------------------

fn string_literal(input: &str) -> PResult<'_, String> {
    fn quoted<'a>(q: char) -> impl Fn(&'a str) -> PResult<'a, String> {
        move |input: &'a str| {
            let (mut rest, _) = char(q)(input)?;
            let mut out = String::new();
            loop {
                match rest.find(q) {
                    Some(pos) => {
                        out.push_str(&rest[..pos]);
                        rest = &rest[pos + 1..];
                        // a doubled quote is an escaped quote
                        if rest.starts_with(q) {
                            out.push(q);
                            rest = &rest[1..];
                        } else {
                            return Ok((rest, out));
                        }
                    }
                    None => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            input,
                            nom::error::ErrorKind::Char,
                        )));
                    }
                }
            }
        }
    }
    alt((quoted('"'), quoted('\''))).parse(input)
}

fn numeric_literal(input: &str) -> PResult<'_, Literal> {
    let (rest, text) = recognize((
        alt((
            recognize((digit1, opt(pair(char('.'), digit1)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            digit1,
        )),
    ))
    .parse(input)?;
    let literal = if text.contains('e') || text.contains('E') {
        Literal::Double(text.parse().unwrap_or(f64::NAN))
    } else if text.contains('.') {
        match text.parse() {
            Ok(d) => Literal::Decimal(d),
            Err(_) => Literal::Double(text.parse().unwrap_or(f64::NAN)),
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Literal::Integer(i),
            Err(_) => Literal::Double(text.parse().unwrap_or(f64::NAN)),
        }
    };
    Ok((rest, literal))
}

// --- top level ---------------------------------------------------------

fn expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, mut items) =
        separated_list1(ws(char(',')), |i| expr_single(i, ctx)).parse(input)?;
    Ok((
        input,
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expression::Sequence(items)
        },
    ))
}

fn expr_single<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    alt((
        |i| for_expr(i, ctx),
        |i| let_expr(i, ctx),
        |i| quantified_expr(i, ctx),
        |i| if_expr(i, ctx),
        |i| or_expr(i, ctx),
    ))
    .parse(input)
}

fn binding<'a>(
    input: &'a str,
    ctx: &Ctx,
    sep: &'static str,
) -> PResult<'a, (String, Expression)> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input, ctx)?;
    let (input, _) = ws(tag(sep)).parse(input)?;
    let (input, bound) = expr_single(input, ctx)?;
    Ok((input, (name, bound)))
}

fn var_name<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, String> {
    let (input, name) = eqname(input, ctx)?;
    Ok((input, name.clark()))
}

fn for_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = kw("for").parse(input)?;
    let (input, bindings) =
        separated_list1(ws(char(',')), |i| binding(i, ctx, "in")).parse(input)?;
    let (input, _) = kw("return").parse(input)?;
    let (input, body) = expr_single(input, ctx)?;
    Ok((
        input,
        Expression::For {
            bindings,
            body: body.boxed(),
        },
    ))
}

fn let_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = kw("let").parse(input)?;
    let (input, bindings) =
        separated_list1(ws(char(',')), |i| binding(i, ctx, ":=")).parse(input)?;
    let (input, _) = kw("return").parse(input)?;
    let (input, body) = expr_single(input, ctx)?;
    Ok((
        input,
        Expression::Let {
            bindings,
            body: body.boxed(),
        },
    ))
}

fn quantified_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, quantifier) = alt((
        value(Quantifier::Some, kw("some")),
        value(Quantifier::Every, kw("every")),
    ))
    .parse(input)?;
    let (input, bindings) =
        separated_list1(ws(char(',')), |i| binding(i, ctx, "in")).parse(input)?;
    let (input, _) = kw("satisfies").parse(input)?;
    let (input, satisfies) = expr_single(input, ctx)?;
    Ok((
        input,
        Expression::Quantified {
            quantifier,
            bindings,
            satisfies: satisfies.boxed(),
        },
    ))
}

fn if_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = kw("if").parse(input)?;
    let (input, condition) =
        delimited(ws(char('(')), |i| expr(i, ctx), ws(char(')'))).parse(input)?;
    let (input, _) = kw("then").parse(input)?;
    let (input, then_branch) = expr_single(input, ctx)?;
    let (input, _) = kw("else").parse(input)?;
    let (input, else_branch) = expr_single(input, ctx)?;
    Ok((
        input,
        Expression::If {
            condition: condition.boxed(),
            then_branch: then_branch.boxed(),
            else_branch: else_branch.boxed(),
        },
    ))
}

fn binary_chain<'a>(
    input: &'a str,
    ctx: &Ctx,
    mut operand: impl FnMut(&'a str, &Ctx) -> PResult<'a, Expression>,
    mut operator: impl FnMut(&'a str) -> PResult<'a, BinaryOp>,
) -> PResult<'a, Expression> {
    let (mut input, mut left) = operand(input, ctx)?;
    loop {
        let checkpoint = input;
        match operator(input) {
            Ok((rest, op)) => match operand(rest, ctx) {
                Ok((rest, right)) => {
                    left = Expression::Binary {
                        op,
                        left: left.boxed(),
                        right: right.boxed(),
                    };
                    input = rest;
                }
                Err(_) => {
                    input = checkpoint;
                    break;
                }
            },
            Err(_) => break,
        }
    }
    Ok((input, left))
}

fn or_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, and_expr, |i| {
        value(BinaryOp::Or, kw("or")).parse(i)
    })
}

fn and_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, comparison_expr, |i| {
        value(BinaryOp::And, kw("and")).parse(i)
    })
}

fn comparison_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, left) = concat_expr(input, ctx)?;
    let op = ws(alt((
        value(BinaryOp::ValueEq, kw("eq")),
        value(BinaryOp::ValueNe, kw("ne")),
        value(BinaryOp::ValueLt, kw("lt")),
        value(BinaryOp::ValueLe, kw("le")),
        value(BinaryOp::ValueGt, kw("gt")),
        value(BinaryOp::ValueGe, kw("ge")),
        value(BinaryOp::Is, kw("is")),
        value(BinaryOp::Precedes, tag("<<")),
        value(BinaryOp::Follows, tag(">>")),
        value(BinaryOp::GeneralNe, tag("!=")),
        value(BinaryOp::GeneralLe, tag("<=")),
        value(BinaryOp::GeneralGe, tag(">=")),
        value(BinaryOp::GeneralEq, char('=')),
        value(BinaryOp::GeneralLt, char('<')),
        value(BinaryOp::GeneralGt, char('>')),
    )));
    let (input, rest) = opt(pair(op, |i| concat_expr(i, ctx))).parse(input)?;
    Ok((
        input,
        match rest {
            Some((op, right)) => Expression::Binary {
                op,
                left: left.boxed(),
                right: right.boxed(),
            },
            None => left,
        },
    ))
}

fn concat_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, first) = range_expr(input, ctx)?;
    let (input, rest) =
        many0(preceded(ws(tag("||")), |i| range_expr(i, ctx))).parse(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |left, right| {
            Expression::StringConcat {
                left: left.boxed(),
                right: right.boxed(),
            }
        }),
    ))
}

fn range_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, from) = additive_expr(input, ctx)?;
    let (input, to) = opt(preceded(kw("to"), |i| additive_expr(i, ctx))).parse(input)?;
    Ok((
        input,
        match to {
            Some(to) => Expression::Range {
                from: from.boxed(),
                to: to.boxed(),
            },
            None => from,
        },
    ))
}

fn additive_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, multiplicative_expr, |i| {
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Subtract, char('-')),
        )))
        .parse(i)
    })
}

fn multiplicative_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, union_expr, |i| {
        ws(alt((
            value(BinaryOp::Multiply, char('*')),
            value(BinaryOp::IntegerDivide, kw("idiv")),
            value(BinaryOp::Divide, kw("div")),
            value(BinaryOp::Modulo, kw("mod")),
        )))
        .parse(i)
    })
}

fn union_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, intersect_expr, |i| {
        ws(alt((
            value(BinaryOp::Union, kw("union")),
            value(BinaryOp::Union, char('|')),
        )))
        .parse(i)
    })
}

fn intersect_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    binary_chain(input, ctx, instance_of_expr, |i| {
        ws(alt((
            value(BinaryOp::Intersect, kw("intersect")),
            value(BinaryOp::Except, kw("except")),
        )))
        .parse(i)
    })
}

fn seq_type_text<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, SequenceType> {
    // delegate to the sequence-type grammar by scanning its textual extent
    let mut depth = 0usize;
    let mut end = input.len();
    for (pos, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                } else {
                    end = pos;
                    break;
                }
            }
            c if depth == 0 && !is_name_char(c) && !matches!(c, ':' | '?' | '*' | '+') => {
                end = pos;
                break;
            }
            _ => {}
        }
    }
    let candidate = input[..end].trim_end();
    match SequenceType::parse(candidate, ctx.namespaces) {
        Ok(seq_type) => Ok((&input[candidate.len()..], seq_type)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn single_type<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, (AtomicType, bool)> {
    let (input, name) = ws(|i| eqname(i, ctx)).parse(input)?;
    let (input, optional) = opt(ws(char('?'))).parse(input)?;
    let atomic = (name.uri.as_deref() == Some(XS_NAMESPACE))
        .then(|| AtomicType::from_local_name(&name.local))
        .flatten();
    match atomic {
        Some(atomic) => Ok((input, (atomic, optional.is_some()))),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn instance_of_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, inner) = treat_expr(input, ctx)?;
    let (input, seq_type) = opt(preceded(
        (kw("instance"), kw("of")),
        ws(|i| seq_type_text(i, ctx)),
    ))
    .parse(input)?;
    Ok((
        input,
        match seq_type {
            Some(seq_type) => Expression::InstanceOf {
                expr: inner.boxed(),
                seq_type,
            },
            None => inner,
        },
    ))
}

fn treat_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, inner) = castable_expr(input, ctx)?;
    let (input, seq_type) = opt(preceded(
        (kw("treat"), kw("as")),
        ws(|i| seq_type_text(i, ctx)),
    ))
    .parse(input)?;
    Ok((
        input,
        match seq_type {
            Some(seq_type) => Expression::TreatAs {
                expr: inner.boxed(),
                seq_type,
            },
            None => inner,
        },
    ))
}

fn castable_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, inner) = cast_expr(input, ctx)?;
    let (input, target) = opt(preceded(
        (kw("castable"), kw("as")),
        |i| single_type(i, ctx),
    ))
    .parse(input)?;
    Ok((
        input,
        match target {
            Some((target, optional)) => Expression::CastableAs {
                expr: inner.boxed(),
                target,
                optional,
            },
            None => inner,
        },
    ))
}

fn cast_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, inner) = unary_expr(input, ctx)?;
    let (input, target) =
        opt(preceded((kw("cast"), kw("as")), |i| single_type(i, ctx))).parse(input)?;
    Ok((
        input,
        match target {
            Some((target, optional)) => Expression::CastAs {
                expr: inner.boxed(),
                target,
                optional,
            },
            None => inner,
        },
    ))
}

fn unary_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, signs) =
        many0(ws(alt((char('-'), char('+'))))).parse(input)?;
    let (input, mut inner) = simple_map_expr(input, ctx)?;
    for sign in signs.into_iter().rev() {
        inner = Expression::Unary {
            op: if sign == '-' { UnaryOp::Minus } else { UnaryOp::Plus },
            expr: inner.boxed(),
        };
    }
    Ok((input, inner))
}

fn simple_map_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, first) = path_expr(input, ctx)?;
    let (input, rest) = many0(preceded(
        ws(terminated(char('!'), peek(not(char('='))))),
        |i| path_expr(i, ctx),
    ))
    .parse(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |left, right| Expression::SimpleMap {
            left: left.boxed(),
            right: right.boxed(),
        }),
    ))
}

// --- paths -------------------------------------------------------------

fn descendant_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Kind(KindTest::AnyKind),
        predicates: Vec::new(),
    }
}

fn path_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    // leading '//' and '/'
    if let Ok((rest, _)) = ws::<_, _>(tag("//")).parse(input) {
        let (rest, steps) = relative_path(rest, ctx)?;
        let mut all = vec![descendant_step()];
        all.extend(steps);
        return Ok((
            rest,
            Expression::Path {
                start: PathStart::Root,
                steps: all,
            },
        ));
    }
    if let Ok((rest, _)) = ws::<_, _>(terminated(char('/'), peek(not(char('/'))))).parse(input) {
        return match relative_path(rest, ctx) {
            Ok((rest, steps)) => Ok((
                rest,
                Expression::Path {
                    start: PathStart::Root,
                    steps,
                },
            )),
            // a lone '/' selects the root
            Err(_) => Ok((
                rest,
                Expression::Path {
                    start: PathStart::Root,
                    steps: Vec::new(),
                },
            )),
        };
    }

    // relative: either a postfix primary optionally continuing as a path,
    // or an axis-step path
    let start = input;
    match postfix_expr(input, ctx) {
        Ok((rest, primary)) => {
            let (rest, continuation) = path_continuation(rest, ctx)?;
            if continuation.is_empty() {
                Ok((rest, primary))
            } else {
                Ok((
                    rest,
                    Expression::Path {
                        start: PathStart::Source(primary.boxed()),
                        steps: continuation,
                    },
                ))
            }
        }
        Err(_) => {
            let (rest, steps) = relative_path(start, ctx)?;
            Ok((
                rest,
                Expression::Path {
                    start: PathStart::Context,
                    steps,
                },
            ))
        }
    }
}

fn path_continuation<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Vec<Step>> {
    let mut steps = Vec::new();
    let mut rest = input;
    loop {
        if let Ok((after, _)) = ws::<_, _>(tag("//")).parse(rest) {
            let (after, step) = axis_step(after, ctx)?;
            steps.push(descendant_step());
            steps.push(step);
            rest = after;
        } else if let Ok((after, _)) =
            ws::<_, _>(terminated(char('/'), peek(not(char('/'))))).parse(rest)
        {
            let (after, step) = axis_step(after, ctx)?;
            steps.push(step);
            rest = after;
        } else {
            return Ok((rest, steps));
        }
    }
}

fn relative_path<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Vec<Step>> {
    let (input, first) = axis_step(input, ctx)?;
    let mut steps = vec![first];
    let (input, continuation) = path_continuation(input, ctx)?;
    steps.extend(continuation);
    Ok((input, steps))
}

fn axis_step<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Step> {
    let (input, (axis, test)) = alt((
        // '..'
        map(ws(tag("..")), |_| {
            (Axis::Parent, NodeTest::Kind(KindTest::AnyKind))
        }),
        // explicit axis
        |i| explicit_axis_step(i, ctx),
        // '@name'
        map(preceded(ws(char('@')), |i| node_test(i, ctx, true)), |test| {
            (Axis::Attribute, test)
        }),
        // abbreviated child step
        map(|i| node_test(i, ctx, false), |test| (Axis::Child, test)),
    ))
    .parse(input)?;
    let (input, predicates) = many0(|i| predicate(i, ctx)).parse(input)?;
    Ok((
        input,
        Step {
            axis,
            test,
            predicates,
        },
    ))
}

fn axis_name(input: &str) -> PResult<'_, Axis> {
    let (input, name) = terminated(ncname, ws(tag("::"))).parse(input)?;
    let axis = match name {
        "child" => Axis::Child,
        "descendant" => Axis::Descendant,
        "descendant-or-self" => Axis::DescendantOrSelf,
        "parent" => Axis::Parent,
        "ancestor" => Axis::Ancestor,
        "ancestor-or-self" => Axis::AncestorOrSelf,
        "following-sibling" => Axis::FollowingSibling,
        "preceding-sibling" => Axis::PrecedingSibling,
        "following" => Axis::Following,
        "preceding" => Axis::Preceding,
        "attribute" => Axis::Attribute,
        "namespace" => Axis::Namespace,
        "self" => Axis::SelfAxis,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
    };
    Ok((input, axis))
}

fn explicit_axis_step<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, (Axis, NodeTest)> {
    let (input, axis) = ws(axis_name).parse(input)?;
    let (input, test) = node_test(input, ctx, axis == Axis::Attribute)?;
    Ok((input, (axis, test)))
}

fn node_test<'a>(input: &'a str, ctx: &Ctx, is_attribute: bool) -> PResult<'a, NodeTest> {
    alt((
        map(|i| kind_test(i, ctx), NodeTest::Kind),
        map(
            |i| name_test(i, ctx, is_attribute),
            NodeTest::Name,
        ),
    ))
    .parse(input)
}

fn kind_test<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, KindTest> {
    let (input, name) = ws(terminated(
        recognize(pair(ncname, many0(pair(char('-'), ncname)))),
        peek(ws(char('('))),
    ))
    .parse(input)?;
    let make = |kind: KindTest| move |_: Option<&str>| kind.clone();
    match name {
        "node" => map(paren_opt_arg, make(KindTest::AnyKind)).parse(input),
        "text" => map(paren_opt_arg, make(KindTest::Text)).parse(input),
        "comment" => map(paren_opt_arg, make(KindTest::Comment)).parse(input),
        "namespace-node" => map(paren_opt_arg, make(KindTest::NamespaceNode)).parse(input),
        "document-node" => map(paren_opt_arg, make(KindTest::Document)).parse(input),
        "processing-instruction" => map(paren_opt_arg, |target| {
            KindTest::ProcessingInstruction(
                target.map(|t: &str| t.trim_matches(['"', '\'']).to_string()),
            )
        })
        .parse(input),
        "element" => {
            let (input, arg) = paren_opt_arg(input)?;
            let test = element_name_arg(arg, ctx, false)?;
            Ok((input, KindTest::Element(test)))
        }
        "attribute" => {
            let (input, arg) = paren_opt_arg(input)?;
            let test = element_name_arg(arg, ctx, true)?;
            Ok((input, KindTest::Attribute(test)))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn element_name_arg(
    arg: Option<&str>,
    ctx: &Ctx,
    is_attribute: bool,
) -> Result<Option<NameTest>, nom::Err<nom::error::Error<&'static str>>> {
    match arg {
        None => Ok(None),
        Some("*") => Ok(None),
        Some(name) => {
            let qname = QName::parse(name).map_err(|_| {
                nom::Err::Failure(nom::error::Error::new("", nom::error::ErrorKind::Tag))
            })?;
            let expanded = ctx
                .namespaces
                .expand(&qname, !is_attribute)
                .map_err(|_| {
                    nom::Err::Failure(nom::error::Error::new("", nom::error::ErrorKind::Tag))
                })?;
            Ok(Some(NameTest::Exact(expanded)))
        }
    }
}

fn paren_opt_arg(input: &str) -> PResult<'_, Option<&str>> {
    delimited(
        ws(char('(')),
        opt(ws(take_while1(|c: char| c != ')' && !c.is_whitespace()))),
        ws(char(')')),
    )
    .parse(input)
}

fn name_test<'a>(input: &'a str, ctx: &Ctx, is_attribute: bool) -> PResult<'a, NameTest> {
    // '*', '*:local', 'prefix:*', exact
    if let Ok((rest, _)) = ws::<_, _>(terminated(
        char('*'),
        peek(not(char(':'))),
    ))
    .parse(input)
    {
        return Ok((rest, NameTest::Any));
    }
    if let Ok((rest, local)) =
        preceded(ws(tag("*:")), ncname).parse(input)
    {
        return Ok((rest, NameTest::AnyNamespace(local.to_string())));
    }
    if let Ok((rest, prefix)) =
        terminated(ws(ncname), (char(':'), char('*'))).parse(input)
    {
        let uri = ctx.namespaces.resolve(prefix).ok_or_else(|| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
        })?;
        return Ok((rest, NameTest::AnyLocal(uri.to_string())));
    }
    let (rest, qname) = ws(lexical_qname).parse(input)?;
    let expanded = ctx
        .namespaces
        .expand(&qname, !is_attribute)
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
        })?;
    Ok((rest, NameTest::Exact(expanded)))
}

fn predicate<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    delimited(ws(char('[')), |i| expr(i, ctx), ws(char(']'))).parse(input)
}

// --- postfix and primaries ---------------------------------------------

const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "if", "for", "let", "some", "every", "function", "map", "array", "element", "attribute",
    "text", "comment", "node", "document-node", "processing-instruction", "namespace-node",
    "item", "empty-sequence", "and", "or", "div", "mod", "idiv", "union", "intersect", "except",
    "instance", "treat", "castable", "cast", "to", "return", "satisfies", "then", "else", "in",
    "is", "eq", "ne", "lt", "le", "gt", "ge",
];

fn postfix_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (mut input, mut primary) = primary_expr(input, ctx)?;
    loop {
        if let Ok((rest, pred)) = predicate(input, ctx) {
            primary = match primary {
                Expression::Filter {
                    primary: inner,
                    mut predicates,
                } => {
                    predicates.push(pred);
                    Expression::Filter {
                        primary: inner,
                        predicates,
                    }
                }
                other => Expression::Filter {
                    primary: other.boxed(),
                    predicates: vec![pred],
                },
            };
            input = rest;
            continue;
        }
        if let Ok((rest, args)) = argument_list(input, ctx) {
            primary = Expression::DynamicCall {
                target: primary.boxed(),
                args,
            };
            input = rest;
            continue;
        }
        if let Ok((rest, key)) = lookup_suffix(input, ctx) {
            primary = Expression::Lookup {
                target: primary.boxed(),
                key,
            };
            input = rest;
            continue;
        }
        return Ok((input, primary));
    }
}

fn lookup_suffix<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, LookupKey> {
    let (input, _) = ws(char('?')).parse(input)?;
    lookup_key(input, ctx)
}

fn lookup_key<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, LookupKey> {
    alt((
        map(digit1, |d: &str| {
            LookupKey::Integer(d.parse().unwrap_or(0))
        }),
        map(ncname, |n: &str| LookupKey::Name(n.to_string())),
        value(LookupKey::Wildcard, char('*')),
        map(
            delimited(ws(char('(')), |i| expr(i, ctx), ws(char(')'))),
            |e| LookupKey::Expr(e.boxed()),
        ),
    ))
    .parse(input)
}

fn argument_list<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Vec<Arg>> {
    delimited(
        ws(char('(')),
        separated_list0(
            ws(char(',')),
            alt((
                value(Arg::Placeholder, ws(terminated(char('?'), peek(not(alt((
                    map(digit1, |_| ()),
                    map(ncname, |_| ()),
                    map(char('*'), |_| ()),
                    map(char('('), |_| ()),
                ))))))),
                map(|i| expr_single(i, ctx), Arg::Value),
            )),
        ),
        ws(char(')')),
    )
    .parse(input)
}

fn primary_expr<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    alt((
        map(ws(numeric_literal), Expression::Literal),
        map(ws(string_literal), |s| {
            Expression::Literal(Literal::String(s))
        }),
        |i| var_ref(i, ctx),
        // '(' expr? ')'
        map(
            delimited(ws(char('(')), opt(|i| expr(i, ctx)), ws(char(')'))),
            |inner| inner.unwrap_or(Expression::Sequence(Vec::new())),
        ),
        // context item '.' (but not '..')
        map(
            ws(terminated(char('.'), peek(not(alt((char('.'), digit1.map(|_| ' ')) ))))),
            |_| Expression::ContextItem,
        ),
        |i| inline_function(i, ctx),
        |i| map_constructor(i, ctx),
        |i| array_constructor(i, ctx),
        map(preceded(ws(char('?')), |i| lookup_key(i, ctx)), Expression::UnaryLookup),
        |i| named_function_ref(i, ctx),
        |i| function_call(i, ctx),
    ))
    .parse(input)
}

fn var_ref<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input, ctx)?;
    Ok((input, Expression::VarRef(name)))
}

fn inline_function<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = kw("function").parse(input)?;
    let (input, params) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), |i| param(i, ctx)),
        ws(char(')')),
    )
    .parse(input)?;
    // an optional return type is accepted and checked by the stylesheet
    // layer for declared functions; inline items run unchecked
    let (input, _) = opt(preceded(kw("as"), ws(|i| seq_type_text(i, ctx)))).parse(input)?;
    let (input, body) =
        delimited(ws(char('{')), |i| expr(i, ctx), ws(char('}'))).parse(input)?;
    Ok((
        input,
        Expression::InlineFunction {
            params,
            body: body.boxed(),
        },
    ))
}

fn param<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Param> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input, ctx)?;
    let (input, seq_type) =
        opt(preceded(kw("as"), ws(|i| seq_type_text(i, ctx)))).parse(input)?;
    Ok((input, Param { name, seq_type }))
}

fn map_constructor<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, _) = kw("map").parse(input)?;
    let (input, entries) = delimited(
        ws(char('{')),
        separated_list0(ws(char(',')), |i| map_entry(i, ctx)),
        ws(char('}')),
    )
    .parse(input)?;
    Ok((input, Expression::MapConstructor(entries)))
}

fn map_entry<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, (Expression, Expression)> {
    let (input, key) = expr_single(input, ctx)?;
    let (input, _) = ws(char(':')).parse(input)?;
    let (input, value) = expr_single(input, ctx)?;
    Ok((input, (key, value)))
}

fn array_constructor<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    alt((
        map(
            delimited(
                ws(char('[')),
                separated_list0(ws(char(',')), |i| expr_single(i, ctx)),
                ws(char(']')),
            ),
            Expression::SquareArray,
        ),
        map(
            preceded(
                kw("array"),
                delimited(ws(char('{')), opt(|i| expr(i, ctx)), ws(char('}'))),
            ),
            |inner| {
                Expression::CurlyArray(
                    inner.unwrap_or(Expression::Sequence(Vec::new())).boxed(),
                )
            },
        ),
    ))
    .parse(input)
}

fn named_function_ref<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let (input, name) = ws(|i| eqname(i, ctx)).parse(input)?;
    let (input, _) = char('#')(input)?;
    let (input, arity) = digit1(input)?;
    Ok((
        input,
        Expression::NamedFunctionRef {
            name,
            arity: arity.parse().unwrap_or(0),
        },
    ))
}

fn function_call<'a>(input: &'a str, ctx: &Ctx) -> PResult<'a, Expression> {
    let checkpoint = input;
    let (input, qname) = ws(lexical_qname).parse(input)?;
    if qname.prefix.is_none() && RESERVED_FUNCTION_NAMES.contains(&qname.local.as_str()) {
        return Err(nom::Err::Error(nom::error::Error::new(
            checkpoint,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (input, _) = peek(ws(char('('))).parse(input)?;
    let name = ctx.namespaces.expand(&qname, false).map_err(|_| {
        nom::Err::Failure(nom::error::Error::new(checkpoint, nom::error::ErrorKind::Tag))
    })?;
    let (input, args) = argument_list(input, ctx)?;
    Ok((input, Expression::FunctionCall { name, args }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Expression {
        parse_expression(s).unwrap()
    }

    #[test]
    fn parses_literals() {
        assert_eq!(parse("42"), Expression::Literal(Literal::Integer(42)));
        assert!(matches!(
            parse("1.5"),
            Expression::Literal(Literal::Decimal(_))
        ));
        assert!(matches!(
            parse("1e3"),
            Expression::Literal(Literal::Double(_))
        ));
        assert_eq!(
            parse("'it''s'"),
            Expression::Literal(Literal::String("it's".to_string()))
        );
    }

    #[test]
    fn parses_arithmetic_with_precedence() {
        match parse("1 + 2 * 3") {
            Expression::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(
                    *right,
                    Expression::Binary { op: BinaryOp::Multiply, .. }
                ));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_paths() {
        match parse("/doc//item[@id = 'x']/name") {
            Expression::Path { start, steps } => {
                assert_eq!(start, PathStart::Root);
                assert_eq!(steps.len(), 4);
                assert_eq!(steps[1].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[2].axis, Axis::Child);
                assert_eq!(steps[2].predicates.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_variable_paths() {
        match parse("$doc/child::item") {
            Expression::Path { start, steps } => {
                assert!(matches!(start, PathStart::Source(_)));
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].axis, Axis::Child);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_flwor_and_quantified() {
        assert!(matches!(
            parse("for $x in 1 to 3 return $x * 2"),
            Expression::For { .. }
        ));
        assert!(matches!(
            parse("let $x := 1 return $x"),
            Expression::Let { .. }
        ));
        assert!(matches!(
            parse("some $x in (1,2) satisfies $x = 2"),
            Expression::Quantified { .. }
        ));
        assert!(matches!(
            parse("if (1) then 'a' else 'b'"),
            Expression::If { .. }
        ));
    }

    #[test]
    fn parses_inline_function_and_call() {
        match parse("function($a, $b) { $a + $b }(1, 2)") {
            Expression::DynamicCall { target, args } => {
                assert!(matches!(*target, Expression::InlineFunction { .. }));
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_named_ref_and_placeholder() {
        assert!(matches!(
            parse("fn:concat#3"),
            Expression::NamedFunctionRef { arity: 3, .. }
        ));
        match parse("substring(?, 2)") {
            Expression::FunctionCall { args, .. } => {
                assert_eq!(args[0], Arg::Placeholder);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_maps_arrays_lookup() {
        assert!(matches!(
            parse("map { 'a': 1, 'b': 2 }"),
            Expression::MapConstructor(entries) if entries.len() == 2
        ));
        assert!(matches!(parse("[1, 2, 3]"), Expression::SquareArray(_)));
        assert!(matches!(
            parse("$m?key"),
            Expression::Lookup { key: LookupKey::Name(_), .. }
        ));
        assert!(matches!(
            parse("array { 1 to 3 }"),
            Expression::CurlyArray(_)
        ));
    }

    #[test]
    fn parses_type_operations() {
        assert!(matches!(
            parse("5 instance of xs:integer"),
            Expression::InstanceOf { .. }
        ));
        assert!(matches!(
            parse("'3' cast as xs:integer"),
            Expression::CastAs { .. }
        ));
        assert!(matches!(
            parse("'x' castable as xs:double"),
            Expression::CastableAs { .. }
        ));
    }

    #[test]
    fn function_names_resolve_through_namespaces() {
        match parse("math:pi()") {
            Expression::FunctionCall { name, .. } => {
                assert_eq!(name.uri.as_deref(), Some(MATH_NAMESPACE));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // unprefixed names stay in no namespace for the registry to route
        match parse("string-length('x')") {
            Expression::FunctionCall { name, .. } => assert_eq!(name.uri, None),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn reserved_words_are_not_function_names() {
        assert!(matches!(parse("if (1) then 2 else 3"), Expression::If { .. }));
        assert!(matches!(parse("node()"), Expression::Path { .. }));
    }

    #[test]
    fn unbound_prefix_is_a_parse_error() {
        assert!(parse_expression("nope:fun()").is_err());
    }

    #[test]
    fn parses_string_concat_and_simple_map() {
        assert!(matches!(
            parse("'a' || 'b'"),
            Expression::StringConcat { .. }
        ));
        assert!(matches!(parse("(1,2) ! (. * 2)"), Expression::SimpleMap { .. }));
    }
}
