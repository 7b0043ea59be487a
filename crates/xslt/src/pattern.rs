//! Match patterns.
//!
//! The subset key declarations and accumulator rules use: unions of
//! relative or absolute step paths over the child and attribute axes, with
//! `//` descent and the kind tests. Matching walks the candidate node's
//! ancestor chain against the steps in reverse, the cheap direction for a
//! pattern.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, not, opt, peek, recognize, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded, terminated},
};

use stilo_xdm::{Namespaces, NodeKind, QName, SourceNode};
use stilo_xpath::ast::{KindTest, NameTest, NodeTest};
use stilo_xpath::engine::kind_test_matches;

use crate::error::XsltError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternAxis {
    Child,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
struct PatternStep {
    axis: PatternAxis,
    test: NodeTest,
    /// Preceded by `//`: any number of intervening ancestors is allowed
    /// when walking up past this step.
    descend: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct PathPattern {
    /// Anchored at the document root by a leading `/` or `//`.
    anchored: bool,
    steps: Vec<PatternStep>,
}

/// A compiled match pattern: a union of location path patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    paths: Vec<PathPattern>,
    text: String,
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Pattern {
    pub fn parse(text: &str, namespaces: &Namespaces) -> Result<Pattern, XsltError> {
        let ctx = Ctx { namespaces };
        match terminated(|i| union_pattern(i, &ctx), multispace0).parse(text.trim()) {
            Ok(("", paths)) => Ok(Pattern {
                paths,
                text: text.to_string(),
            }),
            Ok((rest, _)) => Err(XsltError::pattern(
                text,
                format!("unparsed input remaining: '{}'", rest),
            )),
            Err(e) => Err(XsltError::pattern(text, e.to_string())),
        }
    }

    pub fn matches<N: SourceNode>(&self, node: &N) -> bool {
        self.paths.iter().any(|path| path.matches(node))
    }
}

impl PathPattern {
    fn matches<N: SourceNode>(&self, node: &N) -> bool {
        if self.steps.is_empty() {
            // "/" alone matches the document node
            return node.node_kind() == NodeKind::Document;
        }
        Self::match_steps(node, &self.steps, self.anchored)
    }

    fn match_steps<N: SourceNode>(node: &N, steps: &[PatternStep], anchored: bool) -> bool {
        let (step, rest) = steps.split_last().expect("nonempty steps");
        if !step_matches(step, node) {
            return false;
        }
        let parents: Vec<N> = if step.descend {
            node.ancestors().collect()
        } else {
            node.parent().into_iter().collect()
        };
        if rest.is_empty() {
            if !anchored {
                return true;
            }
            // anchored: the chain above must reach the document node,
            // through any depth for a descending first step
            return parents
                .iter()
                .any(|p| p.node_kind() == NodeKind::Document);
        }
        parents
            .iter()
            .any(|parent| Self::match_steps(parent, rest, anchored))
    }
}

fn step_matches<N: SourceNode>(step: &PatternStep, node: &N) -> bool {
    match &step.test {
        NodeTest::Name(name_test) => {
            let wanted = match step.axis {
                PatternAxis::Child => NodeKind::Element,
                PatternAxis::Attribute => NodeKind::Attribute,
            };
            node.node_kind() == wanted && name_test.matches(node.expanded_name().as_ref())
        }
        NodeTest::Kind(kind) => {
            // an attribute step with a kind test still requires an attribute
            if step.axis == PatternAxis::Attribute && node.node_kind() != NodeKind::Attribute {
                return false;
            }
            kind_test_matches(kind, node)
        }
    }
}

// --- parsing ------------------------------------------------------------

struct Ctx<'n> {
    namespaces: &'n Namespaces,
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn ncname(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.'),
    ))
    .parse(input)
}

fn union_pattern<'a>(input: &'a str, ctx: &Ctx) -> IResult<&'a str, Vec<PathPattern>> {
    separated_list1(ws(char('|')), |i| path_pattern(i, ctx)).parse(input)
}

fn path_pattern<'a>(input: &'a str, ctx: &Ctx) -> IResult<&'a str, PathPattern> {
    // leading '//' anchors trivially; leading '/' anchors hard
    if let Ok((rest, _)) = ws::<_, _>(tag("//")).parse(input) {
        let (rest, mut steps) = step_list(rest, ctx)?;
        if let Some(first) = steps.first_mut() {
            first.descend = true;
        }
        return Ok((
            rest,
            PathPattern {
                anchored: true,
                steps,
            },
        ));
    }
    if let Ok((rest, _)) =
        ws::<_, _>(terminated(char('/'), peek(not(char('/'))))).parse(input)
    {
        return match step_list(rest, ctx) {
            Ok((rest, steps)) => Ok((
                rest,
                PathPattern {
                    anchored: true,
                    steps,
                },
            )),
            // "/" alone
            Err(_) => Ok((
                rest,
                PathPattern {
                    anchored: true,
                    steps: Vec::new(),
                },
            )),
        };
    }
    let (rest, steps) = step_list(input, ctx)?;
    Ok((
        rest,
        PathPattern {
            anchored: false,
            steps,
        },
    ))
}

fn step_list<'a>(input: &'a str, ctx: &Ctx) -> IResult<&'a str, Vec<PatternStep>> {
    let (mut input, first) = pattern_step(input, ctx, false)?;
    let mut steps = vec![first];
    loop {
        if let Ok((rest, _)) = ws::<_, _>(tag("//")).parse(input) {
            let (rest, step) = pattern_step(rest, ctx, true)?;
            steps.push(step);
            input = rest;
        } else if let Ok((rest, _)) =
            ws::<_, _>(terminated(char('/'), peek(not(char('/'))))).parse(input)
        {
            let (rest, step) = pattern_step(rest, ctx, false)?;
            steps.push(step);
            input = rest;
        } else {
            return Ok((input, steps));
        }
    }
}

fn pattern_step<'a>(
    input: &'a str,
    ctx: &Ctx,
    descend: bool,
) -> IResult<&'a str, PatternStep> {
    let (input, axis) = map(opt(ws(char('@'))), |at| match at {
        Some(_) => PatternAxis::Attribute,
        None => PatternAxis::Child,
    })
    .parse(input)?;
    let (input, test) = node_test(input, ctx, axis == PatternAxis::Attribute)?;
    Ok((
        input,
        PatternStep {
            axis,
            test,
            descend,
        },
    ))
}

fn node_test<'a>(input: &'a str, ctx: &Ctx, is_attribute: bool) -> IResult<&'a str, NodeTest> {
    // kind tests
    let kind = alt((
        value(KindTest::Text, (tag("text"), ws(tag("()")))),
        value(KindTest::Comment, (tag("comment"), ws(tag("()")))),
        value(
            KindTest::ProcessingInstruction(None),
            (tag("processing-instruction"), ws(tag("()"))),
        ),
        value(KindTest::AnyKind, (tag("node"), ws(tag("()")))),
        value(KindTest::Document, (tag("document-node"), ws(tag("()")))),
    ));
    if let Ok((rest, kind)) = ws(kind).parse(input) {
        return Ok((rest, NodeTest::Kind(kind)));
    }

    // wildcard and name forms
    if let Ok((rest, _)) =
        ws::<_, _>(terminated(char('*'), peek(not(char(':'))))).parse(input)
    {
        return Ok((rest, NodeTest::Name(NameTest::Any)));
    }
    if let Ok((rest, local)) = preceded(ws(tag("*:")), ncname).parse(input) {
        return Ok((rest, NodeTest::Name(NameTest::AnyNamespace(local.to_string()))));
    }
    if let Ok((rest, prefix)) =
        terminated(ws(ncname), (char(':'), char('*'))).parse(input)
    {
        let uri = ctx.namespaces.resolve(prefix).ok_or(nom::Err::Failure(
            nom::error::Error::new(input, nom::error::ErrorKind::Tag),
        ))?;
        return Ok((rest, NodeTest::Name(NameTest::AnyLocal(uri.to_string()))));
    }

    let (rest, first) = ws(ncname).parse(input)?;
    let (rest, second) = opt(preceded(
        terminated(char(':'), peek(not(char(':')))),
        ncname,
    ))
    .parse(rest)?;
    let qname = match second {
        Some(local) => QName::with_prefix(first, local),
        None => QName::new(first),
    };
    let expanded = ctx
        .namespaces
        .expand(&qname, !is_attribute)
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
        })?;
    Ok((rest, NodeTest::Name(NameTest::Exact(expanded))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::{SourceNode, XmlNode, XmlTree};

    fn parse(text: &str) -> Pattern {
        Pattern::parse(text, &Namespaces::new()).unwrap()
    }

    fn find(root: &XmlNode, name: &str) -> XmlNode {
        root.descendants_or_self()
            .find(|n| n.expanded_name().map(|e| e.local == name).unwrap_or(false))
            .unwrap()
    }

    #[test]
    fn name_and_union_patterns() {
        let tree = XmlTree::parse("<doc><para/><note/><other/></doc>").unwrap();
        let root = tree.root();
        let pattern = parse("para|note");
        assert!(pattern.matches(&find(&root, "para")));
        assert!(pattern.matches(&find(&root, "note")));
        assert!(!pattern.matches(&find(&root, "other")));
    }

    #[test]
    fn relative_paths_match_a_suffix_of_the_ancestry() {
        let tree = XmlTree::parse("<doc><sec><para/></sec><para/></doc>").unwrap();
        let root = tree.root();
        let pattern = parse("sec/para");
        let nested = find(&root, "sec").children().next().unwrap();
        assert!(pattern.matches(&nested));
        let top = root.children().next().unwrap().children().nth(1).unwrap();
        assert!(!pattern.matches(&top));
    }

    #[test]
    fn absolute_and_descendant_patterns() {
        let tree = XmlTree::parse("<doc><a><b/></a></doc>").unwrap();
        let root = tree.root();
        let b = find(&root, "b");
        assert!(parse("/doc/a/b").matches(&b));
        assert!(!parse("/a/b").matches(&b));
        assert!(parse("//b").matches(&b));
        assert!(parse("doc//b").matches(&b));
        assert!(parse("/").matches(&root));
    }

    #[test]
    fn attribute_patterns() {
        let tree = XmlTree::parse(r#"<doc id="1"><item key="k"/></doc>"#).unwrap();
        let root = tree.root();
        let item_attr = find(&root, "item").attributes().next().unwrap();
        assert!(parse("@key").matches(&item_attr));
        assert!(parse("item/@key").matches(&item_attr));
        assert!(!parse("@id").matches(&item_attr));
        assert!(parse("@*").matches(&item_attr));
    }

    #[test]
    fn kind_test_patterns() {
        let tree = XmlTree::parse("<doc>text<!--c--></doc>").unwrap();
        let root = tree.root();
        let doc = root.children().next().unwrap();
        let text = doc.children().next().unwrap();
        let comment = doc.children().nth(1).unwrap();
        assert!(parse("text()").matches(&text));
        assert!(parse("comment()").matches(&comment));
        assert!(parse("node()").matches(&text));
        assert!(!parse("text()").matches(&comment));
    }

    #[test]
    fn prefixed_patterns_resolve_against_bindings() {
        let ns = Namespaces::new().bind("p", "http://x");
        let pattern = Pattern::parse("p:item", &ns).unwrap();
        let tree = XmlTree::parse(r#"<r xmlns:q="http://x"><q:item/></r>"#).unwrap();
        let item = find(&tree.root(), "item");
        assert!(pattern.matches(&item));
    }
}
