//! Regular-expression functions.
//!
//! Patterns compile onto the host regex engine after flag translation
//! (`s`, `m`, `i`, `x` become inline flags, `q` escapes the pattern).
//! Compiled patterns live in a process-wide cache keyed by
//! `(pattern, flags)`; entries are immutable so concurrent population can
//! only duplicate work.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use stilo_xdm::{FN_NAMESPACE, SourceNode};

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{ArgType, Table, def, optional_string_arg, string_arg};
use crate::types::{AtomicValue, XdmItem, XdmValue};

static REGEX_CACHE: LazyLock<Mutex<HashMap<(String, String), Arc<Regex>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(
        table,
        "matches",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_matches,
    );
    def(
        table,
        "replace",
        3,
        Some(4),
        &[ArgType::String, ArgType::String, ArgType::String, ArgType::String],
        fn_replace,
    );
    def(
        table,
        "tokenize",
        1,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_tokenize,
    );
    def(
        table,
        "analyze-string",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_analyze_string,
    );
    def(table, "regex-group", 1, Some(1), &[ArgType::Numeric], fn_regex_group);
}

/// Compiles a pattern with XPath flags, via the process-wide cache.
pub fn compile_regex(pattern: &str, flags: &str) -> Result<Arc<Regex>> {
    let key = (pattern.to_string(), flags.to_string());
    if let Some(compiled) = REGEX_CACHE.lock().unwrap().get(&key) {
        return Ok(Arc::clone(compiled));
    }

    let mut translated = String::new();
    let mut literal = false;
    for flag in flags.chars() {
        match flag {
            'i' => translated.push_str("(?i)"),
            'm' => translated.push_str("(?m)"),
            's' => translated.push_str("(?s)"),
            'x' => translated.push_str("(?x)"),
            'q' => literal = true,
            _ => return Err(XPathError::RegexFlags(flags.to_string())),
        }
    }
    if literal {
        translated.push_str(&regex::escape(pattern));
    } else {
        translated.push_str(pattern);
    }

    let compiled = Regex::new(&translated).map_err(|e| XPathError::RegexSyntax {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let compiled = Arc::new(compiled);
    REGEX_CACHE
        .lock()
        .unwrap()
        .insert(key, Arc::clone(&compiled));
    Ok(compiled)
}

pub fn fn_matches<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let input = string_arg(&args, 0);
    let regex = compile_regex(
        &string_arg(&args, 1),
        &optional_string_arg(&args, 2).unwrap_or_default(),
    )?;
    Ok(XdmValue::from_boolean(regex.is_match(&input)))
}

pub fn fn_replace<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let input = string_arg(&args, 0);
    let regex = compile_regex(
        &string_arg(&args, 1),
        &optional_string_arg(&args, 3).unwrap_or_default(),
    )?;
    // XPath replacement syntax: $N group references, \$ and \\ escapes
    let replacement = string_arg(&args, 2);
    let mut translated = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => translated.push_str("$$"),
                Some('\\') => translated.push('\\'),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => translated.push('\\'),
            },
            '$' => {
                translated.push('$');
                // brace the group number so a following digit character
                // in the text does not extend it
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                translated.push('{');
                translated.push_str(&digits);
                translated.push('}');
            }
            other => translated.push(other),
        }
    }
    Ok(XdmValue::from_string(
        regex.replace_all(&input, translated.as_str()).into_owned(),
    ))
}

pub fn fn_tokenize<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let input = string_arg(&args, 0);
    let mut out = XdmValue::empty();
    if args.len() == 1 {
        // one-argument form splits on whitespace after trimming
        for token in input.split_ascii_whitespace() {
            out.push(XdmItem::Atomic(AtomicValue::String(token.to_string())));
        }
        return Ok(out);
    }
    let regex = compile_regex(
        &string_arg(&args, 1),
        &optional_string_arg(&args, 2).unwrap_or_default(),
    )?;
    if input.is_empty() {
        return Ok(out);
    }
    for token in regex.split(&input) {
        out.push(XdmItem::Atomic(AtomicValue::String(token.to_string())));
    }
    Ok(out)
}

fn xml_escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

/// Builds the `fn:analyze-string-result` document: alternating
/// `fn:non-match` and `fn:match` children, with numbered `fn:group`
/// elements for capturing groups.
pub fn fn_analyze_string<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let input = string_arg(&args, 0);
    let regex = compile_regex(
        &string_arg(&args, 1),
        &optional_string_arg(&args, 2).unwrap_or_default(),
    )?;

    let mut xml = String::new();
    xml.push_str(&format!(
        "<fn:analyze-string-result xmlns:fn=\"{}\">",
        FN_NAMESPACE
    ));
    let mut cursor = 0;
    for captures in regex.captures_iter(&input) {
        let whole = captures.get(0).expect("group 0 always matches");
        if whole.start() > cursor {
            xml.push_str("<fn:non-match>");
            xml_escape(&input[cursor..whole.start()], &mut xml);
            xml.push_str("</fn:non-match>");
        }
        xml.push_str("<fn:match>");
        // emit group spans interleaved with plain match text
        let mut inner = whole.start();
        let mut spans: Vec<(usize, regex::Match)> = Vec::new();
        for nr in 1..captures.len() {
            if let Some(group) = captures.get(nr) {
                spans.push((nr, group));
            }
        }
        spans.sort_by_key(|(_, group)| group.start());
        for (nr, group) in spans {
            if group.start() < inner {
                // nested group; the outer group already covers it
                continue;
            }
            xml_escape(&input[inner..group.start()], &mut xml);
            xml.push_str(&format!("<fn:group nr=\"{}\">", nr));
            xml_escape(group.as_str(), &mut xml);
            xml.push_str("</fn:group>");
            inner = group.end();
        }
        xml_escape(&input[inner..whole.end()], &mut xml);
        xml.push_str("</fn:match>");
        cursor = whole.end();
    }
    if cursor < input.len() {
        xml.push_str("<fn:non-match>");
        xml_escape(&input[cursor..], &mut xml);
        xml.push_str("</fn:non-match>");
    }
    xml.push_str("</fn:analyze-string-result>");

    let hooks = ctx.hooks.ok_or_else(|| {
        XPathError::dynamic("XPST0001", "no document factory in the evaluation context")
    })?;
    let document = hooks.parse_xml(&xml)?;
    // the result element, not its document wrapper
    let element = document
        .children()
        .next()
        .ok_or_else(|| XPathError::XmlParse("empty analyze-string result".to_string()))?;
    Ok(XdmValue::from_node(element))
}

/// The n-th captured group of the innermost active match.
pub fn fn_regex_group<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let n = args[0].to_double();
    let text = match (&ctx.regex_match, n) {
        (Some(found), n) if n >= 0.0 => found.group(n as usize).to_string(),
        _ => String::new(),
    };
    Ok(XdmValue::from_string(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RegexMatch;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    fn s(text: &str) -> V {
        V::from_string(text)
    }

    #[test]
    fn matches_and_flags() {
        let ctx = Ctx::new();
        assert!(
            fn_matches(vec![s("Hello"), s("^h"), s("i")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
        let err = fn_matches(vec![s("x"), s("x"), s("z")], &ctx).unwrap_err();
        assert_eq!(err.code(), "FORX0001");
        let err = fn_matches(vec![s("x"), s("(")], &ctx).unwrap_err();
        assert_eq!(err.code(), "FORX0002");
    }

    #[test]
    fn q_flag_escapes_the_pattern() {
        let ctx = Ctx::new();
        assert!(
            fn_matches(vec![s("a(b)"), s("(b)"), s("q")], &ctx)
                .unwrap()
                .effective_boolean_value()
                .unwrap()
        );
    }

    #[test]
    fn replace_with_group_references() {
        let ctx = Ctx::new();
        let out = fn_replace(
            vec![s("John Smith"), s("(\\w+) (\\w+)"), s("$2, $1")],
            &ctx,
        )
        .unwrap();
        assert_eq!(out.to_string_value(), "Smith, John");
    }

    #[test]
    fn tokenize_forms() {
        let ctx = Ctx::new();
        let out = fn_tokenize(vec![s(" a  b c ")], &ctx).unwrap();
        assert_eq!(out.len(), 3);
        let out = fn_tokenize(vec![s("a,b,,c"), s(",")], &ctx).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn regex_group_reads_context_state() {
        let ctx = Ctx::new().with_regex_match(RegexMatch {
            groups: vec![
                Some("whole".to_string()),
                Some("first".to_string()),
                None,
            ],
        });
        assert_eq!(
            fn_regex_group(vec![V::from_integer(1)], &ctx)
                .unwrap()
                .to_string_value(),
            "first"
        );
        assert_eq!(
            fn_regex_group(vec![V::from_integer(2)], &ctx)
                .unwrap()
                .to_string_value(),
            ""
        );
        assert_eq!(
            fn_regex_group(vec![V::from_integer(9)], &ctx)
                .unwrap()
                .to_string_value(),
            ""
        );
    }

    #[test]
    fn compiled_patterns_are_cached() {
        let first = compile_regex("cache-me", "i").unwrap();
        let second = compile_regex("cache-me", "i").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
