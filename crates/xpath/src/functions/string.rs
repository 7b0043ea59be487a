//! String functions.
//!
//! `substring` rounds its start and length arguments half-up (not floor);
//! `translate` drops characters whose index in the map string has no
//! counterpart in the replacement string; comparison-shaped functions all
//! route through the collation.

use stilo_xdm::SourceNode;

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::numeric::round_half_up;
use crate::functions::{
    ArgType, Table, def, double_arg, optional_string_arg, string_arg,
};
use crate::types::{AtomicValue, XdmItem, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "string", 0, Some(1), &[ArgType::Any], fn_string);
    def(table, "concat", 2, None, &[ArgType::Any], fn_concat);
    def(table, "string-join", 1, Some(2), &[ArgType::Any, ArgType::String], fn_string_join);
    def(
        table,
        "substring",
        2,
        Some(3),
        &[ArgType::String, ArgType::Numeric, ArgType::Numeric],
        fn_substring,
    );
    def(table, "string-length", 0, Some(1), &[ArgType::Any], fn_string_length);
    def(table, "normalize-space", 0, Some(1), &[ArgType::Any], fn_normalize_space);
    def(
        table,
        "normalize-unicode",
        1,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_normalize_unicode,
    );
    def(table, "upper-case", 1, Some(1), &[ArgType::String], fn_upper_case);
    def(table, "lower-case", 1, Some(1), &[ArgType::String], fn_lower_case);
    def(
        table,
        "translate",
        3,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_translate,
    );
    def(
        table,
        "contains",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_contains,
    );
    def(
        table,
        "starts-with",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_starts_with,
    );
    def(
        table,
        "ends-with",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_ends_with,
    );
    def(
        table,
        "substring-before",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_substring_before,
    );
    def(
        table,
        "substring-after",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_substring_after,
    );
    def(
        table,
        "compare",
        2,
        Some(3),
        &[ArgType::String, ArgType::String, ArgType::String],
        fn_compare,
    );
    def(
        table,
        "codepoints-to-string",
        1,
        Some(1),
        &[ArgType::Any],
        fn_codepoints_to_string,
    );
    def(
        table,
        "string-to-codepoints",
        1,
        Some(1),
        &[ArgType::String],
        fn_string_to_codepoints,
    );
    def(
        table,
        "codepoint-equal",
        2,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_codepoint_equal,
    );
    def(
        table,
        "contains-token",
        2,
        Some(3),
        &[ArgType::Any, ArgType::String, ArgType::String],
        fn_contains_token,
    );
    def(table, "encode-for-uri", 1, Some(1), &[ArgType::String], fn_encode_for_uri);
    def(table, "iri-to-uri", 1, Some(1), &[ArgType::String], fn_iri_to_uri);
    def(table, "escape-html-uri", 1, Some(1), &[ArgType::String], fn_escape_html_uri);
    def(
        table,
        "resolve-uri",
        1,
        Some(2),
        &[ArgType::String, ArgType::String],
        fn_resolve_uri,
    );
    def(table, "static-base-uri", 0, Some(0), &[], fn_static_base_uri);
    def(table, "default-collation", 0, Some(0), &[], fn_default_collation);
}

pub fn fn_string<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let value = match args.first() {
        Some(v) => v.clone(),
        None => match &ctx.item {
            Some(item) => XdmValue::from_item(item.clone()),
            None => return Err(XPathError::NoContextItem),
        },
    };
    if value.len() > 1 {
        return Err(XPathError::type_error("string() requires at most one item"));
    }
    Ok(XdmValue::from_string(value.to_string_value()))
}

/// Variadic; empty-sequence arguments stringify as the empty string.
pub fn fn_concat<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut out = String::new();
    for arg in &args {
        out.push_str(&arg.to_string_value());
    }
    Ok(XdmValue::from_string(out))
}

pub fn fn_string_join<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let separator = if args.len() > 1 {
        string_arg(&args, 1)
    } else {
        String::new()
    };
    let parts: Vec<String> = args[0]
        .atomized()?
        .iter()
        .map(AtomicValue::to_string_value)
        .collect();
    Ok(XdmValue::from_string(parts.join(&separator)))
}

/// Positions are 1-based; the start and length round half-up, and NaN in
/// either bound selects nothing.
pub fn fn_substring<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let source: Vec<char> = string_arg(&args, 0).chars().collect();
    let start = round_half_up(double_arg(&args, 1));
    if start.is_nan() {
        return Ok(XdmValue::from_string(""));
    }
    let end = if args.len() > 2 {
        let length = round_half_up(double_arg(&args, 2));
        if length.is_nan() {
            return Ok(XdmValue::from_string(""));
        }
        start + length
    } else {
        f64::INFINITY
    };
    let mut out = String::new();
    for (index, c) in source.iter().enumerate() {
        let position = (index + 1) as f64;
        if position >= start && position < end {
            out.push(*c);
        }
    }
    Ok(XdmValue::from_string(out))
}

pub fn fn_string_length<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let text = match args.first() {
        Some(v) => v.to_string_value(),
        None => match &ctx.item {
            Some(item) => item.string_value(),
            None => return Err(XPathError::NoContextItem),
        },
    };
    Ok(XdmValue::from_integer(text.chars().count() as i64))
}

/// Collapses runs of ASCII whitespace and trims the ends.
pub fn fn_normalize_space<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let text = match args.first() {
        Some(v) => v.to_string_value(),
        None => match &ctx.item {
            Some(item) => item.string_value(),
            None => return Err(XPathError::NoContextItem),
        },
    };
    let normalized = text.split_ascii_whitespace().collect::<Vec<_>>().join(" ");
    Ok(XdmValue::from_string(normalized))
}

/// ASCII-range input is already in every normal form, which is the subset
/// this engine guarantees; unknown forms are rejected.
pub fn fn_normalize_unicode<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let text = string_arg(&args, 0);
    let form = optional_string_arg(&args, 1)
        .unwrap_or_else(|| "NFC".to_string())
        .trim()
        .to_ascii_uppercase();
    match form.as_str() {
        "" | "NFC" | "NFD" | "NFKC" | "NFKD" => Ok(XdmValue::from_string(text)),
        other => Err(XPathError::UnsupportedNormalization(other.to_string())),
    }
}

pub fn fn_upper_case<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_string(string_arg(&args, 0).to_uppercase()))
}

pub fn fn_lower_case<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_string(string_arg(&args, 0).to_lowercase()))
}

pub fn fn_translate<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let source = string_arg(&args, 0);
    let map: Vec<char> = string_arg(&args, 1).chars().collect();
    let replace: Vec<char> = string_arg(&args, 2).chars().collect();
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match map.iter().position(|m| *m == c) {
            Some(index) => {
                if let Some(replacement) = replace.get(index) {
                    out.push(*replacement);
                }
                // no replacement at that index: the character is removed
            }
            None => out.push(c),
        }
    }
    Ok(XdmValue::from_string(out))
}

fn collation_pair<N: SourceNode>(
    args: &[XdmValue<N>],
    ctx: &EvaluationContext<'_, N>,
    collation_index: usize,
) -> Result<(String, String, stilo_xdm::Collation)> {
    let a = string_arg(args, 0);
    let b = string_arg(args, 1);
    let collation = ctx.resolve_collation(optional_string_arg(args, collation_index).as_deref())?;
    Ok((a, b, collation))
}

pub fn fn_contains<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    Ok(XdmValue::from_boolean(collation.contains(&a, &b)))
}

pub fn fn_starts_with<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    Ok(XdmValue::from_boolean(collation.starts_with(&a, &b)))
}

pub fn fn_ends_with<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    Ok(XdmValue::from_boolean(collation.ends_with(&a, &b)))
}

pub fn fn_substring_before<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    if b.is_empty() {
        return Ok(XdmValue::from_string(""));
    }
    let result = collation
        .key(&a)
        .find(&collation.key(&b))
        .map(|pos| a[..pos].to_string())
        .unwrap_or_default();
    Ok(XdmValue::from_string(result))
}

pub fn fn_substring_after<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    if b.is_empty() {
        return Ok(XdmValue::from_string(a));
    }
    let result = collation
        .key(&a)
        .find(&collation.key(&b))
        .map(|pos| a[pos + b.len()..].to_string())
        .unwrap_or_default();
    Ok(XdmValue::from_string(result))
}

pub fn fn_compare<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() || args[1].is_empty() {
        return Ok(XdmValue::empty());
    }
    let (a, b, collation) = collation_pair(&args, ctx, 2)?;
    let result = match collation.compare(&a, &b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(XdmValue::from_integer(result))
}

fn is_valid_xml_char(c: char) -> bool {
    c == '\t'
        || c == '\n'
        || c == '\r'
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || ('\u{10000}'..='\u{10FFFF}').contains(&c)
}

pub fn fn_codepoints_to_string<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut out = String::new();
    for atomic in args[0].atomized()? {
        let code = atomic.to_double();
        let c = u32::try_from(code as i64)
            .ok()
            .and_then(char::from_u32)
            .filter(|c| is_valid_xml_char(*c))
            .ok_or(XPathError::InvalidCodepoint)?;
        out.push(c);
    }
    Ok(XdmValue::from_string(out))
}

pub fn fn_string_to_codepoints<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let mut out = XdmValue::empty();
    for c in string_arg(&args, 0).chars() {
        out.push(XdmItem::Atomic(AtomicValue::Integer(c as i64)));
    }
    Ok(out)
}

pub fn fn_codepoint_equal<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() || args[1].is_empty() {
        return Ok(XdmValue::empty());
    }
    Ok(XdmValue::from_boolean(
        string_arg(&args, 0) == string_arg(&args, 1),
    ))
}

pub fn fn_contains_token<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let token = string_arg(&args, 1);
    let token = token.trim();
    let collation = ctx.resolve_collation(optional_string_arg(&args, 2).as_deref())?;
    for atomic in args[0].atomized()? {
        let text = atomic.to_string_value();
        if text
            .split_ascii_whitespace()
            .any(|candidate| collation.eq(candidate, token))
        {
            return Ok(XdmValue::from_boolean(true));
        }
    }
    Ok(XdmValue::from_boolean(false))
}

fn percent_encode(text: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if keep(c) {
            out.push(c);
        } else {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).as_bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

pub fn fn_encode_for_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let encoded = percent_encode(&string_arg(&args, 0), |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
    });
    Ok(XdmValue::from_string(encoded))
}

pub fn fn_iri_to_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let encoded = percent_encode(&string_arg(&args, 0), |c| {
        c.is_ascii() && c > ' ' && !matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`')
    });
    Ok(XdmValue::from_string(encoded))
}

pub fn fn_escape_html_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let encoded = percent_encode(&string_arg(&args, 0), |c| c.is_ascii() && (' '..='~').contains(&c));
    Ok(XdmValue::from_string(encoded))
}

pub fn fn_resolve_uri<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let reference = string_arg(&args, 0);
    let base = optional_string_arg(&args, 1)
        .or_else(|| ctx.static_base_uri.as_ref().map(|b| b.to_string()));
    let resolved = match base {
        Some(base) => stilo_xdm::datasource::xml::resolve_uri(&reference, &base),
        None => reference,
    };
    Ok(XdmValue::from_atomic(AtomicValue::AnyUri(resolved)))
}

pub fn fn_static_base_uri<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(match &ctx.static_base_uri {
        Some(base) => XdmValue::from_atomic(AtomicValue::AnyUri(base.to_string())),
        None => XdmValue::empty(),
    })
}

pub fn fn_default_collation<N: SourceNode>(
    _args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    Ok(XdmValue::from_string(ctx.default_collation().uri()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Ctx<'h> = EvaluationContext<'h, XmlNode>;
    type V = XdmValue<XmlNode>;

    fn s(text: &str) -> V {
        V::from_string(text)
    }

    #[test]
    fn substring_rounds_half_up() {
        let ctx = Ctx::new();
        let out = fn_substring(
            vec![s("12345"), V::from_double(1.5), V::from_double(2.6)],
            &ctx,
        )
        .unwrap();
        assert_eq!(out.to_string_value(), "234");
    }

    #[test]
    fn substring_handles_nan_and_infinite_bounds() {
        let ctx = Ctx::new();
        let out = fn_substring(
            vec![s("12345"), V::from_double(f64::NAN)],
            &ctx,
        )
        .unwrap();
        assert_eq!(out.to_string_value(), "");
        let out = fn_substring(
            vec![s("12345"), V::from_double(-2.0), V::from_double(f64::INFINITY)],
            &ctx,
        )
        .unwrap();
        assert_eq!(out.to_string_value(), "12345");
        let out = fn_substring(vec![s("12345"), V::from_double(0.0)], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "12345");
    }

    #[test]
    fn normalize_space_collapses_runs() {
        let ctx = Ctx::new();
        let out = fn_normalize_space(vec![s("  a \t b\n\nc  ")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "a b c");
    }

    #[test]
    fn translate_removes_unmapped_chars() {
        let ctx = Ctx::new();
        let out = fn_translate(vec![s("abcabc"), s("abc"), s("AB")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "ABAB");
    }

    #[test]
    fn concat_stringifies_empty_as_empty() {
        let ctx = Ctx::new();
        let out = fn_concat(vec![s("a"), V::empty(), s("b")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "ab");
    }

    #[test]
    fn compare_returns_sign() {
        let ctx = Ctx::new();
        assert_eq!(fn_compare(vec![s("a"), s("b")], &ctx).unwrap().to_double(), -1.0);
        assert_eq!(fn_compare(vec![s("b"), s("b")], &ctx).unwrap().to_double(), 0.0);
        assert!(fn_compare(vec![V::empty(), s("b")], &ctx).unwrap().is_empty());
    }

    #[test]
    fn codepoints_round_trip_and_validate() {
        let ctx = Ctx::new();
        let codes = fn_string_to_codepoints(vec![s("hi")], &ctx).unwrap();
        assert_eq!(codes.len(), 2);
        let back = fn_codepoints_to_string(vec![codes], &ctx).unwrap();
        assert_eq!(back.to_string_value(), "hi");
        let err = fn_codepoints_to_string(vec![V::from_integer(0)], &ctx).unwrap_err();
        assert_eq!(err.code(), "FOCH0001");
    }

    #[test]
    fn encode_for_uri_keeps_unreserved() {
        let ctx = Ctx::new();
        let out = fn_encode_for_uri(vec![s("a b/c~")], &ctx).unwrap();
        assert_eq!(out.to_string_value(), "a%20b%2Fc~");
    }

    #[test]
    fn unsupported_normalization_form_is_rejected() {
        let ctx = Ctx::new();
        let err = fn_normalize_unicode(vec![s("x"), s("FULLY")], &ctx).unwrap_err();
        assert_eq!(err.code(), "FOCH0003");
    }
}
