//! JSON functions: `parse-json`, `json-doc`, and the §17.5 JSON↔XML
//! representation mapping.
//!
//! Parsing keeps the raw entry list so the `duplicates` policy can act on
//! repeated object keys (`use-first` drops later occurrences, `reject`
//! raises, `retain` keeps all for the XML form). Numbers keep their lexical
//! form so the integer-versus-float distinction survives the round trip;
//! re-serialization goes through `serde_json` for canonical output.

use stilo_xdm::{FN_NAMESPACE, NodeKind, SourceNode};

use crate::context::EvaluationContext;
use crate::error::{Result, XPathError};
use crate::functions::{ArgType, Table, def, optional_string_arg, string_arg};
use crate::types::{AtomicValue, XdmArray, XdmItem, XdmMap, XdmValue};

pub(crate) fn register<N: SourceNode>(table: &mut Table<N>) {
    def(table, "parse-json", 1, Some(2), &[ArgType::String, ArgType::Any], fn_parse_json);
    def(table, "json-doc", 1, Some(2), &[ArgType::String, ArgType::Any], fn_json_doc);
    def(table, "json-to-xml", 1, Some(2), &[ArgType::String, ArgType::Any], fn_json_to_xml);
    def(table, "xml-to-json", 1, Some(2), &[ArgType::NodeSet, ArgType::Any], fn_xml_to_json);
}

// --- options ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duplicates {
    UseFirst,
    Reject,
    Retain,
}

#[derive(Debug, Clone, Copy)]
struct JsonOptions {
    duplicates: Duplicates,
    liberal: bool,
    escape: bool,
    validate: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            duplicates: Duplicates::UseFirst,
            liberal: false,
            escape: false,
            validate: false,
        }
    }
}

fn parse_options<N: SourceNode>(
    args: &[XdmValue<N>],
    index: usize,
    allow_retain: bool,
) -> Result<JsonOptions> {
    let mut options = JsonOptions::default();
    let map = match args.get(index).and_then(XdmValue::first) {
        None => return Ok(options),
        Some(XdmItem::Map(map)) => map,
        Some(other) => {
            return Err(XPathError::JsonOptions(format!(
                "options must be a map, got {}",
                other.type_name()
            )));
        }
    };
    for (key, value) in map.entries() {
        let name = key.to_string_value();
        match name.as_str() {
            "liberal" | "escape" | "validate" => {
                let flag = match value.first() {
                    Some(XdmItem::Atomic(AtomicValue::Boolean(b))) => *b,
                    _ => {
                        return Err(XPathError::JsonOptions(format!(
                            "option '{}' must be a boolean",
                            name
                        )));
                    }
                };
                match name.as_str() {
                    "liberal" => options.liberal = flag,
                    "escape" => options.escape = flag,
                    _ => options.validate = flag,
                }
            }
            "duplicates" => {
                options.duplicates = match value.to_string_value().as_str() {
                    "use-first" => Duplicates::UseFirst,
                    "reject" => Duplicates::Reject,
                    "retain" if allow_retain => Duplicates::Retain,
                    other => {
                        return Err(XPathError::JsonOptions(format!(
                            "bad duplicates option '{}'",
                            other
                        )));
                    }
                };
            }
            // unknown options are ignored
            _ => {}
        }
    }
    Ok(options)
}

// --- a duplicate-preserving JSON reader --------------------------------

/// Parsed JSON keeping lexical numbers and every object entry, so the
/// duplicates policy is applied by the consumer.
#[derive(Debug, Clone)]
enum Json {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<Json>),
    Object(Vec<(String, Json)>),
}

struct Reader<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> XPathError {
        XPathError::JsonParse(format!("{} at offset {}", message, self.pos))
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.text.get(self.pos) {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }

    fn parse(&mut self) -> Result<Json> {
        self.skip_ws();
        let value = self.value()?;
        self.skip_ws();
        if self.pos != self.text.len() {
            return Err(self.error("trailing content"));
        }
        Ok(value)
    }

    fn value(&mut self) -> Result<Json> {
        self.skip_ws();
        match self.peek().ok_or_else(|| self.error("unexpected end"))? {
            b'{' => self.object(),
            b'[' => self.array(),
            b'"' => Ok(Json::String(self.string()?)),
            b't' => self.literal("true", Json::Bool(true)),
            b'f' => self.literal("false", Json::Bool(false)),
            b'n' => self.literal("null", Json::Null),
            b'-' | b'0'..=b'9' => self.number(),
            _ => Err(self.error("unexpected character")),
        }
    }

    fn literal(&mut self, word: &str, value: Json) -> Result<Json> {
        if self.text[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.error("bad literal"))
        }
    }

    fn number(&mut self) -> Result<Json> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let lexical = std::str::from_utf8(&self.text[start..self.pos])
            .map_err(|_| self.error("bad number"))?;
        if lexical.parse::<f64>().is_err() {
            return Err(self.error("bad number"));
        }
        Ok(Json::Number(lexical.to_string()))
    }

    fn string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            match self.peek().ok_or_else(|| self.error("unterminated string"))? {
                b'"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    self.pos += 1;
                    match self.peek().ok_or_else(|| self.error("bad escape"))? {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let hex = self
                                .text
                                .get(self.pos + 1..self.pos + 5)
                                .ok_or_else(|| self.error("bad unicode escape"))?;
                            let code = u32::from_str_radix(
                                std::str::from_utf8(hex)
                                    .map_err(|_| self.error("bad unicode escape"))?,
                                16,
                            )
                            .map_err(|_| self.error("bad unicode escape"))?;
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                            self.pos += 4;
                        }
                        _ => return Err(self.error("bad escape")),
                    }
                    self.pos += 1;
                }
                _ => {
                    let rest = std::str::from_utf8(&self.text[self.pos..])
                        .map_err(|_| self.error("bad utf-8"))?;
                    let c = rest.chars().next().expect("nonempty");
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn array(&mut self) -> Result<Json> {
        self.expect(b'[')?;
        let mut members = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Json::Array(members));
        }
        loop {
            members.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Json::Array(members));
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn object(&mut self) -> Result<Json> {
        self.expect(b'{')?;
        let mut entries = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Json::Object(entries));
        }
        loop {
            self.skip_ws();
            let key = self.string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.value()?;
            entries.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Json::Object(entries));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }
}

fn number_atomic(lexical: &str) -> AtomicValue {
    if lexical.contains(['.', 'e', 'E']) {
        AtomicValue::Double(lexical.parse().unwrap_or(f64::NAN))
    } else {
        match lexical.parse::<i64>() {
            Ok(i) => AtomicValue::Integer(i),
            Err(_) => AtomicValue::Double(lexical.parse().unwrap_or(f64::NAN)),
        }
    }
}

fn json_to_xdm<N: SourceNode>(json: &Json, options: &JsonOptions) -> Result<XdmValue<N>> {
    Ok(match json {
        Json::Null => XdmValue::empty(),
        Json::Bool(b) => XdmValue::from_boolean(*b),
        Json::Number(lexical) => XdmValue::from_atomic(number_atomic(lexical)),
        Json::String(s) => XdmValue::from_string(s.clone()),
        Json::Array(members) => {
            let mut out = Vec::with_capacity(members.len());
            for member in members {
                out.push(json_to_xdm(member, options)?);
            }
            XdmValue::from_item(XdmItem::Array(XdmArray::new(out)))
        }
        Json::Object(entries) => {
            let mut map = XdmMap::new();
            for (key, value) in entries {
                let key = AtomicValue::String(key.clone());
                if map.contains(&key) {
                    match options.duplicates {
                        Duplicates::UseFirst => continue,
                        _ => {
                            return Err(XPathError::JsonDuplicateKey(key.to_string_value()));
                        }
                    }
                }
                map.put(key, json_to_xdm(value, options)?)?;
            }
            XdmValue::from_item(XdmItem::Map(map))
        }
    })
}

pub fn fn_parse_json<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let options = parse_options(&args, 1, false)?;
    let json = Reader::new(&string_arg(&args, 0)).parse()?;
    json_to_xdm(&json, &options)
}

pub fn fn_json_doc<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    let href = string_arg(&args, 0);
    let hooks = ctx.hooks.ok_or_else(|| {
        XPathError::dynamic("XPST0001", "no resource loader in the evaluation context")
    })?;
    let base = ctx.static_base_uri.as_ref().map(|b| b.to_string());
    let text = hooks.unparsed_text(&href, None, base.as_deref())?;
    let options = parse_options(&args, 1, false)?;
    let json = Reader::new(&text).parse()?;
    json_to_xdm(&json, &options)
}

// --- json-to-xml --------------------------------------------------------

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

fn escape_attr(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

fn json_to_xml_text(
    json: &Json,
    key: Option<&str>,
    options: &JsonOptions,
    out: &mut String,
) -> Result<()> {
    let attr = |out: &mut String, key: Option<&str>| {
        if let Some(key) = key {
            out.push_str(" key=\"");
            escape_attr(key, out);
            out.push('"');
        }
    };
    match json {
        Json::Null => {
            out.push_str("<null");
            attr(out, key);
            out.push_str("/>");
        }
        Json::Bool(b) => {
            out.push_str("<boolean");
            attr(out, key);
            out.push('>');
            out.push_str(if *b { "true" } else { "false" });
            out.push_str("</boolean>");
        }
        Json::Number(lexical) => {
            out.push_str("<number");
            attr(out, key);
            out.push('>');
            out.push_str(lexical);
            out.push_str("</number>");
        }
        Json::String(s) => {
            out.push_str("<string");
            attr(out, key);
            out.push('>');
            escape_text(s, out);
            out.push_str("</string>");
        }
        Json::Array(members) => {
            out.push_str("<array");
            attr(out, key);
            out.push('>');
            for member in members {
                json_to_xml_text(member, None, options, out)?;
            }
            out.push_str("</array>");
        }
        Json::Object(entries) => {
            out.push_str("<map");
            attr(out, key);
            out.push('>');
            let mut seen: Vec<&str> = Vec::new();
            for (entry_key, value) in entries {
                if seen.contains(&entry_key.as_str()) {
                    match options.duplicates {
                        // the descending writer skips the duplicate subtree
                        Duplicates::UseFirst => continue,
                        Duplicates::Reject => {
                            return Err(XPathError::JsonDuplicateKey(entry_key.clone()));
                        }
                        Duplicates::Retain => {}
                    }
                }
                seen.push(entry_key);
                json_to_xml_text(value, Some(entry_key), options, out)?;
            }
            out.push_str("</map>");
        }
    }
    Ok(())
}

pub fn fn_json_to_xml<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let options = parse_options(&args, 1, true)?;
    let json = Reader::new(&string_arg(&args, 0)).parse()?;
    let mut xml = String::new();
    json_to_xml_text(&json, None, &options, &mut xml)?;
    // bind the default namespace on the root element, right after its name
    let name_end = 1 + xml[1..]
        .find(|c: char| !c.is_ascii_alphabetic())
        .expect("serialized element");
    let wrapped = format!(
        "{} xmlns=\"{}\"{}",
        &xml[..name_end],
        FN_NAMESPACE,
        &xml[name_end..]
    );
    let hooks = ctx.hooks.ok_or_else(|| {
        XPathError::dynamic("XPST0001", "no document factory in the evaluation context")
    })?;
    hooks.parse_xml(&wrapped).map(XdmValue::from_node)
}

// --- xml-to-json --------------------------------------------------------

fn json_element_name<N: SourceNode>(node: &N) -> Result<String> {
    let name = node
        .expanded_name()
        .ok_or_else(|| XPathError::JsonWrite("unnamed node in JSON tree".to_string()))?;
    if let Some(uri) = &name.uri {
        if uri != FN_NAMESPACE {
            return Err(XPathError::JsonWrite(format!(
                "element {} is not in the functions namespace",
                name
            )));
        }
    }
    Ok(name.local)
}

fn element_children<N: SourceNode>(node: &N) -> Vec<N> {
    node.children()
        .filter(|child| child.node_kind() == NodeKind::Element)
        .collect()
}

fn key_attr<N: SourceNode>(node: &N) -> Option<String> {
    node.attributes()
        .find(|attr| {
            attr.expanded_name()
                .map(|name| name.local == "key" && name.uri.is_none())
                .unwrap_or(false)
        })
        .map(|attr| attr.string_value())
}

fn xml_to_json_text<N: SourceNode>(node: &N, out: &mut String) -> Result<()> {
    match json_element_name(node)?.as_str() {
        "null" => out.push_str("null"),
        "boolean" => {
            let value = node.string_value();
            out.push_str(if value.trim() == "true" || value.trim() == "1" {
                "true"
            } else {
                "false"
            });
        }
        "number" => {
            let text = node.string_value();
            let parsed: f64 = text
                .trim()
                .parse()
                .map_err(|_| XPathError::JsonWrite(format!("bad number '{}'", text)))?;
            if parsed.is_nan() || parsed.is_infinite() {
                return Err(XPathError::JsonWrite(format!(
                    "number '{}' has no JSON form",
                    text
                )));
            }
            // canonical re-serialization
            let canonical: serde_json::Value = serde_json::from_str(text.trim())
                .map_err(|_| XPathError::JsonWrite(format!("bad number '{}'", text)))?;
            out.push_str(&canonical.to_string());
        }
        "string" => {
            out.push_str(&serde_json::Value::String(node.string_value()).to_string());
        }
        "array" => {
            out.push('[');
            for (index, child) in element_children(node).iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                xml_to_json_text(child, out)?;
            }
            out.push(']');
        }
        "map" => {
            out.push('{');
            let mut seen: Vec<String> = Vec::new();
            for (index, child) in element_children(node).iter().enumerate() {
                let key = key_attr(child).ok_or_else(|| {
                    XPathError::JsonWrite("map entry without a key attribute".to_string())
                })?;
                if seen.contains(&key) {
                    return Err(XPathError::JsonWrite(format!("duplicate key '{}'", key)));
                }
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                seen.push(key);
                xml_to_json_text(child, out)?;
            }
            out.push('}');
        }
        other => {
            return Err(XPathError::JsonWrite(format!(
                "unexpected element '{}' in JSON tree",
                other
            )));
        }
    }
    Ok(())
}

pub fn fn_xml_to_json<N: SourceNode>(
    args: Vec<XdmValue<N>>,
    _ctx: &EvaluationContext<'_, N>,
) -> Result<XdmValue<N>> {
    if args[0].is_empty() {
        return Ok(XdmValue::empty());
    }
    let _ = optional_string_arg(&args, 1);
    let node = args[0]
        .first()
        .and_then(XdmItem::as_node)
        .cloned()
        .ok_or_else(|| XPathError::type_error("xml-to-json requires a node"))?;
    let element = if node.node_kind() == NodeKind::Document {
        element_children(&node)
            .into_iter()
            .next()
            .ok_or_else(|| XPathError::JsonWrite("empty document".to_string()))?
    } else {
        node
    };
    let mut out = String::new();
    xml_to_json_text(&element, &mut out)?;
    Ok(XdmValue::from_string(out))
}
