//! End-to-end XSLT runtime scenarios: keys, decimal formats, date/time
//! pictures, JSON conversion, documents and accumulators, all driven
//! through a `TransformContext`.

use std::sync::Arc;

use stilo::xpath::DecimalFormat;
use stilo::xpath::{evaluate_xpath, parse_expression};
use stilo::xslt::stylesheet::{
    AccumulatorDecl, AccumulatorPhase, AccumulatorRule, FunctionParam, KeyDefinition,
    UserFunction,
};
use stilo::xslt::{CompiledStylesheet, MemoryResolver, Pattern, TransformContext};
use stilo::{ExpandedName, Namespaces, SourceNode, XmlNode, XmlTree};

fn eval_with(
    runtime: &TransformContext,
    extra_namespaces: &[(&str, &str)],
    source: Option<&Arc<XmlTree>>,
    expression: &str,
) -> Result<stilo::XdmValue<XmlNode>, stilo::XPathError> {
    let mut namespaces = stilo::xpath::default_static_namespaces();
    for (prefix, uri) in extra_namespaces {
        namespaces = namespaces.bind(*prefix, *uri);
    }
    let mut ctx = runtime.context().with_namespaces(namespaces);
    if let Some(tree) = source {
        ctx = ctx.with_current_node(tree.root());
    }
    evaluate_xpath(expression, &ctx)
}

#[test]
fn key_results_do_not_depend_on_the_lexical_prefix() {
    // two declarations for the same expanded name {http://x}k
    let ns = Namespaces::new();
    let stylesheet = CompiledStylesheet::builder()
        .key(
            ExpandedName::new("http://x", "k"),
            KeyDefinition {
                pattern: Pattern::parse("item", &ns).unwrap(),
                use_expr: parse_expression("@id").unwrap(),
                collation: None,
            },
        )
        .key(
            ExpandedName::new("http://x", "k"),
            KeyDefinition {
                pattern: Pattern::parse("extra", &ns).unwrap(),
                use_expr: parse_expression("@ref").unwrap(),
                collation: None,
            },
        )
        .build();
    let runtime = TransformContext::new(stylesheet);
    let tree = XmlTree::parse(
        r#"<doc><item id="v">1</item><extra ref="v">2</extra><item id="w">3</item></doc>"#,
    )
    .unwrap();

    let bindings = [("p", "http://x"), ("q", "http://x")];
    let with_p = eval_with(&runtime, &bindings, Some(&tree), "key('p:k', 'v')").unwrap();
    let with_q = eval_with(&runtime, &bindings, Some(&tree), "key('q:k', 'v')").unwrap();
    assert_eq!(with_p.len(), 2, "both declarations populate the key");
    assert_eq!(with_p, with_q, "prefix is not part of key identity");

    // value order does not change the result set
    let forward =
        eval_with(&runtime, &bindings, Some(&tree), "key('p:k', ('v','w'))").unwrap();
    let backward =
        eval_with(&runtime, &bindings, Some(&tree), "key('p:k', ('w','v'))").unwrap();
    assert_eq!(forward, backward);
}

#[test]
fn format_number_with_custom_symbols() {
    let stylesheet = CompiledStylesheet::builder()
        .decimal_format(
            None,
            DecimalFormat {
                decimal_separator: ',',
                grouping_separator: '.',
                ..DecimalFormat::default()
            },
        )
        .build();
    let runtime = TransformContext::new(stylesheet);
    let out = eval_with(
        &runtime,
        &[],
        None,
        "format-number(-1234.5, '#.##0,00;(#.##0,00)')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "(1.234,50)");
}

#[test]
fn format_number_unknown_format_name_is_xtde1280() {
    let runtime = TransformContext::bare();
    let err = eval_with(&runtime, &[], None, "format-number(1, '0', 'nope')").unwrap_err();
    assert_eq!(err.code(), "XTDE1280");
}

#[test]
fn format_datetime_pictures() {
    let runtime = TransformContext::bare();
    let out = eval_with(
        &runtime,
        &[],
        None,
        "format-dateTime(xs:dateTime('2024-07-09T08:05:03'), \
         '[Y0001]-[M01]-[D01]T[H01]:[m01]:[s01]')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "2024-07-09T08:05:03");

    let out = eval_with(
        &runtime,
        &[],
        None,
        "format-date(xs:date('2024-07-01'), '[D1o] [MNn] [Y]')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "1st July 2024");
}

#[test]
fn format_integer_pictures() {
    let runtime = TransformContext::bare();
    for (expr, expected) in [
        ("format-integer(7, '001')", "007"),
        ("format-integer(1234567, '#,###')", "1,234,567"),
        ("format-integer(2024, 'I')", "MMXXIV"),
        ("format-integer(4000, 'I')", "4000"),
        ("format-integer(3, 'w;o')", "third"),
        ("format-integer(28, 'a')", "ab"),
    ] {
        let out = eval_with(&runtime, &[], None, expr).unwrap();
        assert_eq!(out.to_string_value(), expected, "{}", expr);
    }
}

#[test]
fn json_round_trip() {
    let runtime = TransformContext::bare();
    let out = eval_with(
        &runtime,
        &[],
        None,
        r#"xml-to-json(json-to-xml('{"a":[1,2],"b":true}'))"#,
    )
    .unwrap();
    let produced: serde_json::Value =
        serde_json::from_str(&out.to_string_value()).unwrap();
    assert_eq!(produced, serde_json::json!({"a": [1, 2], "b": true}));
}

#[test]
fn json_to_xml_produces_the_w3c_vocabulary() {
    let runtime = TransformContext::bare();
    let out = eval_with(
        &runtime,
        &[("j", "http://www.w3.org/2005/xpath-functions")],
        None,
        "json-to-xml('{\"n\": 1.5}')/j:map/j:number/@key",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "n");
}

#[test]
fn generate_id_agrees_with_node_identity() {
    let runtime = TransformContext::bare();
    let tree = XmlTree::parse("<doc><a/><a/></doc>").unwrap();
    let same = eval_with(
        &runtime,
        &[],
        Some(&tree),
        "generate-id(/doc/a[1]) = generate-id((//a)[1])",
    )
    .unwrap();
    assert!(same.effective_boolean_value().unwrap());
    let different = eval_with(
        &runtime,
        &[],
        Some(&tree),
        "generate-id(/doc/a[1]) = generate-id(/doc/a[2])",
    )
    .unwrap();
    assert!(!different.effective_boolean_value().unwrap());
}

#[test]
fn documents_load_resolve_and_cache() {
    let resolver = MemoryResolver::new()
        .with("mem://docs/data.xml", "<data><x>42</x></data>")
        .with("mem://docs/other.xml", "<other/>");
    let stylesheet = CompiledStylesheet::builder()
        .base_uri("mem://docs/stylesheet.xsl")
        .build();
    let runtime = TransformContext::with_resolver(stylesheet, Arc::new(resolver));

    let out = eval_with(&runtime, &[], None, "doc('data.xml')/data/x").unwrap();
    assert_eq!(out.to_string_value(), "42");

    // document() swallows failures, doc() raises FODC0002
    let out = eval_with(&runtime, &[], None, "count(document('missing.xml'))").unwrap();
    assert_eq!(out.to_double(), 0.0);
    let err = eval_with(&runtime, &[], None, "doc('missing.xml')").unwrap_err();
    assert_eq!(err.code(), "FODC0002");
    let out = eval_with(&runtime, &[], None, "doc-available('missing.xml')").unwrap();
    assert!(!out.effective_boolean_value().unwrap());
    let out = eval_with(&runtime, &[], None, "doc-available('other.xml')").unwrap();
    assert!(out.effective_boolean_value().unwrap());

    // the cache hands back the same document (same identity)
    let same = eval_with(
        &runtime,
        &[],
        None,
        "doc('data.xml') is doc('mem://docs/data.xml')",
    )
    .unwrap();
    assert!(same.effective_boolean_value().unwrap());
}

#[test]
fn unparsed_text_and_lines() {
    let resolver = MemoryResolver::new().with("mem://text/notes.txt", "one\ntwo\r\nthree\n");
    let runtime = TransformContext::with_resolver(
        CompiledStylesheet::builder().build(),
        Arc::new(resolver),
    );
    let out = eval_with(
        &runtime,
        &[],
        None,
        "count(unparsed-text-lines('mem://text/notes.txt'))",
    )
    .unwrap();
    assert_eq!(out.to_double(), 3.0);
    let out = eval_with(
        &runtime,
        &[],
        None,
        "unparsed-text-available('mem://text/missing.txt')",
    )
    .unwrap();
    assert!(!out.effective_boolean_value().unwrap());
}

#[test]
fn accumulators_expose_before_and_after_values() {
    let ns = Namespaces::new();
    let stylesheet = CompiledStylesheet::builder()
        .accumulator(AccumulatorDecl {
            name: ExpandedName::local("total"),
            initial: parse_expression("0").unwrap(),
            rules: vec![AccumulatorRule {
                pattern: Pattern::parse("n", &ns).unwrap(),
                phase: AccumulatorPhase::Start,
                select: parse_expression("$value + number(.)").unwrap(),
            }],
        })
        .build();
    let runtime = TransformContext::new(stylesheet);
    let tree = XmlTree::parse("<doc><n>1</n><n>2</n><n>3</n></doc>").unwrap();

    let second = tree
        .root()
        .descendants()
        .filter(|n| n.expanded_name().map(|e| e.local == "n").unwrap_or(false))
        .nth(1)
        .unwrap();
    let ctx = runtime.context().with_current_node(second);
    let before = evaluate_xpath("accumulator-before('total')", &ctx).unwrap();
    assert_eq!(before.to_double(), 3.0, "1 + 2 at the second n");
    let ctx = runtime.context().with_current_node(tree.root());
    let after = evaluate_xpath("accumulator-after('total')", &ctx).unwrap();
    assert_eq!(after.to_double(), 6.0);

    // unknown accumulator names raise dynamically
    let err = evaluate_xpath("accumulator-before('nope')", &ctx).unwrap_err();
    assert_eq!(err.code(), "XTDE3340");
}

#[test]
fn analyze_string_builds_the_result_tree() {
    let runtime = TransformContext::bare();
    let fns = ("f", "http://www.w3.org/2005/xpath-functions");
    let out = eval_with(
        &runtime,
        &[fns],
        None,
        "string-join(analyze-string('a1b22', '([0-9]+)')/f:match/f:group[@nr='1'], ',')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "1,22");
    let out = eval_with(
        &runtime,
        &[fns],
        None,
        "string-join(analyze-string('a1b22', '[0-9]+')/f:non-match, '|')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "a|b");
}

#[test]
fn user_functions_participate_in_higher_order_calls() {
    let stylesheet = CompiledStylesheet::builder()
        .function(UserFunction {
            name: ExpandedName::new("http://example.com/f", "shout"),
            params: vec![FunctionParam {
                name: "s".to_string(),
                seq_type: None,
            }],
            return_type: None,
            cache: false,
            body: parse_expression("concat(upper-case($s), '!')").unwrap(),
        })
        .build();
    let runtime = TransformContext::new(stylesheet);
    let out = eval_with(
        &runtime,
        &[("f", "http://example.com/f")],
        None,
        "string-join(for-each(('a','b'), f:shout#1), '')",
    )
    .unwrap();
    assert_eq!(out.to_string_value(), "A!B!");
}

#[test]
fn system_properties_for_the_xslt_namespace() {
    let runtime = TransformContext::new(
        CompiledStylesheet::builder()
            .package("urn:example:pkg", "1.2.3")
            .build(),
    );
    for (name, expected) in [
        ("xsl:version", "3.0"),
        ("xsl:xpath-version", "3.1"),
        ("xsl:supports-streaming", "no"),
        ("xsl:is-schema-aware", "no"),
        ("xsl:supports-serialization", "yes"),
        ("xsl:package-name", "urn:example:pkg"),
        ("xsl:package-version", "1.2.3"),
    ] {
        let out = eval_with(
            &runtime,
            &[],
            None,
            &format!("system-property('{}')", name),
        )
        .unwrap();
        assert_eq!(out.to_string_value(), expected, "{}", name);
    }
}

#[test]
fn rtf_buffer_round_trips_into_a_document() {
    use stilo::QName;
    use stilo::xslt::{EventSink, RtfBuffer};

    let mut buffer = RtfBuffer::new();
    buffer.start_document();
    buffer.start_element(&QName::new("greeting"), None);
    buffer.attribute(&QName::new("lang"), None, "en");
    buffer.characters("hello");
    buffer.end_element();
    buffer.end_document();
    let document = buffer.into_document().unwrap();

    let runtime = TransformContext::bare();
    let ctx = runtime.context().with_current_node(document);
    let out = evaluate_xpath("string(/greeting[@lang='en'])", &ctx).unwrap();
    assert_eq!(out.to_string_value(), "hello");
}
