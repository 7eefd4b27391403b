use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, ValueData, compile, evaluate};
use rstest::rstest;
use std::rc::Rc;

fn sample() -> Rc<Document> {
    doc().child(elem("root").child(elem("item").child(text("  hello   world  ")))).build()
}

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

fn string_of(document: &Rc<Document>, query: &str) -> String {
    eval(document, query).to_string_value()
}

#[rstest]
#[case("concat('a', 'b')", "ab")]
#[case("concat('a', 'b', 'c', 1)", "abc1")]
#[case("substring('12345', 2)", "2345")]
#[case("substring('12345', 2, 3)", "234")]
#[case("substring('12345', 1.5, 2.6)", "234")]
#[case("substring('12345', 0, 3)", "12")]
#[case("substring('12345', -1)", "12345")]
#[case("substring-before('1999/04/01', '/')", "1999")]
#[case("substring-after('1999/04/01', '/')", "04/01")]
#[case("substring-before('abc', 'x')", "")]
#[case("normalize-space('  a   b  ')", "a b")]
#[case("translate('bar', 'abc', 'ABC')", "BAr")]
#[case("translate('--aaa--', 'abc-', 'ABC')", "AAA")]
#[case("upper-case('MiXeD')", "MIXED")]
#[case("lower-case('MiXeD')", "mixed")]
#[case("string-join(('a', 'b', 'c'), '-')", "a-b-c")]
#[case("encode-for-uri('a b~c')", "a%20b~c")]
#[case("escape-html-uri('a b')", "a b")]
fn string_function_results(#[case] query: &str, #[case] expected: &str) {
    let document = sample();
    assert_eq!(string_of(&document, query), expected, "query '{query}'");
}

#[rstest]
#[case("starts-with('hello', 'he')", true)]
#[case("starts-with('hello', 'lo')", false)]
#[case("ends-with('hello', 'lo')", true)]
#[case("contains('hello', 'ell')", true)]
#[case("contains('hello', 'xyz')", false)]
fn string_predicates(#[case] query: &str, #[case] expected: bool) {
    let document = sample();
    assert_eq!(eval(&document, query).to_boolean(), expected, "query '{query}'");
}

#[test]
fn string_length_counts_characters() {
    let document = sample();
    assert_eq!(eval(&document, "string-length('hello')").to_number(), 5.0);
    assert_eq!(eval(&document, "string-length('')").to_number(), 0.0);
}

#[test]
fn string_defaults_to_the_context_node() {
    let document = sample();
    assert_eq!(string_of(&document, "normalize-space(/root/item)"), "hello world");
    assert_eq!(string_of(&document, "string(/root/item)"), "  hello   world  ");
}

#[test]
fn matches_uses_regular_expressions() {
    let document = sample();
    assert!(eval(&document, "matches('abracadabra', 'bra')").to_boolean());
    assert!(eval(&document, "matches('abracadabra', '^a.*a$')").to_boolean());
    assert!(!eval(&document, "matches('abracadabra', '^bra')").to_boolean());
    assert!(eval(&document, "matches('ABC', 'abc', 'i')").to_boolean());
}

#[test]
fn replace_substitutes_matches() {
    let document = sample();
    assert_eq!(string_of(&document, "replace('abracadabra', 'bra', '*')"), "a*cada*");
    assert_eq!(string_of(&document, "replace('abracadabra', 'a(.)', 'a$1$1')"), "abbraccaddabbra");
}

#[test]
fn tokenize_yields_synthetic_items() {
    let document = sample();
    let result = eval(&document, r"tokenize('2001-06-30', '-')");
    let ValueData::NodeSet(set) = &result.data else {
        panic!("expected a node set");
    };
    assert_eq!(set.len(), 3);
    assert!(set.nodes[0].is_none());
    assert_eq!(set.item_string(0), "2001");
    assert_eq!(set.item_string(2), "30");
    assert_eq!(eval(&document, r"count(tokenize('a,b,,c', ','))").to_number(), 4.0);
}

#[test]
fn invalid_regex_reports_an_error() {
    let document = sample();
    let compiled = compile("matches('x', '(')").unwrap();
    assert!(evaluate(&compiled, &document, 0).is_err());
}
