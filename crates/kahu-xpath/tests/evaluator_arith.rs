use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, compile, evaluate};
use rstest::rstest;
use std::rc::Rc;

fn numbers() -> Rc<Document> {
    doc()
        .child(
            elem("data")
                .child(elem("n").child(text("10")))
                .child(elem("n").child(text("20")))
                .child(elem("n").child(text("30"))),
        )
        .build()
}

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

#[rstest]
#[case("1 + 2", 3.0)]
#[case("5 - 7", -2.0)]
#[case("3 * 4", 12.0)]
#[case("10 div 4", 2.5)]
#[case("7 mod 3", 1.0)]
#[case("-7 mod 3", -1.0)]
#[case("2 + 3 * 4", 14.0)]
#[case("(2 + 3) * 4", 20.0)]
#[case("-(2 + 3)", -5.0)]
#[case("--5", 5.0)]
#[case("1.5 + 2.25", 3.75)]
fn arithmetic(#[case] query: &str, #[case] expected: f64) {
    let document = numbers();
    let result = eval(&document, query).to_number();
    assert!((result - expected).abs() < 1e-9, "'{query}' gave {result}, expected {expected}");
}

#[test]
fn ieee_special_cases() {
    let document = numbers();
    assert!(eval(&document, "1 div 0").to_number().is_infinite());
    assert!(eval(&document, "0 div 0").to_number().is_nan());
    assert!(eval(&document, "number('abc') + 1").to_number().is_nan());
    assert!(eval(&document, "5 mod 0").to_number().is_nan());
}

#[test]
fn arithmetic_coerces_node_sets() {
    let document = numbers();
    assert_eq!(eval(&document, "/data/n[1] + /data/n[2]").to_number(), 30.0);
    assert_eq!(eval(&document, "sum(/data/n) div count(/data/n)").to_number(), 20.0);
}

#[test]
fn string_operands_coerce_to_numbers() {
    let document = numbers();
    assert_eq!(eval(&document, "'4' * '2'").to_number(), 8.0);
    assert!(eval(&document, "'4x' * 2").to_number().is_nan());
}

#[test]
fn range_builds_integer_sequences() {
    let document = numbers();
    assert_eq!(eval(&document, "count(1 to 5)").to_number(), 5.0);
    assert_eq!(eval(&document, "count(5 to 1)").to_number(), 0.0);
    assert_eq!(eval(&document, "count(3 to 3)").to_number(), 1.0);
    assert_eq!(eval(&document, "string(1 to 3)").to_string_value(), "1");
    assert_eq!(eval(&document, "sum(1 to 4)").to_number(), 10.0);
}

#[test]
fn comma_sequences_concatenate() {
    let document = numbers();
    assert_eq!(eval(&document, "count((1, 2, 3))").to_number(), 3.0);
    assert_eq!(eval(&document, "count((/data/n, 99))").to_number(), 4.0);
    assert_eq!(eval(&document, "count(())").to_number(), 0.0);
}

#[test]
fn number_formatting_canonical_forms() {
    let document = numbers();
    assert_eq!(eval(&document, "string(0 div 0)").to_string_value(), "NaN");
    assert_eq!(eval(&document, "string(1 div 0)").to_string_value(), "Infinity");
    assert_eq!(eval(&document, "string(-1 div 0)").to_string_value(), "-Infinity");
    assert_eq!(eval(&document, "string(0)").to_string_value(), "0");
    assert_eq!(eval(&document, "string(-0)").to_string_value(), "0");
    assert_eq!(eval(&document, "string(2.50)").to_string_value(), "2.5");
    assert_eq!(eval(&document, "string(0.1 + 0.2)").to_string_value(), "0.3");
    assert_eq!(eval(&document, "string(12)").to_string_value(), "12");
}
