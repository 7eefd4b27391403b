use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, compile, evaluate};
use rstest::rstest;
use std::rc::Rc;

fn library() -> Rc<Document> {
    doc()
        .child(
            elem("root")
                .child(elem("book").attr("id", "1").child(elem("title").child(text("A"))))
                .child(elem("book").attr("id", "2").child(elem("title").child(text("B"))))
                .child(elem("book").attr("id", "3").child(elem("title").child(text("C")))),
        )
        .build()
}

fn truth(document: &Rc<Document>, query: &str) -> bool {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    let value: Value =
        evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"));
    value.to_boolean()
}

#[rstest]
#[case("some $b in /root/book satisfies $b/@id = '2'", true)]
#[case("every $b in /root/book satisfies $b/@id = '2'", false)]
#[case("some $b in /root/book satisfies $b/@id = '9'", false)]
#[case("every $b in /root/book satisfies $b/@id > 0", true)]
#[case("some $i in 1 to 10 satisfies $i * $i = 49", true)]
#[case("every $i in 1 to 10 satisfies $i < 10", false)]
#[case("some $x in () satisfies $x = 1", false)]
#[case("every $x in () satisfies $x = 1", true)]
fn quantified_expressions(#[case] query: &str, #[case] expected: bool) {
    let document = library();
    assert_eq!(truth(&document, query), expected, "query '{query}'");
}

#[test]
fn multiple_bindings_form_a_cross_product() {
    let document = library();
    assert!(truth(&document, "some $i in 1 to 3, $j in 1 to 3 satisfies $i + $j = 6"));
    assert!(!truth(&document, "some $i in 1 to 2, $j in 1 to 2 satisfies $i + $j = 6"));
    assert!(truth(&document, "every $i in 1 to 2, $j in 1 to 2 satisfies $i + $j <= 4"));
}

#[test]
fn quantifiers_short_circuit_before_errors() {
    let document = library();
    // `some` stops at the first true binding; the failing tail never runs.
    assert!(truth(
        &document,
        "some $i in (1, 2) satisfies $i = 1 or unknown-function()"
    ));
}

#[test]
fn conditional_expressions_choose_branches() {
    let document = library();
    assert!(truth(&document, "if (count(/root/book) = 3) then true() else false()"));
    assert!(truth(&document, "if (/root/missing) then false() else true()"));
}
