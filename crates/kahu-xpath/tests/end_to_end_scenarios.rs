//! End-to-end checks over the canonical three-book document.

use kahu_xml::{Document, ResourceResolver, doc, elem, text};
use kahu_xpath::{Value, ValueData, compile, evaluate};
use std::rc::Rc;

struct EmptyResolver;

impl ResourceResolver for EmptyResolver {
    fn document(&self, _uri: &str) -> Option<Rc<Document>> {
        None
    }
}

fn books() -> Rc<Document> {
    let document = doc()
        .child(
            elem("root")
                .child(elem("book").attr("id", "1").child(elem("title").child(text("A"))))
                .child(elem("book").attr("id", "2").child(elem("title").child(text("B"))))
                .child(elem("book").attr("id", "3").child(elem("title").child(text("C")))),
        )
        .build();
    document.set_resolver(Rc::new(EmptyResolver));
    document
}

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

fn strings(value: &Value) -> Vec<String> {
    match &value.data {
        ValueData::NodeSet(set) => (0..set.len()).map(|i| set.item_string(i)).collect(),
        _ => vec![value.to_string_value()],
    }
}

#[test]
fn attribute_predicate_selects_one_title() {
    let document = books();
    let value = eval(&document, "/root/book[@id='2']/title");
    assert_eq!(strings(&value).len(), 1);
    assert_eq!(value.to_string_value(), "B");
}

#[test]
fn count_of_books_is_three() {
    let document = books();
    assert_eq!(eval(&document, "count(/root/book)").to_number(), 3.0);
}

#[test]
fn string_step_on_the_last_book() {
    let document = books();
    let value = eval(&document, "/root/book[last()]/title/string()");
    assert_eq!(value.to_string_value(), "C");
}

#[test]
fn ordered_flwor_returns_descending_titles() {
    let document = books();
    let value = eval(
        &document,
        "for $b in /root/book order by $b/@id descending return $b/title",
    );
    assert_eq!(strings(&value), vec!["C", "B", "A"]);
}

#[test]
fn quantified_expressions_over_books() {
    let document = books();
    assert!(eval(&document, "some $b in /root/book satisfies $b/@id = '2'").to_boolean());
    assert!(!eval(&document, "every $b in /root/book satisfies $b/@id = '2'").to_boolean());
}

#[test]
fn summary_constructor_combines_count_and_title() {
    let document = books();
    let value = eval(
        &document,
        "<summary count=\"{count(/root/book)}\">{/root/book[1]/title/string()}</summary>",
    );
    let ValueData::NodeSet(set) = &value.data else {
        panic!("expected a node set");
    };
    let node = set.nodes[0].clone().expect("constructed element");
    assert_eq!(node.local_name(), Some("summary"));
    assert_eq!(node.attribute_value("count"), Some("3"));
    assert_eq!(node.string_value(), "A");
}

#[test]
fn range_with_modulo_predicate() {
    let document = books();
    let value = eval(&document, "(1 to 5)[. mod 2 = 0]");
    assert_eq!(strings(&value), vec!["2", "4"]);
}

#[test]
fn missing_documents_are_empty_not_errors() {
    let document = books();
    let value = eval(&document, "doc('missing.xml')");
    assert!(value.is_empty_sequence());
    assert!(!eval(&document, "doc-available('missing.xml')").to_boolean());
}
