use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, compile, evaluate};
use std::rc::Rc;

fn library() -> Rc<Document> {
    doc()
        .child(
            elem("root")
                .child(elem("book").attr("id", "1").attr("lang", "en").child(elem("title").child(text("A"))))
                .child(elem("book").attr("id", "2").child(elem("title").child(text("B"))))
                .child(elem("book").attr("id", "3").child(elem("title").child(text("C")))),
        )
        .build()
}

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

fn count(document: &Rc<Document>, query: &str) -> f64 {
    eval(document, &format!("count({query})")).to_number()
}

#[test]
fn positional_predicates_select_by_index() {
    let document = library();
    assert_eq!(eval(&document, "/root/book[1]/@id").to_string_value(), "1");
    assert_eq!(eval(&document, "/root/book[3]/@id").to_string_value(), "3");
    assert_eq!(count(&document, "/root/book[4]"), 0.0);
    assert_eq!(count(&document, "/root/book[0]"), 0.0);
}

#[test]
fn last_and_position_functions() {
    let document = library();
    assert_eq!(eval(&document, "/root/book[last()]/@id").to_string_value(), "3");
    assert_eq!(count(&document, "/root/book[position() > 1]"), 2.0);
    assert_eq!(count(&document, "/root/book[position() = last()]"), 1.0);
}

#[test]
fn boolean_predicates_filter() {
    let document = library();
    assert_eq!(count(&document, "/root/book[@id > 1]"), 2.0);
    assert_eq!(count(&document, "/root/book[title = 'B']"), 1.0);
    assert_eq!(count(&document, "/root/book[false()]"), 0.0);
}

#[test]
fn attribute_exists_shorthand() {
    let document = library();
    assert_eq!(count(&document, "/root/book[@lang]"), 1.0);
    assert_eq!(count(&document, "/root/book[@missing]"), 0.0);
}

#[test]
fn attribute_equals_shorthand() {
    let document = library();
    assert_eq!(eval(&document, "/root/book[@id='2']/title").to_string_value(), "B");
    assert_eq!(count(&document, "/root/book[@id='9']"), 0.0);
}

#[test]
fn content_equals_shorthand() {
    let document = library();
    assert_eq!(count(&document, "/root/book/title[='B']"), 1.0);
    assert_eq!(eval(&document, "/root/book/title[='C']/../@id").to_string_value(), "3");
}

#[test]
fn general_attribute_comparisons_still_work() {
    let document = library();
    assert_eq!(count(&document, "/root/book[@id = '2' or @id = '3']"), 2.0);
    assert_eq!(count(&document, "/root/book[@id != '2']"), 2.0);
}

#[test]
fn chained_predicates_renumber_positions() {
    let document = library();
    // After the first filter only books 2 and 3 remain; [1] picks book 2.
    assert_eq!(eval(&document, "/root/book[@id > 1][1]/@id").to_string_value(), "2");
    assert_eq!(eval(&document, "/root/book[position() > 1][last()]/@id").to_string_value(), "3");
}

#[test]
fn predicates_over_sequences() {
    let document = library();
    assert_eq!(count(&document, "(1 to 5)[. mod 2 = 0]"), 2.0);
    assert_eq!(eval(&document, "string((1 to 5)[. mod 2 = 0])").to_string_value(), "2");
    assert_eq!(eval(&document, "(1 to 9)[3]").to_string_value(), "3");
}

#[test]
fn nan_predicate_matches_nothing() {
    let document = library();
    assert_eq!(count(&document, "/root/book[number('x')]"), 0.0);
}
