use kahu_xml::{Document, comment, doc, elem, pi, text};
use kahu_xpath::{Value, compile, evaluate};
use std::rc::Rc;

fn library() -> Rc<Document> {
    doc()
        .child(
            elem("root")
                .child(elem("book").attr("id", "1").child(elem("title").child(text("A"))))
                .child(elem("book").attr("id", "2").child(elem("title").child(text("B"))))
                .child(elem("book").attr("id", "3").child(elem("title").child(text("C"))))
                .child(comment("catalogue"))
                .child(pi("render", "mode=fast")),
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
fn absolute_child_steps() {
    let document = library();
    let result = eval(&document, "/root/book/title");
    assert_eq!(count(&document, "/root/book/title"), 3.0);
    assert_eq!(result.to_string_value(), "A");
}

#[test]
fn descendant_shorthand_finds_nested_elements() {
    let document = library();
    assert_eq!(count(&document, "//title"), 3.0);
    assert_eq!(count(&document, "//book/title"), 3.0);
    assert_eq!(count(&document, "/root//title"), 3.0);
}

#[test]
fn attribute_steps() {
    let document = library();
    assert_eq!(count(&document, "/root/book/@id"), 3.0);
    assert_eq!(eval(&document, "/root/book[2]/@id").to_string_value(), "2");
    assert_eq!(eval(&document, "string(/root/book/@id)").to_string_value(), "1");
}

#[test]
fn explicit_axes() {
    let document = library();
    assert_eq!(count(&document, "/root/book[1]/following-sibling::book"), 2.0);
    assert_eq!(count(&document, "/root/book[3]/preceding-sibling::book"), 2.0);
    assert_eq!(count(&document, "//title/ancestor::book"), 3.0);
    assert_eq!(count(&document, "//title/ancestor-or-self::*"), 7.0);
    assert_eq!(count(&document, "/root/book[1]/descendant::node()"), 2.0);
    assert_eq!(eval(&document, "//title[1]/parent::book/@id").to_string_value(), "1");
    assert_eq!(count(&document, "/root/book[2]/following::title"), 1.0);
    assert_eq!(count(&document, "/root/book[2]/preceding::title"), 1.0);
    assert_eq!(count(&document, "/root/book[1]/self::book"), 1.0);
}

#[test]
fn node_type_tests() {
    let document = library();
    assert_eq!(count(&document, "//text()"), 3.0);
    assert_eq!(count(&document, "//comment()"), 1.0);
    assert_eq!(count(&document, "//processing-instruction()"), 1.0);
    assert_eq!(count(&document, "//processing-instruction('render')"), 1.0);
    assert_eq!(count(&document, "//processing-instruction('other')"), 0.0);
    assert_eq!(count(&document, "/root/node()"), 5.0);
}

#[test]
fn wildcard_matches_elements_only() {
    let document = library();
    assert_eq!(count(&document, "/root/*"), 3.0);
    assert_eq!(count(&document, "//*"), 7.0);
}

#[test]
fn root_only_path_returns_top_level() {
    let document = library();
    assert_eq!(count(&document, "/"), 1.0);
    assert_eq!(eval(&document, "name(/)").to_string_value(), "root");
}

#[test]
fn relative_paths_have_no_result_without_context() {
    let document = library();
    assert_eq!(count(&document, "book"), 0.0);
}

#[test]
fn paths_continue_after_filter_expressions() {
    let document = library();
    assert_eq!(eval(&document, "(/root/book)[2]/title").to_string_value(), "B");
    assert_eq!(eval(&document, "string((//title)[last()])").to_string_value(), "C");
}

#[test]
fn function_call_steps_evaluate_per_item() {
    let document = library();
    assert_eq!(eval(&document, "/root/book[last()]/title/string()").to_string_value(), "C");
    assert_eq!(count(&document, "/root/book/title/string()"), 3.0);
}

#[test]
fn repeat_evaluation_is_stable() {
    let document = library();
    let compiled = compile("/root/book[@id='2']/title").unwrap();
    let first = evaluate(&compiled, &document, 0).unwrap();
    let second = evaluate(&compiled, &document, 0).unwrap();
    assert_eq!(first.to_string_value(), second.to_string_value());
}
