use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, ValueData, compile, evaluate};
use std::rc::Rc;

fn library() -> Rc<Document> {
    doc()
        .child(
            elem("root")
                .child(elem("v").child(text("10")))
                .child(elem("v").child(text("20")))
                .child(elem("v").child(text("10"))),
        )
        .build()
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
fn empty_and_exists() {
    let document = library();
    assert!(eval(&document, "empty(/root/missing)").to_boolean());
    assert!(!eval(&document, "empty(/root/v)").to_boolean());
    assert!(eval(&document, "exists(/root/v)").to_boolean());
    assert!(!eval(&document, "exists(())").to_boolean());
}

#[test]
fn distinct_values_removes_duplicates() {
    let document = library();
    let result = eval(&document, "distinct-values(/root/v)");
    assert_eq!(strings(&result), vec!["10", "20"]);
    let atoms = eval(&document, "distinct-values(('a', 'b', 'a'))");
    assert_eq!(strings(&atoms), vec!["a", "b"]);
}

#[test]
fn index_of_reports_positions() {
    let document = library();
    assert_eq!(strings(&eval(&document, "index-of(('a', 'b', 'a'), 'a')")), vec!["1", "3"]);
    assert_eq!(strings(&eval(&document, "index-of((10, 20, 30), 20)")), vec!["2"]);
    assert!(strings(&eval(&document, "index-of((1, 2), 9)")).is_empty());
}

#[test]
fn reverse_subsequence_head_tail() {
    let document = library();
    assert_eq!(strings(&eval(&document, "reverse((1, 2, 3))")), vec!["3", "2", "1"]);
    assert_eq!(strings(&eval(&document, "subsequence((1, 2, 3, 4, 5), 2, 3)")), vec!["2", "3", "4"]);
    assert_eq!(strings(&eval(&document, "subsequence((1, 2, 3), 2)")), vec!["2", "3"]);
    assert_eq!(strings(&eval(&document, "head((7, 8, 9))")), vec!["7"]);
    assert_eq!(strings(&eval(&document, "tail((7, 8, 9))")), vec!["8", "9"]);
    assert!(strings(&eval(&document, "head(())")).is_empty());
    assert!(strings(&eval(&document, "tail((1))")).is_empty());
}

#[test]
fn insert_before_and_remove() {
    let document = library();
    assert_eq!(
        strings(&eval(&document, "insert-before(('a', 'b'), 1, 'x')")),
        vec!["x", "a", "b"]
    );
    assert_eq!(
        strings(&eval(&document, "insert-before(('a', 'b'), 2, 'x')")),
        vec!["a", "x", "b"]
    );
    assert_eq!(
        strings(&eval(&document, "insert-before(('a', 'b'), 9, 'x')")),
        vec!["a", "b", "x"]
    );
    assert_eq!(strings(&eval(&document, "remove(('a', 'b', 'c'), 2)")), vec!["a", "c"]);
    assert_eq!(strings(&eval(&document, "remove(('a', 'b', 'c'), 9)")), vec!["a", "b", "c"]);
}

#[test]
fn data_atomises_nodes() {
    let document = library();
    let result = eval(&document, "data(/root/v)");
    let ValueData::NodeSet(set) = &result.data else {
        panic!("expected a node set");
    };
    assert!(set.nodes.iter().all(Option::is_none));
    assert_eq!(strings(&result), vec!["10", "20", "10"]);
}

#[test]
fn for_each_applies_a_named_function() {
    let document = library();
    let result = eval(
        &document,
        "declare function local:double($n) { $n * 2 }; for-each((1, 2, 3), 'local:double')",
    );
    assert_eq!(strings(&result), vec!["2", "4", "6"]);
    // Built-in names resolve too.
    let upper = eval(&document, "for-each(('a', 'b'), 'upper-case')");
    assert_eq!(strings(&upper), vec!["A", "B"]);
}

#[test]
fn filter_applies_a_named_predicate() {
    let document = library();
    let result = eval(
        &document,
        "declare function local:big($n) { $n >= 20 }; filter(/root/v, 'local:big')",
    );
    assert_eq!(strings(&result), vec!["20"]);
}

#[test]
fn string_join_concatenates_items() {
    let document = library();
    assert_eq!(eval(&document, "string-join(/root/v, ',')").to_string_value(), "10,20,10");
    assert_eq!(eval(&document, "string-join(('x'), '-')").to_string_value(), "x");
}
