use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, ValueData, compile, evaluate};
use std::rc::Rc;

fn library() -> Rc<Document> {
    doc()
        .child(
            elem("root")
                .child(elem("book").attr("id", "1").attr("genre", "sf").child(elem("title").child(text("A"))))
                .child(elem("book").attr("id", "2").attr("genre", "crime").child(elem("title").child(text("B"))))
                .child(elem("book").attr("id", "3").attr("genre", "sf").child(elem("title").child(text("C")))),
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
fn for_iterates_in_sequence_order() {
    let document = library();
    let result = eval(&document, "for $b in /root/book return $b/title/string()");
    assert_eq!(strings(&result), vec!["A", "B", "C"]);
}

#[test]
fn for_over_ranges() {
    let document = library();
    let result = eval(&document, "for $i in 1 to 3 return $i * 10");
    assert_eq!(strings(&result), vec!["10", "20", "30"]);
}

#[test]
fn nested_for_builds_cross_products() {
    let document = library();
    let result = eval(&document, "for $i in 1 to 2, $j in 1 to 2 return $i * 10 + $j");
    assert_eq!(strings(&result), vec!["11", "12", "21", "22"]);
}

#[test]
fn let_binds_once() {
    let document = library();
    assert_eq!(eval(&document, "let $x := 5 return $x + 1").to_number(), 6.0);
    assert_eq!(
        eval(&document, "let $x := 2, $y := 3 return $x * $y").to_number(),
        6.0
    );
}

#[test]
fn for_and_let_compose() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book let $t := $b/title return concat($t, '!')",
    );
    assert_eq!(strings(&result), vec!["A!", "B!", "C!"]);
}

#[test]
fn where_filters_tuples() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book where $b/@genre = 'sf' return $b/@id/string()",
    );
    assert_eq!(strings(&result), vec!["1", "3"]);
}

#[test]
fn order_by_ascending_and_descending() {
    let document = library();
    let ascending = eval(
        &document,
        "for $b in /root/book order by $b/@id return $b/title/string()",
    );
    assert_eq!(strings(&ascending), vec!["A", "B", "C"]);
    let descending = eval(
        &document,
        "for $b in /root/book order by $b/@id descending return $b/title/string()",
    );
    assert_eq!(strings(&descending), vec!["C", "B", "A"]);
}

#[test]
fn order_by_string_keys_uses_codepoint_order() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book order by $b/@genre return $b/@id/string()",
    );
    // crime < sf; equal keys keep source order.
    assert_eq!(strings(&result), vec!["2", "1", "3"]);
}

#[test]
fn order_by_is_stable_for_equal_keys() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book order by 'constant' return $b/@id/string()",
    );
    assert_eq!(strings(&result), vec!["1", "2", "3"]);
}

#[test]
fn order_by_empty_modes() {
    let document = library();
    // The key is empty for $i = 1 and the number 2 for $i = 2.
    let least = eval(
        &document,
        "for $i in (1, 2) order by /root/book[@id = 2][@id = $i]/@id empty least return $i",
    );
    assert_eq!(strings(&least), vec!["1", "2"]);
    let greatest = eval(
        &document,
        "for $i in (1, 2) order by /root/book[@id = 2][@id = $i]/@id empty greatest return $i",
    );
    assert_eq!(strings(&greatest), vec!["2", "1"]);
    // All-empty keys fall back to source order.
    let stable = eval(
        &document,
        "for $b in /root/book order by $b/@missing empty greatest return $b/@id/string()",
    );
    assert_eq!(strings(&stable), vec!["1", "2", "3"]);
}

#[test]
fn results_preserve_tuple_order() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book order by $b/@id descending return $b/title",
    );
    let ValueData::NodeSet(set) = &result.data else {
        panic!("expected a node set");
    };
    assert!(set.preserve_node_order);
    assert_eq!(strings(&result), vec!["C", "B", "A"]);
}

#[test]
fn multiple_order_keys() {
    let document = library();
    let result = eval(
        &document,
        "for $b in /root/book order by $b/@genre, $b/@id descending return $b/@id/string()",
    );
    // genre crime first, then sf group ordered by id descending.
    assert_eq!(strings(&result), vec!["2", "3", "1"]);
}
