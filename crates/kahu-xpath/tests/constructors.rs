use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{Value, ValueData, compile, evaluate};
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

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

fn single_node(value: &Value) -> Rc<kahu_xml::Tag> {
    let ValueData::NodeSet(set) = &value.data else {
        panic!("expected a node set");
    };
    assert_eq!(set.len(), 1, "expected exactly one constructed node");
    set.nodes[0].clone().expect("a real node")
}

#[test]
fn direct_element_with_avt_and_content() {
    let document = library();
    let value = eval(
        &document,
        "<summary count=\"{count(/root/book)}\">{/root/book[1]/title/string()}</summary>",
    );
    let node = single_node(&value);
    assert_eq!(node.local_name(), Some("summary"));
    assert_eq!(node.attribute_value("count"), Some("3"));
    assert_eq!(node.string_value(), "A");
    assert!(node.id < 0, "constructed nodes use negative IDs");
}

#[test]
fn direct_element_literal_text_and_entities() {
    let document = library();
    let node = single_node(&eval(&document, "<a>x &lt;&amp;&gt; y</a>"));
    assert_eq!(node.string_value(), "x <&> y");
}

#[test]
fn nested_direct_elements() {
    let document = library();
    let node = single_node(&eval(&document, "<a><b>1</b><c>{1 + 1}</c></a>"));
    assert_eq!(node.children.len(), 2);
    assert_eq!(node.children[0].local_name(), Some("b"));
    assert_eq!(node.string_value(), "12");
    assert!(node.children.iter().all(|child| child.parent_id == node.id));
}

#[test]
fn curly_brace_escapes_in_content() {
    let document = library();
    let node = single_node(&eval(&document, "<a>{{literal}}</a>"));
    assert_eq!(node.string_value(), "{literal}");
}

#[test]
fn boundary_whitespace_is_stripped_by_default() {
    let document = library();
    let node = single_node(&eval(&document, "<a> <b>x</b> </a>"));
    assert_eq!(node.children.len(), 1);
    assert_eq!(node.string_value(), "x");
}

#[test]
fn boundary_whitespace_preserved_on_request() {
    let document = library();
    let node = single_node(&eval(
        &document,
        "declare boundary-space preserve; <a> <b>x</b> </a>",
    ));
    assert_eq!(node.children.len(), 3);
    assert_eq!(node.string_value(), " x ");
}

#[test]
fn cloned_content_nodes_survive_with_the_value() {
    let document = library();
    let value = eval(&document, "<wrap>{/root/book[2]/title}</wrap>");
    drop(document);
    let node = single_node(&value);
    assert_eq!(node.string_value(), "B");
    let copy = value.clone();
    drop(value);
    assert_eq!(single_node(&copy).string_value(), "B");
}

#[test]
fn computed_element_constructor() {
    let document = library();
    let node = single_node(&eval(&document, "element note { 'hi' }"));
    assert_eq!(node.local_name(), Some("note"));
    assert_eq!(node.string_value(), "hi");

    let named = single_node(&eval(&document, "element { concat('no', 'te') } { 'x' }"));
    assert_eq!(named.local_name(), Some("note"));
}

#[test]
fn computed_element_rejects_invalid_names() {
    let document = library();
    let compiled = compile("element { '1bad' } { 'x' }").unwrap();
    assert!(evaluate(&compiled, &document, 0).is_err());
}

#[test]
fn computed_attribute_constructor() {
    let document = library();
    let value = eval(&document, "attribute class { 'compact' }");
    let ValueData::NodeSet(set) = &value.data else {
        panic!("expected a node set");
    };
    assert_eq!(set.len(), 1);
    assert!(set.attributes[0].is_some(), "the single item is an attribute node");
    assert_eq!(value.to_string_value(), "compact");
    assert_eq!(eval(&document, "string(attribute class { 'compact' })").to_string_value(), "compact");
}

#[test]
fn text_and_document_constructors() {
    let document = library();
    let node = single_node(&eval(&document, "text { 'abc' }"));
    assert!(node.is_content());
    assert_eq!(node.string_value(), "abc");

    let built = eval(&document, "document { <a/> }");
    let ValueData::NodeSet(set) = &built.data else {
        panic!("expected a node set");
    };
    assert_eq!(set.len(), 1);
}

#[test]
fn comment_constructor_validates_content() {
    let document = library();
    let node = single_node(&eval(&document, "comment { 'note' }"));
    assert!(node.is_comment());

    let double_dash = compile("comment { 'a--b' }").unwrap();
    assert!(evaluate(&double_dash, &document, 0).is_err());
    let trailing = compile("comment { 'ends-' }").unwrap();
    assert!(evaluate(&trailing, &document, 0).is_err());
}

#[test]
fn pi_constructor_validates_target_and_content() {
    let document = library();
    let node = single_node(&eval(&document, "processing-instruction render { 'mode=f' }"));
    assert!(node.is_instruction());
    assert_eq!(node.pi_target(), Some("render"));

    let bad_target = compile("processing-instruction { '1bad' } { 'x' }").unwrap();
    assert!(evaluate(&bad_target, &document, 0).is_err());
    let xml_target = compile("processing-instruction { 'xml' } { 'x' }").unwrap();
    assert!(evaluate(&xml_target, &document, 0).is_err());
    let bad_content = compile("processing-instruction ok { '?>' }").unwrap();
    assert!(evaluate(&bad_content, &document, 0).is_err());
}

#[test]
fn constructors_inside_flwor_returns() {
    let document = library();
    let value = eval(
        &document,
        "for $b in /root/book return <entry id=\"{$b/@id}\">{$b/title/string()}</entry>",
    );
    let ValueData::NodeSet(set) = &value.data else {
        panic!("expected a node set");
    };
    assert_eq!(set.len(), 3);
    assert!(set.preserve_node_order);
    let first = set.nodes[0].clone().unwrap();
    assert_eq!(first.attribute_value("id"), Some("1"));
    assert_eq!(first.string_value(), "A");
}

#[test]
fn namespace_declarations_scope_constructed_elements() {
    let document = library();
    let node = single_node(&eval(&document, "<k:a xmlns:k=\"urn:k\"><k:b/></k:a>"));
    assert_ne!(node.namespace_hash, 0);
    assert_eq!(node.children[0].namespace_hash, node.namespace_hash);
    assert_eq!(document.namespace_uri(node.namespace_hash).as_deref(), Some("urn:k"));
}

#[test]
fn constructor_depth_is_bounded() {
    let document = library();
    let mut query = String::new();
    for _ in 0..260 {
        query.push_str("element a { ");
    }
    query.push('1');
    for _ in 0..260 {
        query.push_str(" }");
    }
    let compiled = compile(&query).unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("depth bound");
    assert!(error.message.contains("depth"));
}

#[test]
fn depth_just_below_the_bound_succeeds() {
    let document = library();
    let mut query = String::new();
    for _ in 0..200 {
        query.push_str("element a { ");
    }
    query.push('1');
    for _ in 0..200 {
        query.push_str(" }");
    }
    let compiled = compile(&query).unwrap();
    assert!(evaluate(&compiled, &document, 0).is_ok());
}
