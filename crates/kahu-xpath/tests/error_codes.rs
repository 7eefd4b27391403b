use kahu_xml::{Document, doc, elem, text};
use kahu_xpath::{ErrorCode, compile, evaluate};
use std::rc::Rc;

fn sample() -> Rc<Document> {
    doc().child(elem("root").child(elem("a").child(text("1")))).build()
}

#[test]
fn syntax_errors_surface_as_a_string_list() {
    let error = compile("/root/book[").expect_err("unterminated predicate");
    assert!(!error.errors.is_empty());

    let error = compile("1 +").expect_err("dangling operator");
    assert!(!error.errors.is_empty());

    let error = compile("if (1) then 2").expect_err("missing else");
    assert!(error.errors.iter().any(|message| message.contains("else")));

    let error = compile("'unterminated").expect_err("open string literal");
    assert!(error.errors.iter().any(|message| message.contains("unterminated")));
}

#[test]
fn compile_error_lists_are_deterministic() {
    let first = compile("for $x in").expect_err("incomplete flwor");
    let second = compile("for $x in").expect_err("incomplete flwor");
    assert_eq!(first.errors, second.errors);
}

#[test]
fn unknown_functions_are_reported_not_swallowed() {
    let document = sample();
    let compiled = compile("frobnicate()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("unknown function");
    assert_eq!(error.code, ErrorCode::Syntax);
    assert!(
        error.message.contains("Unsupported XPath function: frobnicate"),
        "got: {}",
        error.message
    );
}

#[test]
fn wrong_arity_is_reported_like_an_unknown_function() {
    let document = sample();
    let compiled = compile("count()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("wrong arity");
    assert!(error.message.contains("Unsupported XPath function: count"));

    let compiled = compile("not(1, 2)").unwrap();
    assert!(evaluate(&compiled, &document, 0).is_err());
}

#[test]
fn runtime_failures_record_a_message_on_the_document() {
    let document = sample();
    let compiled = compile("frobnicate()").unwrap();
    let _ = evaluate(&compiled, &document, 0);
    let message = document.error_msg().expect("message recorded");
    assert!(message.contains("frobnicate"));
}

#[test]
fn the_first_error_message_is_preserved() {
    let document = sample();
    let compiled = compile("first-missing() or second-missing()").unwrap();
    let _ = evaluate(&compiled, &document, 0);
    let message = document.error_msg().expect("message recorded");
    assert!(message.contains("first-missing"), "got: {message}");
}

#[test]
fn a_fresh_evaluation_clears_the_error_slot() {
    let document = sample();
    let failing = compile("frobnicate()").unwrap();
    let _ = evaluate(&failing, &document, 0);
    assert!(document.error_msg().is_some());

    let passing = compile("count(/root/a)").unwrap();
    let value = evaluate(&passing, &document, 0).unwrap();
    assert_eq!(value.to_number(), 1.0);
    assert!(document.error_msg().is_none());
}

#[test]
fn external_variables_are_unsupported() {
    let document = sample();
    let compiled = compile("declare variable $v external; $v").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("external variable");
    assert!(error.message.contains("external"));
}

#[test]
fn empty_result_is_not_an_error() {
    let document = sample();
    let compiled = compile("/root/missing").unwrap();
    let value = evaluate(&compiled, &document, 0).unwrap();
    assert!(value.is_empty_sequence());
    assert!(document.error_msg().is_none());
}
