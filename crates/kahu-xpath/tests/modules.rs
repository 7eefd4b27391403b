use kahu_xml::{Document, ResourceResolver, doc, elem, text};
use kahu_xpath::{Value, compile, evaluate};
use std::collections::HashMap;
use std::rc::Rc;

struct ModuleResolver {
    sources: HashMap<&'static str, &'static str>,
}

impl ModuleResolver {
    fn new() -> Self {
        let mut sources = HashMap::new();
        sources.insert(
            "urn:math",
            "module namespace m = 'urn:math';\n\
             declare variable $m:base := 10;\n\
             declare function m:double($x) { $x * 2 };\n\
             declare function m:scale($x) { $x * $m:base };",
        );
        sources.insert(
            "urn:loop-a",
            "module namespace a = 'urn:loop-a';\n\
             import module namespace b = 'urn:loop-b';\n\
             declare function a:f() { 1 };",
        );
        sources.insert(
            "urn:loop-b",
            "module namespace b = 'urn:loop-b';\n\
             import module namespace a = 'urn:loop-a';\n\
             declare function b:g() { 2 };",
        );
        sources.insert(
            "urn:bad-export",
            "module namespace m = 'urn:bad-export';\n\
             declare function local:f() { 1 };",
        );
        sources.insert("urn:main-module", "1 + 1");
        Self { sources }
    }
}

impl ResourceResolver for ModuleResolver {
    fn document(&self, _uri: &str) -> Option<Rc<Document>> {
        None
    }

    fn unparsed_text(&self, uri: &str) -> Option<String> {
        self.sources.get(uri).map(|s| (*s).to_string())
    }
}

fn host_document() -> Rc<Document> {
    let document = doc().child(elem("root").child(text("x"))).build();
    document.set_resolver(Rc::new(ModuleResolver::new()));
    document
}

fn eval(document: &Rc<Document>, query: &str) -> Value {
    let compiled = compile(query).unwrap_or_else(|e| panic!("compile '{query}': {e}"));
    evaluate(&compiled, document, 0).unwrap_or_else(|e| panic!("evaluate '{query}': {e}"))
}

#[test]
fn imported_functions_are_callable() {
    let document = host_document();
    let value = eval(&document, "import module namespace m = 'urn:math'; m:double(21)");
    assert_eq!(value.to_number(), 42.0);
}

#[test]
fn imported_variables_resolve() {
    let document = host_document();
    let value = eval(&document, "import module namespace m = 'urn:math'; $m:base + 1");
    assert_eq!(value.to_number(), 11.0);
}

#[test]
fn module_functions_see_their_own_declarations() {
    let document = host_document();
    let value = eval(&document, "import module namespace m = 'urn:math'; m:scale(3)");
    assert_eq!(value.to_number(), 30.0);
}

#[test]
fn the_cache_returns_the_identical_compiled_module() {
    let document = host_document();
    let compiled =
        compile("import module namespace m = 'urn:math'; m:double(2) + m:double(3)").unwrap();
    let value = evaluate(&compiled, &document, 0).unwrap();
    assert_eq!(value.to_number(), 10.0);
    let first = compiled.module_cache.borrow().get("urn:math").expect("cached");
    let second = compiled.module_cache.borrow().get("urn:math").expect("cached");
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn circular_imports_are_rejected() {
    let document = host_document();
    let compiled = compile("import module namespace a = 'urn:loop-a'; a:f()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("circular import");
    assert!(error.message.contains("XQDY0054"), "got: {}", error.message);
}

#[test]
fn exports_outside_the_module_namespace_are_rejected() {
    let document = host_document();
    let compiled = compile("import module namespace m = 'urn:bad-export'; m:f()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("bad export");
    assert!(error.message.contains("XQST0048"), "got: {}", error.message);
}

#[test]
fn importing_a_main_module_fails() {
    let document = host_document();
    let compiled = compile("import module namespace m = 'urn:main-module'; m:f()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("main module");
    assert!(error.message.contains("XQST0059"), "got: {}", error.message);
}

#[test]
fn unknown_modules_fail_to_load() {
    let document = host_document();
    let compiled = compile("import module namespace m = 'urn:nowhere'; m:f()").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("unresolvable module");
    assert!(error.message.contains("XQST0059"), "got: {}", error.message);
}

#[test]
fn duplicate_imports_fail_at_compile_time() {
    let error = compile(
        "import module namespace a = 'urn:math'; import module namespace b = 'urn:math'; 1",
    )
    .expect_err("duplicate import");
    assert!(error.errors.iter().any(|message| message.contains("XQST0047")));
}

#[test]
fn imports_without_a_resolver_are_errors() {
    let document = doc().child(elem("root")).build();
    let compiled = compile("import module namespace m = 'urn:math'; m:double(1)").unwrap();
    let error = evaluate(&compiled, &document, 0).expect_err("no resolver");
    assert!(error.message.contains("XQST0059"), "got: {}", error.message);
}

#[test]
fn location_hints_are_tried_first() {
    let document = host_document();
    let value = eval(
        &document,
        "import module namespace m = 'urn:math' at 'urn:math'; m:double(5)",
    );
    assert_eq!(value.to_number(), 10.0);
}
