//! XPath 2.0 / XQuery 1.0 evaluation engine over the kahu XML tree.
//!
//! A textual query compiles to an AST ([`compile`]); the compiled query can
//! then be evaluated against a document to produce a [`Value`] sequence
//! ([`evaluate`]) or streamed as callbacks over each matched node
//! ([`find_tag`]).
//!
//! ```
//! use kahu_xml::{doc, elem, text};
//! use kahu_xpath::{compile, evaluate};
//!
//! let document = doc()
//!     .child(elem("root").child(elem("item").child(text("7"))))
//!     .build();
//! let query = compile("count(/root/item)").unwrap();
//! let result = evaluate(&query, &document, 0).unwrap();
//! assert_eq!(result.to_number(), 1.0);
//! ```

pub mod arena;
pub mod ast;
pub mod axis;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod modules;
pub mod parser;
pub mod prolog;
pub mod regex;
pub mod schema;
pub mod tokenizer;
pub mod value;

pub use error::{Control, Error, ErrorCode, FindOutcome};
pub use value::{NodeSet, Value, ValueData};

use ast::AstNode;
use modules::ModuleCache;
use prolog::XQueryProlog;
use std::cell::RefCell;
use std::rc::Rc;

/// A reusable compiled query: shared AST plus its prolog and the module
/// cache its imports resolve through.
#[derive(Debug)]
pub struct CompiledQuery {
    pub ast: Rc<AstNode>,
    pub prolog: Rc<XQueryProlog>,
    pub source: String,
    pub module_cache: Rc<RefCell<ModuleCache>>,
}

/// Compilation failure: the accumulated parser error list.
#[derive(Debug, Clone, thiserror::Error)]
#[error("query failed to compile: {}", errors.join("; "))]
pub struct CompileError {
    pub errors: Vec<String>,
}

/// Compile a query. Errors are human-readable strings in source order.
pub fn compile(text: &str) -> Result<CompiledQuery, CompileError> {
    compile_with_cache(text, None).map_err(|errors| CompileError { errors })
}

pub(crate) fn compile_with_cache(
    text: &str,
    module_cache: Option<Rc<RefCell<ModuleCache>>>,
) -> Result<CompiledQuery, Vec<String>> {
    tracing::debug!(target: "kahu_xpath::compile", query = text, "compiling");
    let output = parser::Parser::new(text).parse_query();
    if !output.errors.is_empty() {
        tracing::debug!(
            target: "kahu_xpath::compile",
            errors = output.errors.len(),
            "compilation failed"
        );
        return Err(output.errors);
    }
    let Some(ast) = output.ast else {
        return Err(vec!["empty query".to_string()]);
    };
    let cache = module_cache.unwrap_or_default();
    let prolog = Rc::new(output.prolog);
    *prolog.module_cache.borrow_mut() = Some(Rc::downgrade(&cache));
    Ok(CompiledQuery {
        ast: Rc::new(ast),
        prolog,
        source: text.to_string(),
        module_cache: cache,
    })
}

/// Evaluate a compiled query and return the result sequence. Runtime
/// failures record their first message on the document's error slot.
pub fn evaluate(
    query: &CompiledQuery,
    document: &Rc<kahu_xml::Document>,
    current_prefix: u32,
) -> Result<Value, Error> {
    let mut evaluator =
        evaluator::Evaluator::new(query, Rc::clone(document), current_prefix);
    evaluator.evaluate_query(&query.ast)
}

/// Evaluate a compiled query as a node search, invoking `callback` once per
/// distinct matched node in document order. The callback may stop the
/// traversal by returning [`Control::Terminate`]; errors it returns
/// propagate verbatim.
pub fn find_tag(
    query: &CompiledQuery,
    document: &Rc<kahu_xml::Document>,
    current_prefix: u32,
    mut callback: impl FnMut(&kahu_xml::Document, i32, Option<&str>) -> Result<Control, Error>,
) -> Result<FindOutcome, Error> {
    let mut evaluator =
        evaluator::Evaluator::new(query, Rc::clone(document), current_prefix);
    evaluator.find_tag(&query.ast, &mut callback)
}
