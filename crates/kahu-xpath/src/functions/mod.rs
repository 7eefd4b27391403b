//! Built-in function library.
//!
//! Functions are keyed by expanded name; the standard library lives in the
//! XPath functions namespace (also reachable unprefixed) and registers with
//! an arity range, so wrong-arity calls are distinguishable from unknown
//! names. Dispatch never silently returns empty for an unknown function.

mod accessors;
mod boolean;
mod documents;
mod node_set;
mod numeric;
mod sequences;
mod strings;

use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

pub(crate) type BuiltinFn = fn(&mut Evaluator, &[Value]) -> Result<Value, Error>;

pub(crate) struct FunctionEntry {
    pub min_arity: usize,
    /// `None` marks a variadic tail.
    pub max_arity: Option<usize>,
    pub implementation: BuiltinFn,
}

pub(crate) type Registry = HashMap<&'static str, Vec<FunctionEntry>>;

pub(crate) fn register(
    registry: &mut Registry,
    name: &'static str,
    min_arity: usize,
    max_arity: Option<usize>,
    implementation: BuiltinFn,
) {
    registry
        .entry(name)
        .or_default()
        .push(FunctionEntry { min_arity, max_arity, implementation });
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = Registry::new();
        node_set::register_all(&mut map);
        strings::register_all(&mut map);
        boolean::register_all(&mut map);
        numeric::register_all(&mut map);
        sequences::register_all(&mut map);
        documents::register_all(&mut map);
        accessors::register_all(&mut map);
        map
    })
}

pub(crate) enum Dispatch {
    Done(Result<Value, Error>),
    WrongArity,
    Unknown,
}

pub(crate) fn dispatch(eval: &mut Evaluator, local: &str, args: &[Value]) -> Dispatch {
    let Some(entries) = registry().get(local) else {
        return Dispatch::Unknown;
    };
    let arity = args.len();
    for entry in entries {
        let fits = arity >= entry.min_arity && entry.max_arity.is_none_or(|max| arity <= max);
        if fits {
            return Dispatch::Done((entry.implementation)(eval, args));
        }
    }
    Dispatch::WrongArity
}

/// Argument helper: the argument at `index`, or the context item when the
/// caller omitted it.
pub(crate) fn arg_or_context(eval: &mut Evaluator, args: &[Value], index: usize) -> Value {
    match args.get(index) {
        Some(value) => value.clone(),
        None => eval.context_item_value(),
    }
}
