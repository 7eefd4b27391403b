//! Boolean functions.

use super::{Registry, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::Value;

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "boolean", 1, Some(1), boolean_fn);
    register(registry, "not", 1, Some(1), not_fn);
    register(registry, "true", 0, Some(0), true_fn);
    register(registry, "false", 0, Some(0), false_fn);
}

fn boolean_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0].to_boolean()))
}

fn not_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(!args[0].to_boolean()))
}

fn true_fn(_eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(true))
}

fn false_fn(_eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    Ok(Value::boolean(false))
}
