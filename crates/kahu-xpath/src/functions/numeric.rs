//! Numeric functions and aggregates.

use super::{Registry, arg_or_context, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::{Value, ValueData, string_to_number};

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "number", 0, Some(1), number_fn);
    register(registry, "sum", 1, Some(1), sum_fn);
    register(registry, "avg", 1, Some(1), avg_fn);
    register(registry, "min", 1, Some(1), min_fn);
    register(registry, "max", 1, Some(1), max_fn);
    register(registry, "floor", 1, Some(1), floor_fn);
    register(registry, "ceiling", 1, Some(1), ceiling_fn);
    register(registry, "round", 1, Some(1), round_fn);
    register(registry, "abs", 1, Some(1), abs_fn);
}

fn number_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    Ok(Value::number(value.to_number()))
}

/// Per-item numeric values of a sequence argument.
fn item_numbers(value: &Value) -> Vec<f64> {
    match &value.data {
        ValueData::NodeSet(set) => {
            (0..set.len()).map(|i| string_to_number(&set.item_string(i))).collect()
        }
        _ => vec![value.to_number()],
    }
}

fn sum_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(item_numbers(&args[0]).iter().sum()))
}

#[allow(clippy::cast_precision_loss)]
fn avg_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let numbers = item_numbers(&args[0]);
    if numbers.is_empty() {
        return Ok(Value::empty());
    }
    let total: f64 = numbers.iter().sum();
    Ok(Value::number(total / numbers.len() as f64))
}

fn min_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let numbers = item_numbers(&args[0]);
    if numbers.is_empty() {
        return Ok(Value::empty());
    }
    let result = numbers.iter().copied().fold(f64::INFINITY, |acc, v| {
        if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.min(v) }
    });
    Ok(Value::number(result))
}

fn max_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let numbers = item_numbers(&args[0]);
    if numbers.is_empty() {
        return Ok(Value::empty());
    }
    let result = numbers.iter().copied().fold(f64::NEG_INFINITY, |acc, v| {
        if acc.is_nan() || v.is_nan() { f64::NAN } else { acc.max(v) }
    });
    Ok(Value::number(result))
}

fn floor_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(args[0].to_number().floor()))
}

fn ceiling_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(args[0].to_number().ceil()))
}

/// XPath round: floor(v + 0.5), NaN and infinities unchanged.
fn round_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = args[0].to_number();
    let rounded = if value.is_nan() || value.is_infinite() { value } else { (value + 0.5).floor() };
    Ok(Value::number(rounded))
}

fn abs_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(args[0].to_number().abs()))
}
