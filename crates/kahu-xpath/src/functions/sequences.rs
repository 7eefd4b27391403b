//! Sequence manipulation functions.

use super::{Registry, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::{NodeSet, Value, ValueData, string_to_number};
use itertools::Itertools;

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "empty", 1, Some(1), empty_fn);
    register(registry, "exists", 1, Some(1), exists_fn);
    register(registry, "distinct-values", 1, Some(1), distinct_values_fn);
    register(registry, "index-of", 2, Some(2), index_of_fn);
    register(registry, "reverse", 1, Some(1), reverse_fn);
    register(registry, "subsequence", 2, Some(3), subsequence_fn);
    register(registry, "insert-before", 3, Some(3), insert_before_fn);
    register(registry, "remove", 2, Some(2), remove_fn);
    register(registry, "head", 1, Some(1), head_fn);
    register(registry, "tail", 1, Some(1), tail_fn);
    register(registry, "for-each", 2, Some(2), for_each_fn);
    register(registry, "filter", 2, Some(2), filter_fn);
    register(registry, "data", 1, Some(1), data_fn);
}

fn as_sequence(value: &Value) -> NodeSet {
    match &value.data {
        ValueData::NodeSet(set) => set.clone(),
        _ => {
            let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
            set.push_synthetic(value.to_string_value());
            set
        }
    }
}

fn sequence_of(items: NodeSet) -> Value {
    Value::node_set(NodeSet { preserve_node_order: true, ..items })
}

fn empty_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let empty = match &args[0].data {
        ValueData::NodeSet(set) => set.is_empty(),
        _ => false,
    };
    Ok(Value::boolean(empty))
}

fn exists_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let exists = match &args[0].data {
        ValueData::NodeSet(set) => !set.is_empty(),
        _ => true,
    };
    Ok(Value::boolean(exists))
}

fn distinct_values_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for text in (0..source.len()).map(|index| source.item_string(index)).unique() {
        result.push_synthetic(text);
    }
    Ok(sequence_of(result))
}

#[allow(clippy::cast_precision_loss)]
fn index_of_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let target = args[1].to_string_value();
    let target_number = string_to_number(&target);
    let numeric = !target_number.is_nan();
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for index in 0..source.len() {
        let text = source.item_string(index);
        let matched = if numeric {
            crate::evaluator::numbers_equal(string_to_number(&text), target_number)
        } else {
            text == target
        };
        if matched {
            result.push_synthetic(crate::value::format_number((index + 1) as f64));
        }
    }
    Ok(sequence_of(result))
}

fn reverse_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for index in (0..source.len()).rev() {
        result.push_item(
            source.nodes[index].clone(),
            source.attributes[index],
            source.string_values.get(index).cloned().unwrap_or(None),
        );
    }
    Ok(sequence_of(result))
}

fn xpath_round(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() { value } else { (value + 0.5).floor() }
}

fn subsequence_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let start = xpath_round(args[1].to_number());
    if start.is_nan() {
        return Ok(sequence_of(NodeSet::default()));
    }
    let end = match args.get(2) {
        Some(length) => {
            let length = xpath_round(length.to_number());
            if length.is_nan() {
                return Ok(sequence_of(NodeSet::default()));
            }
            start + length
        }
        None => f64::INFINITY,
    };
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for index in 0..source.len() {
        #[allow(clippy::cast_precision_loss)]
        let position = (index + 1) as f64;
        if position >= start && position < end {
            result.push_item(
                source.nodes[index].clone(),
                source.attributes[index],
                source.string_values.get(index).cloned().unwrap_or(None),
            );
        }
    }
    Ok(sequence_of(result))
}

fn insert_before_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let inserted = as_sequence(&args[2]);
    let position = args[1].to_number();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let insert_at = if position.is_nan() || position < 1.0 {
        0
    } else {
        ((position as usize).saturating_sub(1)).min(source.len())
    };
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    let push = |result: &mut NodeSet, set: &NodeSet, index: usize| {
        result.push_item(
            set.nodes[index].clone(),
            set.attributes[index],
            set.string_values.get(index).cloned().unwrap_or(None),
        );
    };
    for index in 0..insert_at {
        push(&mut result, &source, index);
    }
    for index in 0..inserted.len() {
        push(&mut result, &inserted, index);
    }
    for index in insert_at..source.len() {
        push(&mut result, &source, index);
    }
    Ok(sequence_of(result))
}

fn remove_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let position = args[1].to_number();
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for index in 0..source.len() {
        #[allow(clippy::cast_precision_loss)]
        let item_position = (index + 1) as f64;
        if item_position != position {
            result.push_item(
                source.nodes[index].clone(),
                source.attributes[index],
                source.string_values.get(index).cloned().unwrap_or(None),
            );
        }
    }
    Ok(sequence_of(result))
}

fn head_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    if !source.is_empty() {
        result.push_item(
            source.nodes[0].clone(),
            source.attributes[0],
            source.string_values.first().cloned().unwrap_or(None),
        );
    }
    Ok(sequence_of(result))
}

fn tail_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let source = as_sequence(&args[0]);
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for index in 1..source.len() {
        result.push_item(
            source.nodes[index].clone(),
            source.attributes[index],
            source.string_values.get(index).cloned().unwrap_or(None),
        );
    }
    Ok(sequence_of(result))
}

/// The second argument names a single-parameter function (built-in or
/// declared); it is applied to each item.
fn for_each_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let function_name = args[1].to_string_value();
    let source = args[0].clone();
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for item in Evaluator::sequence_items(&source) {
        let mapped = eval.call_function_by_name(&function_name, vec![item])?;
        Evaluator::append_value_items(&mut result, &mapped);
    }
    Ok(sequence_of(result))
}

/// Keeps the items for which the named predicate function is true.
fn filter_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let function_name = args[1].to_string_value();
    let source = args[0].clone();
    let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for item in Evaluator::sequence_items(&source) {
        let verdict = eval.call_function_by_name(&function_name, vec![item.clone()])?;
        if verdict.to_boolean() {
            Evaluator::append_value_items(&mut result, &item);
        }
    }
    Ok(sequence_of(result))
}

/// Atomise: the typed/string value of every item as a synthetic sequence.
fn data_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    match &args[0].data {
        ValueData::NodeSet(set) => {
            let mut result = NodeSet { preserve_node_order: true, ..NodeSet::default() };
            for index in 0..set.len() {
                result.push_synthetic(set.item_string(index));
            }
            Ok(sequence_of(result))
        }
        _ => Ok(args[0].clone()),
    }
}
