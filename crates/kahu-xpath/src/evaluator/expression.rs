//! Expression dispatch: literals, operators, comparisons and set operations.

use super::Evaluator;
use crate::ast::{AstKind, AstNode, BinaryOperator};
use crate::error::Error;
use crate::value::{NodeSet, Value, ValueData, format_number};
use std::collections::HashSet;
use std::rc::Rc;

/// Identity of a sequence item for set operations: node identity for real
/// nodes, the string value for synthetic items.
#[derive(PartialEq, Eq, Hash)]
enum ItemKey {
    Node(usize, usize),
    Synthetic(String),
}

fn item_key(set: &NodeSet, index: usize) -> ItemKey {
    match &set.nodes[index] {
        Some(node) => {
            ItemKey::Node(Rc::as_ptr(node) as usize, set.attributes[index].map_or(0, |a| a + 1))
        }
        None => ItemKey::Synthetic(set.item_string(index)),
    }
}

/// 16-ulp style tolerance: absolute for magnitudes up to one, relative above.
pub(crate) fn numbers_equal(left: f64, right: f64) -> bool {
    if left.is_nan() || right.is_nan() {
        return false;
    }
    if left.is_infinite() || right.is_infinite() {
        return left == right;
    }
    let larger = left.abs().max(right.abs());
    if larger <= 1.0 {
        (left - right).abs() <= f64::EPSILON * 16.0
    } else {
        (left - right).abs() <= larger * f64::EPSILON * 16.0
    }
}

fn compare_numbers(op: BinaryOperator, left: f64, right: f64) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::ValueEq => numbers_equal(left, right),
        BinaryOperator::NotEquals | BinaryOperator::ValueNe => {
            !left.is_nan() && !right.is_nan() && !numbers_equal(left, right)
        }
        BinaryOperator::LessThan | BinaryOperator::ValueLt => left < right,
        BinaryOperator::LessEqual | BinaryOperator::ValueLe => left <= right,
        BinaryOperator::GreaterThan | BinaryOperator::ValueGt => left > right,
        BinaryOperator::GreaterEqual | BinaryOperator::ValueGe => left >= right,
        _ => false,
    }
}

fn compare_strings(op: BinaryOperator, left: &str, right: &str) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::ValueEq => left == right,
        BinaryOperator::NotEquals | BinaryOperator::ValueNe => left != right,
        BinaryOperator::LessThan | BinaryOperator::ValueLt => left < right,
        BinaryOperator::LessEqual | BinaryOperator::ValueLe => left <= right,
        BinaryOperator::GreaterThan | BinaryOperator::ValueGt => left > right,
        BinaryOperator::GreaterEqual | BinaryOperator::ValueGe => left >= right,
        _ => false,
    }
}

/// A scalar that is usable as a number without information loss.
fn is_numeric_operand(value: &Value) -> bool {
    if value.schema_kind().is_some_and(crate::schema::SchemaKind::is_numeric) {
        return true;
    }
    match &value.data {
        ValueData::Number(_) => true,
        ValueData::String(text) => !crate::value::string_to_number(text).is_nan(),
        _ => false,
    }
}

fn is_boolean_operand(value: &Value) -> bool {
    if value.schema_kind().is_some_and(crate::schema::SchemaKind::is_boolean) {
        return true;
    }
    matches!(value.data, ValueData::Boolean(_))
}

impl Evaluator {
    pub(crate) fn evaluate_node(&mut self, node: &AstNode) -> Result<Value, Error> {
        match node.kind {
            AstKind::Number => {
                Ok(Value::number(node.value.parse::<f64>().unwrap_or(f64::NAN)))
            }
            AstKind::String | AstKind::Literal => Ok(Value::string(node.value.clone())),
            AstKind::VariableReference => self.resolve_variable(&node.value.clone()),
            AstKind::BinaryOp => self.evaluate_binary(node),
            AstKind::UnaryOp => {
                let operand = self.evaluate_node(&node.children[0])?;
                let number = operand.to_number();
                Ok(Value::number(if node.value == "-" { -number } else { number }))
            }
            AstKind::FunctionCall => self.evaluate_function_call(node),
            AstKind::LocationPath => self.evaluate_location_path(node),
            AstKind::Path => self.evaluate_path_combination(node),
            AstKind::Filter => self.evaluate_filter(node),
            AstKind::Union => self.evaluate_union(node),
            AstKind::Conditional => {
                let condition = self.evaluate_node(&node.children[0])?;
                if condition.to_boolean() {
                    self.evaluate_node(&node.children[1])
                } else {
                    self.evaluate_node(&node.children[2])
                }
            }
            AstKind::ForExpression | AstKind::LetExpression | AstKind::FlworExpression => {
                self.evaluate_flwor(node)
            }
            AstKind::QuantifiedExpression => self.evaluate_quantified(node),
            AstKind::Expression => match node.children.len() {
                0 => Ok(Value::empty()),
                1 => self.evaluate_node(&node.children[0]),
                _ => {
                    let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                    for child in &node.children {
                        let value = self.evaluate_node(child)?;
                        Self::append_value_items(&mut set, &value);
                    }
                    Ok(Value::node_set(set))
                }
            },
            AstKind::Root => {
                let mut set = NodeSet::default();
                for tag in self.document().tags() {
                    set.push_node(Rc::clone(tag));
                }
                Ok(Value::node_set(set))
            }
            AstKind::DirectElementConstructor
            | AstKind::ComputedElementConstructor
            | AstKind::ComputedAttributeConstructor
            | AstKind::TextConstructor
            | AstKind::CommentConstructor
            | AstKind::PiConstructor
            | AstKind::DocumentConstructor => self.evaluate_constructor(node),
            _ => Err(self.unsupported(format!("unexpected {:?} node in expression", node.kind))),
        }
    }

    fn evaluate_binary(&mut self, node: &AstNode) -> Result<Value, Error> {
        let op = node.op.unwrap_or(BinaryOperator::Equals);
        match op {
            BinaryOperator::Or => {
                let left = self.evaluate_node(&node.children[0])?;
                if left.to_boolean() {
                    return Ok(Value::boolean(true));
                }
                let right = self.evaluate_node(&node.children[1])?;
                Ok(Value::boolean(right.to_boolean()))
            }
            BinaryOperator::And => {
                let left = self.evaluate_node(&node.children[0])?;
                if !left.to_boolean() {
                    return Ok(Value::boolean(false));
                }
                let right = self.evaluate_node(&node.children[1])?;
                Ok(Value::boolean(right.to_boolean()))
            }
            BinaryOperator::Comma => {
                let left = self.evaluate_node(&node.children[0])?;
                let right = self.evaluate_node(&node.children[1])?;
                let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                Self::append_value_items(&mut set, &left);
                Self::append_value_items(&mut set, &right);
                Ok(Value::node_set(set))
            }
            BinaryOperator::Range => {
                let start = self.evaluate_node(&node.children[0])?.to_number();
                let end = self.evaluate_node(&node.children[1])?.to_number();
                let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                if start.is_finite() && end.is_finite() {
                    let mut current = start.round();
                    let end = end.round();
                    while current <= end {
                        set.push_synthetic(format_number(current));
                        current += 1.0;
                    }
                }
                Ok(Value::node_set(set))
            }
            BinaryOperator::Add
            | BinaryOperator::Subtract
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => {
                let left = self.evaluate_node(&node.children[0])?.to_number();
                let right = self.evaluate_node(&node.children[1])?.to_number();
                let result = match op {
                    BinaryOperator::Add => left + right,
                    BinaryOperator::Subtract => left - right,
                    BinaryOperator::Multiply => left * right,
                    BinaryOperator::Divide => left / right,
                    _ => left % right,
                };
                Ok(Value::number(result))
            }
            BinaryOperator::Equals
            | BinaryOperator::NotEquals
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => {
                let left = self.evaluate_node(&node.children[0])?;
                let right = self.evaluate_node(&node.children[1])?;
                Ok(Value::boolean(Self::general_compare(op, &left, &right)))
            }
            BinaryOperator::ValueEq
            | BinaryOperator::ValueNe
            | BinaryOperator::ValueLt
            | BinaryOperator::ValueLe
            | BinaryOperator::ValueGt
            | BinaryOperator::ValueGe => {
                let left = self.evaluate_node(&node.children[0])?;
                let right = self.evaluate_node(&node.children[1])?;
                Ok(Value::boolean(Self::value_compare(op, &left, &right)))
            }
            BinaryOperator::Union | BinaryOperator::Intersect | BinaryOperator::Except => {
                let left = self.evaluate_node(&node.children[0])?;
                let right = self.evaluate_node(&node.children[1])?;
                self.evaluate_set_op(op, &left, &right)
            }
            BinaryOperator::ContentEquals => {
                let literal = node.children[0].value.clone();
                let Some(context_node) = self.context.context_node.clone() else {
                    return Ok(Value::boolean(false));
                };
                Ok(Value::boolean(context_node.string_value() == literal))
            }
            BinaryOperator::AttributeExists => {
                let name = node.children[0].value.clone();
                let Some(context_node) = self.context.context_node.clone() else {
                    return Ok(Value::boolean(false));
                };
                Ok(Value::boolean(context_node.attribute_value(&name).is_some()))
            }
            BinaryOperator::AttributeEquals => {
                let name = node.children[0].value.clone();
                let literal = node.children[1].value.clone();
                let Some(context_node) = self.context.context_node.clone() else {
                    return Ok(Value::boolean(false));
                };
                Ok(Value::boolean(
                    context_node.attribute_value(&name).is_some_and(|value| value == literal),
                ))
            }
        }
    }

    /// General comparisons: boolean short-path, then numeric, then
    /// node-set existential quantification, then string comparison.
    pub(crate) fn general_compare(op: BinaryOperator, left: &Value, right: &Value) -> bool {
        if is_boolean_operand(left) || is_boolean_operand(right) {
            let lhs = if left.to_boolean() { 1.0 } else { 0.0 };
            let rhs = if right.to_boolean() { 1.0 } else { 0.0 };
            return compare_numbers(op, lhs, rhs);
        }

        let left_is_set = left.is_node_set();
        let right_is_set = right.is_node_set();

        if !left_is_set && !right_is_set {
            if is_numeric_operand(left) && is_numeric_operand(right) {
                return compare_numbers(op, left.to_number(), right.to_number());
            }
            return compare_strings(op, &left.to_string_value(), &right.to_string_value());
        }

        // Existential: some pair of items compares true.
        let left_items = Self::atom_strings(left);
        let right_items = Self::atom_strings(right);
        let numeric = if left_is_set && right_is_set {
            false
        } else if left_is_set {
            is_numeric_operand(right)
        } else {
            is_numeric_operand(left)
        };
        itertools::iproduct!(&left_items, &right_items).any(|(lhs, rhs)| {
            if numeric {
                compare_numbers(
                    op,
                    crate::value::string_to_number(lhs),
                    crate::value::string_to_number(rhs),
                )
            } else {
                compare_strings(op, lhs, rhs)
            }
        })
    }

    fn atom_strings(value: &Value) -> Vec<String> {
        match &value.data {
            ValueData::NodeSet(set) => (0..set.len()).map(|i| set.item_string(i)).collect(),
            _ => vec![value.to_string_value()],
        }
    }

    /// Value comparisons atomise both sides: the empty sequence never
    /// compares true, and only the first item of a longer sequence counts.
    pub(crate) fn value_compare(op: BinaryOperator, left: &Value, right: &Value) -> bool {
        let Some(lhs) = Self::atomize_first(left) else {
            return false;
        };
        let Some(rhs) = Self::atomize_first(right) else {
            return false;
        };
        if is_numeric_operand(&lhs) && is_numeric_operand(&rhs) {
            return compare_numbers(op, lhs.to_number(), rhs.to_number());
        }
        if is_boolean_operand(&lhs) || is_boolean_operand(&rhs) {
            let left_bool = if lhs.to_boolean() { 1.0 } else { 0.0 };
            let right_bool = if rhs.to_boolean() { 1.0 } else { 0.0 };
            return compare_numbers(op, left_bool, right_bool);
        }
        compare_strings(op, &lhs.to_string_value(), &rhs.to_string_value())
    }

    pub(crate) fn atomize_first(value: &Value) -> Option<Value> {
        match &value.data {
            ValueData::NodeSet(set) => {
                if set.is_empty() {
                    None
                } else {
                    Some(Value::string(set.item_string(0)))
                }
            }
            _ => Some(value.clone()),
        }
    }

    fn evaluate_union(&mut self, node: &AstNode) -> Result<Value, Error> {
        let mut result = self.evaluate_node(&node.children[0])?;
        for child in &node.children[1..] {
            let right = self.evaluate_node(child)?;
            result = self.evaluate_set_op(BinaryOperator::Union, &result, &right)?;
        }
        Ok(result)
    }

    pub(crate) fn evaluate_set_op(
        &mut self,
        op: BinaryOperator,
        left: &Value,
        right: &Value,
    ) -> Result<Value, Error> {
        let (Some(left_set), Some(right_set)) = (left.as_node_set(), right.as_node_set()) else {
            return Err(self.unsupported(format!(
                "'{}' requires node-set operands",
                op.lexeme()
            )));
        };

        let mut result = NodeSet {
            preserve_node_order: left_set.preserve_node_order,
            ..NodeSet::default()
        };
        match op {
            BinaryOperator::Union => {
                let mut seen: HashSet<ItemKey> = HashSet::new();
                for (set, len) in [(left_set, left_set.len()), (right_set, right_set.len())] {
                    for index in 0..len {
                        if seen.insert(item_key(set, index)) {
                            result.push_item(
                                set.nodes[index].clone(),
                                set.attributes[index],
                                set.string_values.get(index).cloned().unwrap_or(None),
                            );
                        }
                    }
                }
            }
            BinaryOperator::Intersect | BinaryOperator::Except => {
                let other: HashSet<ItemKey> =
                    (0..right_set.len()).map(|i| item_key(right_set, i)).collect();
                let keep_present = op == BinaryOperator::Intersect;
                let mut seen: HashSet<ItemKey> = HashSet::new();
                for index in 0..left_set.len() {
                    let key = item_key(left_set, index);
                    if other.contains(&key) == keep_present && seen.insert(item_key(left_set, index))
                    {
                        result.push_item(
                            left_set.nodes[index].clone(),
                            left_set.attributes[index],
                            left_set.string_values.get(index).cloned().unwrap_or(None),
                        );
                    }
                }
            }
            _ => unreachable!("set operator"),
        }
        self.sort_node_set(&mut result);
        Ok(Value::node_set(result))
    }
}
