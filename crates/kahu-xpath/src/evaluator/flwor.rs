//! FLWOR pipelines and quantified expressions.

use super::Evaluator;
use crate::ast::{AstKind, AstNode, OrderModifiers};
use crate::error::Error;
use crate::prolog::{EmptyOrder, expanded_key};
use crate::value::{NodeSet, Value, ValueData};
use std::cmp::Ordering;

/// One atomised sort key: empty, numeric, or string.
#[derive(Debug, Clone)]
enum OrderKey {
    Empty,
    Number(f64),
    Text(String),
}

fn atomize_order_key(value: &Value) -> OrderKey {
    match &value.data {
        ValueData::NodeSet(set) => {
            if set.is_empty() && set.string_override.is_none() {
                return OrderKey::Empty;
            }
            let text = set
                .string_override
                .clone()
                .unwrap_or_else(|| set.item_string(0));
            classify_key(&text)
        }
        ValueData::Number(number) => {
            if number.is_nan() {
                OrderKey::Empty
            } else {
                OrderKey::Number(*number)
            }
        }
        _ => classify_key(&value.to_string_value()),
    }
}

fn classify_key(text: &str) -> OrderKey {
    let number = crate::value::string_to_number(text);
    if number.is_nan() {
        OrderKey::Text(text.to_string())
    } else {
        OrderKey::Number(number)
    }
}

fn compare_keys(left: &OrderKey, right: &OrderKey, empty_least: bool) -> Ordering {
    match (left, right) {
        (OrderKey::Empty, OrderKey::Empty) => Ordering::Equal,
        (OrderKey::Empty, _) => {
            if empty_least {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (_, OrderKey::Empty) => {
            if empty_least {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (OrderKey::Number(a), OrderKey::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (OrderKey::Text(a), OrderKey::Text(b)) => a.cmp(b),
        // Mixed keys compare on their string forms (codepoint collation).
        (a, b) => key_text(a).cmp(&key_text(b)),
    }
}

fn key_text(key: &OrderKey) -> String {
    match key {
        OrderKey::Empty => String::new(),
        OrderKey::Number(n) => crate::value::format_number(*n),
        OrderKey::Text(t) => t.clone(),
    }
}

enum Clause<'a> {
    For(String, &'a AstNode),
    Let(String, &'a AstNode),
    Where(&'a AstNode),
}

impl Evaluator {
    /// Evaluate `for`/`let`/FLWOR pipelines. Tuples form in source order;
    /// `order by` materialises the pending tuple stream and sorts it stably
    /// before the return clause runs.
    pub(crate) fn evaluate_flwor(&mut self, node: &AstNode) -> Result<Value, Error> {
        debug_assert!(!node.children.is_empty());
        let return_expr = node.children.last().expect("return clause");

        let mut clauses: Vec<Clause<'_>> = Vec::new();
        let mut order_specs: Vec<(&AstNode, &OrderModifiers)> = Vec::new();
        let mut binding_names: Vec<String> = Vec::new();
        for child in &node.children[..node.children.len() - 1] {
            match child.kind {
                AstKind::ForBinding => {
                    let key = self.binding_key(&child.value);
                    binding_names.push(key.clone());
                    clauses.push(Clause::For(key, &child.children[0]));
                }
                AstKind::LetBinding => {
                    let key = self.binding_key(&child.value);
                    binding_names.push(key.clone());
                    clauses.push(Clause::Let(key, &child.children[0]));
                }
                AstKind::WhereClause => clauses.push(Clause::Where(&child.children[0])),
                AstKind::OrderByClause => {
                    for spec in &child.children {
                        let modifiers =
                            spec.order.as_ref().expect("order modifiers on every spec");
                        order_specs.push((&spec.children[0], modifiers));
                    }
                }
                _ => {
                    return Err(
                        self.unsupported(format!("unexpected {:?} in FLWOR pipeline", child.kind))
                    );
                }
            }
        }

        let mut results = NodeSet { preserve_node_order: true, ..NodeSet::default() };

        if order_specs.is_empty() {
            self.run_tuples(&clauses, 0, &mut |eval| {
                let value = eval.evaluate_node(return_expr)?;
                Self::append_value_items(&mut results, &value);
                Ok(())
            })?;
            return Ok(Value::node_set(results));
        }

        // Collect surviving tuples with their sort keys.
        let mut tuples: Vec<(Vec<OrderKey>, Vec<(String, Value)>)> = Vec::new();
        let empty_least_default = self.prolog.empty_order == EmptyOrder::Least;
        self.run_tuples(&clauses, 0, &mut |eval| {
            let mut keys = Vec::with_capacity(order_specs.len());
            for (expr, _) in &order_specs {
                let key_value = eval.evaluate_node(expr)?;
                keys.push(atomize_order_key(&key_value));
            }
            let snapshot: Vec<(String, Value)> = binding_names
                .iter()
                .filter_map(|name| {
                    eval.variable_value(name).map(|value| (name.clone(), value))
                })
                .collect();
            tuples.push((keys, snapshot));
            Ok(())
        })?;

        let mut order: Vec<usize> = (0..tuples.len()).collect();
        order.sort_by(|&a, &b| {
            for (index, (_, modifiers)) in order_specs.iter().enumerate() {
                let empty_least = modifiers.empty_least.unwrap_or(empty_least_default);
                let mut ordering =
                    compare_keys(&tuples[a].0[index], &tuples[b].0[index], empty_least);
                if modifiers.descending {
                    ordering = ordering.reverse();
                }
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            // Stability: equal keys retain tuple order.
            a.cmp(&b)
        });

        for index in order {
            let snapshot = tuples[index].1.clone();
            let value = self.with_tuple(&snapshot, |eval| eval.evaluate_node(return_expr))?;
            Self::append_value_items(&mut results, &value);
        }
        Ok(Value::node_set(results))
    }

    fn binding_key(&self, qname: &str) -> String {
        let (ns_uri, local) = self.prolog.expand_variable_name(qname);
        expanded_key(ns_uri.as_deref(), &local)
    }

    pub(crate) fn variable_value(&self, key: &str) -> Option<Value> {
        self.variable_storage.get(key).cloned()
    }

    fn run_tuples(
        &mut self,
        clauses: &[Clause<'_>],
        index: usize,
        emit: &mut dyn FnMut(&mut Self) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let Some(clause) = clauses.get(index) else {
            return emit(self);
        };
        match clause {
            Clause::Let(key, expr) => {
                let value = self.evaluate_node(expr)?;
                self.with_binding(key.clone(), value, |eval| {
                    eval.run_tuples(clauses, index + 1, &mut *emit)
                })
            }
            Clause::Where(expr) => {
                let condition = self.evaluate_node(expr)?;
                if condition.to_boolean() {
                    self.run_tuples(clauses, index + 1, emit)
                } else {
                    Ok(())
                }
            }
            Clause::For(key, expr) => {
                let sequence = self.evaluate_node(expr)?;
                for item in Self::sequence_items(&sequence) {
                    self.with_binding(key.clone(), item, |eval| {
                        eval.run_tuples(clauses, index + 1, &mut *emit)
                    })?;
                }
                Ok(())
            }
        }
    }

    /// Bind a full tuple snapshot, restoring prior bindings afterwards.
    fn with_tuple(
        &mut self,
        bindings: &[(String, Value)],
        f: impl FnOnce(&mut Self) -> Result<Value, Error>,
    ) -> Result<Value, Error> {
        let mut saved: Vec<(String, Option<Value>)> = Vec::with_capacity(bindings.len());
        for (key, value) in bindings {
            saved.push((key.clone(), self.variable_storage.insert(key.clone(), value.clone())));
        }
        let result = f(self);
        for (key, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.variable_storage.insert(key, value);
                }
                None => {
                    self.variable_storage.remove(&key);
                }
            }
        }
        result
    }

    /// Split a sequence value into single-item values for iteration.
    pub(crate) fn sequence_items(value: &Value) -> Vec<Value> {
        match &value.data {
            ValueData::NodeSet(set) => (0..set.len())
                .map(|index| {
                    let mut single = NodeSet {
                        preserve_node_order: true,
                        ..NodeSet::default()
                    };
                    single.push_item(
                        set.nodes[index].clone(),
                        set.attributes[index],
                        Some(set.item_string(index)),
                    );
                    Value::node_set(single)
                })
                .collect(),
            _ => vec![value.clone()],
        }
    }

    pub(crate) fn evaluate_quantified(&mut self, node: &AstNode) -> Result<Value, Error> {
        let every = node.value == "every";
        let bindings: Vec<&AstNode> = node
            .children
            .iter()
            .filter(|c| c.kind == AstKind::QuantifiedBinding)
            .collect();
        let condition = node.children.last().expect("satisfies clause");
        let result = self.quantify(&bindings, condition, every)?;
        Ok(Value::boolean(result))
    }

    /// Cross-product over the bindings, short-circuiting as soon as the
    /// answer is fixed.
    fn quantify(
        &mut self,
        bindings: &[&AstNode],
        condition: &AstNode,
        every: bool,
    ) -> Result<bool, Error> {
        let Some(binding) = bindings.first() else {
            let value = self.evaluate_node(condition)?;
            return Ok(value.to_boolean());
        };
        let key = self.binding_key(&binding.value);
        let sequence = self.evaluate_node(&binding.children[0])?;
        for item in Self::sequence_items(&sequence) {
            let verdict = self.with_binding(key.clone(), item, |eval| {
                eval.quantify(&bindings[1..], condition, every)
            })?;
            if every && !verdict {
                return Ok(false);
            }
            if !every && verdict {
                return Ok(true);
            }
        }
        Ok(every)
    }
}
