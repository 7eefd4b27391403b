//! Accessor functions over nodes and the static context.

use super::{Registry, arg_or_context, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::prolog::CODEPOINT_COLLATION_URI;
use crate::value::{Value, ValueData};

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "node-name", 0, Some(1), node_name_fn);
    register(registry, "nilled", 0, Some(1), nilled_fn);
    register(registry, "base-uri", 0, Some(1), base_uri_fn);
    register(registry, "document-uri", 0, Some(1), document_uri_fn);
    register(registry, "static-base-uri", 0, Some(0), static_base_uri_fn);
    register(registry, "default-collation", 0, Some(0), default_collation_fn);
}

fn node_name_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let ValueData::NodeSet(set) = &value.data else {
        return Ok(Value::empty());
    };
    if set.is_empty() {
        return Ok(Value::empty());
    }
    let name = match (&set.nodes[0], set.attributes[0]) {
        (Some(node), Some(slot)) => {
            node.attribs.get(slot).map(|attribute| attribute.name.clone())
        }
        (Some(node), None) => node
            .name()
            .map(|name| name.strip_prefix('?').unwrap_or(name).to_string()),
        _ => None,
    };
    match name {
        Some(name) if !name.is_empty() => Ok(Value::string(name)),
        _ => Ok(Value::empty()),
    }
}

/// Only schema validation can nill an element; without it the answer for
/// any element is false, and the empty sequence for non-elements.
fn nilled_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let ValueData::NodeSet(set) = &value.data else {
        return Ok(Value::empty());
    };
    match (set.nodes.first(), set.attributes.first()) {
        (Some(Some(node)), Some(None)) if node.is_element() => Ok(Value::boolean(false)),
        _ => Ok(Value::empty()),
    }
}

fn base_uri_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    if let ValueData::NodeSet(set) = &value.data {
        if let Some(Some(node)) = set.nodes.first() {
            // An explicit xml:base on the node or its ancestors wins.
            let document = eval.owning_document(node).unwrap_or_else(|| eval.document());
            let mut current = Some(node.clone());
            while let Some(tag) = current {
                if let Some(base) = tag.attribute_value("xml:base") {
                    return Ok(Value::string(base));
                }
                current = document.parent_of(&tag);
            }
            if let Some(path) = &document.path {
                return Ok(Value::string(path.clone()));
            }
        }
    }
    match &eval.prolog.static_base_uri {
        Some(base) => Ok(Value::string(base.clone())),
        None => Ok(Value::empty()),
    }
}

fn document_uri_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    if let ValueData::NodeSet(set) = &value.data {
        if let Some(Some(node)) = set.nodes.first() {
            let document = eval.owning_document(node).unwrap_or_else(|| eval.document());
            if let Some(path) = &document.path {
                return Ok(Value::string(path.clone()));
            }
        }
    }
    Ok(Value::empty())
}

fn static_base_uri_fn(eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    match &eval.prolog.static_base_uri {
        Some(base) => Ok(Value::string(base.clone())),
        None => match &eval.document().path {
            Some(path) => Ok(Value::string(path.clone())),
            None => Ok(Value::empty()),
        },
    }
}

fn default_collation_fn(eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    let collation = eval
        .prolog
        .default_collation
        .clone()
        .unwrap_or_else(|| CODEPOINT_COLLATION_URI.to_string());
    Ok(Value::string(collation))
}
