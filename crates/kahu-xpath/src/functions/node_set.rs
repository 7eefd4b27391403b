//! Node-set functions: position bookkeeping, counting, ID lookup and names.

use super::{Registry, arg_or_context, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::{NodeSet, Value, ValueData};
use kahu_xml::{Document, Tag};
use std::collections::HashSet;
use std::rc::Rc;

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "last", 0, Some(0), last_fn);
    register(registry, "position", 0, Some(0), position_fn);
    register(registry, "count", 1, Some(1), count_fn);
    register(registry, "id", 1, Some(1), id_fn);
    register(registry, "idref", 1, Some(1), idref_fn);
    register(registry, "local-name", 0, Some(1), local_name_fn);
    register(registry, "namespace-uri", 0, Some(1), namespace_uri_fn);
    register(registry, "name", 0, Some(1), name_fn);
    register(registry, "root", 0, Some(1), root_fn);
    register(registry, "lang", 1, Some(1), lang_fn);
}

#[allow(clippy::cast_precision_loss)]
fn last_fn(eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(eval.context.size as f64))
}

#[allow(clippy::cast_precision_loss)]
fn position_fn(eval: &mut Evaluator, _args: &[Value]) -> Result<Value, Error> {
    Ok(Value::number(eval.context.position as f64))
}

#[allow(clippy::cast_precision_loss)]
fn count_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let count = match &args[0].data {
        ValueData::NodeSet(set) => set.len(),
        _ => 1,
    };
    Ok(Value::number(count as f64))
}

/// Whitespace-separated tokens from every item of the argument.
fn gather_tokens(value: &Value) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let collect = |text: &str, tokens: &mut HashSet<String>| {
        for token in text.split_whitespace() {
            tokens.insert(token.to_string());
        }
    };
    match &value.data {
        ValueData::NodeSet(set) => {
            for index in 0..set.len() {
                collect(&set.item_string(index), &mut tokens);
            }
        }
        _ => collect(&value.to_string_value(), &mut tokens),
    }
    tokens
}

fn walk_elements(document: &Document, mut visit: impl FnMut(&Rc<Tag>)) {
    fn recurse(tag: &Rc<Tag>, visit: &mut impl FnMut(&Rc<Tag>)) {
        visit(tag);
        for child in &tag.children {
            recurse(child, visit);
        }
    }
    for tag in document.tags() {
        recurse(tag, &mut visit);
    }
}

fn id_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let targets = gather_tokens(&args[0]);
    let document = eval.document();
    let mut set = NodeSet::default();
    walk_elements(&document, |tag| {
        if !tag.is_element() {
            return;
        }
        let matched = tag.attributes().any(|(_, attribute)| {
            (attribute.name.eq_ignore_ascii_case("id")
                || attribute.name.eq_ignore_ascii_case("xml:id"))
                && targets.contains(attribute.value.as_str())
        });
        if matched {
            set.push_node(Rc::clone(tag));
        }
    });
    Ok(Value::node_set(set))
}

fn idref_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let targets = gather_tokens(&args[0]);
    let document = eval.document();
    let mut set = NodeSet::default();
    walk_elements(&document, |tag| {
        if !tag.is_element() {
            return;
        }
        let matched = tag.attributes().any(|(_, attribute)| {
            (attribute.name.eq_ignore_ascii_case("idref")
                || attribute.name.eq_ignore_ascii_case("xml:idref")
                || attribute.name.eq_ignore_ascii_case("idrefs"))
                && attribute.value.split_whitespace().any(|token| targets.contains(token))
        });
        if matched {
            set.push_node(Rc::clone(tag));
        }
    });
    Ok(Value::node_set(set))
}

/// The (node, attribute) pair a name-reading function should inspect.
fn first_named_item(value: &Value) -> Option<(Rc<Tag>, Option<usize>)> {
    let set = value.as_node_set()?;
    if set.is_empty() {
        return None;
    }
    let node = set.nodes[0].clone()?;
    Some((node, set.attributes[0]))
}

fn local_name_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let name = match first_named_item(&value) {
        Some((node, Some(slot))) => {
            node.attribs.get(slot).map(|a| a.local_name().to_string()).unwrap_or_default()
        }
        Some((node, None)) => {
            node.local_name().map(ToString::to_string).or_else(|| node.pi_target().map(ToString::to_string)).unwrap_or_default()
        }
        None => String::new(),
    };
    Ok(Value::string(name))
}

fn name_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let name = match first_named_item(&value) {
        Some((node, Some(slot))) => {
            node.attribs.get(slot).map(|a| a.name.clone()).unwrap_or_default()
        }
        Some((node, None)) => node
            .name()
            .map(|n| n.strip_prefix('?').unwrap_or(n).to_string())
            .unwrap_or_default(),
        None => String::new(),
    };
    Ok(Value::string(name))
}

fn namespace_uri_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let uri = match first_named_item(&value) {
        Some((node, attribute)) => {
            let document = eval.owning_document(&node).unwrap_or_else(|| eval.document());
            match attribute {
                Some(slot) => node
                    .attribs
                    .get(slot)
                    .and_then(|a| a.prefix())
                    .and_then(|prefix| document.resolve_prefix(prefix, node.id))
                    .and_then(|hash| document.namespace_uri(hash)),
                None => document.namespace_uri(node.namespace_hash),
            }
        }
        None => None,
    };
    Ok(Value::string(uri.unwrap_or_default()))
}

fn root_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let mut set = NodeSet::default();
    if let Some((node, _)) = first_named_item(&value) {
        let document = eval.owning_document(&node).unwrap_or_else(|| eval.document());
        let mut current = node;
        while let Some(parent) = document.parent_of(&current) {
            current = parent;
        }
        set.push_node(current);
    }
    Ok(Value::node_set(set))
}

/// True when the context node's in-scope `xml:lang` matches the argument,
/// comparing case-insensitively and allowing a sublanguage suffix.
fn lang_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let wanted = args[0].to_string_value();
    let document = eval.document();
    let mut current = eval.context.context_node.clone();
    while let Some(node) = current {
        if let Some(lang) = node.attribute_value("xml:lang") {
            let lang = lang.to_ascii_lowercase();
            let wanted = wanted.to_ascii_lowercase();
            let matched = lang == wanted
                || (lang.starts_with(&wanted)
                    && lang.as_bytes().get(wanted.len()) == Some(&b'-'));
            return Ok(Value::boolean(matched));
        }
        current = document.parent_of(&node);
    }
    Ok(Value::boolean(false))
}
