//! Document and text-resource retrieval functions.
//!
//! All loading goes through the host resolver attached to the primary
//! document; results are cached per document with normalised URI keys. A
//! missing resource yields an empty sequence, never an error.

use super::{Registry, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::{NodeSet, Value};
use std::rc::Rc;

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "doc", 1, Some(1), doc_fn);
    register(registry, "doc-available", 1, Some(1), doc_available_fn);
    register(registry, "collection", 0, Some(1), collection_fn);
    register(registry, "uri-collection", 0, Some(1), uri_collection_fn);
    register(registry, "unparsed-text", 1, Some(1), unparsed_text_fn);
    register(registry, "unparsed-text-available", 1, Some(1), unparsed_text_available_fn);
    register(registry, "unparsed-text-lines", 1, Some(1), unparsed_text_lines_fn);
    register(registry, "resolve-uri", 1, Some(2), resolve_uri_fn);
}

fn doc_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uri = args[0].to_string_value();
    let mut set = NodeSet::default();
    if let Some(loaded) = eval.document().cached_document(&uri) {
        eval.register_document(&loaded);
        for tag in loaded.tags() {
            set.push_node(Rc::clone(tag));
        }
    }
    Ok(Value::node_set(set))
}

fn doc_available_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uri = args[0].to_string_value();
    Ok(Value::boolean(eval.document().cached_document(&uri).is_some()))
}

fn collection_uris(eval: &mut Evaluator, args: &[Value]) -> Vec<String> {
    let uri = args.first().map(Value::to_string_value);
    let document = eval.document();
    let Some(resolver) = document.resolver() else {
        return Vec::new();
    };
    // With no argument the collection is the owning document's directory;
    // when that is unknown the collection is empty.
    if uri.is_none() && document.directory().is_none() {
        return Vec::new();
    }
    resolver.collection(uri.as_deref()).unwrap_or_default()
}

fn collection_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uris = collection_uris(eval, args);
    let mut set = NodeSet::default();
    for uri in uris {
        if let Some(loaded) = eval.document().cached_document(&uri) {
            eval.register_document(&loaded);
            for tag in loaded.tags() {
                set.push_node(Rc::clone(tag));
            }
        }
    }
    Ok(Value::node_set(set))
}

fn uri_collection_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uris = collection_uris(eval, args);
    let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for uri in uris {
        set.push_synthetic(uri);
    }
    Ok(Value::node_set(set))
}

fn unparsed_text_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uri = args[0].to_string_value();
    match eval.document().cached_text(&uri) {
        Some(text) => Ok(Value::string(text)),
        None => Ok(Value::empty()),
    }
}

fn unparsed_text_available_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uri = args[0].to_string_value();
    Ok(Value::boolean(eval.document().cached_text(&uri).is_some()))
}

fn unparsed_text_lines_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let uri = args[0].to_string_value();
    let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    if let Some(text) = eval.document().cached_text(&uri) {
        for line in text.lines() {
            set.push_synthetic(line.to_string());
        }
    }
    Ok(Value::node_set(set))
}

/// Resolve a relative reference against the given base, the prolog's static
/// base URI, or the document path, in that order.
fn resolve_uri_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let relative = args[0].to_string_value();
    let base = args
        .get(1)
        .map(Value::to_string_value)
        .or_else(|| eval.prolog.static_base_uri.clone())
        .or_else(|| eval.document().path.clone());

    let Some(base) = base else {
        return Ok(Value::string(relative));
    };
    match url::Url::parse(&base) {
        Ok(base_url) => match base_url.join(&relative) {
            Ok(joined) => Ok(Value::string(joined.to_string())),
            Err(_) => Ok(Value::string(relative)),
        },
        Err(_) => {
            // Plain paths resolve textually.
            if relative.starts_with('/') || relative.contains("://") {
                return Ok(Value::string(relative));
            }
            let directory = match base.rfind('/') {
                Some(index) => &base[..=index],
                None => "",
            };
            Ok(Value::string(format!("{directory}{relative}")))
        }
    }
}
