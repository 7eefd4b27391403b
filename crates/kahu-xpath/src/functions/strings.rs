//! String functions, including the regex-backed trio.

use super::{Registry, arg_or_context, register};
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::value::{NodeSet, Value, ValueData};

pub(super) fn register_all(registry: &mut Registry) {
    register(registry, "string", 0, Some(1), string_fn);
    register(registry, "concat", 2, None, concat_fn);
    register(registry, "starts-with", 2, Some(2), starts_with_fn);
    register(registry, "ends-with", 2, Some(2), ends_with_fn);
    register(registry, "contains", 2, Some(2), contains_fn);
    register(registry, "substring", 2, Some(3), substring_fn);
    register(registry, "substring-before", 2, Some(2), substring_before_fn);
    register(registry, "substring-after", 2, Some(2), substring_after_fn);
    register(registry, "string-length", 0, Some(1), string_length_fn);
    register(registry, "normalize-space", 0, Some(1), normalize_space_fn);
    register(registry, "translate", 3, Some(3), translate_fn);
    register(registry, "upper-case", 1, Some(1), upper_case_fn);
    register(registry, "lower-case", 1, Some(1), lower_case_fn);
    register(registry, "encode-for-uri", 1, Some(1), encode_for_uri_fn);
    register(registry, "escape-html-uri", 1, Some(1), escape_html_uri_fn);
    register(registry, "matches", 2, Some(3), matches_fn);
    register(registry, "replace", 3, Some(4), replace_fn);
    register(registry, "tokenize", 2, Some(3), tokenize_fn);
    register(registry, "string-join", 1, Some(2), string_join_fn);
}

fn string_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    Ok(Value::string(value.to_string_value()))
}

fn concat_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.to_string_value());
    }
    Ok(Value::string(out))
}

fn starts_with_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(Value::boolean(haystack.starts_with(&needle)))
}

fn ends_with_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(Value::boolean(haystack.ends_with(&needle)))
}

fn contains_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    Ok(Value::boolean(haystack.contains(&needle)))
}

/// `round(v)` with the XPath definition: floor(v + 0.5).
fn xpath_round(value: f64) -> f64 {
    if value.is_nan() || value.is_infinite() {
        return value;
    }
    (value + 0.5).floor()
}

/// Character positions are 1-based; the start and length arguments round
/// per XPath and NaN excludes everything.
fn substring_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let start = xpath_round(args[1].to_number());
    if start.is_nan() {
        return Ok(Value::string(""));
    }
    let end = if let Some(length) = args.get(2) {
        let length = xpath_round(length.to_number());
        if length.is_nan() {
            return Ok(Value::string(""));
        }
        start + length
    } else {
        f64::INFINITY
    };

    let mut out = String::new();
    for (index, ch) in text.chars().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let position = (index + 1) as f64;
        if position >= start && position < end {
            out.push(ch);
        }
    }
    Ok(Value::string(out))
}

fn substring_before_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    let result = haystack.find(&needle).map_or("", |index| &haystack[..index]);
    Ok(Value::string(result))
}

fn substring_after_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let haystack = args[0].to_string_value();
    let needle = args[1].to_string_value();
    let result = haystack
        .find(&needle)
        .map_or("", |index| &haystack[index + needle.len()..]);
    Ok(Value::string(result))
}

#[allow(clippy::cast_precision_loss)]
fn string_length_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    Ok(Value::number(value.to_string_value().chars().count() as f64))
}

fn normalize_space_fn(eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let value = arg_or_context(eval, args, 0);
    let text = value.to_string_value();
    let normalised: Vec<&str> = text.split_whitespace().collect();
    Ok(Value::string(normalised.join(" ")))
}

fn translate_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let from: Vec<char> = args[1].to_string_value().chars().collect();
    let to: Vec<char> = args[2].to_string_value().chars().collect();
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match from.iter().position(|&f| f == ch) {
            Some(index) => {
                if let Some(&replacement) = to.get(index) {
                    out.push(replacement);
                }
                // Characters with no replacement are removed.
            }
            None => out.push(ch),
        }
    }
    Ok(Value::string(out))
}

fn upper_case_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::string(args[0].to_string_value().to_uppercase()))
}

fn lower_case_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::string(args[0].to_string_value().to_lowercase()))
}

fn encode_for_uri_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let mut out = String::with_capacity(text.len());
    for byte in text.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    Ok(Value::string(out))
}

fn escape_html_uri_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let mut out = String::with_capacity(text.len());
    for byte in text.as_bytes() {
        if (32..=126).contains(byte) {
            out.push(*byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    Ok(Value::string(out))
}

fn matches_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = args.get(2).map(Value::to_string_value).unwrap_or_default();
    let matched = crate::regex::engine().matches(&pattern, &flags, &text)?;
    Ok(Value::boolean(matched))
}

fn replace_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let replacement = args[2].to_string_value();
    let flags = args.get(3).map(Value::to_string_value).unwrap_or_default();
    let result = crate::regex::engine().replace(&pattern, &flags, &text, &replacement)?;
    Ok(Value::string(result))
}

/// `tokenize` yields synthetic string items: the result is a node set whose
/// entries carry no tag, only a string value.
fn tokenize_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let text = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = args.get(2).map(Value::to_string_value).unwrap_or_default();
    let tokens = crate::regex::engine().tokenize(&pattern, &flags, &text)?;
    let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
    for token in tokens {
        set.push_synthetic(token);
    }
    Ok(Value::node_set(set))
}

fn string_join_fn(_eval: &mut Evaluator, args: &[Value]) -> Result<Value, Error> {
    let separator = args.get(1).map(Value::to_string_value).unwrap_or_default();
    let joined = match &args[0].data {
        ValueData::NodeSet(set) => {
            let parts: Vec<String> = (0..set.len()).map(|i| set.item_string(i)).collect();
            parts.join(&separator)
        }
        _ => args[0].to_string_value(),
    };
    Ok(Value::string(joined))
}
