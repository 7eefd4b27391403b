//! The XPath/XQuery value model: tagged sequence values and conversions.

use crate::schema::{SchemaKind, SchemaTypeDescriptor};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use kahu_xml::Tag;
use std::rc::Rc;

/// A node-set entry refers to a tag, optionally narrowing to one of its
/// attributes by index. Nodes may be absent for synthetic items (for example
/// the strings produced by `tokenize`), in which case the parallel
/// `string_values` slot carries the item's value.
#[derive(Clone, Default)]
pub struct NodeSet {
    pub nodes: Vec<Option<Rc<Tag>>>,
    /// Attribute index into the owning tag's attribute list, per item.
    pub attributes: Vec<Option<usize>>,
    /// Pre-computed string value per item, when known.
    pub string_values: Vec<Option<String>>,
    /// Authoritative string value for the whole sequence when set.
    pub string_override: Option<String>,
    /// Suppresses the document-order sort on emission.
    pub preserve_node_order: bool,
}

impl NodeSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push_node(&mut self, node: Rc<Tag>) {
        self.nodes.push(Some(node));
        self.attributes.push(None);
        self.string_values.push(None);
    }

    pub fn push_attribute(&mut self, owner: Rc<Tag>, attribute: usize) {
        self.nodes.push(Some(owner));
        self.attributes.push(Some(attribute));
        self.string_values.push(None);
    }

    pub fn push_synthetic(&mut self, value: String) {
        self.nodes.push(None);
        self.attributes.push(None);
        self.string_values.push(Some(value));
    }

    pub fn push_item(
        &mut self,
        node: Option<Rc<Tag>>,
        attribute: Option<usize>,
        string_value: Option<String>,
    ) {
        self.nodes.push(node);
        self.attributes.push(attribute);
        self.string_values.push(string_value);
    }

    /// Identity of an item for deduplication: (tag address, attribute slot).
    #[must_use]
    pub fn identity(&self, index: usize) -> (usize, usize) {
        let tag = self.nodes[index].as_ref().map_or(0, |n| Rc::as_ptr(n) as usize);
        let attribute = self.attributes.get(index).copied().flatten().map_or(0, |a| a + 1);
        (tag, attribute)
    }

    /// String value of one item.
    #[must_use]
    pub fn item_string(&self, index: usize) -> String {
        if let Some(Some(attr_index)) = self.attributes.get(index) {
            if let Some(Some(node)) = self.nodes.get(index) {
                if let Some(attribute) = node.attribs.get(*attr_index) {
                    return attribute.value.clone();
                }
            }
        }
        if let Some(Some(precomputed)) = self.string_values.get(index) {
            return precomputed.clone();
        }
        if let Some(Some(node)) = self.nodes.get(index) {
            return node.string_value();
        }
        String::new()
    }
}

#[derive(Clone)]
pub enum ValueData {
    NodeSet(NodeSet),
    Boolean(bool),
    Number(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

#[derive(Clone)]
pub struct Value {
    pub data: ValueData,
    pub schema_type: Option<&'static SchemaTypeDescriptor>,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ValueData::NodeSet(set) => write!(f, "NodeSet(len={})", set.len()),
            ValueData::Boolean(b) => write!(f, "Boolean({b})"),
            ValueData::Number(n) => write!(f, "Number({n})"),
            ValueData::String(s) => write!(f, "String({s:?})"),
            ValueData::Date(d) => write!(f, "Date({d})"),
            ValueData::Time(t) => write!(f, "Time({t})"),
            ValueData::DateTime(dt) => write!(f, "DateTime({dt})"),
        }
    }
}

impl Value {
    #[must_use]
    pub fn from_data(data: ValueData) -> Self {
        Self { data, schema_type: None }
    }

    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self::from_data(ValueData::Boolean(value))
    }

    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::from_data(ValueData::Number(value))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::from_data(ValueData::String(value.into()))
    }

    #[must_use]
    pub fn node_set(set: NodeSet) -> Self {
        Self::from_data(ValueData::NodeSet(set))
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::node_set(NodeSet::default())
    }

    #[must_use]
    pub fn is_node_set(&self) -> bool {
        matches!(self.data, ValueData::NodeSet(_))
    }

    #[must_use]
    pub fn as_node_set(&self) -> Option<&NodeSet> {
        match &self.data {
            ValueData::NodeSet(set) => Some(set),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty_sequence(&self) -> bool {
        matches!(&self.data, ValueData::NodeSet(set) if set.is_empty())
    }

    #[must_use]
    pub fn schema_kind(&self) -> Option<SchemaKind> {
        self.schema_type.map(|descriptor| descriptor.kind)
    }

    /// Effective boolean value.
    #[must_use]
    pub fn to_boolean(&self) -> bool {
        if let Some(kind) = self.schema_kind() {
            if kind.is_boolean() {
                if let ValueData::String(text) = &self.data {
                    if let Some(parsed) = parse_schema_boolean(text) {
                        return parsed;
                    }
                }
            }
        }
        match &self.data {
            ValueData::Boolean(value) => *value,
            ValueData::Number(value) => *value != 0.0 && !value.is_nan(),
            ValueData::String(value) => !value.is_empty(),
            ValueData::NodeSet(set) => !set.is_empty(),
            ValueData::Date(_) | ValueData::Time(_) | ValueData::DateTime(_) => true,
        }
    }

    /// Numeric value; any failure yields NaN.
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match &self.data {
            ValueData::Boolean(value) => {
                if *value {
                    1.0
                } else {
                    0.0
                }
            }
            ValueData::Number(value) => *value,
            ValueData::String(value) => string_to_number(value),
            ValueData::NodeSet(set) => {
                if set.is_empty() && set.string_override.is_none() {
                    f64::NAN
                } else {
                    string_to_number(&self.to_string_value())
                }
            }
            ValueData::Date(_) | ValueData::Time(_) | ValueData::DateTime(_) => f64::NAN,
        }
    }

    /// String value of the whole sequence.
    #[must_use]
    pub fn to_string_value(&self) -> String {
        match &self.data {
            ValueData::Boolean(value) => {
                if *value {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            ValueData::Number(value) => format_number(*value),
            ValueData::String(value) => value.clone(),
            ValueData::NodeSet(set) => {
                if let Some(text) = &set.string_override {
                    return text.clone();
                }
                if set.is_empty() {
                    return String::new();
                }
                set.item_string(0)
            }
            ValueData::Date(date) => date.format("%Y-%m-%d").to_string(),
            ValueData::Time(time) => time.format("%H:%M:%S").to_string(),
            ValueData::DateTime(stamp) => stamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

/// Canonical XPath number form: `NaN`, `Infinity`, `-Infinity`, `0` for
/// either zero, otherwise a fifteen-significant-digit decimal with trailing
/// zeros trimmed and no leading `+`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Fifteen significant digits: one leading digit plus fourteen decimals.
    let formatted = format!("{:.14e}", value.abs());
    let (mantissa, exponent) = formatted.split_once('e').expect("exponent form");
    let exponent: i32 = exponent.parse().expect("numeric exponent");
    let mut digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }

    let negative = value < 0.0;
    let mut out = String::new();
    if negative {
        out.push('-');
    }

    if exponent < -4 || exponent >= 15 {
        // Very large or very small magnitudes stay in scientific form.
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        if exponent >= 0 {
            out.push('+');
        } else {
            out.push('-');
        }
        let magnitude = exponent.unsigned_abs();
        if magnitude < 10 {
            out.push('0');
        }
        out.push_str(&magnitude.to_string());
        return out;
    }

    let point = exponent + 1; // digits before the decimal point
    if point <= 0 {
        out.push_str("0.");
        for _ in 0..-point {
            out.push('0');
        }
        out.push_str(&digits);
    } else if (point as usize) >= digits.len() {
        out.push_str(&digits);
        for _ in 0..(point as usize - digits.len()) {
            out.push('0');
        }
    } else {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    }

    // Trailing zeros after a decimal point are trimmed.
    if out.contains('.') {
        while out.ends_with('0') {
            out.pop();
        }
        if out.ends_with('.') {
            out.pop();
        }
    }
    out
}

/// Lenient decimal parse: optional sign, digits with at most one decimal
/// point, surrounding whitespace allowed, whole string required.
#[must_use]
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return f64::NAN;
    }
    let bytes = trimmed.as_bytes();
    let mut idx = 0;
    if matches!(bytes[0], b'+' | b'-') {
        idx = 1;
    }
    let mut digits = 0;
    let mut dots = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'0'..=b'9' => digits += 1,
            b'.' => dots += 1,
            _ => return f64::NAN,
        }
        idx += 1;
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Schema boolean lexical forms: `true`/`1` and `false`/`0`, whitespace
/// trimmed, ASCII case-insensitive.
#[must_use]
pub fn parse_schema_boolean(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if trimmed == "1" {
        return Some(true);
    }
    if trimmed == "0" {
        return Some(false);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Some(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(false);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_format_edge_cases() {
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-42.5), "-42.5");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1234.5), "1234.5");
        assert_eq!(format_number(0.001), "0.001");
    }

    #[test]
    fn number_format_has_no_trailing_zeros() {
        assert_eq!(format_number(2.5000), "2.5");
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(1.25), "1.25");
    }

    #[test]
    fn string_to_number_requires_whole_string() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number("-1.5"), -1.5);
        assert!(string_to_number("1x").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("1.2.3").is_nan());
        assert!(string_to_number("1e5").is_nan());
    }

    #[test]
    fn boolean_conversions() {
        assert!(Value::number(1.0).to_boolean());
        assert!(!Value::number(0.0).to_boolean());
        assert!(!Value::number(f64::NAN).to_boolean());
        assert!(Value::string("x").to_boolean());
        assert!(!Value::string("").to_boolean());
        assert!(!Value::empty().to_boolean());
    }

    #[test]
    fn conversion_laws_round_trip() {
        for value in [Value::boolean(true), Value::number(7.25), Value::string("text")] {
            let through_string = Value::string(
                if value.to_boolean() { "true" } else { "" },
            );
            assert_eq!(through_string.to_boolean(), value.to_boolean());
            let renumbered = Value::string(format_number(value.to_number()));
            let lhs = renumbered.to_number();
            let rhs = value.to_number();
            assert!((lhs.is_nan() && rhs.is_nan()) || lhs == rhs);
        }
    }

    #[test]
    fn schema_boolean_overrides_string_conversion() {
        // The bare string "false" is truthy; a schema-typed one is not.
        assert!(Value::string("false").to_boolean());
        let reg = crate::schema::registry();
        let boolean = reg.find_by_kind(crate::schema::SchemaKind::Boolean).unwrap();
        let mut typed = Value::string("false");
        typed.schema_type = Some(boolean);
        assert!(!typed.to_boolean());
        let mut spaced = Value::string("  TRUE  ");
        spaced.schema_type = Some(boolean);
        assert!(spaced.to_boolean());
    }

    #[test]
    fn node_set_string_override_wins() {
        let mut set = NodeSet::default();
        set.push_synthetic("alpha".to_string());
        set.string_override = Some("omega".to_string());
        let value = Value::node_set(set);
        assert_eq!(value.to_string_value(), "omega");
    }
}
