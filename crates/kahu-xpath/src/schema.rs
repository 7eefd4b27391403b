//! XML-Schema-aware type registry.
//!
//! Descriptors form an acyclic derivation graph stored in an arena with
//! index-based base links. The registry is a process-wide, lazily
//! initialised singleton keyed by kind, lexical QName and expanded name.
//! Registering a duplicate kind is a no-op; the first registration wins.

use crate::prolog::XS_NAMESPACE_URI;
use crate::value::{Value, ValueData};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    AnyType,
    String,
    Boolean,
    Decimal,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    QName,
    // XPath pseudo-types
    XpathNodeSet,
    XpathBoolean,
    XpathNumber,
    XpathString,
    UserDefined,
}

impl SchemaKind {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SchemaKind::Decimal
                | SchemaKind::Float
                | SchemaKind::Double
                | SchemaKind::Integer
                | SchemaKind::Long
                | SchemaKind::Int
                | SchemaKind::Short
                | SchemaKind::Byte
                | SchemaKind::XpathNumber
        )
    }

    #[must_use]
    pub fn is_boolean(self) -> bool {
        matches!(self, SchemaKind::Boolean | SchemaKind::XpathBoolean)
    }

    #[must_use]
    pub fn is_string_like(self) -> bool {
        matches!(self, SchemaKind::String | SchemaKind::XpathString)
    }
}

#[derive(Debug)]
pub struct SchemaTypeDescriptor {
    pub kind: SchemaKind,
    pub prefix: String,
    pub ns_uri: String,
    pub local: String,
    /// Arena index of the base descriptor; `None` only for `xs:anyType`.
    pub base: Option<usize>,
    pub built_in: bool,
    pub constructor_arity: usize,
    pub namespace_sensitive: bool,
}

impl SchemaTypeDescriptor {
    #[must_use]
    pub fn qname(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

#[derive(Default)]
pub struct SchemaRegistry {
    descriptors: Vec<SchemaTypeDescriptor>,
    by_kind: HashMap<SchemaKind, usize>,
    by_qname: HashMap<String, usize>,
    by_expanded: HashMap<(String, String), usize>,
}

impl SchemaRegistry {
    fn register(&mut self, descriptor: SchemaTypeDescriptor) -> usize {
        // First registration of a kind wins.
        if let Some(existing) = self.by_kind.get(&descriptor.kind) {
            if descriptor.kind != SchemaKind::UserDefined {
                return *existing;
            }
        }
        let index = self.descriptors.len();
        self.by_qname.insert(descriptor.qname(), index);
        self.by_expanded.insert((descriptor.ns_uri.clone(), descriptor.local.clone()), index);
        self.by_kind.entry(descriptor.kind).or_insert(index);
        self.descriptors.push(descriptor);
        index
    }

    fn register_builtin(
        &mut self,
        kind: SchemaKind,
        prefix: &str,
        ns_uri: &str,
        local: &str,
        base: Option<usize>,
    ) -> usize {
        self.register(SchemaTypeDescriptor {
            kind,
            prefix: prefix.to_string(),
            ns_uri: ns_uri.to_string(),
            local: local.to_string(),
            base,
            built_in: true,
            constructor_arity: 1,
            namespace_sensitive: kind == SchemaKind::QName,
        })
    }

    #[must_use]
    pub fn descriptor(&self, index: usize) -> &SchemaTypeDescriptor {
        &self.descriptors[index]
    }

    #[must_use]
    pub fn find_by_kind(&self, kind: SchemaKind) -> Option<&SchemaTypeDescriptor> {
        self.by_kind.get(&kind).map(|idx| &self.descriptors[*idx])
    }

    #[must_use]
    pub fn find_by_qname(&self, qname: &str) -> Option<&SchemaTypeDescriptor> {
        self.by_qname.get(qname).map(|idx| &self.descriptors[*idx])
    }

    #[must_use]
    pub fn find_by_expanded(&self, ns_uri: &str, local: &str) -> Option<&SchemaTypeDescriptor> {
        self.by_expanded
            .get(&(ns_uri.to_string(), local.to_string()))
            .map(|idx| &self.descriptors[*idx])
    }

    /// Walk base links from `descriptor` looking for `target`.
    #[must_use]
    pub fn is_derived_from(&self, descriptor: &SchemaTypeDescriptor, target: SchemaKind) -> bool {
        if descriptor.kind == target {
            return true;
        }
        let mut current = descriptor.base;
        while let Some(index) = current {
            let base = &self.descriptors[index];
            if base.kind == target {
                return true;
            }
            current = base.base;
        }
        false
    }

    #[must_use]
    pub fn can_coerce_to(&self, from: SchemaKind, target: SchemaKind) -> bool {
        if from == target || target == SchemaKind::AnyType {
            return true;
        }
        if from.is_numeric() && target.is_numeric() {
            return true;
        }
        if target.is_string_like() {
            return true;
        }
        let Some(descriptor) = self.find_by_kind(from) else {
            return false;
        };
        match descriptor.base {
            Some(index) => self.can_coerce_to(self.descriptors[index].kind, target),
            None => false,
        }
    }

    /// Convert `value` to the target descriptor's kind, attaching the
    /// descriptor to the result. Unconvertible targets pass the value
    /// through unchanged.
    #[must_use]
    pub fn coerce(&'static self, value: &Value, target: &'static SchemaTypeDescriptor) -> Value {
        let mut coerced = match target.kind {
            kind if kind.is_boolean() => {
                // The schema lexical forms win for string input; other values
                // use their effective boolean value.
                let mut tagged = value.clone();
                tagged.schema_type = Some(target);
                Value::boolean(tagged.to_boolean())
            }
            kind if kind.is_numeric() => Value::number(value.to_number()),
            kind if kind.is_string_like() => Value::string(value.to_string_value()),
            SchemaKind::Date => match parse_date(&value.to_string_value()) {
                Some(date) => Value::from_data(ValueData::Date(date)),
                None => value.clone(),
            },
            SchemaKind::Time => match parse_time(&value.to_string_value()) {
                Some(time) => Value::from_data(ValueData::Time(time)),
                None => value.clone(),
            },
            SchemaKind::DateTime => match parse_date_time(&value.to_string_value()) {
                Some(stamp) => Value::from_data(ValueData::DateTime(stamp)),
                None => value.clone(),
            },
            _ => value.clone(),
        };
        coerced.schema_type = Some(target);
        coerced
    }
}

/// `YYYY-MM-DD`, with an optional timezone suffix that is accepted and
/// discarded.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let stripped = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    let date_part = if stripped.len() > 10 { &stripped[..10] } else { stripped };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// `hh:mm:ss` with optional fractional seconds and timezone suffix.
#[must_use]
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    let stripped = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    NaiveTime::parse_from_str(stripped, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(stripped, "%H:%M:%S"))
        .ok()
}

/// `YYYY-MM-DDThh:mm:ss` with optional fractional seconds; timezone offsets
/// are folded to the equivalent UTC instant.
#[must_use]
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(stamp) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(stamp.naive_utc());
    }
    let stripped = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();

/// The process-wide registry, built on first use.
pub fn registry() -> &'static SchemaRegistry {
    REGISTRY.get_or_init(|| {
        let mut reg = SchemaRegistry::default();
        let xs = XS_NAMESPACE_URI;
        let any = reg.register_builtin(SchemaKind::AnyType, "xs", xs, "anyType", None);
        reg.register_builtin(SchemaKind::String, "xs", xs, "string", Some(any));
        reg.register_builtin(SchemaKind::Boolean, "xs", xs, "boolean", Some(any));
        let decimal = reg.register_builtin(SchemaKind::Decimal, "xs", xs, "decimal", Some(any));
        reg.register_builtin(SchemaKind::Float, "xs", xs, "float", Some(any));
        reg.register_builtin(SchemaKind::Double, "xs", xs, "double", Some(any));
        reg.register_builtin(SchemaKind::Duration, "xs", xs, "duration", Some(any));
        reg.register_builtin(SchemaKind::DateTime, "xs", xs, "dateTime", Some(any));
        reg.register_builtin(SchemaKind::Time, "xs", xs, "time", Some(any));
        reg.register_builtin(SchemaKind::Date, "xs", xs, "date", Some(any));
        let integer = reg.register_builtin(SchemaKind::Integer, "xs", xs, "integer", Some(decimal));
        let long = reg.register_builtin(SchemaKind::Long, "xs", xs, "long", Some(integer));
        let int = reg.register_builtin(SchemaKind::Int, "xs", xs, "int", Some(long));
        let short = reg.register_builtin(SchemaKind::Short, "xs", xs, "short", Some(int));
        reg.register_builtin(SchemaKind::Byte, "xs", xs, "byte", Some(short));
        reg.register_builtin(SchemaKind::QName, "xs", xs, "QName", Some(any));
        // XPath pseudo-types live outside the schema namespace.
        reg.register_builtin(SchemaKind::XpathNodeSet, "", "", "node-set", Some(any));
        reg.register_builtin(SchemaKind::XpathBoolean, "", "", "boolean", Some(any));
        reg.register_builtin(SchemaKind::XpathNumber, "", "", "number", Some(any));
        reg.register_builtin(SchemaKind::XpathString, "", "", "string", Some(any));
        reg
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_chain_derives_from_decimal() {
        let reg = registry();
        let byte = reg.find_by_kind(SchemaKind::Byte).expect("byte registered");
        assert!(reg.is_derived_from(byte, SchemaKind::Short));
        assert!(reg.is_derived_from(byte, SchemaKind::Decimal));
        assert!(reg.is_derived_from(byte, SchemaKind::AnyType));
        assert!(!reg.is_derived_from(byte, SchemaKind::String));
    }

    #[test]
    fn coercion_rules() {
        let reg = registry();
        assert!(reg.can_coerce_to(SchemaKind::Int, SchemaKind::Double));
        assert!(reg.can_coerce_to(SchemaKind::Date, SchemaKind::String));
        assert!(reg.can_coerce_to(SchemaKind::Boolean, SchemaKind::AnyType));
        assert!(!reg.can_coerce_to(SchemaKind::String, SchemaKind::Duration));
    }

    #[test]
    fn lookup_by_qname_and_expanded_name() {
        let reg = registry();
        let by_qname = reg.find_by_qname("xs:date").expect("xs:date");
        assert_eq!(by_qname.kind, SchemaKind::Date);
        let by_expanded = reg.find_by_expanded(XS_NAMESPACE_URI, "date").expect("expanded");
        assert_eq!(by_expanded.kind, SchemaKind::Date);
    }

    #[test]
    fn date_parsing_accepts_timezone_suffix() {
        assert!(parse_date("2024-02-29").is_some());
        assert!(parse_date("2024-02-29Z").is_some());
        assert!(parse_date("not-a-date").is_none());
        assert!(parse_date_time("2024-02-29T12:30:00Z").is_some());
        assert!(parse_time("23:59:59").is_some());
    }
}
