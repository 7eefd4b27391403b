//! XQuery prolog: per-query compile-time state.

use crate::ast::AstNode;
use kahu_xml::str_hash;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XS_NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const FN_NAMESPACE_URI: &str = "http://www.w3.org/2005/xpath-functions";
pub const LOCAL_NAMESPACE_URI: &str = "http://www.w3.org/2005/xquery-local-functions";
pub const CODEPOINT_COLLATION_URI: &str =
    "http://www.w3.org/2005/xpath-functions/collation/codepoint";

/// Key for function and variable maps: `{uri}local`, with arity appended as
/// `/{arity}` for functions.
#[must_use]
pub fn expanded_key(ns_uri: Option<&str>, local: &str) -> String {
    match ns_uri {
        Some(uri) if !uri.is_empty() => format!("{{{uri}}}{local}"),
        _ => local.to_string(),
    }
}

#[must_use]
pub fn function_key(ns_uri: Option<&str>, local: &str, arity: usize) -> String {
    format!("{}/{arity}", expanded_key(ns_uri, local))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructionMode {
    #[default]
    Preserve,
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundarySpace {
    Preserve,
    #[default]
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    #[default]
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOrder {
    #[default]
    Greatest,
    Least,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyNamespaces {
    pub preserve: bool,
    pub inherit: bool,
}

impl Default for CopyNamespaces {
    fn default() -> Self {
        Self { preserve: true, inherit: true }
    }
}

/// Picture-string symbol set declared by `declare decimal-format`.
#[derive(Debug, Clone)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

/// A `declare function` body.
#[derive(Debug, Clone)]
pub struct XQueryFunction {
    pub ns_uri: Option<String>,
    pub local: String,
    /// Parameter names as expanded keys, in declaration order.
    pub params: Vec<String>,
    pub body: Rc<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ModuleImport {
    pub prefix: Option<String>,
    pub target_namespace: String,
    pub location_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub ns_uri: Option<String>,
    pub local: String,
    pub initializer: Option<Rc<AstNode>>,
    pub external: bool,
}

#[derive(Debug, Default)]
pub struct XQueryProlog {
    pub static_base_uri: Option<String>,
    pub default_collation: Option<String>,
    /// URI applied to unprefixed element name tests.
    pub default_element_namespace: Option<String>,
    pub default_function_namespace: Option<String>,
    /// prefix -> URI hash, mirroring the document registry representation.
    pub declared_namespaces: HashMap<String, u32>,
    /// prefix -> URI string.
    pub namespace_uris: HashMap<String, String>,
    /// Keyed by the optional format QName; `None` is the unnamed default.
    pub decimal_formats: HashMap<Option<String>, DecimalFormat>,
    pub construction_mode: ConstructionMode,
    pub boundary_space: BoundarySpace,
    pub ordering_mode: OrderingMode,
    pub empty_order: EmptyOrder,
    pub copy_namespaces: CopyNamespaces,
    pub is_library_module: bool,
    pub module_namespace_uri: Option<String>,
    pub module_prefix: Option<String>,
    /// Keyed by `{expanded-qname}/{arity}`.
    pub functions: HashMap<String, Rc<XQueryFunction>>,
    /// Keyed by expanded QName.
    pub variables: HashMap<String, VariableDecl>,
    pub module_imports: Vec<ModuleImport>,
    /// Weak handle to the cache shared by every query compiled for the same
    /// host document.
    pub module_cache: RefCell<Option<Weak<RefCell<crate::modules::ModuleCache>>>>,
}

impl XQueryProlog {
    #[must_use]
    pub fn new() -> Self {
        let mut prolog = Self {
            default_function_namespace: Some(FN_NAMESPACE_URI.to_string()),
            default_collation: Some(CODEPOINT_COLLATION_URI.to_string()),
            ..Self::default()
        };
        for (prefix, uri) in [
            ("xml", XML_NAMESPACE_URI),
            ("xs", XS_NAMESPACE_URI),
            ("xsi", XSI_NAMESPACE_URI),
            ("fn", FN_NAMESPACE_URI),
            ("local", LOCAL_NAMESPACE_URI),
        ] {
            prolog.declare_namespace(prefix, uri);
        }
        prolog
    }

    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.declared_namespaces.insert(prefix.to_string(), str_hash(uri));
        self.namespace_uris.insert(prefix.to_string(), uri.to_string());
    }

    /// Compile-time prefix resolution against the declared namespaces.
    #[must_use]
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespace_uris.get(prefix).map(String::as_str)
    }

    /// Expand a lexical function name. Unprefixed names fall into the default
    /// function namespace.
    #[must_use]
    pub fn expand_function_name(&self, qname: &str) -> (Option<String>, String) {
        match qname.split_once(':') {
            Some((prefix, local)) => {
                (self.resolve_prefix(prefix).map(String::from), local.to_string())
            }
            None => (self.default_function_namespace.clone(), qname.to_string()),
        }
    }

    /// Expand a lexical variable name. Unprefixed names have no namespace.
    #[must_use]
    pub fn expand_variable_name(&self, qname: &str) -> (Option<String>, String) {
        match qname.split_once(':') {
            Some((prefix, local)) => {
                (self.resolve_prefix(prefix).map(String::from), local.to_string())
            }
            None => (None, qname.to_string()),
        }
    }

    #[must_use]
    pub fn find_function(&self, ns_uri: Option<&str>, local: &str, arity: usize) -> Option<Rc<XQueryFunction>> {
        self.functions.get(&function_key(ns_uri, local, arity)).cloned()
    }

    /// True when the namespace belongs to one of this query's module imports.
    #[must_use]
    pub fn is_imported_namespace(&self, ns_uri: &str) -> bool {
        self.module_imports.iter().any(|import| import.target_namespace == ns_uri)
    }

    /// Validate that every exported function and variable lies in the module's
    /// target namespace. Returns the offending QName on failure.
    #[must_use]
    pub fn validate_exports(&self) -> Option<String> {
        let Some(target) = self.module_namespace_uri.as_deref() else {
            return None;
        };
        for function in self.functions.values() {
            if function.ns_uri.as_deref() != Some(target) {
                return Some(function.local.clone());
            }
        }
        for variable in self.variables.values() {
            if variable.ns_uri.as_deref() != Some(target) {
                return Some(variable.local.clone());
            }
        }
        None
    }

    /// Collation lookup used at compile time for `order by ... collation`.
    #[must_use]
    pub fn is_known_collation(uri: &str) -> bool {
        uri == CODEPOINT_COLLATION_URI
    }

    /// Duplicate-import detection (XQST0047).
    #[must_use]
    pub fn has_module_import(&self, target_namespace: &str) -> bool {
        self.module_imports.iter().any(|import| import.target_namespace == target_namespace)
    }
}
