//! The AST walker.
//!
//! One `Evaluator` instance serves one evaluation at a time: it owns the
//! context stack, the scratch arena, variable storage and the constructed
//! node counter. `find_tag` materialises the matched node set and then
//! dispatches callbacks in document order; `evaluate` returns the computed
//! value directly.

mod constructors;
mod expression;
mod flwor;
mod navigation;

pub(crate) use expression::numbers_equal;

use crate::arena::Arena;
use crate::ast::AstNode;
use crate::context::XPathContext;
use crate::error::{Control, Error, FindOutcome};
use crate::modules::{ModuleCache, load_module};
use crate::prolog::{XQueryProlog, expanded_key, function_key};
use crate::value::{NodeSet, Value, ValueData};
use crate::CompiledQuery;
use kahu_xml::{Document, Tag};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub(crate) struct Evaluator {
    pub(crate) context: XPathContext,
    context_stack: Vec<XPathContext>,
    /// Primary document first, then any loaded while evaluating. Used to
    /// resolve which tree a borrowed node belongs to.
    documents: Vec<Rc<Document>>,
    pub(crate) arena: Arena,
    pub(crate) prolog: Rc<XQueryProlog>,
    module_cache: Rc<RefCell<ModuleCache>>,
    /// Namespace hash applied to unqualified name tests during `find_tag`
    /// when no other declaration is in scope.
    pub(crate) current_prefix: u32,
    use_current_prefix: bool,
    expression_unsupported: bool,
    variable_storage: HashMap<String, Value>,
    prolog_variable_cache: HashMap<String, Value>,
    variables_in_evaluation: HashSet<String>,
    next_constructed_id: i32,
    pub(crate) constructor_depth: u32,
}

/// Bound on recursive constructor evaluation.
pub(crate) const MAX_CONSTRUCTOR_DEPTH: u32 = 256;

impl Evaluator {
    pub fn new(query: &CompiledQuery, document: Rc<Document>, current_prefix: u32) -> Self {
        Self {
            context: XPathContext::new(Rc::clone(&document)),
            context_stack: Vec::new(),
            documents: vec![document],
            arena: Arena::new(),
            prolog: Rc::clone(&query.prolog),
            module_cache: Rc::clone(&query.module_cache),
            current_prefix,
            use_current_prefix: false,
            expression_unsupported: false,
            variable_storage: HashMap::new(),
            prolog_variable_cache: HashMap::new(),
            variables_in_evaluation: HashSet::new(),
            next_constructed_id: -1,
            constructor_depth: 0,
        }
    }

    pub fn document(&self) -> Rc<Document> {
        Rc::clone(&self.context.document)
    }

    // ===== entry points =====

    pub fn evaluate_query(&mut self, ast: &AstNode) -> Result<Value, Error> {
        self.arena.reset();
        self.context.document.clear_error_msg();
        let result = self.evaluate_node(ast);
        if let Err(error) = &result {
            self.record_error(&error.message, false);
        }
        result
    }

    pub fn find_tag(
        &mut self,
        ast: &AstNode,
        callback: &mut dyn FnMut(&Document, i32, Option<&str>) -> Result<Control, Error>,
    ) -> Result<FindOutcome, Error> {
        self.use_current_prefix = true;
        let value = self.evaluate_query(ast)?;
        self.use_current_prefix = false;

        let ValueData::NodeSet(set) = &value.data else {
            // A non-node result has nothing to call back on.
            return Ok(FindOutcome::NoMatch);
        };
        if set.is_empty() {
            return Ok(FindOutcome::NoMatch);
        }

        let mut matched = false;
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for index in 0..set.len() {
            let Some(node) = &set.nodes[index] else {
                continue;
            };
            if !seen.insert(set.identity(index)) {
                continue;
            }
            let attribute_name = set.attributes[index]
                .and_then(|slot| node.attribs.get(slot))
                .map(|attribute| attribute.name.clone());
            let document = self.owning_document(node).unwrap_or_else(|| self.document());
            matched = true;
            match callback(&document, node.id, attribute_name.as_deref())? {
                Control::Continue => {}
                Control::Terminate => return Ok(FindOutcome::Terminated),
            }
        }
        if matched { Ok(FindOutcome::Matched) } else { Ok(FindOutcome::NoMatch) }
    }

    // ===== context stack =====

    pub(crate) fn with_context<R>(
        &mut self,
        context: XPathContext,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.context_stack.push(std::mem::replace(&mut self.context, context));
        let result = f(self);
        self.context = self.context_stack.pop().expect("balanced context stack");
        result
    }

    pub(crate) fn with_binding<R>(
        &mut self,
        key: String,
        value: Value,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.variable_storage.insert(key.clone(), value);
        let result = f(self);
        match previous {
            Some(old) => {
                self.variable_storage.insert(key, old);
            }
            None => {
                self.variable_storage.remove(&key);
            }
        }
        result
    }

    // ===== error recording =====

    /// Record a runtime failure. The first message wins unless forced.
    pub(crate) fn record_error(&mut self, message: &str, force: bool) {
        tracing::debug!(target: "kahu_xpath::evaluator", message, force, "evaluation error");
        if force || !self.expression_unsupported {
            self.context.document.set_error_msg(message);
        }
        self.expression_unsupported = true;
    }

    pub(crate) fn unsupported(&mut self, message: impl Into<String>) -> Error {
        let message = message.into();
        self.record_error(&message, false);
        Error::unsupported(message)
    }

    // ===== document resolution =====

    pub(crate) fn register_document(&mut self, document: &Rc<Document>) {
        if !self.documents.iter().any(|doc| Rc::ptr_eq(doc, document)) {
            self.documents.push(Rc::clone(document));
        }
    }

    /// Resolve the document a borrowed node belongs to. Constructed nodes
    /// (negative IDs) belong to no document.
    pub(crate) fn owning_document(&self, node: &Rc<Tag>) -> Option<Rc<Document>> {
        if node.id < 0 {
            return None;
        }
        for document in &self.documents {
            if let Some(found) = document.find_tag(node.id) {
                if Rc::ptr_eq(&found, node) {
                    return Some(Rc::clone(document));
                }
            }
        }
        None
    }

    /// Total order used for document-order sorting: (document index,
    /// preorder position). Constructed nodes order by creation after all
    /// document nodes; their IDs count down from -1.
    pub(crate) fn order_key(&self, node: &Rc<Tag>, attribute: Option<usize>) -> (usize, usize, usize) {
        if node.id < 0 {
            let creation = node.id.unsigned_abs() as usize;
            return (usize::MAX, creation, attribute.map_or(0, |a| a + 1));
        }
        for (doc_index, document) in self.documents.iter().enumerate() {
            if let Some(found) = document.find_tag(node.id) {
                if Rc::ptr_eq(&found, node) {
                    let order = document.order_of(node.id).unwrap_or(usize::MAX);
                    return (doc_index, order, attribute.map_or(0, |a| a + 1));
                }
            }
        }
        (usize::MAX - 1, 0, attribute.map_or(0, |a| a + 1))
    }

    /// Normalise a node set: dedup by identity and sort to document order
    /// unless the set preserves its own order. Synthetic items keep their
    /// relative position at the end of the sequence.
    pub(crate) fn sort_node_set(&self, set: &mut NodeSet) {
        if set.preserve_node_order {
            return;
        }
        let len = set.len();
        let mut order: Vec<usize> = (0..len).collect();
        let keys: Vec<(usize, usize, usize, usize)> = (0..len)
            .map(|index| match &set.nodes[index] {
                Some(node) => {
                    let (doc, pos, attr) = self.order_key(node, set.attributes[index]);
                    (doc, pos, attr, index)
                }
                None => (usize::MAX, usize::MAX, index, index),
            })
            .collect();
        order.sort_by_key(|&index| keys[index]);

        let mut nodes = Vec::with_capacity(len);
        let mut attributes = Vec::with_capacity(len);
        let mut strings = Vec::with_capacity(len);
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for index in order {
            if set.nodes[index].is_some() && !seen.insert(set.identity(index)) {
                continue;
            }
            nodes.push(set.nodes[index].clone());
            attributes.push(set.attributes[index]);
            strings.push(set.string_values.get(index).cloned().unwrap_or(None));
        }
        set.nodes = nodes;
        set.attributes = attributes;
        set.string_values = strings;
    }

    pub(crate) fn allocate_constructed_id(&mut self) -> i32 {
        let id = self.next_constructed_id;
        self.next_constructed_id -= 1;
        id
    }

    // ===== variable resolution =====

    /// Resolution order: context-frame locals, host variables on the
    /// document, the prolog variable cache, then prolog declarations (with
    /// cycle detection). External variables are unsupported.
    pub(crate) fn resolve_variable(&mut self, qname: &str) -> Result<Value, Error> {
        let (ns_uri, local) = self.prolog.expand_variable_name(qname);
        let key = expanded_key(ns_uri.as_deref(), &local);

        if let Some(value) = self.variable_storage.get(&key) {
            return Ok(value.clone());
        }
        if let Some(text) = self.context.document.variable(&local) {
            return Ok(Value::string(text));
        }
        if let Some(value) = self.prolog_variable_cache.get(&key) {
            return Ok(value.clone());
        }

        let prolog = Rc::clone(&self.prolog);
        if let Some(declaration) = prolog.variables.get(&key) {
            if declaration.external {
                return Err(self.unsupported(format!("external variable ${qname} is not supported")));
            }
            let Some(initializer) = declaration.initializer.clone() else {
                return Err(self.unsupported(format!("variable ${qname} has no value")));
            };
            if !self.variables_in_evaluation.insert(key.clone()) {
                return Err(self.unsupported(format!("circular variable definition for ${qname}")));
            }
            let result = self.evaluate_node(&initializer);
            self.variables_in_evaluation.remove(&key);
            let value = result?;
            self.prolog_variable_cache.insert(key, value.clone());
            return Ok(value);
        }

        // Variables exported by imported library modules.
        if let Some(ns_uri) = ns_uri.as_deref() {
            if prolog.is_imported_namespace(ns_uri) {
                let module = self.load_imported_module(ns_uri)?;
                if let Some(declaration) = module.prolog.variables.get(&key) {
                    let Some(initializer) = declaration.initializer.clone() else {
                        return Err(self.unsupported(format!("variable ${qname} has no value")));
                    };
                    if !self.variables_in_evaluation.insert(key.clone()) {
                        return Err(
                            self.unsupported(format!("circular variable definition for ${qname}"))
                        );
                    }
                    let module_prolog = Rc::clone(&module.prolog);
                    let result = self.with_prolog(module_prolog, |eval| {
                        eval.evaluate_node(&initializer)
                    });
                    self.variables_in_evaluation.remove(&key);
                    let value = result?;
                    self.prolog_variable_cache.insert(key, value.clone());
                    return Ok(value);
                }
            }
        }

        Err(self.unsupported(format!("unknown variable ${qname}")))
    }

    fn with_prolog<R>(
        &mut self,
        prolog: Rc<XQueryProlog>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let saved = std::mem::replace(&mut self.prolog, prolog);
        let result = f(self);
        self.prolog = saved;
        result
    }

    fn load_imported_module(&mut self, ns_uri: &str) -> Result<Rc<CompiledQuery>, Error> {
        let import = self
            .prolog
            .module_imports
            .iter()
            .find(|import| import.target_namespace == ns_uri)
            .cloned();
        let Some(import) = import else {
            return Err(self.unsupported(format!("namespace '{ns_uri}' is not an imported module")));
        };
        let resolver = self.context.document.resolver();
        match load_module(
            &self.module_cache,
            &import.target_namespace,
            &import.location_hints,
            resolver.as_ref(),
        ) {
            Ok(module) => Ok(module),
            Err(error) => {
                self.record_error(&error.message, false);
                Err(error)
            }
        }
    }

    // ===== function calls =====

    pub(crate) fn evaluate_function_call(&mut self, node: &AstNode) -> Result<Value, Error> {
        let qname = node.value.clone();
        let mut args = Vec::with_capacity(node.children.len());
        for child in &node.children {
            args.push(self.evaluate_node(child)?);
        }
        self.call_function_by_name(&qname, args)
    }

    pub(crate) fn call_function_by_name(
        &mut self,
        qname: &str,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let (ns_uri, local) = self.prolog.expand_function_name(qname);

        // Built-in library (the default function namespace or no namespace).
        let is_builtin_ns = match ns_uri.as_deref() {
            None => true,
            Some(uri) => uri == crate::prolog::FN_NAMESPACE_URI,
        };
        if is_builtin_ns {
            match crate::functions::dispatch(self, &local, &args) {
                crate::functions::Dispatch::Done(result) => return result,
                crate::functions::Dispatch::WrongArity => {
                    return Err(self.unsupported(format!("Unsupported XPath function: {local}")));
                }
                crate::functions::Dispatch::Unknown => {}
            }
        }

        // Schema constructor functions, e.g. xs:date("2024-01-01").
        if let Some(uri) = ns_uri.as_deref() {
            if uri == crate::prolog::XS_NAMESPACE_URI && args.len() == 1 {
                let registry = crate::schema::registry();
                if let Some(descriptor) = registry.find_by_expanded(uri, &local) {
                    return Ok(registry.coerce(&args[0], descriptor));
                }
            }
        }

        // Prolog-declared functions.
        if let Some(function) = self.prolog.find_function(ns_uri.as_deref(), &local, args.len()) {
            return self.invoke_user_function(&function, args, None);
        }

        // Functions exported by imported library modules.
        if let Some(uri) = ns_uri.as_deref() {
            if self.prolog.is_imported_namespace(uri) {
                let module = self.load_imported_module(uri)?;
                let key = function_key(Some(uri), &local, args.len());
                if let Some(function) = module.prolog.functions.get(&key).cloned() {
                    let module_prolog = Rc::clone(&module.prolog);
                    return self.invoke_user_function(&function, args, Some(module_prolog));
                }
                return Err(self.unsupported(format!("Unsupported XPath function: {qname}")));
            }
        }

        Err(self.unsupported(format!("Unsupported XPath function: {qname}")))
    }

    fn invoke_user_function(
        &mut self,
        function: &Rc<crate::prolog::XQueryFunction>,
        args: Vec<Value>,
        module_prolog: Option<Rc<XQueryProlog>>,
    ) -> Result<Value, Error> {
        fn bind_and_run(
            eval: &mut Evaluator,
            params: &[String],
            mut args: std::vec::IntoIter<Value>,
            body: &AstNode,
        ) -> Result<Value, Error> {
            match params.first() {
                None => eval.evaluate_node(body),
                Some(param) => {
                    let value = args.next().expect("arity checked at lookup");
                    eval.with_binding(param.clone(), value, |eval| {
                        bind_and_run(eval, &params[1..], args, body)
                    })
                }
            }
        }

        let body = Rc::clone(&function.body);
        let params = function.params.clone();
        match module_prolog {
            Some(prolog) => self.with_prolog(prolog, |eval| {
                bind_and_run(eval, &params, args.into_iter(), &body)
            }),
            None => bind_and_run(self, &params, args.into_iter(), &body),
        }
    }

    // ===== shared helpers =====

    /// Wrap a value's items into an existing node set, turning atomic values
    /// into synthetic text items (the comma/return concatenation rule).
    pub(crate) fn append_value_items(target: &mut NodeSet, value: &Value) {
        match &value.data {
            ValueData::NodeSet(set) => {
                for index in 0..set.len() {
                    target.push_item(
                        set.nodes[index].clone(),
                        set.attributes[index],
                        set.string_values.get(index).cloned().unwrap_or(None),
                    );
                }
            }
            _ => {
                if !value.is_empty_sequence() {
                    target.push_synthetic(value.to_string_value());
                }
            }
        }
    }

    /// The context item as a single-item node set, used by `.`-style
    /// expressions and by functions defaulting to the context node.
    pub(crate) fn context_item_value(&mut self) -> Value {
        let mut set = NodeSet::default();
        if let Some(node) = &self.context.context_node {
            match self.context.attribute {
                Some(slot) => set.push_attribute(Rc::clone(node), slot),
                None => set.push_node(Rc::clone(node)),
            }
        } else if let Some(synthetic) = &self.context.synthetic_value {
            set.push_synthetic(synthetic.clone());
        }
        Value::node_set(set)
    }

}
