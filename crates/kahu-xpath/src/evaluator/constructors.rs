//! Node construction: direct and computed element/attribute/text/comment/PI
//! and document constructors.
//!
//! Constructed tags receive fresh negative IDs so they can never collide
//! with host-document IDs. The returned `Value` owns the nodes; they stay
//! valid for as long as the value (or any clone of it) is alive.

use super::{Evaluator, MAX_CONSTRUCTOR_DEPTH};
use crate::ast::{AstKind, AstNode, AvtPart, ConstructorAttribute};
use crate::error::Error;
use crate::prolog::BoundarySpace;
use crate::value::{NodeSet, Value, ValueData};
use kahu_xml::{Attribute, Tag, TagFlags};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Default)]
struct NsScope {
    bindings: HashMap<String, u32>,
    default_ns: Option<u32>,
}

fn is_ncname(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_qname(text: &str) -> bool {
    match text.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(text),
    }
}

fn text_node(id: i32, parent_id: i32, text: &str) -> Rc<Tag> {
    Rc::new(Tag {
        id,
        parent_id,
        namespace_hash: 0,
        flags: TagFlags::CONTENT,
        attribs: vec![Attribute::new("", text)],
        children: Vec::new(),
    })
}

impl Evaluator {
    pub(crate) fn evaluate_constructor(&mut self, node: &AstNode) -> Result<Value, Error> {
        match node.kind {
            AstKind::DirectElementConstructor => {
                let scope = NsScope::default();
                let element = self.build_direct_element(node, &scope, 0)?;
                let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                set.push_node(element);
                Ok(Value::node_set(set))
            }
            AstKind::ComputedElementConstructor => self.build_computed_element(node),
            AstKind::ComputedAttributeConstructor => self.build_computed_attribute(node),
            AstKind::TextConstructor => {
                let text = match node.children.first() {
                    Some(content) => self.constructor_content_string(content)?,
                    None => String::new(),
                };
                let id = self.allocate_constructed_id();
                let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                set.push_node(text_node(id, 0, &text));
                Ok(Value::node_set(set))
            }
            AstKind::CommentConstructor => self.build_comment(node),
            AstKind::PiConstructor => self.build_pi(node),
            AstKind::DocumentConstructor => self.build_document(node),
            _ => Err(self.unsupported(format!("unexpected constructor kind {:?}", node.kind))),
        }
    }

    fn enter_constructor(&mut self) -> Result<(), Error> {
        if self.constructor_depth >= MAX_CONSTRUCTOR_DEPTH {
            return Err(self.unsupported(format!(
                "constructor nesting exceeds the supported depth of {MAX_CONSTRUCTOR_DEPTH}"
            )));
        }
        self.constructor_depth += 1;
        Ok(())
    }

    fn leave_constructor(&mut self) {
        self.constructor_depth = self.constructor_depth.saturating_sub(1);
    }

    /// String content of a computed constructor body: expression results
    /// atomised and joined with single spaces.
    fn constructor_content_string(&mut self, node: &AstNode) -> Result<String, Error> {
        if node.kind == AstKind::ConstructorContent {
            return Ok(node.value.clone());
        }
        let value = self.evaluate_node(node)?;
        Ok(Self::sequence_string(&value))
    }

    /// Items joined with a single space, the attribute-value-template rule.
    pub(crate) fn sequence_string(value: &Value) -> String {
        match &value.data {
            ValueData::NodeSet(set) => {
                if let Some(text) = &set.string_override {
                    return text.clone();
                }
                let parts: Vec<String> = (0..set.len()).map(|i| set.item_string(i)).collect();
                parts.join(" ")
            }
            _ => value.to_string_value(),
        }
    }

    fn evaluate_avt(&mut self, parts: &[AvtPart]) -> Result<String, Error> {
        let mut out = String::new();
        for part in parts {
            match part {
                AvtPart::Literal(text) => out.push_str(text),
                AvtPart::Expr(expr) => {
                    let value = self.evaluate_node(expr)?;
                    out.push_str(&Self::sequence_string(&value));
                }
            }
        }
        Ok(out)
    }

    fn resolve_constructor_prefix(&mut self, scope: &NsScope, prefix: &str) -> Option<u32> {
        if let Some(hash) = scope.bindings.get(prefix) {
            return Some(*hash);
        }
        if let Some(uri) = self.prolog.resolve_prefix(prefix) {
            let uri = uri.to_string();
            return Some(self.document().register_namespace(&uri));
        }
        self.document().prefix_hash(prefix)
    }

    fn build_direct_element(
        &mut self,
        node: &AstNode,
        parent_scope: &NsScope,
        parent_id: i32,
    ) -> Result<Rc<Tag>, Error> {
        self.enter_constructor()?;
        let result = self.build_direct_element_inner(node, parent_scope, parent_id);
        self.leave_constructor();
        result
    }

    fn build_direct_element_inner(
        &mut self,
        node: &AstNode,
        parent_scope: &NsScope,
        parent_id: i32,
    ) -> Result<Rc<Tag>, Error> {
        let info = node.constructor.as_deref().cloned().unwrap_or_default();
        let mut scope = parent_scope.clone();

        // Namespace declarations first so sibling attributes and the element
        // name resolve against the augmented scope.
        for attribute in &info.attributes {
            if !attribute.is_namespace_decl {
                continue;
            }
            let uri = self.evaluate_avt(&attribute.value)?;
            let hash = self.document().register_namespace(&uri);
            if attribute.prefix.is_empty() {
                scope.default_ns = Some(hash);
            } else {
                self.document().register_prefix(&attribute.local, &uri);
                scope.bindings.insert(attribute.local.clone(), hash);
            }
        }

        let id = self.allocate_constructed_id();
        let mut attribs: Vec<Attribute> = vec![Attribute::new(node.value.clone(), "")];

        for attribute in &info.attributes {
            let value = self.evaluate_avt(&attribute.value)?;
            let name = Self::constructor_attribute_name(attribute);
            attribs.push(Attribute::new(name, value));
        }

        let namespace_hash = match node.value.split_once(':') {
            Some((prefix, _)) => self.resolve_constructor_prefix(&scope, prefix).unwrap_or(0),
            None => scope.default_ns.unwrap_or(0),
        };

        let mut children: Vec<Rc<Tag>> = Vec::new();
        let child_count = node.children.len();
        for (index, child) in node.children.iter().enumerate() {
            match child.kind {
                AstKind::ConstructorContent => {
                    let boundary = child.value.trim().is_empty()
                        && (index == 0 || index + 1 == child_count
                            || Self::is_constructor_child(&node.children[index - 1])
                            || Self::is_constructor_child(&node.children[index + 1]));
                    if boundary && self.prolog.boundary_space == BoundarySpace::Strip {
                        continue;
                    }
                    let text_id = self.allocate_constructed_id();
                    children.push(text_node(text_id, id, &child.value));
                }
                AstKind::DirectElementConstructor => {
                    children.push(self.build_direct_element(child, &scope, id)?);
                }
                AstKind::CommentConstructor => {
                    let comment = self.build_comment(child)?;
                    Self::adopt_constructed(&comment, id, &mut children);
                }
                AstKind::PiConstructor => {
                    let pi = self.build_pi(child)?;
                    Self::adopt_constructed(&pi, id, &mut children);
                }
                _ => {
                    let value = self.evaluate_node(child)?;
                    self.append_sequence(&mut children, &value, id)?;
                }
            }
        }

        Ok(Rc::new(Tag {
            id,
            parent_id,
            namespace_hash,
            flags: TagFlags::default(),
            attribs,
            children,
        }))
    }

    fn is_constructor_child(node: &AstNode) -> bool {
        matches!(
            node.kind,
            AstKind::DirectElementConstructor
                | AstKind::CommentConstructor
                | AstKind::PiConstructor
        )
    }

    fn constructor_attribute_name(attribute: &ConstructorAttribute) -> String {
        if attribute.is_namespace_decl {
            if attribute.prefix.is_empty() {
                attribute.local.clone()
            } else {
                format!("xmlns:{}", attribute.local)
            }
        } else if attribute.prefix.is_empty() {
            attribute.local.clone()
        } else {
            format!("{}:{}", attribute.prefix, attribute.local)
        }
    }

    /// Re-parent a freshly built node (value result) under a constructed
    /// element.
    fn adopt_constructed(value: &Value, parent_id: i32, children: &mut Vec<Rc<Tag>>) {
        if let ValueData::NodeSet(set) = &value.data {
            for index in 0..set.len() {
                if let Some(node) = &set.nodes[index] {
                    let mut tag = (**node).clone();
                    tag.parent_id = parent_id;
                    children.push(Rc::new(tag));
                }
            }
        }
    }

    /// Append an evaluated content sequence: nodes are cloned as subtrees,
    /// adjacent atomic items merge into one space-separated text node.
    fn append_sequence(
        &mut self,
        children: &mut Vec<Rc<Tag>>,
        value: &Value,
        parent_id: i32,
    ) -> Result<(), Error> {
        match &value.data {
            ValueData::NodeSet(set) => {
                let mut atomics: Vec<String> = Vec::new();
                for index in 0..set.len() {
                    match &set.nodes[index] {
                        Some(node) => {
                            if !atomics.is_empty() {
                                let text_id = self.allocate_constructed_id();
                                children.push(text_node(text_id, parent_id, &atomics.join(" ")));
                                atomics.clear();
                            }
                            if let Some(slot) = set.attributes[index] {
                                // Attribute items contribute their value text.
                                let text = node
                                    .attribs
                                    .get(slot)
                                    .map(|a| a.value.clone())
                                    .unwrap_or_default();
                                let text_id = self.allocate_constructed_id();
                                children.push(text_node(text_id, parent_id, &text));
                            } else {
                                let clone = self.clone_subtree(node, parent_id);
                                children.push(clone);
                            }
                        }
                        None => atomics.push(set.item_string(index)),
                    }
                }
                if !atomics.is_empty() {
                    let text_id = self.allocate_constructed_id();
                    children.push(text_node(text_id, parent_id, &atomics.join(" ")));
                }
            }
            _ => {
                let text = value.to_string_value();
                if !text.is_empty() {
                    let text_id = self.allocate_constructed_id();
                    children.push(text_node(text_id, parent_id, &text));
                }
            }
        }
        Ok(())
    }

    /// Deep copy with fresh negative IDs.
    pub(crate) fn clone_subtree(&mut self, source: &Rc<Tag>, parent_id: i32) -> Rc<Tag> {
        let id = self.allocate_constructed_id();
        let children = source
            .children
            .iter()
            .map(|child| self.clone_subtree(child, id))
            .collect();
        Rc::new(Tag {
            id,
            parent_id,
            namespace_hash: source.namespace_hash,
            flags: source.flags,
            attribs: source.attribs.clone(),
            children,
        })
    }

    fn constructor_name(&mut self, node: &AstNode) -> Result<(String, usize), Error> {
        let info = node.constructor.as_deref();
        if info.is_some_and(|i| i.has_name_expression) {
            let name_value = self.evaluate_node(&node.children[0])?;
            Ok((name_value.to_string_value(), 1))
        } else {
            Ok((node.value.clone(), 0))
        }
    }

    fn build_computed_element(&mut self, node: &AstNode) -> Result<Value, Error> {
        self.enter_constructor()?;
        let result = (|| {
            let (name, content_start) = self.constructor_name(node)?;
            if !is_qname(&name) {
                return Err(self.unsupported(format!("invalid element name '{name}'")));
            }
            let id = self.allocate_constructed_id();
            let mut children: Vec<Rc<Tag>> = Vec::new();
            for child in &node.children[content_start..] {
                let value = self.evaluate_node(child)?;
                self.append_sequence(&mut children, &value, id)?;
            }
            let scope = NsScope::default();
            let namespace_hash = match name.split_once(':') {
                Some((prefix, _)) => self.resolve_constructor_prefix(&scope, prefix).unwrap_or(0),
                None => 0,
            };
            let element = Rc::new(Tag {
                id,
                parent_id: 0,
                namespace_hash,
                flags: TagFlags::default(),
                attribs: vec![Attribute::new(name, "")],
                children,
            });
            let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
            set.push_node(element);
            Ok(Value::node_set(set))
        })();
        self.leave_constructor();
        result
    }

    /// A computed attribute yields a node set whose single item is a
    /// synthetic owner element carrying that one attribute.
    fn build_computed_attribute(&mut self, node: &AstNode) -> Result<Value, Error> {
        let (name, content_start) = self.constructor_name(node)?;
        if !is_qname(&name) {
            return Err(self.unsupported(format!("invalid attribute name '{name}'")));
        }
        let mut value_text = String::new();
        for child in &node.children[content_start..] {
            let value = self.evaluate_node(child)?;
            value_text.push_str(&Self::sequence_string(&value));
        }
        let id = self.allocate_constructed_id();
        let owner = Rc::new(Tag {
            id,
            parent_id: 0,
            namespace_hash: 0,
            flags: TagFlags::default(),
            attribs: vec![Attribute::new(name.clone(), ""), Attribute::new(name, value_text)],
            children: Vec::new(),
        });
        let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
        set.push_attribute(owner, 1);
        Ok(Value::node_set(set))
    }

    fn build_comment(&mut self, node: &AstNode) -> Result<Value, Error> {
        let text = match node.children.first() {
            Some(content) => self.constructor_content_string(content)?,
            None => String::new(),
        };
        if text.contains("--") || text.ends_with('-') {
            return Err(Error::invalid_value(
                "comment content must not contain '--' or end with '-'",
            ));
        }
        let id = self.allocate_constructed_id();
        let comment = Rc::new(Tag {
            id,
            parent_id: 0,
            namespace_hash: 0,
            flags: TagFlags::CONTENT | TagFlags::COMMENT,
            attribs: vec![Attribute::new("", text)],
            children: Vec::new(),
        });
        let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
        set.push_node(comment);
        Ok(Value::node_set(set))
    }

    fn build_pi(&mut self, node: &AstNode) -> Result<Value, Error> {
        let (target, content_start) = self.constructor_name(node)?;
        if !is_ncname(&target) {
            return Err(Error::invalid_value(format!(
                "processing-instruction target '{target}' is not an NCName"
            )));
        }
        if target.eq_ignore_ascii_case("xml") {
            return Err(Error::invalid_value(
                "processing-instruction target must not be 'xml'",
            ));
        }
        let mut text = String::new();
        for child in &node.children[content_start..] {
            text.push_str(&self.constructor_content_string(child)?);
        }
        if text.contains("?>") {
            return Err(Error::invalid_value(
                "processing-instruction content must not contain '?>'",
            ));
        }
        let id = self.allocate_constructed_id();
        let pi = Rc::new(Tag {
            id,
            parent_id: 0,
            namespace_hash: 0,
            flags: TagFlags::INSTRUCTION,
            attribs: vec![Attribute::new(format!("?{target}"), text)],
            children: Vec::new(),
        });
        let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
        set.push_node(pi);
        Ok(Value::node_set(set))
    }

    fn build_document(&mut self, node: &AstNode) -> Result<Value, Error> {
        self.enter_constructor()?;
        let result = (|| {
            let mut children: Vec<Rc<Tag>> = Vec::new();
            for child in &node.children {
                let value = self.evaluate_node(child)?;
                self.append_sequence(&mut children, &value, 0)?;
            }
            let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
            for child in children {
                set.push_node(child);
            }
            Ok(Value::node_set(set))
        })();
        self.leave_constructor();
        result
    }
}
