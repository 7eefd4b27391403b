//! Location-path evaluation: step expansion, node tests and predicates.

use super::Evaluator;
use crate::ast::{AstKind, AstNode};
use crate::axis::{Axis, AxisMatch, evaluate_axis};
use crate::context::XPathContext;
use crate::error::Error;
use crate::value::{NodeSet, Value, ValueData};
use kahu_xml::Tag;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::rc::Rc;

impl Evaluator {
    pub(crate) fn evaluate_location_path(&mut self, path: &AstNode) -> Result<Value, Error> {
        let absolute = path.children.first().is_some_and(|c| c.kind == AstKind::Root);
        let steps: Vec<&AstNode> =
            path.children.iter().filter(|c| c.kind == AstKind::Step).collect();

        if absolute {
            if steps.is_empty() {
                // `/` alone: the document's top-level nodes.
                let mut set = NodeSet::default();
                for tag in self.document().tags() {
                    set.push_node(Rc::clone(tag));
                }
                return Ok(Value::node_set(set));
            }
            let initial = self.expand_step_from_root(steps[0])?;
            return self.apply_steps(initial, &steps[1..]);
        }

        // Relative path from the current context item.
        let Some(context_node) = self.context.context_node.clone() else {
            // A synthetic context item only answers `self::node()`.
            if let Some(synthetic) = self.context.synthetic_value.clone() {
                if steps.len() == 1 && Self::is_self_node_step(steps[0]) {
                    let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                    set.push_synthetic(synthetic);
                    let filtered = self.apply_predicates_to_value(
                        Value::node_set(set),
                        &Self::step_predicates(steps[0]),
                    )?;
                    return Ok(filtered);
                }
            }
            return Ok(Value::empty());
        };

        let initial =
            vec![AxisMatch { node: context_node, attribute: self.context.attribute }];
        self.apply_steps(initial, &steps)
    }

    fn is_self_node_step(step: &AstNode) -> bool {
        step.children.first().is_some_and(|c| c.kind == AstKind::AxisSpecifier && c.value == "self")
            && step
                .children
                .get(1)
                .is_some_and(|c| c.kind == AstKind::NodeTypeTest && c.value == "node")
    }

    fn step_predicates(step: &AstNode) -> Vec<&AstNode> {
        step.children.iter().filter(|c| c.kind == AstKind::Predicate).collect()
    }

    /// The first step of an absolute path runs against the document root,
    /// which is not itself a tag.
    fn expand_step_from_root(&mut self, step: &AstNode) -> Result<Vec<AxisMatch>, Error> {
        if let Some(call) = step.children.first() {
            if call.kind == AstKind::FunctionCall {
                return Err(self.unsupported("a function call cannot start an absolute path"));
            }
        }
        let axis = self.step_axis(step)?;
        let document = self.document();
        let mut candidates: Vec<AxisMatch> = Vec::new();
        match axis {
            Axis::Child => {
                for tag in document.tags() {
                    candidates.push(AxisMatch::node(Rc::clone(tag)));
                }
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                fn walk(tag: &Rc<Tag>, out: &mut Vec<AxisMatch>) {
                    out.push(AxisMatch::node(Rc::clone(tag)));
                    for child in &tag.children {
                        walk(child, out);
                    }
                }
                for tag in document.tags() {
                    walk(tag, &mut candidates);
                }
            }
            Axis::SelfAxis
            | Axis::Parent
            | Axis::Ancestor
            | Axis::AncestorOrSelf
            | Axis::Attribute
            | Axis::FollowingSibling
            | Axis::PrecedingSibling
            | Axis::Following
            | Axis::Preceding => {}
            Axis::Namespace => {
                return Err(self.unsupported("XPST0134: the namespace axis is not supported"));
            }
        }

        let tested = self.filter_by_node_test(step, axis, candidates)?;
        self.apply_step_predicates(step, tested)
    }

    fn step_axis(&mut self, step: &AstNode) -> Result<Axis, Error> {
        let Some(spec) = step.children.iter().find(|c| c.kind == AstKind::AxisSpecifier) else {
            return Ok(Axis::Child);
        };
        match Axis::parse(&spec.value) {
            Some(axis) => Ok(axis),
            None => Err(self.unsupported(format!("unknown axis '{}'", spec.value))),
        }
    }

    /// Run a chain of steps over an initial context list, normalising to
    /// document order between steps.
    pub(crate) fn apply_steps(
        &mut self,
        initial: Vec<AxisMatch>,
        steps: &[&AstNode],
    ) -> Result<Value, Error> {
        let mut current = initial;
        for (index, step) in steps.iter().enumerate() {
            // Function-call steps evaluate per context item.
            if let Some(call) = step.children.first() {
                if call.kind == AstKind::FunctionCall {
                    return self.apply_function_step(current, step, &steps[index + 1..]);
                }
            }

            let axis = self.step_axis(step)?;
            let mut next: Vec<AxisMatch> = Vec::new();
            let mut seen: HashSet<(usize, usize)> = HashSet::new();
            for context_entry in &current {
                let mut buffer = self.arena.matches.acquire(8);
                let document = self.document();
                let owning = self
                    .owning_document(&context_entry.node)
                    .unwrap_or(document);
                if let Err(error) = evaluate_axis(&owning, axis, context_entry, &mut buffer) {
                    self.arena.matches.release(buffer);
                    self.record_error(&error.message, false);
                    return Err(error);
                }
                let candidates = std::mem::take(&mut buffer);
                self.arena.matches.release(buffer);

                let tested = self.filter_by_node_test(step, axis, candidates)?;
                let surviving = self.apply_step_predicates(step, tested)?;
                for entry in surviving {
                    if seen.insert(entry.identity()) {
                        next.push(entry);
                    }
                }
            }
            self.sort_matches(&mut next);
            current = next;
            if current.is_empty() {
                break;
            }
        }

        let mut set = NodeSet::default();
        for entry in current {
            match entry.attribute {
                Some(slot) => set.push_attribute(entry.node, slot),
                None => set.push_node(entry.node),
            }
        }
        Ok(Value::node_set(set))
    }

    /// `title/string()` style steps: evaluate the call once per context item.
    fn apply_function_step(
        &mut self,
        current: Vec<AxisMatch>,
        step: &AstNode,
        remaining: &[&AstNode],
    ) -> Result<Value, Error> {
        let call = &step.children[0];
        let predicates = Self::step_predicates(step);
        let size = current.len();
        let mut values: Vec<Value> = Vec::with_capacity(size);
        for (index, entry) in current.iter().enumerate() {
            let mut context = XPathContext::new(self.document());
            context.context_node = Some(Rc::clone(&entry.node));
            context.attribute = entry.attribute;
            context.position = index + 1;
            context.size = size;
            let value = self.with_context(context, |eval| eval.evaluate_node(call))?;
            values.push(value);
        }

        if !remaining.is_empty() {
            // Continue stepping through any nodes the calls produced.
            let mut nodes: Vec<AxisMatch> = Vec::new();
            for value in &values {
                if let ValueData::NodeSet(set) = &value.data {
                    for index in 0..set.len() {
                        if let Some(node) = &set.nodes[index] {
                            nodes.push(AxisMatch {
                                node: Rc::clone(node),
                                attribute: set.attributes[index],
                            });
                        }
                    }
                }
            }
            return self.apply_steps(nodes, remaining);
        }

        if values.len() == 1 && predicates.is_empty() {
            return Ok(values.pop().expect("one value"));
        }
        let mut set = NodeSet { preserve_node_order: true, ..NodeSet::default() };
        for value in &values {
            Self::append_value_items(&mut set, value);
        }
        self.apply_predicates_to_value(Value::node_set(set), &predicates)
    }

    fn matches_node_test(
        &mut self,
        test: &AstNode,
        axis: Axis,
        candidate: &AxisMatch,
    ) -> Result<bool, Error> {
        let node = &candidate.node;
        match test.kind {
            AstKind::NodeTypeTest => Ok(match test.value.as_str() {
                "node" => true,
                "text" => node.is_content() && candidate.attribute.is_none(),
                "comment" => node.is_comment(),
                _ => false,
            }),
            AstKind::ProcessingInstructionTest => {
                if !node.is_instruction() {
                    return Ok(false);
                }
                if test.value.is_empty() {
                    return Ok(true);
                }
                Ok(node
                    .pi_target()
                    .is_some_and(|target| target.eq_ignore_ascii_case(&test.value)))
            }
            AstKind::Wildcard => Ok(if axis == Axis::Attribute {
                candidate.attribute.is_some()
            } else {
                node.is_element()
            }),
            AstKind::NameTest => {
                if axis == Axis::Attribute || candidate.attribute.is_some() {
                    let Some(slot) = candidate.attribute else {
                        return Ok(false);
                    };
                    self.match_attribute_name(&test.value, node, slot)
                } else {
                    self.match_element_name(&test.value, node)
                }
            }
            _ => Ok(false),
        }
    }

    fn filter_by_node_test(
        &mut self,
        step: &AstNode,
        axis: Axis,
        candidates: Vec<AxisMatch>,
    ) -> Result<Vec<AxisMatch>, Error> {
        let Some(test) = step.children.iter().find(|c| {
            matches!(
                c.kind,
                AstKind::NameTest
                    | AstKind::Wildcard
                    | AstKind::NodeTypeTest
                    | AstKind::ProcessingInstructionTest
            )
        }) else {
            return Ok(candidates);
        };
        let test = test.clone();
        let mut kept = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.matches_node_test(&test, axis, &candidate)? {
                kept.push(candidate);
            }
        }
        Ok(kept)
    }

    /// Element name tests: case-insensitive local match; the prefix (or the
    /// default element namespace) must resolve to the element's namespace
    /// hash. During `find_tag`, `current_prefix` stands in when nothing else
    /// is declared.
    fn match_element_name(&mut self, test: &str, node: &Rc<Tag>) -> Result<bool, Error> {
        if !node.is_element() {
            return Ok(false);
        }
        let (prefix, local) = match test.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, test),
        };
        let candidate_local = node.local_name().unwrap_or("");
        if local != "*" && !local.eq_ignore_ascii_case(candidate_local) {
            return Ok(false);
        }
        match prefix {
            Some("*") => Ok(true),
            Some(prefix) => {
                let expected = self.resolve_test_prefix(prefix, node);
                Ok(expected.is_some_and(|hash| hash == node.namespace_hash))
            }
            None => {
                if let Some(default_ns) = self.prolog.default_element_namespace.as_deref() {
                    return Ok(node.namespace_hash == kahu_xml::str_hash(default_ns));
                }
                if self.use_current_prefix && self.current_prefix != 0 {
                    // find_tag's caller-supplied namespace stands in when no
                    // declaration is in scope.
                    return Ok(node.namespace_hash == self.current_prefix
                        || node.namespace_hash == 0);
                }
                Ok(node.namespace_hash == 0)
            }
        }
    }

    /// Attribute name tests: an empty prefix only matches attributes with no
    /// prefix (attributes do not take the default namespace).
    fn match_attribute_name(
        &mut self,
        test: &str,
        node: &Rc<Tag>,
        slot: usize,
    ) -> Result<bool, Error> {
        let Some(attribute) = node.attribs.get(slot) else {
            return Ok(false);
        };
        let (prefix, local) = match test.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, test),
        };
        if local != "*" && !local.eq_ignore_ascii_case(attribute.local_name()) {
            return Ok(false);
        }
        match (prefix, attribute.prefix()) {
            (None, None) => Ok(true),
            (None, Some(_)) | (Some(_), None) => Ok(prefix == Some("*")),
            (Some("*"), Some(_)) => Ok(true),
            (Some(test_prefix), Some(attr_prefix)) => {
                let expected = self.resolve_test_prefix(test_prefix, node);
                let actual = self.document().resolve_prefix(attr_prefix, node.id);
                Ok(match (expected, actual) {
                    (Some(a), Some(b)) => a == b,
                    // Unresolvable prefixes fall back to a lexical match.
                    _ => test_prefix.eq_ignore_ascii_case(attr_prefix),
                })
            }
        }
    }

    /// Resolve a name-test prefix: prolog declarations first, then the
    /// document's in-scope and registered prefixes.
    fn resolve_test_prefix(&mut self, prefix: &str, node: &Rc<Tag>) -> Option<u32> {
        if let Some(uri) = self.prolog.resolve_prefix(prefix) {
            return Some(kahu_xml::str_hash(uri));
        }
        let document =
            self.owning_document(node).unwrap_or_else(|| self.document());
        document.resolve_prefix(prefix, node.id)
    }

    /// Apply a step's predicates left to right, renumbering positions after
    /// each filter.
    fn apply_step_predicates(
        &mut self,
        step: &AstNode,
        candidates: Vec<AxisMatch>,
    ) -> Result<Vec<AxisMatch>, Error> {
        let predicates = Self::step_predicates(step);
        let mut current = candidates;
        for predicate in predicates {
            let size = current.len();
            let mut surviving: Vec<AxisMatch> = Vec::with_capacity(size);
            for (index, entry) in current.iter().enumerate() {
                let mut context = XPathContext::new(self.document());
                context.context_node = Some(Rc::clone(&entry.node));
                context.attribute = entry.attribute;
                context.position = index + 1;
                context.size = size;
                let matched = self.with_context(context, |eval| {
                    eval.evaluate_predicate(&predicate.children[0])
                })?;
                if matched {
                    surviving.push(entry.clone());
                }
            }
            current = surviving;
        }
        Ok(current)
    }

    /// A numeric predicate matches by position; anything else by its
    /// effective boolean value.
    pub(crate) fn evaluate_predicate(&mut self, expression: &AstNode) -> Result<bool, Error> {
        let value = self.evaluate_node(expression)?;
        if let ValueData::Number(number) = value.data {
            if number.is_nan() || number < 0.0 || number.fract() != 0.0 {
                return Ok(false);
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Ok(self.context.position == number as usize);
        }
        Ok(value.to_boolean())
    }

    /// Predicates over an arbitrary sequence value (filter expressions and
    /// parenthesised sequences).
    pub(crate) fn apply_predicates_to_value(
        &mut self,
        value: Value,
        predicates: &[&AstNode],
    ) -> Result<Value, Error> {
        if predicates.is_empty() {
            return Ok(value);
        }
        let mut set = match value.data {
            ValueData::NodeSet(set) => set,
            _ => {
                let mut wrapped = NodeSet { preserve_node_order: true, ..NodeSet::default() };
                Self::append_value_items(&mut wrapped, &value);
                wrapped
            }
        };

        for predicate in predicates {
            let expression = &predicate.children[0];
            let size = set.len();
            let mut kept = NodeSet { preserve_node_order: set.preserve_node_order, ..NodeSet::default() };
            for index in 0..size {
                let mut context = XPathContext::new(self.document());
                match &set.nodes[index] {
                    Some(node) => {
                        context.context_node = Some(Rc::clone(node));
                        context.attribute = set.attributes[index];
                    }
                    None => {
                        context.synthetic_value = Some(set.item_string(index));
                    }
                }
                context.position = index + 1;
                context.size = size;
                let matched =
                    self.with_context(context, |eval| eval.evaluate_predicate(expression))?;
                if matched {
                    kept.push_item(
                        set.nodes[index].clone(),
                        set.attributes[index],
                        set.string_values.get(index).cloned().unwrap_or(None),
                    );
                }
            }
            set = kept;
        }
        Ok(Value::node_set(set))
    }

    pub(crate) fn evaluate_filter(&mut self, node: &AstNode) -> Result<Value, Error> {
        let value = self.evaluate_node(&node.children[0])?;
        let predicates: Vec<&AstNode> =
            node.children.iter().skip(1).filter(|c| c.kind == AstKind::Predicate).collect();
        self.apply_predicates_to_value(value, &predicates)
    }

    /// A filter (or other primary) continued by path steps.
    pub(crate) fn evaluate_path_combination(&mut self, node: &AstNode) -> Result<Value, Error> {
        let initial_value = self.evaluate_node(&node.children[0])?;
        let steps: Vec<&AstNode> =
            node.children.iter().skip(1).filter(|c| c.kind == AstKind::Step).collect();

        let mut initial: SmallVec<[AxisMatch; 8]> = SmallVec::new();
        if let ValueData::NodeSet(set) = &initial_value.data {
            for index in 0..set.len() {
                if let Some(tag) = &set.nodes[index] {
                    initial.push(AxisMatch {
                        node: Rc::clone(tag),
                        attribute: set.attributes[index],
                    });
                }
            }
        }
        self.apply_steps(initial.into_vec(), &steps)
    }

    pub(crate) fn sort_matches(&self, matches: &mut Vec<AxisMatch>) {
        let keys: Vec<(usize, usize, usize)> = matches
            .iter()
            .map(|entry| self.order_key(&entry.node, entry.attribute))
            .collect();
        let mut order: Vec<usize> = (0..matches.len()).collect();
        order.sort_by_key(|&index| keys[index]);
        let mut sorted = Vec::with_capacity(matches.len());
        for index in order {
            sorted.push(matches[index].clone());
        }
        *matches = sorted;
    }
}
