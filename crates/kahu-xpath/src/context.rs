//! Evaluation context: the implicit state a step or predicate runs in.

use kahu_xml::{Document, Tag};
use std::rc::Rc;

#[derive(Clone)]
pub struct XPathContext {
    pub document: Rc<Document>,
    pub context_node: Option<Rc<Tag>>,
    /// Attribute slot when the context item is an attribute node.
    pub attribute: Option<usize>,
    /// Carries the value of a synthetic (nodeless) context item.
    pub synthetic_value: Option<String>,
    /// 1-based position of the context item in the current candidate list.
    pub position: usize,
    pub size: usize,
}

impl XPathContext {
    #[must_use]
    pub fn new(document: Rc<Document>) -> Self {
        Self {
            document,
            context_node: None,
            attribute: None,
            synthetic_value: None,
            position: 1,
            size: 1,
        }
    }
}
