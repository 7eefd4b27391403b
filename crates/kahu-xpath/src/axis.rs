//! Axis traversal over the tag tree.
//!
//! Every axis yields `(tag, attribute?)` pairs in axis order: forward axes
//! in document order, reverse axes (`ancestor`, `ancestor-or-self`,
//! `preceding`, `preceding-sibling`) in reverse document order. The
//! namespace axis is reported as unsupported (XPST0134).

use crate::error::Error;
use kahu_xml::{Document, Tag};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    Parent,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
    SelfAxis,
    DescendantOrSelf,
    AncestorOrSelf,
}

impl Axis {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            "self" => Axis::SelfAxis,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            _ => return None,
        })
    }

    /// Reverse axes enumerate candidates in reverse document order, which
    /// feeds the position numbering of their predicates.
    #[must_use]
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

/// One axis candidate: a tag, optionally narrowed to an attribute slot.
#[derive(Debug, Clone)]
pub struct AxisMatch {
    pub node: Rc<Tag>,
    pub attribute: Option<usize>,
}

impl AxisMatch {
    #[must_use]
    pub fn node(node: Rc<Tag>) -> Self {
        Self { node, attribute: None }
    }

    #[must_use]
    pub fn identity(&self) -> (usize, usize) {
        (Rc::as_ptr(&self.node) as usize, self.attribute.map_or(0, |a| a + 1))
    }
}

fn push_subtree(tag: &Rc<Tag>, out: &mut Vec<AxisMatch>) {
    out.push(AxisMatch::node(Rc::clone(tag)));
    for child in &tag.children {
        push_subtree(child, out);
    }
}

fn push_subtree_reverse(tag: &Rc<Tag>, out: &mut Vec<AxisMatch>) {
    for child in tag.children.iter().rev() {
        push_subtree_reverse(child, out);
    }
    out.push(AxisMatch::node(Rc::clone(tag)));
}

/// Siblings of a tag, including itself: the parent's children, or the
/// document's top-level tags at the root.
fn sibling_list(document: &Document, tag: &Rc<Tag>) -> Vec<Rc<Tag>> {
    match document.parent_of(tag) {
        Some(parent) => parent.children.clone(),
        None => document.tags().to_vec(),
    }
}

fn sibling_position(siblings: &[Rc<Tag>], tag: &Rc<Tag>) -> Option<usize> {
    siblings.iter().position(|candidate| Rc::ptr_eq(candidate, tag))
}

/// Enumerate one axis from a context item into `out`.
pub fn evaluate_axis(
    document: &Document,
    axis: Axis,
    context: &AxisMatch,
    out: &mut Vec<AxisMatch>,
) -> Result<(), Error> {
    let node = &context.node;
    match axis {
        Axis::Child => {
            for child in &node.children {
                out.push(AxisMatch::node(Rc::clone(child)));
            }
        }
        Axis::Descendant => {
            for child in &node.children {
                push_subtree(child, out);
            }
        }
        Axis::DescendantOrSelf => {
            out.push(context.clone());
            for child in &node.children {
                push_subtree(child, out);
            }
        }
        Axis::SelfAxis => {
            out.push(context.clone());
        }
        Axis::Parent => {
            if context.attribute.is_some() {
                // The parent of an attribute is its owner element.
                out.push(AxisMatch::node(Rc::clone(node)));
            } else if let Some(parent) = document.parent_of(node) {
                out.push(AxisMatch::node(parent));
            }
        }
        Axis::Ancestor => {
            let mut current = if context.attribute.is_some() {
                Some(Rc::clone(node))
            } else {
                document.parent_of(node)
            };
            while let Some(tag) = current {
                current = document.parent_of(&tag);
                out.push(AxisMatch::node(tag));
            }
        }
        Axis::AncestorOrSelf => {
            out.push(context.clone());
            let mut current = if context.attribute.is_some() {
                Some(Rc::clone(node))
            } else {
                document.parent_of(node)
            };
            while let Some(tag) = current {
                current = document.parent_of(&tag);
                out.push(AxisMatch::node(tag));
            }
        }
        Axis::FollowingSibling => {
            let siblings = sibling_list(document, node);
            if let Some(position) = sibling_position(&siblings, node) {
                for sibling in &siblings[position + 1..] {
                    out.push(AxisMatch::node(Rc::clone(sibling)));
                }
            }
        }
        Axis::PrecedingSibling => {
            let siblings = sibling_list(document, node);
            if let Some(position) = sibling_position(&siblings, node) {
                for sibling in siblings[..position].iter().rev() {
                    out.push(AxisMatch::node(Rc::clone(sibling)));
                }
            }
        }
        Axis::Following => {
            // Following siblings of each ancestor-or-self, subtrees included,
            // nearest ancestor first.
            let mut current = Rc::clone(node);
            loop {
                let siblings = sibling_list(document, &current);
                if let Some(position) = sibling_position(&siblings, &current) {
                    for sibling in &siblings[position + 1..] {
                        push_subtree(sibling, out);
                    }
                }
                match document.parent_of(&current) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        Axis::Preceding => {
            // Preceding siblings of each ancestor-or-self in reverse document
            // order; ancestors themselves are excluded.
            let mut current = Rc::clone(node);
            loop {
                let siblings = sibling_list(document, &current);
                if let Some(position) = sibling_position(&siblings, &current) {
                    for sibling in siblings[..position].iter().rev() {
                        push_subtree_reverse(sibling, out);
                    }
                }
                match document.parent_of(&current) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        Axis::Attribute => {
            if node.is_element() {
                for (index, _) in node.attributes() {
                    out.push(AxisMatch { node: Rc::clone(node), attribute: Some(index) });
                }
            }
        }
        Axis::Namespace => {
            return Err(Error::unsupported(
                "XPST0134: the namespace axis is not supported",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kahu_xml::{doc, elem, text};

    fn sample() -> Rc<Document> {
        // <root><a><b>1</b></a><c/></root>
        doc()
            .child(
                elem("root")
                    .child(elem("a").child(elem("b").child(text("1"))))
                    .child(elem("c")),
            )
            .build()
    }

    fn names(matches: &[AxisMatch]) -> Vec<String> {
        matches
            .iter()
            .map(|m| m.node.local_name().unwrap_or("#text").to_string())
            .collect()
    }

    #[test]
    fn descendant_is_preorder_excluding_self() {
        let document = sample();
        let root = document.find_tag(1).unwrap();
        let mut out = Vec::new();
        evaluate_axis(&document, Axis::Descendant, &AxisMatch::node(root), &mut out).unwrap();
        assert_eq!(names(&out), vec!["a", "b", "#text", "c"]);
    }

    #[test]
    fn ancestor_walks_to_the_root() {
        let document = sample();
        let b = document.find_tag(3).unwrap();
        let mut out = Vec::new();
        evaluate_axis(&document, Axis::Ancestor, &AxisMatch::node(b), &mut out).unwrap();
        assert_eq!(names(&out), vec!["a", "root"]);
    }

    #[test]
    fn following_excludes_descendants() {
        let document = sample();
        let a = document.find_tag(2).unwrap();
        let mut out = Vec::new();
        evaluate_axis(&document, Axis::Following, &AxisMatch::node(a), &mut out).unwrap();
        assert_eq!(names(&out), vec!["c"]);
    }

    #[test]
    fn preceding_excludes_ancestors() {
        let document = sample();
        let c = document.find_tag(5).unwrap();
        let mut out = Vec::new();
        evaluate_axis(&document, Axis::Preceding, &AxisMatch::node(c), &mut out).unwrap();
        // Reverse document order: the text node sits deepest.
        assert_eq!(names(&out), vec!["#text", "b", "a"]);
    }

    #[test]
    fn namespace_axis_is_unsupported() {
        let document = sample();
        let root = document.find_tag(1).unwrap();
        let mut out = Vec::new();
        let err = evaluate_axis(&document, Axis::Namespace, &AxisMatch::node(root), &mut out)
            .expect_err("unsupported");
        assert!(err.message.contains("XPST0134"));
    }
}
