//! Fluent construction of documents for hosts and tests.
//!
//! ```
//! use kahu_xml::{doc, elem, text};
//!
//! // <root><book id="1"><title>A</title></book></root>
//! let document = doc()
//!     .child(
//!         elem("root").child(elem("book").attr("id", "1").child(elem("title").child(text("A")))),
//!     )
//!     .build();
//! assert_eq!(document.tags()[0].local_name(), Some("root"));
//! ```
//!
//! IDs are assigned in document order during `build()`, and `xmlns`
//! declarations are registered with the document's namespace registry so that
//! prefixed name tests resolve without a parser in the loop.

use crate::document::Document;
use crate::node::{Attribute, Tag, TagFlags};
use std::collections::HashMap;
use std::rc::Rc;

pub struct TagBuilder {
    flags: TagFlags,
    attribs: Vec<Attribute>,
    children: Vec<TagBuilder>,
}

/// Start an element node.
#[must_use]
pub fn elem(name: &str) -> TagBuilder {
    TagBuilder {
        flags: TagFlags::default(),
        attribs: vec![Attribute::new(name, "")],
        children: Vec::new(),
    }
}

/// Start a text node.
#[must_use]
pub fn text(value: &str) -> TagBuilder {
    TagBuilder {
        flags: TagFlags::CONTENT,
        attribs: vec![Attribute::new("", value)],
        children: Vec::new(),
    }
}

/// Start a CDATA section.
#[must_use]
pub fn cdata(value: &str) -> TagBuilder {
    TagBuilder {
        flags: TagFlags::CONTENT | TagFlags::CDATA,
        attribs: vec![Attribute::new("", value)],
        children: Vec::new(),
    }
}

/// Start a comment node.
#[must_use]
pub fn comment(value: &str) -> TagBuilder {
    TagBuilder {
        flags: TagFlags::CONTENT | TagFlags::COMMENT,
        attribs: vec![Attribute::new("", value)],
        children: Vec::new(),
    }
}

/// Start a processing instruction with the given target.
#[must_use]
pub fn pi(target: &str, value: &str) -> TagBuilder {
    TagBuilder {
        flags: TagFlags::INSTRUCTION,
        attribs: vec![Attribute::new(format!("?{target}"), value)],
        children: Vec::new(),
    }
}

impl TagBuilder {
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attribs.push(Attribute::new(name, value));
        self
    }

    #[must_use]
    pub fn child(mut self, child: TagBuilder) -> Self {
        self.children.push(child);
        self
    }
}

pub struct DocumentBuilder {
    children: Vec<TagBuilder>,
    path: Option<String>,
}

/// Start a document.
#[must_use]
pub fn doc() -> DocumentBuilder {
    DocumentBuilder { children: Vec::new(), path: None }
}

impl DocumentBuilder {
    #[must_use]
    pub fn child(mut self, child: TagBuilder) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<Document> {
        let mut document = Document::empty();
        document.path = self.path;

        #[derive(Clone, Default)]
        struct NsScope {
            prefixes: HashMap<String, u32>,
            default_ns: u32,
        }

        fn freeze(
            builder: TagBuilder,
            parent_id: i32,
            next_id: &mut i32,
            scope: &NsScope,
            document: &Document,
        ) -> Rc<Tag> {
            let id = *next_id;
            *next_id += 1;

            let mut scope = scope.clone();
            for attrib in &builder.attribs {
                if attrib.name == "xmlns" {
                    scope.default_ns = document.register_namespace(&attrib.value);
                } else if let Some(prefix) = attrib.name.strip_prefix("xmlns:") {
                    let hash = document.register_prefix(prefix, &attrib.value);
                    scope.prefixes.insert(prefix.to_string(), hash);
                }
            }

            let mut namespace_hash = 0u32;
            if !builder.flags.intersects(
                TagFlags::CONTENT | TagFlags::COMMENT | TagFlags::INSTRUCTION | TagFlags::NOTATION,
            ) {
                let name = builder.attribs.first().map(|a| a.name.as_str()).unwrap_or("");
                namespace_hash = match name.split_once(':') {
                    Some((prefix, _)) => {
                        scope.prefixes.get(prefix).copied().or_else(|| document.prefix_hash(prefix)).unwrap_or(0)
                    }
                    None => scope.default_ns,
                };
            }

            let children = builder
                .children
                .into_iter()
                .map(|c| freeze(c, id, next_id, &scope, document))
                .collect();

            Rc::new(Tag {
                id,
                parent_id,
                namespace_hash,
                flags: builder.flags,
                attribs: builder.attribs,
                children,
            })
        }

        let mut next_id = 1;
        let scope = NsScope::default();
        let tags = self
            .children
            .into_iter()
            .map(|c| freeze(c, 0, &mut next_id, &scope, &document))
            .collect();
        document.set_tags(tags);
        Rc::new(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_assigned_in_document_order() {
        let document = doc()
            .child(elem("root").child(elem("a").child(text("x"))).child(elem("b")))
            .build();
        let root = &document.tags()[0];
        assert_eq!(root.id, 1);
        assert_eq!(root.children[0].id, 2);
        assert_eq!(root.children[0].children[0].id, 3);
        assert_eq!(root.children[1].id, 4);
        assert_eq!(root.children[1].parent_id, 1);
    }

    #[test]
    fn default_namespace_applies_to_unprefixed_elements() {
        let document = doc()
            .child(elem("root").attr("xmlns", "urn:default").child(elem("leaf")))
            .build();
        let root = &document.tags()[0];
        assert_ne!(root.namespace_hash, 0);
        assert_eq!(root.children[0].namespace_hash, root.namespace_hash);
        assert_eq!(document.namespace_uri(root.namespace_hash).as_deref(), Some("urn:default"));
    }

    #[test]
    fn prefixed_elements_resolve_against_scope() {
        let document = doc()
            .child(elem("bk:root").attr("xmlns:bk", "urn:books").child(elem("plain")))
            .build();
        let root = &document.tags()[0];
        assert_eq!(document.namespace_uri(root.namespace_hash).as_deref(), Some("urn:books"));
        assert_eq!(root.children[0].namespace_hash, 0);
    }

    #[test]
    fn processing_instruction_targets_keep_marker() {
        let document = doc().child(elem("root").child(pi("xml-stylesheet", "href='a'"))).build();
        let pi_tag = &document.tags()[0].children[0];
        assert_eq!(pi_tag.name(), Some("?xml-stylesheet"));
        assert_eq!(pi_tag.pi_target(), Some("xml-stylesheet"));
    }
}
