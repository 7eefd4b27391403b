//! Tag and attribute records.
//!
//! A `Tag` is one node of the parsed tree. The first attribute of an element
//! carries the element's qualified name; text content is stored in
//! `attribs[0].value` of a tag flagged `CONTENT`. Processing instructions
//! store their target in `attribs[0].name` prefixed with `?`.

use bitflags::bitflags;
use std::rc::Rc;

bitflags! {
    /// Node classification flags. A tag with none of these set is an element.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TagFlags: u32 {
        const CONTENT     = 0x0001;
        const COMMENT     = 0x0002;
        const INSTRUCTION = 0x0004;
        const NOTATION    = 0x0008;
        const CDATA       = 0x0010;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    /// Content attributes (the synthetic slot of a text node) have no name.
    pub fn is_content(&self) -> bool {
        self.name.is_empty()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(_, l)| l)
    }

    /// True for `xmlns` and `xmlns:prefix` declarations.
    pub fn is_namespace_decl(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Positive and unique within a document; constructed nodes use negative IDs.
    pub id: i32,
    /// 0 at the document root.
    pub parent_id: i32,
    /// Hash of the element's namespace URI, 0 when none.
    pub namespace_hash: u32,
    pub flags: TagFlags,
    pub attribs: Vec<Attribute>,
    pub children: Vec<Rc<Tag>>,
}

impl Tag {
    pub fn is_element(&self) -> bool {
        !self.flags.intersects(
            TagFlags::CONTENT | TagFlags::COMMENT | TagFlags::INSTRUCTION | TagFlags::NOTATION,
        )
    }

    pub fn is_content(&self) -> bool {
        self.flags.contains(TagFlags::CONTENT)
            && !self.flags.intersects(TagFlags::COMMENT | TagFlags::INSTRUCTION | TagFlags::NOTATION)
    }

    pub fn is_comment(&self) -> bool {
        self.flags.contains(TagFlags::COMMENT)
    }

    pub fn is_instruction(&self) -> bool {
        self.flags.contains(TagFlags::INSTRUCTION)
    }

    pub fn is_cdata(&self) -> bool {
        self.flags.contains(TagFlags::CDATA)
    }

    /// The qualified name of an element, or the `?`-prefixed target of a
    /// processing instruction. Content and comment tags have no name.
    pub fn name(&self) -> Option<&str> {
        let first = self.attribs.first()?;
        if first.is_content() { None } else { Some(first.name.as_str()) }
    }

    /// Local part of the element name (after any prefix).
    pub fn local_name(&self) -> Option<&str> {
        self.name().map(|n| n.split_once(':').map_or(n, |(_, l)| l))
    }

    /// Namespace prefix of the element name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name().and_then(|n| n.split_once(':').map(|(p, _)| p))
    }

    /// Target of a processing instruction (name without the `?` marker).
    pub fn pi_target(&self) -> Option<&str> {
        if !self.is_instruction() {
            return None;
        }
        self.name().map(|n| n.strip_prefix('?').unwrap_or(n))
    }

    /// Text stored on a content tag.
    pub fn content_value(&self) -> Option<&str> {
        if !self.flags.contains(TagFlags::CONTENT) {
            return None;
        }
        self.attribs.first().filter(|a| a.is_content()).map(|a| a.value.as_str())
    }

    /// Ordinary attributes, skipping the element-name sentinel at index 0.
    pub fn attributes(&self) -> impl Iterator<Item = (usize, &Attribute)> {
        self.attribs.iter().enumerate().skip(1)
    }

    /// Look up an ordinary attribute by qualified name (ASCII case-insensitive).
    pub fn attribute_value(&self, name: &str) -> Option<&str> {
        self.attributes()
            .find(|(_, a)| a.name.eq_ignore_ascii_case(name))
            .map(|(_, a)| a.value.as_str())
    }

    /// Concatenated text of this node: the stored text of a content tag plus
    /// recursive children, or every descendant content value of an element in
    /// document order.
    pub fn string_value(&self) -> String {
        let mut out = String::new();
        append_node_text(self, &mut out);
        out
    }
}

fn append_node_text(node: &Tag, out: &mut String) {
    if node.flags.contains(TagFlags::CONTENT) {
        if node.is_content() || node.is_cdata() {
            if let Some(first) = node.attribs.first() {
                if first.is_content() {
                    out.push_str(&first.value);
                }
            }
        }
        for child in &node.children {
            append_node_text(child, out);
        }
        return;
    }
    if node.is_comment() || node.is_instruction() {
        return;
    }
    for child in &node.children {
        append_node_text(child, out);
    }
}
