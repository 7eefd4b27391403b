//! Document container: top-level tags, namespace registry, ID map and the
//! resource caches consumed by the query engine.

use crate::node::Tag;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub const XML_NAMESPACE_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// FNV-1a, used to store namespace URIs in compact form on tags.
#[must_use]
pub fn str_hash(value: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in value.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    // 0 is reserved for "no namespace".
    if hash == 0 { 1 } else { hash }
}

/// Normalise a cache key: backslashes become forward slashes and a `file:`
/// scheme is stripped.
#[must_use]
pub fn normalize_uri(uri: &str) -> String {
    let forward = uri.replace('\\', "/");
    let stripped = forward
        .strip_prefix("file://")
        .or_else(|| forward.strip_prefix("file:"))
        .unwrap_or(&forward);
    stripped.to_string()
}

/// Host-provided loader for external resources. The engine never touches the
/// filesystem itself; `doc()`, `collection()`, `unparsed-text()` and module
/// imports all route through this seam.
pub trait ResourceResolver {
    /// Load and parse a document. `None` when the resource does not exist.
    fn document(&self, uri: &str) -> Option<Rc<Document>>;

    /// Enumerate the member URIs of a collection. `uri` of `None` requests the
    /// default collection (the directory of the owning document).
    fn collection(&self, uri: Option<&str>) -> Option<Vec<String>> {
        let _ = uri;
        None
    }

    /// Load a raw text resource.
    fn unparsed_text(&self, uri: &str) -> Option<String> {
        let _ = uri;
        None
    }

    /// Source text of a library module. Defaults to the text loader.
    fn module_source(&self, uri: &str) -> Option<String> {
        self.unparsed_text(uri)
    }
}

pub struct Document {
    tags: Vec<Rc<Tag>>,
    /// Absolute URI or path of the document, when known.
    pub path: Option<String>,
    prefixes: RefCell<HashMap<String, u32>>,
    ns_registry: RefCell<HashMap<u32, String>>,
    map: RefCell<Option<HashMap<i32, Rc<Tag>>>>,
    order: RefCell<Option<HashMap<i32, usize>>>,
    variables: RefCell<HashMap<String, String>>,
    error_msg: RefCell<Option<String>>,
    resolver: RefCell<Option<Rc<dyn ResourceResolver>>>,
    document_cache: RefCell<HashMap<String, Rc<Document>>>,
    text_cache: RefCell<HashMap<String, String>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("tags", &self.tags.len())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Document {
    #[must_use]
    pub fn new(tags: Vec<Rc<Tag>>) -> Self {
        let mut doc = Self::empty();
        doc.tags = tags;
        doc
    }

    #[must_use]
    pub fn empty() -> Self {
        let mut prefixes = HashMap::new();
        let mut registry = HashMap::new();
        // The xml prefix is predefined and cannot be redeclared.
        let xml_hash = str_hash(XML_NAMESPACE_URI);
        prefixes.insert("xml".to_string(), xml_hash);
        registry.insert(xml_hash, XML_NAMESPACE_URI.to_string());
        Self {
            tags: Vec::new(),
            path: None,
            prefixes: RefCell::new(prefixes),
            ns_registry: RefCell::new(registry),
            map: RefCell::new(None),
            order: RefCell::new(None),
            variables: RefCell::new(HashMap::new()),
            error_msg: RefCell::new(None),
            resolver: RefCell::new(None),
            document_cache: RefCell::new(HashMap::new()),
            text_cache: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn tags(&self) -> &[Rc<Tag>] {
        &self.tags
    }

    /// Replace the top-level tag list, invalidating the lazy maps.
    pub fn set_tags(&mut self, tags: Vec<Rc<Tag>>) {
        self.tags = tags;
        self.invalidate_map();
    }

    /// Mark the ID map stale; it is rebuilt on next access.
    pub fn invalidate_map(&self) {
        *self.map.borrow_mut() = None;
        *self.order.borrow_mut() = None;
    }

    fn ensure_maps(&self) {
        if self.map.borrow().is_some() {
            return;
        }
        let mut map = HashMap::new();
        let mut order = HashMap::new();
        fn walk(
            tag: &Rc<Tag>,
            map: &mut HashMap<i32, Rc<Tag>>,
            order: &mut HashMap<i32, usize>,
            counter: &mut usize,
        ) {
            map.insert(tag.id, Rc::clone(tag));
            order.insert(tag.id, *counter);
            *counter += 1;
            for child in &tag.children {
                walk(child, map, order, counter);
            }
        }
        let mut counter = 0usize;
        for tag in &self.tags {
            walk(tag, &mut map, &mut order, &mut counter);
        }
        *self.map.borrow_mut() = Some(map);
        *self.order.borrow_mut() = Some(order);
    }

    /// Look up a tag by ID. The map is rebuilt lazily after invalidation.
    #[must_use]
    pub fn find_tag(&self, id: i32) -> Option<Rc<Tag>> {
        self.ensure_maps();
        self.map.borrow().as_ref().and_then(|m| m.get(&id).cloned())
    }

    /// Preorder position of a tag within the document, used for document-order
    /// sorting. Unknown IDs (constructed nodes) return `None`.
    #[must_use]
    pub fn order_of(&self, id: i32) -> Option<usize> {
        self.ensure_maps();
        self.order.borrow().as_ref().and_then(|m| m.get(&id).copied())
    }

    #[must_use]
    pub fn parent_of(&self, tag: &Tag) -> Option<Rc<Tag>> {
        if tag.parent_id == 0 { None } else { self.find_tag(tag.parent_id) }
    }

    /// Register a namespace URI, returning its hash. Idempotent.
    pub fn register_namespace(&self, uri: &str) -> u32 {
        let hash = str_hash(uri);
        self.ns_registry.borrow_mut().entry(hash).or_insert_with(|| uri.to_string());
        hash
    }

    #[must_use]
    pub fn namespace_uri(&self, hash: u32) -> Option<String> {
        self.ns_registry.borrow().get(&hash).cloned()
    }

    /// Bind a prefix to a namespace URI at document scope.
    pub fn register_prefix(&self, prefix: &str, uri: &str) -> u32 {
        let hash = self.register_namespace(uri);
        if prefix != "xml" {
            self.prefixes.borrow_mut().insert(prefix.to_string(), hash);
        }
        hash
    }

    /// Document-scope prefix lookup. Returns the most recently bound URI hash.
    #[must_use]
    pub fn prefix_hash(&self, prefix: &str) -> Option<u32> {
        self.prefixes.borrow().get(prefix).copied()
    }

    /// Resolve a prefix in the scope of a tag by walking ancestor `xmlns`
    /// declarations, falling back to the document-scope bindings.
    #[must_use]
    pub fn resolve_prefix(&self, prefix: &str, tag_id: i32) -> Option<u32> {
        let target = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        let mut current = self.find_tag(tag_id);
        while let Some(tag) = current {
            for (_, attrib) in tag.attributes() {
                if attrib.name == target {
                    return Some(self.register_namespace(&attrib.value));
                }
            }
            current = self.parent_of(&tag);
        }
        if prefix.is_empty() { None } else { self.prefix_hash(prefix) }
    }

    pub fn set_variable(&self, name: &str, value: &str) {
        self.variables.borrow_mut().insert(name.to_string(), value.to_string());
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn set_error_msg(&self, message: &str) {
        *self.error_msg.borrow_mut() = Some(message.to_string());
    }

    #[must_use]
    pub fn error_msg(&self) -> Option<String> {
        self.error_msg.borrow().clone()
    }

    pub fn clear_error_msg(&self) {
        *self.error_msg.borrow_mut() = None;
    }

    pub fn set_resolver(&self, resolver: Rc<dyn ResourceResolver>) {
        *self.resolver.borrow_mut() = Some(resolver);
    }

    #[must_use]
    pub fn resolver(&self) -> Option<Rc<dyn ResourceResolver>> {
        self.resolver.borrow().clone()
    }

    /// Fetch a document through the cache, loading it on first use.
    #[must_use]
    pub fn cached_document(&self, uri: &str) -> Option<Rc<Document>> {
        let key = normalize_uri(uri);
        if let Some(existing) = self.document_cache.borrow().get(&key) {
            return Some(Rc::clone(existing));
        }
        let loaded = self.resolver()?.document(uri)?;
        self.document_cache.borrow_mut().insert(key, Rc::clone(&loaded));
        Some(loaded)
    }

    /// Fetch an unparsed text resource through the cache.
    #[must_use]
    pub fn cached_text(&self, uri: &str) -> Option<String> {
        let key = normalize_uri(uri);
        if let Some(existing) = self.text_cache.borrow().get(&key) {
            return Some(existing.clone());
        }
        let loaded = self.resolver()?.unparsed_text(uri)?;
        self.text_cache.borrow_mut().insert(key, loaded.clone());
        Some(loaded)
    }

    /// Directory portion of the document path, used by the default collection.
    #[must_use]
    pub fn directory(&self) -> Option<String> {
        let path = self.path.as_deref()?;
        let normalised = normalize_uri(path);
        normalised.rfind('/').map(|idx| normalised[..=idx].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{doc, elem, text};

    #[test]
    fn str_hash_is_stable_and_nonzero() {
        assert_eq!(str_hash("urn:example"), str_hash("urn:example"));
        assert_ne!(str_hash("urn:example"), str_hash("urn:other"));
        assert_ne!(str_hash(""), 0);
    }

    #[rstest::rstest]
    #[case("file:data\\books.xml", "data/books.xml")]
    #[case("file:///tmp/a.xml", "/tmp/a.xml")]
    #[case("docs/a.xml", "docs/a.xml")]
    #[case("a\\b\\c.xml", "a/b/c.xml")]
    fn normalize_uri_strips_scheme_and_backslashes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_uri(input), expected);
    }

    #[test]
    fn id_map_is_rebuilt_after_invalidation() {
        let document = doc().child(elem("root").child(elem("a").child(text("x")))).build();
        let root = document.find_tag(1).expect("root present");
        assert_eq!(root.local_name(), Some("root"));
        document.invalidate_map();
        assert!(document.find_tag(1).is_some());
    }

    #[test]
    fn order_follows_preorder_walk() {
        let document = doc()
            .child(elem("root").child(elem("a")).child(elem("b").child(text("t"))))
            .build();
        let ids: Vec<i32> = (1..=4).collect();
        let mut positions: Vec<usize> =
            ids.iter().map(|id| document.order_of(*id).unwrap()).collect();
        let sorted = positions.clone();
        positions.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn resolve_prefix_walks_ancestors() {
        let document = doc()
            .child(
                elem("root")
                    .attr("xmlns:bk", "urn:books")
                    .child(elem("bk:title").child(text("A"))),
            )
            .build();
        let title = document.find_tag(2).expect("title");
        let hash = document.resolve_prefix("bk", title.id).expect("bound");
        assert_eq!(document.namespace_uri(hash).as_deref(), Some("urn:books"));
    }
}
