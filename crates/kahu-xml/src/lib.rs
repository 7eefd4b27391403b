//! In-memory XML tree model consumed by the kahu XPath/XQuery engine.
//!
//! The tree is produced by a host-side parser or assembled programmatically
//! with the [`builder`] API. Nodes are shared as `Rc<Tag>`; the engine only
//! ever reads them. Documents carry the namespace registry, the lazily
//! rebuilt ID map and the resource caches used by `doc()`/`collection()`.

pub mod builder;
pub mod document;
pub mod node;

pub use builder::{DocumentBuilder, TagBuilder, cdata, comment, doc, elem, pi, text};
pub use document::{Document, ResourceResolver, normalize_uri, str_hash};
pub use node::{Attribute, Tag, TagFlags};
