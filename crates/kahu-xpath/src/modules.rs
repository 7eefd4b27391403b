//! Library-module cache.
//!
//! Maps normalised URIs to compiled library queries. In-flight loads are
//! tracked so circular import chains fail with XQDY0054 instead of
//! recursing forever.

use crate::error::Error;
use crate::CompiledQuery;
use kahu_xml::{normalize_uri, ResourceResolver};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: HashMap<String, Rc<CompiledQuery>>,
    in_flight: HashSet<String>,
}

impl ModuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, target_namespace: &str) -> Option<Rc<CompiledQuery>> {
        self.entries.get(&normalize_uri(target_namespace)).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load (or fetch from cache) the library module for `target_namespace`.
///
/// Loading compiles the module source against the same shared cache so that
/// transitive imports resolve through one entry set, then eagerly loads the
/// module's own imports to surface circular chains at the point of entry.
pub fn load_module(
    cache: &Rc<RefCell<ModuleCache>>,
    target_namespace: &str,
    location_hints: &[String],
    resolver: Option<&Rc<dyn ResourceResolver>>,
) -> Result<Rc<CompiledQuery>, Error> {
    let key = normalize_uri(target_namespace);

    {
        let state = cache.borrow();
        if let Some(existing) = state.entries.get(&key) {
            return Ok(Rc::clone(existing));
        }
        if state.in_flight.contains(&key) {
            return Err(Error::module(
                "XQDY0054",
                format!("circular import of module '{target_namespace}'"),
            ));
        }
    }

    let Some(resolver) = resolver else {
        return Err(Error::module(
            "XQST0059",
            format!("no resource loader available for module '{target_namespace}'"),
        ));
    };

    cache.borrow_mut().in_flight.insert(key.clone());
    let result = load_uncached(cache, target_namespace, location_hints, resolver);
    cache.borrow_mut().in_flight.remove(&key);

    let compiled = result?;
    cache.borrow_mut().entries.insert(key, Rc::clone(&compiled));
    Ok(compiled)
}

fn load_uncached(
    cache: &Rc<RefCell<ModuleCache>>,
    target_namespace: &str,
    location_hints: &[String],
    resolver: &Rc<dyn ResourceResolver>,
) -> Result<Rc<CompiledQuery>, Error> {
    let mut source = None;
    for hint in location_hints {
        if let Some(text) = resolver.module_source(hint) {
            source = Some(text);
            break;
        }
    }
    if source.is_none() {
        source = resolver.module_source(target_namespace);
    }
    let Some(source) = source else {
        return Err(Error::module(
            "XQST0059",
            format!("unable to load module '{target_namespace}'"),
        ));
    };

    tracing::debug!(target: "kahu_xpath::modules", uri = target_namespace, "compiling library module");

    let compiled = crate::compile_with_cache(&source, Some(Rc::clone(cache))).map_err(|errors| {
        Error::module(
            "XQST0059",
            format!("module '{target_namespace}' failed to compile: {}", errors.join("; ")),
        )
    })?;

    if !compiled.prolog.is_library_module {
        return Err(Error::module(
            "XQST0059",
            format!("resource '{target_namespace}' is a main module, not a library"),
        ));
    }
    if compiled.prolog.module_namespace_uri.as_deref() != Some(target_namespace) {
        return Err(Error::module(
            "XQST0059",
            format!(
                "module declares namespace '{}', import expected '{target_namespace}'",
                compiled.prolog.module_namespace_uri.as_deref().unwrap_or("")
            ),
        ));
    }
    if let Some(offender) = compiled.prolog.validate_exports() {
        return Err(Error::module(
            "XQST0048",
            format!("declaration '{offender}' is outside the module namespace"),
        ));
    }

    let compiled = Rc::new(compiled);

    // Surface circular chains now rather than on first function call.
    for import in &compiled.prolog.module_imports {
        load_module(cache, &import.target_namespace, &import.location_hints, Some(resolver))?;
    }

    Ok(compiled)
}
