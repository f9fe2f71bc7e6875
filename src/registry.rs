//! Name to spec lookup.
//!
//! Every top-level object, and every [object slot][crate::spec::Structure::Object], is decoded by
//! looking up the name it carries. The codec only depends on the [`SchemaLookup`] trait; the
//! catalog of concrete schemas is supplied by whoever builds the registry, once, before decoding
//! anything.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::spec::Spec;

/// Resolves an object name to the spec that decodes it.
pub trait SchemaLookup {
    fn lookup(&self, name: &str) -> Option<Arc<Spec>>;
}

/// A fixed table of named specs.
///
/// ```
/// # use krds_pack::{Kind, Registry, SchemaLookup, spec::*};
/// let registry = Registry::new()
///     .add("sync_lpr", Spec::basic(Kind::Bool))
///     .add("font.prefs", RecordSpec::new().req_add("font", Spec::basic(Kind::Utf8)).build());
/// assert!(registry.lookup("sync_lpr").is_some());
/// assert!(registry.lookup("nope").is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Registry {
    specs: HashMap<String, Arc<Spec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named spec. A name that is already registered is replaced.
    pub fn add(mut self, name: impl Into<String>, spec: impl Into<Arc<Spec>>) -> Self {
        self.insert(name, spec);
        self
    }

    /// Add a named spec, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        spec: impl Into<Arc<Spec>>,
    ) -> Option<Arc<Spec>> {
        let name = name.into();
        let spec = spec.into();
        debug!("registering schema `{}` as {}", name, spec.describe());
        self.specs.insert(name, spec)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

impl SchemaLookup for Registry {
    fn lookup(&self, name: &str) -> Option<Arc<Spec>> {
        self.specs.get(name).cloned()
    }
}

impl SchemaLookup for HashMap<String, Arc<Spec>> {
    fn lookup(&self, name: &str) -> Option<Arc<Spec>> {
        self.get(name).cloned()
    }
}

impl<T: SchemaLookup + ?Sized> SchemaLookup for &T {
    fn lookup(&self, name: &str) -> Option<Arc<Spec>> {
        (**self).lookup(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::marker::Kind;

    #[test]
    fn shared_by_reference() {
        let shared = Arc::new(Spec::position());
        let registry = Registry::new()
            .add("a", shared.clone())
            .add("b", shared.clone());
        let a = registry.lookup("a").unwrap();
        let b = registry.lookup("b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &shared));
    }

    #[test]
    fn replace() {
        let mut registry = Registry::new().add("x", Spec::basic(Kind::Int));
        let old = registry.insert("x", Spec::basic(Kind::Long)).unwrap();
        assert!(matches!(*old, Spec::Basic(Kind::Int)));
        assert_eq!(registry.len(), 1);
        assert!(matches!(*registry.lookup("x").unwrap(), Spec::Basic(Kind::Long)));
    }

    #[test]
    fn plain_map_lookup() {
        let mut map: HashMap<String, Arc<Spec>> = HashMap::new();
        map.insert(String::from("k"), Arc::new(Spec::dynamic_map()));
        let lookup: &dyn SchemaLookup = &map;
        assert!(lookup.lookup("k").is_some());
    }
}
