//! Identifier resolution between external CURIEs/URIs and knowledge-base ids.
//!
//! The resolver owns the only authoritative copy of the mapping for the
//! duration of a run. It is seeded once by bulk queries (the store has no
//! other index from external key to entity id) and extended in place as the
//! synchronizers create entities — never re-queried mid-run, which is what
//! makes read-after-write against the eventually-consistent query endpoint a
//! non-issue for ordinary creations.
//!
//! Properties and items live in separate namespaces: property keys are
//! canonical URIs, item keys are CURIEs. A key colliding across the two is
//! harmless.

use std::collections::HashMap;

use crate::model::{ItemId, KbId, PropertyId};

/// Bidirectional CURIE/URI ↔ knowledge-base id map.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    properties: HashMap<String, PropertyId>,
    items: HashMap<String, ItemId>,
    // Inverse direction, maintained in lockstep for the exporter.
    property_keys: HashMap<PropertyId, String>,
    item_keys: HashMap<ItemId, String>,
}

impl IdentifierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the property map from a bulk `URI → id` query result.
    pub fn seed_properties<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, PropertyId)>,
    {
        for (uri, pid) in entries {
            self.register_property(uri, pid);
        }
    }

    /// Seed the item map from a bulk cross-reference query result. The query
    /// returns both properties and items (properties carry cross-references
    /// too); only item ids land here — property resolution is URI-keyed.
    pub fn seed_items<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, KbId)>,
    {
        for (curie, id) in entries {
            if let KbId::Item(qid) = id {
                self.register_item(curie, qid);
            }
        }
    }

    pub fn resolve_property(&self, uri: &str) -> Option<&PropertyId> {
        self.properties.get(uri)
    }

    pub fn resolve_item(&self, curie: &str) -> Option<&ItemId> {
        self.items.get(curie)
    }

    /// Inverse lookup: the canonical URI a property was registered under.
    pub fn uri_of(&self, pid: &PropertyId) -> Option<&str> {
        self.property_keys.get(pid).map(String::as_str)
    }

    /// Inverse lookup: the CURIE an item was registered under.
    pub fn curie_of(&self, qid: &ItemId) -> Option<&str> {
        self.item_keys.get(qid).map(String::as_str)
    }

    pub fn register_property(&mut self, uri: impl Into<String>, pid: PropertyId) {
        let uri = uri.into();
        self.property_keys.insert(pid.clone(), uri.clone());
        self.properties.insert(uri, pid);
    }

    pub fn register_item(&mut self, curie: impl Into<String>, qid: ItemId) {
        let curie = curie.into();
        self.item_keys.insert(qid.clone(), curie.clone());
        self.items.insert(curie, qid);
    }

    /// Look up a property, invoking `factory` and registering its result if
    /// absent. The factory runs at most once per key; on success the second
    /// tuple field reports whether a creation happened.
    pub fn get_or_create_property<E>(
        &mut self,
        uri: &str,
        factory: impl FnOnce() -> Result<PropertyId, E>,
    ) -> Result<(PropertyId, bool), E> {
        if let Some(pid) = self.properties.get(uri) {
            return Ok((pid.clone(), false));
        }
        let pid = factory()?;
        self.register_property(uri, pid.clone());
        Ok((pid, true))
    }

    /// Item counterpart of [`get_or_create_property`](Self::get_or_create_property).
    pub fn get_or_create_item<E>(
        &mut self,
        curie: &str,
        factory: impl FnOnce() -> Result<ItemId, E>,
    ) -> Result<(ItemId, bool), E> {
        if let Some(qid) = self.items.get(curie) {
            return Ok((qid.clone(), false));
        }
        let qid = factory()?;
        self.register_item(curie, qid.clone());
        Ok((qid, true))
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Iterate all `(curie, item id)` pairs, for export enumeration.
    pub fn items(&self) -> impl Iterator<Item = (&str, &ItemId)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_invokes_factory_once() {
        let mut resolver = IdentifierResolver::new();
        let mut calls = 0;
        let (pid, created) = resolver
            .get_or_create_property::<()>("http://example.org/p", || {
                calls += 1;
                Ok(PropertyId("P5".into()))
            })
            .unwrap();
        assert!(created);
        assert_eq!(pid.as_str(), "P5");

        let (pid, created) = resolver
            .get_or_create_property::<()>("http://example.org/p", || {
                calls += 1;
                Ok(PropertyId("P6".into()))
            })
            .unwrap();
        assert!(!created);
        assert_eq!(pid.as_str(), "P5");
        assert_eq!(calls, 1);
    }

    #[test]
    fn factory_error_leaves_resolver_unchanged() {
        let mut resolver = IdentifierResolver::new();
        let result = resolver.get_or_create_item("GO:1", || Err("down"));
        assert!(result.is_err());
        assert!(resolver.resolve_item("GO:1").is_none());
        assert_eq!(resolver.item_count(), 0);
    }

    #[test]
    fn namespaces_are_independent() {
        let mut resolver = IdentifierResolver::new();
        resolver.register_property("skos:exactMatch", PropertyId("P3".into()));
        resolver.register_item("skos:exactMatch", ItemId("Q3".into()));
        assert_eq!(
            resolver.resolve_property("skos:exactMatch").unwrap().as_str(),
            "P3"
        );
        assert_eq!(
            resolver.resolve_item("skos:exactMatch").unwrap().as_str(),
            "Q3"
        );
    }

    #[test]
    fn seed_items_ignores_property_entries() {
        let mut resolver = IdentifierResolver::new();
        resolver.seed_items(vec![
            ("GO:1".to_string(), KbId::Item(ItemId("Q1".into()))),
            (
                "oboInOwl:DbXref".to_string(),
                KbId::Property(PropertyId("P2".into())),
            ),
        ]);
        assert_eq!(resolver.item_count(), 1);
        assert!(resolver.resolve_item("oboInOwl:DbXref").is_none());
    }

    #[test]
    fn inverse_lookups_follow_registration() {
        let mut resolver = IdentifierResolver::new();
        resolver.register_item("GO:1", ItemId("Q1".into()));
        assert_eq!(resolver.curie_of(&ItemId("Q1".into())), Some("GO:1"));
        resolver.register_property("http://type", PropertyId("P9".into()));
        assert_eq!(
            resolver.uri_of(&PropertyId("P9".into())),
            Some("http://type")
        );
    }
}
