//! Descriptor registry.

use crate::schema::descriptor::{Attribute, Descriptor, FieldMap};
use std::collections::{BTreeMap, BTreeSet};

/// Model name to field descriptors.
///
/// Owned by one registrar; tests construct their own. Every model's map
/// contains the default id attribute, and [`add`](Self::add) merges field
/// by field over what is already there.
#[derive(Debug, Clone)]
pub struct DescriptorRegistry {
    id_attribute: String,
    entries: BTreeMap<String, FieldMap>,
    added: BTreeSet<String>,
}

impl DescriptorRegistry {
    /// Creates an empty registry whose default id attribute is `id_attribute`.
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            entries: BTreeMap::new(),
            added: BTreeSet::new(),
        }
    }

    fn seed(&self) -> FieldMap {
        FieldMap::from([(
            self.id_attribute.clone(),
            Descriptor::Attribute(Attribute::new()),
        )])
    }

    /// Returns the descriptors for `model`, seeding the default id
    /// attribute for a model seen for the first time.
    pub fn get(&mut self, model: &str) -> &FieldMap {
        let seed = self.seed();
        self.entries.entry(model.to_string()).or_insert(seed)
    }

    /// Merges descriptors into `model`'s map.
    pub fn add<K, D>(&mut self, model: &str, descriptors: impl IntoIterator<Item = (K, D)>)
    where
        K: Into<String>,
        D: Into<Descriptor>,
    {
        let seed = self.seed();
        let fields = self.entries.entry(model.to_string()).or_insert(seed);
        for (name, descriptor) in descriptors {
            fields.insert(name.into(), descriptor.into());
        }
        self.added.insert(model.to_string());
    }

    /// Descriptors added for `model`, if any were.
    ///
    /// A model that was only looked up through [`get`](Self::get) has no
    /// entries of its own.
    pub fn entries(&self, model: &str) -> Option<&FieldMap> {
        if self.added.contains(model) {
            self.entries.get(model)
        } else {
            None
        }
    }

    /// Models with added descriptors.
    pub fn models(&self) -> impl Iterator<Item = &str> + '_ {
        self.added.iter().map(String::as_str)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.added.clear();
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new("id")
    }
}
