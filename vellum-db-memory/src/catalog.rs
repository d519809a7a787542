//! In-memory schema catalog.

use std::collections::HashMap;

use vellum_db_core::{CollectionDescription, Error, Result, SchemaCatalog};

/// An in-memory [`SchemaCatalog`].
///
/// Collections are registered up front with [`MemoryCatalog::insert`] or
/// [`MemoryCatalog::with_collection`]; lookups are read-only afterwards, so
/// a populated catalog may be shared freely across threads.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    collections: HashMap<String, CollectionDescription>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection, replacing any existing one of the same name.
    pub fn insert(&mut self, description: CollectionDescription) {
        self.collections
            .insert(description.name.clone(), description);
    }

    /// Builder-style [`Self::insert`].
    pub fn with_collection(mut self, description: CollectionDescription) -> Self {
        self.insert(description);
        self
    }

    /// Number of registered collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Returns true if no collections are registered.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

impl SchemaCatalog for MemoryCatalog {
    fn collection(&self, name: &str) -> Result<CollectionDescription> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("collection: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_db_core::FieldDescription;

    #[test]
    fn test_lookup() {
        let catalog = MemoryCatalog::new().with_collection(CollectionDescription::new(
            "users",
            vec![FieldDescription::scalar(1, "name")],
        ));

        let desc = catalog.collection("users").unwrap();
        assert_eq!(desc.name, "users");
        assert!(desc.get_field("name").is_some());

        let err = catalog.collection("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
