//! Per-request collection description cache
//!
//! A single mapping traverses the same collection once per relation touched
//! (selection, filter dependency, order dependency, aggregate host), so
//! catalog lookups are memoised for the duration of one request. The cache
//! never outlives the request: a fresh repo is created per mapper entry
//! point.

use std::collections::HashMap;

use tracing::trace;
use vellum_db_core::{CollectionDescription, Error, SchemaCatalog};

use crate::error::{QueryError, Result};

/// Memoising wrapper over a [`SchemaCatalog`], scoped to one request.
pub struct DescriptionsRepo<'a> {
    catalog: &'a dyn SchemaCatalog,
    cache: HashMap<String, CollectionDescription>,
}

impl<'a> DescriptionsRepo<'a> {
    /// Create a repo reading from `catalog`.
    pub fn new(catalog: &'a dyn SchemaCatalog) -> Self {
        Self {
            catalog,
            cache: HashMap::new(),
        }
    }

    /// Resolve a collection description, consulting the catalog at most
    /// once per name.
    pub fn collection(&mut self, name: &str) -> Result<CollectionDescription> {
        if let Some(description) = self.cache.get(name) {
            return Ok(description.clone());
        }

        trace!(collection = name, "catalog lookup");
        let description = self.catalog.collection(name).map_err(|err| match err {
            Error::NotFound(_) => QueryError::UnknownCollection(name.to_string()),
            other => QueryError::Core(other),
        })?;

        self.cache.insert(name.to_string(), description.clone());
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use vellum_db_core::FieldDescription;

    struct CountingCatalog {
        lookups: Cell<usize>,
    }

    impl SchemaCatalog for CountingCatalog {
        fn collection(&self, name: &str) -> vellum_db_core::Result<CollectionDescription> {
            self.lookups.set(self.lookups.get() + 1);
            if name == "users" {
                Ok(CollectionDescription::new(
                    "users",
                    vec![FieldDescription::scalar(1, "name")],
                ))
            } else {
                Err(Error::not_found(format!("collection: {name}")))
            }
        }
    }

    #[test]
    fn test_lookups_are_memoised() {
        let catalog = CountingCatalog {
            lookups: Cell::new(0),
        };
        let mut repo = DescriptionsRepo::new(&catalog);

        repo.collection("users").unwrap();
        repo.collection("users").unwrap();
        repo.collection("users").unwrap();

        assert_eq!(catalog.lookups.get(), 1);
    }

    #[test]
    fn test_missing_collection_maps_to_unknown_collection() {
        let catalog = CountingCatalog {
            lookups: Cell::new(0),
        };
        let mut repo = DescriptionsRepo::new(&catalog);

        let err = repo.collection("ghosts").unwrap_err();
        assert!(matches!(err, QueryError::UnknownCollection(name) if name == "ghosts"));
    }
}
