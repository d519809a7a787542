//! Schema catalog trait.
//!
//! The query mapper resolves collection names against a [`SchemaCatalog`].
//! Implementations may read from a storage transaction, a remote source, or
//! an in-memory table (see the `vellum-db-memory` crate).

use crate::error::Result;
use crate::schema::CollectionDescription;

/// Read access to the collections known to a database instance.
///
/// # Concurrency
///
/// The mapper may be invoked from many threads at once, each call holding a
/// shared reference to the catalog: implementations must be safe for
/// concurrent readers. Lookups may fail (e.g. a storage read error); the
/// mapper propagates such failures without producing a partial plan.
pub trait SchemaCatalog {
    /// Resolve a collection by name.
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) if no collection
    /// with that name exists.
    fn collection(&self, name: &str) -> Result<CollectionDescription>;
}
