//! # Vellum DB Core
//!
//! Core shared types for Vellum DB.
//!
//! This crate provides:
//! - [`DocumentMapping`]: the index-addressed namespace underpinning every
//!   mapped plan
//! - Schema descriptions ([`CollectionDescription`], [`FieldDescription`])
//! - The [`SchemaCatalog`] read trait consulted during query mapping
//! - The core [`Error`] type

pub mod catalog;
pub mod doc;
pub mod error;
pub mod schema;

pub use catalog::SchemaCatalog;
pub use doc::{DocumentMapping, RenderKey, DOC_KEY_INDEX, UNMAPPED_INDEX};
pub use error::{Error, Result};
pub use schema::{
    CollectionDescription, FieldDescription, FieldKind, RelationKind, SchemaDescription,
};
