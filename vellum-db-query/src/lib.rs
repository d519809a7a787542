//! # Vellum DB Query
//!
//! Query mapper for Vellum DB.
//!
//! This crate translates a parsed, consumer-facing selection tree (fields,
//! filters, ordering, grouping, limits, aggregates, commit and mutation
//! wrappers) into an index-addressed plan for the execution engine:
//!
//! - Every field, join, and aggregate in the output is identified by a
//!   stable positional index inside a
//!   [`DocumentMapping`](vellum_db_core::DocumentMapping)
//! - Fields needed by filters, ordering, or composite aggregates but not
//!   requested by the consumer are synthesized as render-less joins
//! - Newly requested aggregates are matched against compatible existing
//!   targets to avoid redundant joins
//!
//! ## Quick Start
//!
//! Build an [`UnresolvedSelect`], then call [`to_select`] with a
//! [`SchemaCatalog`](vellum_db_core::SchemaCatalog) to obtain the mapped
//! [`Select`].

pub mod aggregate;
pub mod ast;
pub mod descriptions;
pub mod error;
pub mod filter;
pub mod ir;
pub mod lower;

// Re-exports
pub use ast::{
    MutationKind, SelectionRoot, UnresolvedArgument, UnresolvedCommitSelect, UnresolvedField,
    UnresolvedFilter, UnresolvedGroupBy, UnresolvedMutation, UnresolvedOrderBy,
    UnresolvedOrderCondition, UnresolvedRequestable, UnresolvedSelect,
};
pub use descriptions::DescriptionsRepo;
pub use error::{QueryError, Result};
pub use filter::{conditions_equal, run_filter, to_filter, Filter, FilterKey, FilterValue};
pub use ir::{
    Aggregate, AggregateTarget, ChildTarget, CommitSelect, Field, GroupBy, Limit, Mutation,
    OrderBy, OrderCondition, Requestable, Select, SortDirection, Targetable,
};
pub use lower::{to_commit_select, to_mutation, to_select, TOP_LEVEL_COLLECTION};
