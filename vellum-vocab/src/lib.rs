//! Reserved Names and Request Vocabulary for Vellum DB
//!
//! This crate provides a centralized location for the reserved field names,
//! aggregate names, and commit-selection constants shared between the query
//! mapper (producer) and the execution/render layers (consumers).
//!
//! # Organization
//!
//! Constants are organized by concern:
//! - `fields` - built-in document fields (`_key`, `_group`, `__typename`)
//! - `aggregates` - the aggregate name set (`_count`, `_sum`, `_avg`)
//! - `commit` - commit-selection field sets and argument names
//! - `mutation` - mutation argument names

/// Built-in document field names
pub mod fields {
    /// The document-key field. Present at index 0 of every non-commit,
    /// non-aggregate top-level select.
    pub const DOC_KEY: &str = "_key";

    /// The group field materialized by group-by queries.
    pub const GROUP: &str = "_group";

    /// The introspection type-name field.
    pub const TYPE_NAME: &str = "__typename";

    /// Prefix marking operator keys inside filter trees.
    ///
    /// Keys starting with this prefix are operators, with the single
    /// exception of [`DOC_KEY`], which is a property despite its leading
    /// underscore.
    pub const OPERATOR_PREFIX: char = '_';
}

/// Aggregate field names
pub mod aggregates {
    /// Count aggregate.
    pub const COUNT: &str = "_count";

    /// Sum aggregate.
    pub const SUM: &str = "_sum";

    /// Average aggregate. Composite: depends on [`COUNT`] and [`SUM`].
    pub const AVERAGE: &str = "_avg";

    /// All aggregate names recognized by the mapper.
    pub const ALL: [&str; 3] = [COUNT, SUM, AVERAGE];

    /// Returns true if `name` is a recognized aggregate name.
    pub fn is_aggregate(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Commit-selection constants
pub mod commit {
    /// Type name recorded on version commit mappings.
    pub const TYPE_NAME: &str = "Commit";

    /// The links field of a commit document.
    pub const LINKS_FIELD: &str = "links";

    /// Sub-fields of the links field, in their fixed index order.
    pub const LINKS_FIELDS: [&str; 2] = ["name", "cid"];

    /// Fields of a version commit document, in their fixed index order.
    pub const VERSION_FIELDS: [&str; 3] = ["height", "cid", "delta"];

    /// Commit select argument: the targeted document key.
    pub const DOC_KEY_ARG: &str = "dockey";

    /// Commit select argument: the targeted field name.
    pub const FIELD_ARG: &str = "field";

    /// Commit select argument: traversal depth.
    pub const DEPTH_ARG: &str = "depth";

    /// Commit select argument: a specific commit content id.
    pub const CID_ARG: &str = "cid";
}

/// Mutation constants
pub mod mutation {
    /// Mutation argument carrying the raw document payload.
    pub const DATA_ARG: &str = "data";
}

/// Aggregate target argument names
pub mod target {
    /// The sub-property of the host to aggregate.
    pub const FIELD: &str = "field";

    /// A filter restricting the aggregated set.
    pub const FILTER: &str = "filter";

    /// Maximum number of items to aggregate.
    pub const LIMIT: &str = "limit";

    /// Number of items to skip before aggregating.
    pub const OFFSET: &str = "offset";

    /// The order in which items are aggregated (affects limited
    /// aggregations).
    pub const ORDER: &str = "order";
}
