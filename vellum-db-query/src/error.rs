//! Error types for query mapping

use thiserror::Error;

/// Errors produced while mapping a parsed request into an execution plan.
///
/// All of these abort the mapping of the whole request: the mapper returns
/// either a complete plan or an error, never a partial plan.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Schema lookup of a required collection name failed
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// An aggregate was requested without a target property
    #[error("Aggregate must be provided with a property to aggregate")]
    AggregateTargetMissing,

    /// An aggregate child was requested on a host that is not selectable
    #[error("Aggregate target host must be selectable, but was not: {0}")]
    AggregateHostNotSelectable(String),

    /// An aggregate named a child property absent from the host mapping
    #[error("Unable to identify aggregate child: {0}")]
    AggregateChildNotFound(String),

    /// A parsed child was of neither a field nor a select variant
    #[error("Unexpected requestable kind: {0}")]
    UnexpectedRequestableKind(String),

    /// A limit, offset, or order argument could not be parsed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A filter could not be evaluated
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Error from vellum-db-core (e.g. a catalog read failure)
    #[error("Core error: {0}")]
    Core(#[from] vellum_db_core::Error),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for query mapping operations
pub type Result<T> = std::result::Result<T, QueryError>;
