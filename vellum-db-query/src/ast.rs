//! Unresolved request types for query mapping
//!
//! These types represent the parsed, consumer-facing request before name
//! resolution: every field, filter key, and ordering path is still a name.
//! The mapper (`lower`) turns them into the index-addressed plan types of
//! [`crate::ir`]. They use `Arc<str>` for efficient string handling and
//! deduplication.
//!
//! The mapper treats the unresolved tree as borrowed and read-only; it is
//! never mutated.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ir::{Limit, SortDirection};

/// Which selection tree a select belongs to.
///
/// Commit selections resolve names against the fixed commit field sets
/// rather than a collection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionRoot {
    /// A regular object selection against a collection schema.
    #[default]
    Object,
    /// A commit selection (version history).
    Commit,
}

/// A consumer-requested scalar field (unresolved).
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedField {
    /// Field name as known to the consumer.
    pub name: Arc<str>,
    /// Output alias; equals the name when the consumer gave none.
    pub alias: Arc<str>,
}

impl UnresolvedField {
    /// Create a field request rendered under its own name.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name: Arc<str> = Arc::from(name.as_ref());
        Self {
            alias: name.clone(),
            name,
        }
    }

    /// Create a field request rendered under `alias`.
    pub fn with_alias(name: impl AsRef<str>, alias: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            alias: Arc::from(alias.as_ref()),
        }
    }
}

/// Anything that may appear in a selection set (unresolved).
#[derive(Debug, Clone, PartialEq)]
pub enum UnresolvedRequestable {
    /// A scalar field.
    Field(UnresolvedField),
    /// A sub-selection (relation, group, or aggregate).
    Select(Box<UnresolvedSelect>),
}

/// Name-keyed filter tree as written by the consumer.
///
/// Keys starting with `_` are operators (with the exception of the
/// document-key field); all other keys are property names. Values are kept
/// as raw JSON.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnresolvedFilter {
    /// The filter conditions, in document order.
    pub conditions: Map<String, Value>,
}

impl UnresolvedFilter {
    /// Create a filter from a condition map.
    pub fn new(conditions: Map<String, Value>) -> Self {
        Self { conditions }
    }

    /// Create a filter from a JSON value.
    ///
    /// Non-object values yield an empty filter.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(conditions) => Self { conditions },
            _ => Self::default(),
        }
    }

    /// Returns true if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// One unresolved ordering condition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedOrderCondition {
    /// Dot-delimited path (`a.b.c`) from the select scope to the ordered
    /// field. Empty for inline-array direction-only ordering.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl UnresolvedOrderCondition {
    /// Create an ordering condition on `field`.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Unresolved ordering clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnresolvedOrderBy {
    /// Conditions in priority order.
    pub conditions: Vec<UnresolvedOrderCondition>,
}

/// Unresolved group-by clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnresolvedGroupBy {
    /// Names of the fields to group by.
    pub fields: Vec<String>,
}

/// A raw argument attached to an aggregate selection.
///
/// The value is kept as raw JSON: either a string naming the host property,
/// or an object carrying `field`/`filter`/`limit`/`offset`/`order`
/// sub-arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedArgument {
    /// Argument name.
    pub name: Arc<str>,
    /// Raw argument value.
    pub value: Value,
}

impl UnresolvedArgument {
    /// Create a new argument.
    pub fn new(name: impl AsRef<str>, value: Value) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            value,
        }
    }
}

/// A parsed selection (unresolved).
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSelect {
    /// Selection name: a collection, relation field, group field, or
    /// aggregate name.
    pub name: Arc<str>,
    /// Output alias; equals the name when the consumer gave none.
    pub alias: Arc<str>,
    /// Which selection tree this select belongs to.
    pub root: SelectionRoot,
    /// Content id pinning the select to a specific version, if any.
    pub cid: Option<String>,
    /// Document keys restricting the selected set, if any.
    pub doc_keys: Option<Vec<String>>,
    /// The requested children.
    pub fields: Vec<UnresolvedRequestable>,
    /// Filter over the selected set.
    pub filter: Option<UnresolvedFilter>,
    /// Limit/offset over the selected set.
    pub limit: Option<Limit>,
    /// Ordering of the selected set.
    pub order_by: Option<UnresolvedOrderBy>,
    /// Grouping of the selected set.
    pub group_by: Option<UnresolvedGroupBy>,
    /// Raw arguments (aggregate targets).
    pub arguments: Vec<UnresolvedArgument>,
}

impl UnresolvedSelect {
    /// Create an empty selection of `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name: Arc<str> = Arc::from(name.as_ref());
        Self {
            alias: name.clone(),
            name,
            root: SelectionRoot::default(),
            cid: None,
            doc_keys: None,
            fields: Vec::new(),
            filter: None,
            limit: None,
            order_by: None,
            group_by: None,
            arguments: Vec::new(),
        }
    }

    /// Set the output alias.
    pub fn with_alias(mut self, alias: impl AsRef<str>) -> Self {
        self.alias = Arc::from(alias.as_ref());
        self
    }

    /// Set the selection root.
    pub fn with_root(mut self, root: SelectionRoot) -> Self {
        self.root = root;
        self
    }

    /// Set the requested children.
    pub fn with_fields(mut self, fields: Vec<UnresolvedRequestable>) -> Self {
        self.fields = fields;
        self
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: UnresolvedFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the limit.
    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the ordering.
    pub fn with_order_by(mut self, order_by: UnresolvedOrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    /// Set the grouping.
    pub fn with_group_by(mut self, fields: Vec<String>) -> Self {
        self.group_by = Some(UnresolvedGroupBy { fields });
        self
    }

    /// Set the content id.
    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = Some(cid.into());
        self
    }

    /// Set the restricting document keys.
    pub fn with_doc_keys(mut self, doc_keys: Vec<String>) -> Self {
        self.doc_keys = Some(doc_keys);
        self
    }

    /// Set the raw arguments.
    pub fn with_arguments(mut self, arguments: Vec<UnresolvedArgument>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Add a field child.
    pub fn with_field(mut self, name: impl AsRef<str>) -> Self {
        self.fields
            .push(UnresolvedRequestable::Field(UnresolvedField::new(name)));
        self
    }

    /// Add a sub-select child.
    pub fn with_select(mut self, select: UnresolvedSelect) -> Self {
        self.fields
            .push(UnresolvedRequestable::Select(Box::new(select)));
        self
    }
}

/// A parsed commit selection (unresolved).
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedCommitSelect {
    /// Selection name.
    pub name: Arc<str>,
    /// Output alias.
    pub alias: Arc<str>,
    /// The targeted document key.
    pub doc_key: String,
    /// The targeted field name, if the commits of a single field were
    /// requested.
    pub field_name: Option<String>,
    /// Traversal depth, if bounded.
    pub depth: Option<u64>,
    /// A specific commit content id, if requested.
    pub cid: Option<String>,
    /// The requested children.
    pub fields: Vec<UnresolvedRequestable>,
    /// Limit/offset over the commit set.
    pub limit: Option<Limit>,
    /// Ordering of the commit set.
    pub order_by: Option<UnresolvedOrderBy>,
}

impl UnresolvedCommitSelect {
    /// Create an empty commit selection of `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name: Arc<str> = Arc::from(name.as_ref());
        Self {
            alias: name.clone(),
            name,
            doc_key: String::new(),
            field_name: None,
            depth: None,
            cid: None,
            fields: Vec::new(),
            limit: None,
            order_by: None,
        }
    }

    /// The equivalent plain selection consumed by the mapper.
    pub fn to_select(&self) -> UnresolvedSelect {
        UnresolvedSelect {
            name: self.name.clone(),
            alias: self.alias.clone(),
            root: SelectionRoot::Commit,
            cid: None,
            doc_keys: None,
            fields: self.fields.clone(),
            filter: None,
            limit: self.limit,
            order_by: self.order_by.clone(),
            group_by: None,
            arguments: Vec::new(),
        }
    }
}

/// The kind of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Create a new document.
    Create,
    /// Update matching documents.
    Update,
    /// Delete matching documents.
    Delete,
}

/// A parsed mutation (unresolved).
///
/// The embedded select names the mutated collection and describes the
/// result selection returned to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedMutation {
    /// The kind of mutation.
    pub kind: MutationKind,
    /// The raw document payload.
    pub data: Value,
    /// The result selection.
    pub select: UnresolvedSelect,
}

impl UnresolvedMutation {
    /// Create a mutation of `kind` against the collection named by
    /// `select`.
    pub fn new(kind: MutationKind, data: Value, select: UnresolvedSelect) -> Self {
        Self { kind, data, select }
    }

    /// The embedded result selection.
    pub fn to_select(&self) -> &UnresolvedSelect {
        &self.select
    }
}
