//! Mapped plan types
//!
//! The index-addressed output of the query mapper. Every identifier in these
//! types is a positional index into a [`DocumentMapping`] owned by the
//! enclosing [`Select`]; consumer-facing names are retained only for
//! diagnostics and render keys.

use serde_json::Value;
use std::sync::Arc;

use vellum_db_core::DocumentMapping;

use crate::ast::MutationKind;
use crate::filter::Filter;

/// The lowest-level requestable: a mapped field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Index of the field in the enclosing mapping.
    pub index: usize,
    /// Consumer-facing name (diagnostic only; the index is authoritative).
    pub name: Arc<str>,
}

impl Field {
    /// Create a new field.
    pub fn new(index: usize, name: impl AsRef<str>) -> Self {
        Self {
            index,
            name: Arc::from(name.as_ref()),
        }
    }
}

impl Default for Field {
    fn default() -> Self {
        Self {
            index: 0,
            name: Arc::from(""),
        }
    }
}

/// Sort direction for order conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A single ordering condition over resolved indices.
///
/// `field_indexes` is the chain of indices walked through successive child
/// mappings; for inline-array ordering it is empty and only the direction
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderCondition {
    /// Index chain from the select scope to the ordered field.
    pub field_indexes: Vec<usize>,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Ordering of a selected set, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderBy {
    /// The ordering conditions.
    pub conditions: Vec<OrderCondition>,
}

/// Limit/offset over a selected set. Zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limit {
    /// Maximum number of items, 0 for no limit.
    pub limit: u64,
    /// Number of items to skip, 0 for none.
    pub offset: u64,
}

impl Limit {
    /// Create a new limit.
    pub fn new(limit: u64, offset: u64) -> Self {
        Self { limit, offset }
    }
}

/// Grouping of a selected set by resolved field indices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupBy {
    /// The fields grouped by.
    pub fields: Vec<Field>,
}

/// A requestable with value modifiers: filter, limit, order, grouping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Targetable {
    /// The underlying field.
    pub field: Field,
    /// Document keys restricting the set, if any.
    pub doc_keys: Option<Vec<String>>,
    /// Index-keyed filter, if any.
    pub filter: Option<Filter>,
    /// Limit/offset, if any.
    pub limit: Option<Limit>,
    /// Ordering, if any.
    pub order_by: Option<OrderBy>,
    /// Grouping, if any.
    pub group_by: Option<GroupBy>,
}

impl Targetable {
    /// Create a targetable carrying only a field, with no modifiers.
    pub fn from_field(field: Field) -> Self {
        Self {
            field,
            ..Self::default()
        }
    }

    /// Returns true if `other` targets the same thing: same name and equal
    /// filter, limit, and ordering.
    ///
    /// Used to reuse existing selections as aggregate hosts instead of
    /// synthesizing duplicate joins. Document keys and grouping do not
    /// participate: aggregate targets cannot carry them.
    pub fn matches_target(&self, other: &Targetable) -> bool {
        self.field.name == other.field.name
            && Filter::options_equal(self.filter.as_ref(), other.filter.as_ref())
            && self.limit == other.limit
            && self.order_by == other.order_by
    }
}

/// A mapped selection: the root of a plan subtree.
///
/// Exclusively owns its [`DocumentMapping`] and its child requestables. The
/// mapping of every child select also appears as a child mapping at the
/// select's index within this select's mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// Targeting information for this selection.
    pub targetable: Targetable,
    /// The resolved collection name.
    pub collection_name: String,
    /// The index-addressed namespace of this scope.
    pub mapping: DocumentMapping,
    /// Content id pinning the select to a specific version, if any.
    pub cid: Option<String>,
    /// The mapped children, including synthesized joins and aggregates.
    pub fields: Vec<Requestable>,
}

/// The sub-property of an aggregate host to aggregate over.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTarget {
    /// Index of the sub-property within the host's mapping.
    pub index: usize,
    /// Consumer-facing name of the sub-property.
    pub name: Arc<str>,
}

/// One target of an aggregate: the host field plus the optional
/// sub-property within it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTarget {
    /// The host field, with any filter/limit/order applied to the
    /// aggregated set.
    pub host: Targetable,
    /// The sub-property to aggregate, absent for inline arrays.
    pub child: Option<ChildTarget>,
}

/// A mapped aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// This aggregate's own field.
    pub field: Field,
    /// Snapshot of the enclosing mapping taken at resolution time.
    pub mapping: DocumentMapping,
    /// The resolved targets.
    pub targets: Vec<AggregateTarget>,
    /// Field indices of the sibling aggregates this one depends on
    /// (composite aggregates only). Each index resolves to an
    /// [`Aggregate`] in the enclosing select's field list.
    pub dependencies: Vec<usize>,
}

/// Any item that may appear in a select's field list.
#[derive(Debug, Clone, PartialEq)]
pub enum Requestable {
    /// A plain mapped field.
    Field(Field),
    /// A sub-selection (requested or synthesized).
    Select(Box<Select>),
    /// An aggregate.
    Aggregate(Box<Aggregate>),
}

impl Requestable {
    /// The index of this requestable in the enclosing mapping.
    pub fn index(&self) -> usize {
        match self {
            Requestable::Field(field) => field.index,
            Requestable::Select(select) => select.targetable.field.index,
            Requestable::Aggregate(aggregate) => aggregate.field.index,
        }
    }

    /// The consumer-facing name of this requestable.
    pub fn name(&self) -> &str {
        match self {
            Requestable::Field(field) => &field.name,
            Requestable::Select(select) => &select.targetable.field.name,
            Requestable::Aggregate(aggregate) => &aggregate.field.name,
        }
    }

    /// This requestable as a select, if it is one.
    pub fn as_select(&self) -> Option<&Select> {
        match self {
            Requestable::Select(select) => Some(select),
            _ => None,
        }
    }

    /// Mutable access to this requestable as a select.
    pub fn as_select_mut(&mut self) -> Option<&mut Select> {
        match self {
            Requestable::Select(select) => Some(select),
            _ => None,
        }
    }

    /// The targeting information of this requestable, if it admits any.
    ///
    /// Plain fields and aggregates support no value modifiers.
    pub fn as_targetable(&self) -> Option<&Targetable> {
        match self {
            Requestable::Select(select) => Some(&select.targetable),
            _ => None,
        }
    }

    /// This requestable as an aggregate, if it is one.
    pub fn as_aggregate(&self) -> Option<&Aggregate> {
        match self {
            Requestable::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    /// Mutable access to this requestable as an aggregate.
    pub fn as_aggregate_mut(&mut self) -> Option<&mut Aggregate> {
        match self {
            Requestable::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }
}

/// A mapped commit selection.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSelect {
    /// The underlying selection over the commit fields.
    pub select: Select,
    /// The targeted document key.
    pub doc_key: String,
    /// The targeted field name, if any.
    pub field_name: Option<String>,
    /// Traversal depth, if bounded.
    pub depth: Option<u64>,
    /// A specific commit content id, if requested.
    pub cid: Option<String>,
}

/// A mapped mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The result selection returned to the consumer.
    pub select: Select,
    /// The kind of mutation.
    pub kind: MutationKind,
    /// The raw document payload, carried verbatim.
    pub data: Value,
}
