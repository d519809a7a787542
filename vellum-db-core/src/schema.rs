//! Schema description types.
//!
//! These types describe the collections known to a database instance: the
//! fields each collection carries, which of those fields are relations, and
//! the schema each relation points at. The query mapper consults them when
//! resolving consumer-facing field names into positional indices.

use serde::{Deserialize, Serialize};

/// The shape of a single schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Scalar value stored inline with the document.
    Scalar,
    /// Inline array of scalars (no separate child documents).
    InlineArray,
    /// A single related or embedded object.
    Object,
    /// An array of related objects.
    ObjectArray,
}

impl FieldKind {
    /// Returns true for object-valued fields.
    ///
    /// Object fields are not fetched by default and must be requested via
    /// sub-selects; scalar and inline-array fields are fetched eagerly.
    pub fn is_object(self) -> bool {
        matches!(self, FieldKind::Object | FieldKind::ObjectArray)
    }
}

/// Cardinality of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelationKind {
    /// Not a relation.
    #[default]
    None,
    /// Points at a single document of the related schema.
    One,
    /// Points at many documents of the related schema.
    Many,
}

impl RelationKind {
    /// Returns true if the field participates in a relation.
    pub fn is_relation(self) -> bool {
        !matches!(self, RelationKind::None)
    }
}

/// Description of a single field within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// Stable positional id of the field within its schema.
    pub id: u32,
    /// Consumer-facing field name.
    pub name: String,
    /// The shape of the field's values.
    pub kind: FieldKind,
    /// Relation cardinality, [`RelationKind::None`] for plain fields.
    pub relation: RelationKind,
    /// Name of the related schema, for relation fields.
    pub schema: Option<String>,
}

impl FieldDescription {
    /// Create a scalar field description.
    pub fn scalar(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: FieldKind::Scalar,
            relation: RelationKind::None,
            schema: None,
        }
    }

    /// Create an inline-array field description.
    pub fn inline_array(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: FieldKind::InlineArray,
            relation: RelationKind::None,
            schema: None,
        }
    }

    /// Create a relation field description pointing at `schema`.
    pub fn relation(
        id: u32,
        name: impl Into<String>,
        schema: impl Into<String>,
        relation: RelationKind,
    ) -> Self {
        let kind = match relation {
            RelationKind::Many => FieldKind::ObjectArray,
            _ => FieldKind::Object,
        };
        Self {
            id,
            name: name.into(),
            kind,
            relation,
            schema: Some(schema.into()),
        }
    }

    /// Returns true for object-valued fields.
    pub fn is_object(&self) -> bool {
        self.kind.is_object()
    }
}

/// Description of a schema: an ordered set of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Schema name (matches the collection name for root schemas).
    pub name: String,
    /// Fields in schema declaration order.
    pub fields: Vec<FieldDescription>,
}

/// Description of a collection: its name and schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectionDescription {
    /// Collection name as known to consumers.
    pub name: String,
    /// The collection's schema.
    pub schema: SchemaDescription,
}

impl CollectionDescription {
    /// Create a collection description with the given fields.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescription>) -> Self {
        let name = name.into();
        Self {
            schema: SchemaDescription {
                name: name.clone(),
                fields,
            },
            name,
        }
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDescription> {
        self.schema.fields.iter().find(|f| f.name == name)
    }
}
