//! Document mappings: the index-addressed namespace of a select scope.
//!
//! Maps consumer-facing field names to compact positional indices used
//! throughout the mapped plan. Every filter, ordering, group-by, and
//! aggregate target produced by the query mapper identifies fields by an
//! index into one of these mappings rather than by name.
//!
//! A mapping also carries, per index, an optional child mapping (for
//! object/relation fields) and the ordered render keys that drive the
//! later render phase.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_vocab::fields;

/// The index of the document-key field in every non-commit, non-aggregate
/// top-level mapping.
pub const DOC_KEY_INDEX: usize = 0;

/// Sentinel index returned for names with no binding.
///
/// Kept out of the valid index space so that a chain containing it is
/// rejected by the executor rather than silently addressing field 0.
pub const UNMAPPED_INDEX: usize = usize::MAX;

/// The mapping from an index to the key the consumer expects in the output
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderKey {
    /// Index of the rendered requestable.
    pub index: usize,
    /// Output key (the consumer alias, or the field name when no alias was
    /// given).
    pub key: String,
}

impl RenderKey {
    /// Create a new render key.
    pub fn new(index: usize, key: impl Into<String>) -> Self {
        Self {
            index,
            key: key.into(),
        }
    }
}

/// The index-addressed namespace for one select scope.
///
/// Indices are assigned by a monotonic counter and never reused. A name may
/// be bound to several indices (synonymous fields); the first binding wins
/// wherever a single index is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMapping {
    /// Name → ordered list of bound indices. Insertion order of the list is
    /// significant.
    indexes_by_name: HashMap<Arc<str>, Vec<usize>>,
    /// The next index to hand out.
    next_index: usize,
    /// Positional child mappings; `Some` only at object/relation indices.
    child_mappings: Vec<Option<DocumentMapping>>,
    /// Ordered render keys for the consumer-visible requestables.
    render_keys: Vec<RenderKey>,
    /// Schema type name of the mapped object, once known.
    type_name: Option<Arc<str>>,
}

impl DocumentMapping {
    /// Create a new empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// The next free index.
    ///
    /// The counter advances when an index is bound via [`Self::add`]; two
    /// consecutive calls without an intervening `add` return the same value.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Bind `index` to `name`, preserving the order of existing bindings.
    ///
    /// Advances the index counter past `index` so explicitly-placed indices
    /// (e.g. schema field ids) and lazily-allocated ones share one dense,
    /// monotonic space.
    pub fn add(&mut self, index: usize, name: impl AsRef<str>) {
        let name = name.as_ref();
        match self.indexes_by_name.get_mut(name) {
            Some(indexes) => indexes.push(index),
            None => {
                self.indexes_by_name.insert(Arc::from(name), vec![index]);
            }
        }
        if index >= self.next_index {
            self.next_index = index + 1;
        }
    }

    /// All indices bound to `name`, in binding order. Empty if unmapped.
    pub fn indexes_of_name(&self, name: &str) -> &[usize] {
        self.indexes_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if `name` has at least one binding.
    pub fn contains_name(&self, name: &str) -> bool {
        !self.indexes_of_name(name).is_empty()
    }

    /// The first index bound to `name`, or [`UNMAPPED_INDEX`].
    ///
    /// When several fields share a name there is no way for the consumer to
    /// disambiguate, so the first binding wins.
    pub fn first_index_of_name(&self, name: &str) -> usize {
        self.try_first_index_of_name(name).unwrap_or(UNMAPPED_INDEX)
    }

    /// The first index bound to `name`, if any.
    pub fn try_first_index_of_name(&self, name: &str) -> Option<usize> {
        self.indexes_of_name(name).first().copied()
    }

    /// Install `child` as the child mapping at `index`, extending the child
    /// array with empty slots as needed.
    pub fn set_child_at(&mut self, index: usize, child: DocumentMapping) {
        if index >= self.child_mappings.len() {
            self.child_mappings.resize_with(index + 1, || None);
        }
        self.child_mappings[index] = Some(child);
    }

    /// The child mapping at `index`, if one is installed.
    pub fn child_at(&self, index: usize) -> Option<&DocumentMapping> {
        self.child_mappings.get(index).and_then(Option::as_ref)
    }

    /// Mutable access to the child mapping at `index`.
    pub fn child_at_mut(&mut self, index: usize) -> Option<&mut DocumentMapping> {
        self.child_mappings.get_mut(index).and_then(Option::as_mut)
    }

    /// Number of slots in the positional child array.
    pub fn child_count(&self) -> usize {
        self.child_mappings.len()
    }

    /// Append a render key.
    pub fn add_render_key(&mut self, key: RenderKey) {
        self.render_keys.push(key);
    }

    /// The ordered render keys of this scope.
    pub fn render_keys(&self) -> &[RenderKey] {
        &self.render_keys
    }

    /// Record the schema type name of the mapped object.
    ///
    /// Allocates the type-name slot at the current counter position, so this
    /// must be called after the object's fields have been added.
    pub fn set_type_name(&mut self, type_name: impl AsRef<str>) {
        let index = self.next_index();
        self.add(index, fields::TYPE_NAME);
        self.type_name = Some(Arc::from(type_name.as_ref()));
    }

    /// The recorded schema type name, if set.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Structural clone that keeps name-index bindings, child mappings, and
    /// the type name, but drops render keys at every level.
    ///
    /// Used when a mapping is created as a side effect of filter or
    /// aggregate resolution: such scopes must not produce user-visible
    /// renders.
    pub fn clone_without_render(&self) -> Self {
        Self {
            indexes_by_name: self.indexes_by_name.clone(),
            next_index: self.next_index,
            child_mappings: self
                .child_mappings
                .iter()
                .map(|child| child.as_ref().map(DocumentMapping::clone_without_render))
                .collect(),
            render_keys: Vec::new(),
            type_name: self.type_name.clone(),
        }
    }

    /// Iterate over all (name, indices) bindings.
    ///
    /// Iteration order is unspecified; the order that matters is the one
    /// inside each index list.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.indexes_by_name
            .iter()
            .map(|(name, indexes)| (name.as_ref(), indexes.as_slice()))
    }
}
