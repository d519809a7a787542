//! Shared fixtures for query mapping integration tests.

#![allow(dead_code)]

use vellum_db_core::{CollectionDescription, FieldDescription, RelationKind, UNMAPPED_INDEX};
use vellum_db_memory::MemoryCatalog;
use vellum_db_query::{FilterKey, FilterValue, Requestable, Select};

/// A catalog with three related collections:
///
/// - `users`: scalars at ids 1-3, an inline array at 4, and relations
///   `address` (one) and `books` (many)
/// - `addresses`: scalars plus an `owner` relation back to `users`
/// - `books`: scalars only
pub fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_collection(CollectionDescription::new(
            "users",
            vec![
                FieldDescription::scalar(1, "name"),
                FieldDescription::scalar(2, "age"),
                FieldDescription::scalar(3, "points"),
                FieldDescription::inline_array(4, "favourite_numbers"),
                FieldDescription::relation(5, "address", "addresses", RelationKind::One),
                FieldDescription::relation(6, "books", "books", RelationKind::Many),
            ],
        ))
        .with_collection(CollectionDescription::new(
            "addresses",
            vec![
                FieldDescription::scalar(1, "city"),
                FieldDescription::scalar(2, "country"),
                FieldDescription::relation(3, "owner", "users", RelationKind::One),
            ],
        ))
        .with_collection(CollectionDescription::new(
            "books",
            vec![
                FieldDescription::scalar(1, "title"),
                FieldDescription::scalar(2, "pages"),
                FieldDescription::scalar(3, "rating"),
            ],
        ))
}

/// Find the child requestable bound at `index`.
pub fn field_at(select: &Select, index: usize) -> &Requestable {
    select
        .fields
        .iter()
        .find(|field| field.index() == index)
        .unwrap_or_else(|| panic!("no requestable at index {index}"))
}

/// Assert that every index referenced anywhere in the plan resolves to a
/// field of the owning mapping (or the appropriate child mapping), and that
/// each child select's owned mapping agrees with the parent's child-mapping
/// slot.
pub fn assert_plan_indexes_reachable(select: &Select) {
    let mapping = &select.mapping;
    let bound: std::collections::HashSet<usize> = mapping
        .iter()
        .flat_map(|(_, indexes)| indexes.iter().copied())
        .collect();

    for render_key in mapping.render_keys() {
        assert!(
            bound.contains(&render_key.index),
            "render key {:?} is unbound",
            render_key
        );
    }

    if let Some(filter) = &select.targetable.filter {
        assert_filter_reachable(&filter.conditions, select);
    }

    if let Some(order_by) = &select.targetable.order_by {
        for condition in &order_by.conditions {
            let mut scope = Some(&select.mapping);
            for &index in &condition.field_indexes {
                assert_ne!(index, UNMAPPED_INDEX, "unresolved order segment");
                let mapping = scope.expect("order chain left the mapping tree");
                assert!(
                    mapping.iter().any(|(_, indexes)| indexes.contains(&index)),
                    "order index {index} is unbound"
                );
                scope = mapping.child_at(index);
            }
        }
    }

    if let Some(group_by) = &select.targetable.group_by {
        for field in &group_by.fields {
            assert!(bound.contains(&field.index), "group field is unbound");
        }
    }

    for field in &select.fields {
        match field {
            Requestable::Field(_) => {}
            Requestable::Select(child) => {
                let index = child.targetable.field.index;
                assert!(bound.contains(&index), "child select index is unbound");
                assert_eq!(
                    select.mapping.child_at(index),
                    Some(&child.mapping),
                    "child mapping at {index} does not match the child select's own mapping"
                );
                assert_plan_indexes_reachable(child);
            }
            Requestable::Aggregate(aggregate) => {
                assert!(
                    bound.contains(&aggregate.field.index),
                    "aggregate index is unbound"
                );
                for target in &aggregate.targets {
                    let host_index = target.host.field.index;
                    assert!(bound.contains(&host_index), "aggregate host is unbound");
                    if let Some(child) = &target.child {
                        let host = field_at(select, host_index)
                            .as_select()
                            .expect("child target on a non-select host");
                        assert!(
                            host.mapping
                                .iter()
                                .any(|(_, indexes)| indexes.contains(&child.index)),
                            "aggregate child index is unbound in the host mapping"
                        );
                    }
                }
                for &dependency in &aggregate.dependencies {
                    assert!(
                        field_at(select, dependency).as_aggregate().is_some(),
                        "aggregate dependency at {dependency} is not an aggregate"
                    );
                }
            }
        }
    }
}

fn assert_filter_reachable(conditions: &[(FilterKey, FilterValue)], select: &Select) {
    fn walk(
        conditions: &[(FilterKey, FilterValue)],
        mapping: &vellum_db_core::DocumentMapping,
    ) {
        for (key, value) in conditions {
            match key {
                FilterKey::PropertyIndex(index) => {
                    assert!(
                        mapping.iter().any(|(_, indexes)| indexes.contains(index)),
                        "filter property {index} is unbound"
                    );
                    let child_scope = mapping.child_at(*index).unwrap_or(mapping);
                    walk_value(value, child_scope, mapping);
                }
                FilterKey::Operator(_) => walk_value(value, mapping, mapping),
            }
        }
    }

    fn walk_value(
        value: &FilterValue,
        child_scope: &vellum_db_core::DocumentMapping,
        same_scope: &vellum_db_core::DocumentMapping,
    ) {
        match value {
            FilterValue::Conditions(inner) => {
                // Property keys inside the clause resolve in the child
                // scope; operator clauses stay in the current scope.
                let references_properties = inner
                    .iter()
                    .any(|(key, _)| matches!(key, FilterKey::PropertyIndex(_)));
                walk(inner, if references_properties { child_scope } else { same_scope });
            }
            FilterValue::List(items) => {
                for item in items {
                    walk_value(item, child_scope, same_scope);
                }
            }
            FilterValue::Scalar(_) => {}
        }
    }

    walk(conditions, &select.mapping);
}
