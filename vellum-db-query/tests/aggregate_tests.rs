//! Integration tests for aggregate resolution
//!
//! These tests verify host binding, join synthesis and reuse, composite
//! dependency injection, and the implicit null-exclusion filter.

mod common;

use serde_json::json;
use vellum_db_query::{
    to_select, FilterKey, FilterValue, QueryError, SortDirection, UnresolvedArgument,
    UnresolvedSelect, TOP_LEVEL_COLLECTION,
};

use common::{assert_plan_indexes_reachable, catalog, field_at};

fn aggregate_child(name: &str, arguments: Vec<(&str, serde_json::Value)>) -> UnresolvedSelect {
    UnresolvedSelect::new(name).with_arguments(
        arguments
            .into_iter()
            .map(|(name, value)| UnresolvedArgument::new(name, value))
            .collect(),
    )
}

#[test]
fn test_count_over_unrequested_relation_synthesizes_join() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users")
        .with_select(aggregate_child("_count", vec![("books", json!({}))]));

    let select = to_select(&catalog, &parsed).unwrap();

    // The aggregate itself sits at the index allocated during requestable
    // extraction; the synthesized host follows it.
    let count_index = select.mapping.first_index_of_name("_count");
    assert_eq!(count_index, 6);
    let books_index = select.mapping.first_index_of_name("books");
    assert_eq!(books_index, 7);

    let books = field_at(&select, books_index).as_select().unwrap();
    assert_eq!(books.collection_name, "books");
    assert!(books.mapping.render_keys().is_empty());

    let count = field_at(&select, count_index).as_aggregate().unwrap();
    assert_eq!(count.targets.len(), 1);
    assert_eq!(count.targets[0].host.field.index, books_index);
    assert!(count.targets[0].child.is_none());

    // Only the aggregate renders.
    assert_eq!(select.mapping.render_keys().len(), 1);
    assert_eq!(select.mapping.render_keys()[0].index, count_index);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_sum_binds_child_within_host_mapping() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(aggregate_child(
        "_sum",
        vec![("books", json!({"field": "pages"}))],
    ));

    let select = to_select(&catalog, &parsed).unwrap();

    let sum = field_at(&select, 6).as_aggregate().unwrap();
    let target = &sum.targets[0];
    let child = target.child.as_ref().expect("sum must target a child");

    // pages resolved inside the books namespace.
    assert_eq!(child.name.as_ref(), "pages");
    assert_eq!(child.index, 2);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_aggregate_reuses_requested_selection_as_host() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users")
        .with_select(UnresolvedSelect::new("books").with_field("title"))
        .with_select(aggregate_child("_count", vec![("books", json!({}))]));

    let select = to_select(&catalog, &parsed).unwrap();

    // No extra join: the requested books selection hosts the count.
    assert_eq!(select.fields.len(), 2);
    let count = field_at(&select, 7).as_aggregate().unwrap();
    assert_eq!(count.targets[0].host.field.index, 6);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_aggregates_with_matching_targets_share_one_join() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users")
        .with_select(aggregate_child(
            "_sum",
            vec![("books", json!({"field": "pages"}))],
        ))
        .with_select(aggregate_child(
            "_count",
            vec![("books", json!({"field": "pages"}))],
        ));

    let select = to_select(&catalog, &parsed).unwrap();

    let book_joins = select
        .fields
        .iter()
        .filter(|field| field.name() == "books")
        .count();
    assert_eq!(book_joins, 1);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_aggregates_with_different_filters_get_separate_joins() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users")
        .with_select(aggregate_child(
            "_count",
            vec![("books", json!({"filter": {"pages": {"_gt": 100}}}))],
        ))
        .with_select(aggregate_child("_count", vec![("books", json!({}))]));

    let select = to_select(&catalog, &parsed).unwrap();

    let book_joins: Vec<_> = select
        .fields
        .iter()
        .filter(|field| field.name() == "books")
        .collect();
    assert_eq!(book_joins.len(), 2);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_average_reuses_compatible_sum_and_count() {
    let catalog = catalog();
    // The consumer's sum and count already carry the null exclusion the
    // average requires, so they are reused as its dependencies.
    let parsed = UnresolvedSelect::new("users")
        .with_select(aggregate_child(
            "_avg",
            vec![("books", json!({"field": "pages"}))],
        ))
        .with_select(aggregate_child(
            "_sum",
            vec![(
                "books",
                json!({"field": "pages", "filter": {"pages": {"_ne": null}}}),
            )],
        ))
        .with_select(aggregate_child(
            "_count",
            vec![(
                "books",
                json!({"field": "pages", "filter": {"pages": {"_ne": null}}}),
            )],
        ));

    let select = to_select(&catalog, &parsed).unwrap();

    let aggregates: Vec<_> = select
        .fields
        .iter()
        .filter_map(|field| field.as_aggregate())
        .collect();
    assert_eq!(aggregates.len(), 3);

    // One shared host join for all three.
    let book_joins = select
        .fields
        .iter()
        .filter(|field| field.name() == "books")
        .count();
    assert_eq!(book_joins, 1);

    // Dependencies point at the consumer's aggregates by plan identity:
    // count at 8, sum at 7.
    let average = field_at(&select, 6).as_aggregate().unwrap();
    assert_eq!(average.dependencies, vec![8, 7]);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_average_appends_dependencies_when_filters_differ() {
    let catalog = catalog();
    // Plain sum/count lack the null exclusion, so the average gets its own.
    let parsed = UnresolvedSelect::new("users")
        .with_select(aggregate_child(
            "_avg",
            vec![("books", json!({"field": "pages"}))],
        ))
        .with_select(aggregate_child(
            "_sum",
            vec![("books", json!({"field": "pages"}))],
        ))
        .with_select(aggregate_child(
            "_count",
            vec![("books", json!({"field": "pages"}))],
        ));

    let select = to_select(&catalog, &parsed).unwrap();

    let aggregates: Vec<_> = select
        .fields
        .iter()
        .filter_map(|field| field.as_aggregate())
        .collect();
    assert_eq!(aggregates.len(), 5);

    // The injected dependencies sit at fresh indices.
    let average = field_at(&select, 6).as_aggregate().unwrap();
    assert_eq!(average.dependencies, vec![9, 10]);
    let injected_count = field_at(&select, 9).as_aggregate().unwrap();
    let injected_sum = field_at(&select, 10).as_aggregate().unwrap();
    assert_eq!(injected_count.field.name.as_ref(), "_count");
    assert_eq!(injected_sum.field.name.as_ref(), "_sum");

    // The average and its dependencies share the null-filtered join; the
    // consumer's plain sum/count share a second, unfiltered one.
    let filtered_host = average.targets[0].host.field.index;
    assert_eq!(injected_count.targets[0].host.field.index, filtered_host);
    assert_eq!(injected_sum.targets[0].host.field.index, filtered_host);

    let plain_sum = field_at(&select, 7).as_aggregate().unwrap();
    let plain_count = field_at(&select, 8).as_aggregate().unwrap();
    assert_eq!(
        plain_sum.targets[0].host.field.index,
        plain_count.targets[0].host.field.index
    );
    assert_ne!(plain_sum.targets[0].host.field.index, filtered_host);

    // The filtered host carries the injected null exclusion on pages.
    let host = field_at(&select, filtered_host).as_select().unwrap();
    let filter = host.targetable.filter.as_ref().unwrap();
    let (key, value) = &filter.conditions[0];
    assert_eq!(*key, FilterKey::PropertyIndex(2));
    match value {
        FilterValue::Conditions(inner) => {
            assert_eq!(inner[0].0, FilterKey::operator("_ne"));
            assert_eq!(inner[0].1, FilterValue::Scalar(serde_json::Value::Null));
        }
        other => panic!("expected conditions, got {other:?}"),
    }

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_inline_array_host_resolves_without_join() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(aggregate_child(
        "_sum",
        vec![("favourite_numbers", json!({"order": "DESC"}))],
    ));

    let select = to_select(&catalog, &parsed).unwrap();

    // Inline arrays are plain schema fields: the host targets the schema
    // id directly, and no join is appended.
    assert_eq!(select.fields.len(), 1);
    let sum = field_at(&select, 6).as_aggregate().unwrap();
    let target = &sum.targets[0];
    assert_eq!(target.host.field.index, 4);
    assert!(target.child.is_none());

    // Inline-array ordering degenerates to a bare direction.
    let order_by = target.host.order_by.as_ref().unwrap();
    assert!(order_by.conditions[0].field_indexes.is_empty());
    assert_eq!(order_by.conditions[0].direction, SortDirection::Descending);
}

#[test]
fn test_average_over_inline_array_filters_nulls_at_root() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(aggregate_child(
        "_avg",
        vec![("favourite_numbers", json!({}))],
    ));

    let select = to_select(&catalog, &parsed).unwrap();

    let average = field_at(&select, 6).as_aggregate().unwrap();
    let filter = average.targets[0].host.filter.as_ref().unwrap();
    assert_eq!(filter.conditions[0].0, FilterKey::operator("_ne"));
    assert_eq!(
        filter.conditions[0].1,
        FilterValue::Scalar(serde_json::Value::Null)
    );
}

#[test]
fn test_top_level_aggregate_maps_against_sentinel_collection() {
    let catalog = catalog();
    let parsed = aggregate_child("_count", vec![("users", json!({}))]);

    let select = to_select(&catalog, &parsed).unwrap();

    assert_eq!(select.collection_name, TOP_LEVEL_COLLECTION);

    // The aggregate occupies index 0; the synthesized users join follows.
    let count = field_at(&select, 0).as_aggregate().unwrap();
    assert_eq!(count.targets[0].host.field.index, 1);
    let users = field_at(&select, 1).as_select().unwrap();
    assert_eq!(users.collection_name, "users");

    assert_eq!(select.mapping.render_keys().len(), 1);
    assert_eq!(select.mapping.render_keys()[0].index, 0);

    assert_plan_indexes_reachable(&select);
}

#[test]
fn test_aggregate_without_target_is_rejected() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(UnresolvedSelect::new("_count"));

    let err = to_select(&catalog, &parsed).unwrap_err();
    assert!(matches!(err, QueryError::AggregateTargetMissing));
}

#[test]
fn test_aggregate_child_missing_from_host_is_rejected() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(aggregate_child(
        "_sum",
        vec![("books", json!({"field": "weight"}))],
    ));

    let err = to_select(&catalog, &parsed).unwrap_err();
    assert!(matches!(err, QueryError::AggregateChildNotFound(name) if name == "weight"));
}

#[test]
fn test_aggregate_child_on_inline_host_is_rejected() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users").with_select(aggregate_child(
        "_sum",
        vec![("favourite_numbers", json!({"field": "value"}))],
    ));

    let err = to_select(&catalog, &parsed).unwrap_err();
    assert!(
        matches!(err, QueryError::AggregateHostNotSelectable(name) if name == "favourite_numbers")
    );
}

#[test]
fn test_aggregate_over_group_synthesizes_group_join() {
    let catalog = catalog();
    let parsed = UnresolvedSelect::new("users")
        .with_field("age")
        .with_select(aggregate_child(
            "_avg",
            vec![("_group", json!({"field": "points"}))],
        ))
        .with_group_by(vec!["age".to_string()]);

    let select = to_select(&catalog, &parsed).unwrap();

    // The group scope was synthesized for the aggregate and reused for the
    // group-by materialization (no second _group index).
    let group_indexes = select.mapping.indexes_of_name("_group");
    assert_eq!(group_indexes.len(), 1);

    let group = field_at(&select, group_indexes[0]).as_select().unwrap();
    assert_eq!(group.collection_name, "users");

    let average = field_at(&select, 6).as_aggregate().unwrap();
    assert_eq!(average.targets[0].host.field.index, group_indexes[0]);
    // points resolved inside the group scope, at its schema id.
    assert_eq!(average.targets[0].child.as_ref().unwrap().index, 3);
    assert_eq!(average.dependencies.len(), 2);

    assert_plan_indexes_reachable(&select);
}
