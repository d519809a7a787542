//! Aggregate resolution
//!
//! Aggregates arrive as raw arguments on a selection (`_count`, `_sum`,
//! `_avg`) and must be bound to concrete host fields before the plan can be
//! executed. Resolution happens in stages:
//!
//! 1. Requests are extracted from the raw arguments
//!    ([`get_aggregate_request`]).
//! 2. Composite aggregates have their dependencies injected
//!    ([`append_underlying_aggregates`]): an average needs a count and a sum
//!    over the same target, reusing compatible existing aggregates where
//!    possible, and excluding null values via an implicit `_ne: null`
//!    filter.
//! 3. Each request is bound to a host ([`resolve_aggregates`]): an inline
//!    scalar field, an existing compatible selection, or a newly
//!    synthesized join.
//! 4. Dependency links are rewritten to plan identities (field indices) in a
//!    second pass once every aggregate in the select is resolved.
//!
//! Resolution is the only place the mapper creates new joins on behalf of
//! aggregates; deduplication here is what keeps N aggregates over one host
//! from producing N joins.

use serde_json::{Map, Value};
use std::sync::Arc;

use tracing::debug;
use vellum_db_core::{CollectionDescription, DocumentMapping};
use vellum_vocab::{aggregates, target};

use crate::ast::{
    UnresolvedFilter, UnresolvedOrderBy, UnresolvedOrderCondition, UnresolvedSelect,
};
use crate::descriptions::DescriptionsRepo;
use crate::error::{QueryError, Result};
use crate::filter::{to_filter, Filter};
use crate::ir::{
    Aggregate, AggregateTarget, ChildTarget, Field, Limit, OrderBy, OrderCondition, Requestable,
    SortDirection, Targetable,
};
use crate::lower::{get_collection_name, get_top_level_info, to_order_by};

/// A consumer-requested aggregate before its exact targets are known.
///
/// Targets are specified by the names the consumer used; which fields those
/// names bind to is determined during [`resolve_aggregates`].
#[derive(Debug, Clone)]
pub(crate) struct AggregateRequest {
    /// This aggregate's own field: its index and name are known up front.
    pub field: Field,
    /// The targets as defined by the consumer.
    pub targets: Vec<AggregateRequestTarget>,
    /// Indices of dependency aggregates, recorded while injecting
    /// underlying aggregates.
    pub dependency_indexes: Vec<usize>,
}

/// The consumer-defined information for one aggregate target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AggregateRequestTarget {
    /// Host property name as known to the consumer. May match zero to many
    /// requested fields.
    pub host_external_name: Arc<str>,
    /// Sub-property name within the host, absent for inline arrays.
    pub child_external_name: Option<Arc<str>>,
    /// Filter restricting the aggregated set.
    pub filter: Option<UnresolvedFilter>,
    /// Limit/offset over the aggregated set.
    pub limit: Option<Limit>,
    /// Order in which items are aggregated. Affects results when combined
    /// with a limit.
    pub order: Option<UnresolvedOrderBy>,
}

impl AggregateRequestTarget {
    fn host(name: impl AsRef<str>) -> Self {
        Self {
            host_external_name: Arc::from(name.as_ref()),
            child_external_name: None,
            filter: None,
            limit: None,
            order: None,
        }
    }
}

/// Dependencies of composite aggregates, by aggregate name.
fn aggregate_dependencies(name: &str) -> Option<&'static [&'static str]> {
    match name {
        aggregates::AVERAGE => Some(&[aggregates::COUNT, aggregates::SUM]),
        _ => None,
    }
}

/// Extract an [`AggregateRequest`] from an aggregate selection's raw
/// arguments.
pub(crate) fn get_aggregate_request(
    index: usize,
    parsed: &UnresolvedSelect,
) -> Result<AggregateRequest> {
    let targets = parsed
        .arguments
        .iter()
        .map(|argument| match &argument.value {
            // A bare string names the host directly.
            Value::String(host) => Ok(AggregateRequestTarget::host(host)),
            // An object argument names the host and carries targeting
            // sub-arguments.
            Value::Object(entries) => parse_object_target(&argument.name, entries),
            other => Err(QueryError::InvalidArgument(format!(
                "aggregate target must be a string or an object, got: {other}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    if targets.is_empty() {
        return Err(QueryError::AggregateTargetMissing);
    }

    Ok(AggregateRequest {
        field: Field::new(index, parsed.name.as_ref()),
        targets,
        dependency_indexes: Vec::new(),
    })
}

fn parse_object_target(
    host: &str,
    entries: &Map<String, Value>,
) -> Result<AggregateRequestTarget> {
    let child_external_name = match entries.get(target::FIELD) {
        None => None,
        Some(Value::String(child)) => Some(Arc::from(child.as_str())),
        Some(other) => {
            return Err(QueryError::InvalidArgument(format!(
                "aggregate field must be a string, got: {other}"
            )))
        }
    };

    let filter = match entries.get(target::FILTER) {
        None => None,
        Some(Value::Object(conditions)) => Some(UnresolvedFilter::new(conditions.clone())),
        Some(other) => {
            return Err(QueryError::InvalidArgument(format!(
                "aggregate filter must be an object, got: {other}"
            )))
        }
    };

    let limit_value = entries.get(target::LIMIT).map(parse_count_argument);
    let offset_value = entries.get(target::OFFSET).map(parse_count_argument);
    let limit = match (limit_value, offset_value) {
        (None, None) => None,
        (limit, offset) => Some(Limit::new(
            limit.transpose()?.unwrap_or(0),
            offset.transpose()?.unwrap_or(0),
        )),
    };

    let order = match entries.get(target::ORDER) {
        None => None,
        // For inline arrays the order is a bare direction.
        Some(Value::String(direction)) => Some(UnresolvedOrderBy {
            conditions: vec![UnresolvedOrderCondition::new(
                "",
                parse_direction(direction)?,
            )],
        }),
        // For relations the order is the same object form used by
        // non-aggregate ordering.
        Some(Value::Object(conditions)) => {
            let conditions = conditions
                .iter()
                .map(|(path, direction)| match direction {
                    Value::String(direction) => Ok(UnresolvedOrderCondition::new(
                        path.clone(),
                        parse_direction(direction)?,
                    )),
                    other => Err(QueryError::InvalidArgument(format!(
                        "order direction must be a string, got: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Some(UnresolvedOrderBy { conditions })
        }
        Some(other) => {
            return Err(QueryError::InvalidArgument(format!(
                "aggregate order must be a direction or an object, got: {other}"
            )))
        }
    };

    Ok(AggregateRequestTarget {
        host_external_name: Arc::from(host),
        child_external_name,
        filter,
        limit,
        order,
    })
}

fn parse_count_argument(value: &Value) -> Result<u64> {
    match value {
        Value::Number(number) => number.as_u64().ok_or_else(|| {
            QueryError::InvalidArgument(format!("expected a non-negative integer, got: {number}"))
        }),
        Value::String(raw) => raw.parse::<u64>().map_err(|_| {
            QueryError::InvalidArgument(format!("expected a non-negative integer, got: {raw}"))
        }),
        other => Err(QueryError::InvalidArgument(format!(
            "expected a non-negative integer, got: {other}"
        ))),
    }
}

fn parse_direction(raw: &str) -> Result<SortDirection> {
    match raw {
        "ASC" => Ok(SortDirection::Ascending),
        "DESC" => Ok(SortDirection::Descending),
        other => Err(QueryError::InvalidArgument(format!(
            "invalid order direction: {other}"
        ))),
    }
}

/// Scan `aggregates` for composite aggregates and append any missing
/// dependencies, recording dependency indices on the composite request.
///
/// Existing aggregates matching the targeting parameters are reused instead
/// of appended. Target filters are adjusted as required: averages skip null
/// items, so non-aggregate targets gain an implicit `_ne: null` predicate.
pub(crate) fn append_underlying_aggregates(
    mut aggregates: Vec<AggregateRequest>,
    mapping: &mut DocumentMapping,
) -> Vec<AggregateRequest> {
    // Items may be appended while looping; they are scanned too.
    let mut i = 0;
    while i < aggregates.len() {
        let Some(dependencies) = aggregate_dependencies(&aggregates[i].field.name) else {
            i += 1;
            continue;
        };

        for target in &mut aggregates[i].targets {
            if let Some(child) = &target.child_external_name {
                // Aggregate-typed child targets always have a value and are
                // exempt from the null filter.
                if aggregates::is_aggregate(child) {
                    continue;
                }
            }
            // A target without a child is an inline array, which still
            // needs the null filter.
            append_not_null_filter(target);
        }

        let targets = aggregates[i].targets.clone();
        for dependency_name in dependencies {
            let dependency_index =
                append_if_not_exists(dependency_name, &targets, &mut aggregates, mapping);
            aggregates[i].dependency_indexes.push(dependency_index);
        }

        i += 1;
    }

    aggregates
}

/// Match `name` and `targets` against existing requests, appending a new
/// request when no match is found. Returns the field index of the matched
/// or appended request.
fn append_if_not_exists(
    name: &str,
    targets: &[AggregateRequestTarget],
    aggregates: &mut Vec<AggregateRequest>,
    mapping: &mut DocumentMapping,
) -> usize {
    if let Some(existing) = try_get_matching_aggregate(name, targets, aggregates) {
        debug!(aggregate = name, index = existing, "reusing matching aggregate");
        return existing;
    }

    let index = mapping.next_index();
    mapping.add(index, name);
    aggregates.push(AggregateRequest {
        field: Field::new(index, name),
        targets: targets.to_vec(),
        dependency_indexes: Vec::new(),
    });
    index
}

/// Scan `aggregates` for one with the given name and structurally equal
/// targets. Returns its field index if found.
fn try_get_matching_aggregate(
    name: &str,
    targets: &[AggregateRequestTarget],
    aggregates: &[AggregateRequest],
) -> Option<usize> {
    'candidates: for aggregate in aggregates {
        if aggregate.field.name.as_ref() != name {
            continue;
        }
        if aggregate.targets.len() != targets.len() {
            continue;
        }

        for (target, candidate) in targets.iter().zip(&aggregate.targets) {
            if target.host_external_name != candidate.host_external_name {
                continue 'candidates;
            }
            if target.child_external_name != candidate.child_external_name {
                continue 'candidates;
            }
            // Filters compare by their original name-keyed conditions.
            match (&target.filter, &candidate.filter) {
                (None, None) => {}
                (Some(a), Some(b)) if a.conditions == b.conditions => {}
                _ => continue 'candidates,
            }
        }

        return Some(aggregate.field.index);
    }
    None
}

/// Append an `_ne: null` predicate for the target's child field (or for the
/// host itself when the target has no child).
fn append_not_null_filter(target: &mut AggregateRequestTarget) {
    let conditions = &mut target.filter.get_or_insert_with(Default::default).conditions;

    let child_block = match &target.child_external_name {
        None => conditions,
        Some(child) => {
            match conditions
                .entry(child.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
            {
                Some(block) => block,
                // An existing non-object condition on the child cannot be
                // amended; leave it untouched.
                None => return,
            }
        }
    };

    child_block.insert("_ne".to_string(), Value::Null);
}

/// How an aggregate host was located.
enum ResolvedHost {
    /// An inline (non-object) schema field; carries its targeting info
    /// directly.
    Inline(Targetable),
    /// A selectable host at the given position in the field list.
    At(usize),
}

/// Figure out which fields the given requests target and convert them into
/// [`Aggregate`]s, appending them onto `fields`.
///
/// If an aggregate targets a host that does not yet exist, the host is
/// created and appended as well; the mapping is updated with any new
/// fields. Once all aggregates are resolved, their recorded dependency
/// indices are validated and attached as plan-identity references.
pub(crate) fn resolve_aggregates(
    parsed: &UnresolvedSelect,
    requests: Vec<AggregateRequest>,
    fields: &mut Vec<Requestable>,
    mapping: &mut DocumentMapping,
    desc: &CollectionDescription,
    repo: &mut DescriptionsRepo<'_>,
) -> Result<()> {
    let mut dependencies_by_parent = Vec::with_capacity(requests.len());

    for request in requests {
        let mut targets = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            targets.push(resolve_target(parsed, target, fields, mapping, desc, repo)?);
        }

        dependencies_by_parent.push((request.field.index, request.dependency_indexes));
        fields.push(Requestable::Aggregate(Box::new(Aggregate {
            field: request.field,
            mapping: mapping.clone(),
            targets,
            dependencies: Vec::new(),
        })));
    }

    // Pair up dependencies now that every aggregate in the select exists.
    for (parent_index, dependency_indexes) in dependencies_by_parent {
        if dependency_indexes.is_empty() {
            continue;
        }

        for &dependency_index in &dependency_indexes {
            let resolved = fields
                .iter()
                .any(|field| field.index() == dependency_index && field.as_aggregate().is_some());
            if !resolved {
                return Err(QueryError::Internal(format!(
                    "aggregate dependency at index {dependency_index} was not resolved"
                )));
            }
        }

        let parent = fields
            .iter_mut()
            .find(|field| field.index() == parent_index)
            .and_then(Requestable::as_aggregate_mut)
            .ok_or_else(|| {
                QueryError::Internal(format!(
                    "aggregate at index {parent_index} was not resolved"
                ))
            })?;
        parent.dependencies = dependency_indexes;
    }

    Ok(())
}

fn resolve_target(
    parsed: &UnresolvedSelect,
    target: &AggregateRequestTarget,
    fields: &mut Vec<Requestable>,
    mapping: &mut DocumentMapping,
    desc: &CollectionDescription,
    repo: &mut DescriptionsRepo<'_>,
) -> Result<AggregateTarget> {
    let host_name = &target.host_external_name;

    // If the host has not been requested, its child mapping may not yet
    // exist, and must be created before the filter can be converted.
    let child_is_mapped = mapping.contains_name(host_name);

    let mut host: Option<ResolvedHost> = None;
    let mut converted_filter: Option<Filter> = None;

    if child_is_mapped {
        match desc.get_field(host_name) {
            Some(field_desc) if !field_desc.is_object() => {
                // The host is a non-object field: no search needed, the
                // targeting info can be constructed inline. Inline-array
                // ordering collapses to a bare direction.
                let order_by = target.order.as_ref().and_then(|order| {
                    order.conditions.first().map(|condition| OrderBy {
                        conditions: vec![OrderCondition {
                            field_indexes: Vec::new(),
                            direction: condition.direction,
                        }],
                    })
                });
                host = Some(ResolvedHost::Inline(Targetable {
                    field: Field::new(field_desc.id as usize, host_name.as_ref()),
                    doc_keys: None,
                    filter: to_filter(target.filter.as_ref(), mapping),
                    limit: target.limit,
                    order_by,
                    group_by: None,
                }));
            }
            _ => {
                let child_object_index = mapping.first_index_of_name(host_name);
                let child_mapping = mapping
                    .child_at(child_object_index)
                    .cloned()
                    .unwrap_or_default();
                converted_filter = to_filter(target.filter.as_ref(), &child_mapping);
                let order_by = to_order_by(target.order.as_ref(), &child_mapping);

                if let Some(position) = try_get_target(
                    host_name,
                    converted_filter.as_ref(),
                    target.limit,
                    order_by.as_ref(),
                    fields,
                ) {
                    debug!(host = %host_name, "aggregate host matches an existing selection");
                    host = Some(ResolvedHost::At(position));
                }
            }
        }
    }

    let host = match host {
        Some(host) => host,
        None => {
            // No matching host was found: construct and append one so the
            // executor knows to fetch the join.
            let index = mapping.next_index();

            let dummy_parsed = UnresolvedSelect::new(host_name.as_ref()).with_root(parsed.root);
            let child_collection_name = get_collection_name(repo, &dummy_parsed, &desc.name)?;
            let (child_mapping, _) = get_top_level_info(repo, &dummy_parsed, &child_collection_name)?;
            let child_mapping = child_mapping.clone_without_render();
            mapping.set_child_at(index, child_mapping.clone());

            if !child_is_mapped {
                // The filter has not been converted yet, so convert it now
                // under the freshly created namespace.
                converted_filter = to_filter(target.filter.as_ref(), &child_mapping);
            }

            debug!(host = %host_name, index, "synthesizing aggregate host join");
            let order_by = to_order_by(target.order.as_ref(), &child_mapping);
            fields.push(Requestable::Select(Box::new(crate::ir::Select {
                targetable: Targetable {
                    field: Field::new(index, host_name.as_ref()),
                    doc_keys: None,
                    filter: converted_filter,
                    limit: target.limit,
                    order_by,
                    group_by: None,
                },
                collection_name: child_collection_name,
                mapping: child_mapping,
                cid: None,
                fields: Vec::new(),
            })));
            mapping.add(index, host_name.as_ref());

            ResolvedHost::At(fields.len() - 1)
        }
    };

    let host_targetable = match &host {
        ResolvedHost::Inline(targetable) => targetable.clone(),
        ResolvedHost::At(position) => match fields[*position].as_targetable() {
            Some(targetable) => targetable.clone(),
            // A host without targeting info (e.g. an inline-array field
            // requestable) contributes its field properties only.
            None => Targetable::from_field(Field::new(
                fields[*position].index(),
                fields[*position].name(),
            )),
        },
    };

    let child = match &target.child_external_name {
        None => None,
        Some(child_name) => {
            let host_select = match &host {
                ResolvedHost::At(position) => fields[*position].as_select(),
                ResolvedHost::Inline(_) => None,
            }
            .ok_or_else(|| QueryError::AggregateHostNotSelectable(host_name.to_string()))?;

            // If there are multiple children of the same name there is no
            // way to identify which one was meant, so the first wins.
            let index = host_select
                .mapping
                .try_first_index_of_name(child_name)
                .ok_or_else(|| QueryError::AggregateChildNotFound(child_name.to_string()))?;

            Some(ChildTarget {
                index,
                name: child_name.clone(),
            })
        }
    };

    Ok(AggregateTarget {
        host: host_targetable,
        child,
    })
}

/// Scan `fields` for a requestable matching the given name, filter, limit,
/// and order. Returns its position if found.
fn try_get_target(
    name: &str,
    filter: Option<&Filter>,
    limit: Option<Limit>,
    order_by: Option<&OrderBy>,
    fields: &[Requestable],
) -> Option<usize> {
    let probe = Targetable {
        field: Field::new(0, name),
        doc_keys: None,
        filter: filter.cloned(),
        limit,
        order_by: order_by.cloned(),
        group_by: None,
    };

    fields.iter().position(|field| {
        field
            .as_targetable()
            .is_some_and(|targetable| targetable.matches_target(&probe))
    })
}
