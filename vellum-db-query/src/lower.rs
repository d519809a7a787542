//! Request lowering: unresolved selection trees to mapped plans
//!
//! The assembler at the heart of the query mapper. Given a parsed selection
//! it resolves the collection name, builds the scope's [`DocumentMapping`],
//! recurses into child selections, and then runs the dependency passes that
//! inject fields required by filters, ordering, and aggregates but not
//! requested by the consumer.
//!
//! Lowering is a pure transformation: the unresolved input tree is borrowed
//! read-only, and a request either maps completely or fails with the first
//! error.

use tracing::{debug, trace};

use vellum_db_core::{
    CollectionDescription, DocumentMapping, RenderKey, SchemaCatalog, DOC_KEY_INDEX,
    UNMAPPED_INDEX,
};
use vellum_vocab::{aggregates, commit, fields};

use crate::aggregate::{append_underlying_aggregates, get_aggregate_request, resolve_aggregates};
use crate::ast::{
    SelectionRoot, UnresolvedCommitSelect, UnresolvedGroupBy, UnresolvedMutation,
    UnresolvedOrderBy, UnresolvedRequestable, UnresolvedSelect,
};
use crate::descriptions::DescriptionsRepo;
use crate::error::{QueryError, Result};
use crate::filter::{is_operator_key, to_filter};
use crate::ir::{
    CommitSelect, Field, GroupBy, Mutation, OrderBy, OrderCondition, Requestable, Select,
    Targetable,
};

/// Collection-name sentinel for top-level aggregates, which have no backing
/// collection. The value is never dereferenced; it only aids debugging.
pub const TOP_LEVEL_COLLECTION: &str = "_topLevel";

/// Convert the given unresolved select into a mapped [`Select`].
///
/// In the process the document mapping required to access the data yielded
/// by the select is constructed.
pub fn to_select(catalog: &dyn SchemaCatalog, parsed: &UnresolvedSelect) -> Result<Select> {
    let mut repo = DescriptionsRepo::new(catalog);
    // The top-level select always has index 0 and no parent collection.
    lower_select(&mut repo, 0, parsed, "")
}

/// Convert the given unresolved commit select into a mapped
/// [`CommitSelect`].
pub fn to_commit_select(
    catalog: &dyn SchemaCatalog,
    parsed: &UnresolvedCommitSelect,
) -> Result<CommitSelect> {
    let select = to_select(catalog, &parsed.to_select())?;
    Ok(CommitSelect {
        select,
        doc_key: parsed.doc_key.clone(),
        field_name: parsed.field_name.clone(),
        depth: parsed.depth,
        cid: parsed.cid.clone(),
    })
}

/// Convert the given unresolved mutation into a mapped [`Mutation`].
pub fn to_mutation(catalog: &dyn SchemaCatalog, parsed: &UnresolvedMutation) -> Result<Mutation> {
    let select = to_select(catalog, parsed.to_select())?;
    Ok(Mutation {
        select,
        kind: parsed.kind,
        data: parsed.data.clone(),
    })
}

fn lower_select(
    repo: &mut DescriptionsRepo<'_>,
    this_index: usize,
    parsed: &UnresolvedSelect,
    parent_collection_name: &str,
) -> Result<Select> {
    let collection_name = get_collection_name(repo, parsed, parent_collection_name)?;
    trace!(collection = %collection_name, index = this_index, "lowering select");

    let (mut mapping, desc) = get_top_level_info(repo, parsed, &collection_name)?;

    let (mut fields, aggregate_requests) = get_requestables(repo, parsed, &mut mapping, &desc)?;

    // Must run before aggregate resolution, else filter conversion may fail
    // there.
    resolve_filter_dependencies(repo, &collection_name, parsed, &mut mapping, &mut fields)?;

    // Order conditions may reference joins that were not requested either.
    resolve_order_dependencies(repo, &collection_name, parsed, &mut mapping, &mut fields)?;

    let aggregate_requests = append_underlying_aggregates(aggregate_requests, &mut mapping);
    resolve_aggregates(parsed, aggregate_requests, &mut fields, &mut mapping, &desc, repo)?;

    // If there is a group-by and no inner group was requested, the group
    // field still needs an index for the executor to materialize the
    // per-group sub-documents at.
    if parsed.group_by.is_some() && !mapping.contains_name(fields::GROUP) {
        let index = mapping.next_index();
        mapping.add(index, fields::GROUP);
    }

    let targetable = to_targetable(this_index, parsed, &mapping);
    Ok(Select {
        targetable,
        collection_name,
        mapping,
        cid: parsed.cid.clone(),
        fields,
    })
}

/// Resolve the collection name of the given selection.
///
/// Group and commit selections inherit the parent collection; relation
/// fields resolve through the parent's schema to the related collection.
pub(crate) fn get_collection_name(
    repo: &mut DescriptionsRepo<'_>,
    parsed: &UnresolvedSelect,
    parent_collection_name: &str,
) -> Result<String> {
    if aggregates::is_aggregate(&parsed.name) {
        return Ok(TOP_LEVEL_COLLECTION.to_string());
    }

    if parsed.name.as_ref() == fields::GROUP || parsed.root == SelectionRoot::Commit {
        return Ok(parent_collection_name.to_string());
    }

    if !parent_collection_name.is_empty() {
        let parent_description = repo.collection(parent_collection_name)?;
        if let Some(host_field) = parent_description.get_field(&parsed.name) {
            if host_field.relation.is_relation() {
                // The field exists on the parent and is a child object, so
                // the collection is the related schema's.
                if let Some(schema) = &host_field.schema {
                    return Ok(schema.clone());
                }
            }
        }
    }

    Ok(parsed.name.to_string())
}

/// Build the top-level mapping for a selection and fetch its collection
/// description.
///
/// Scalar schema fields are mapped eagerly at their schema ids; object
/// fields are not fetched by default and are only mapped when a select,
/// filter, or order path touches them. Commit selections pre-populate their
/// fixed field sets instead.
pub(crate) fn get_top_level_info(
    repo: &mut DescriptionsRepo<'_>,
    parsed: &UnresolvedSelect,
    collection_name: &str,
) -> Result<(DocumentMapping, CollectionDescription)> {
    let mut mapping = DocumentMapping::new();

    if aggregates::is_aggregate(&parsed.name) {
        // A top-level aggregate has no collection description and no
        // top-level fields.
        return Ok((mapping, CollectionDescription::default()));
    }

    if parsed.root != SelectionRoot::Commit {
        mapping.add(DOC_KEY_INDEX, fields::DOC_KEY);

        let desc = repo.collection(collection_name)?;
        for field in &desc.schema.fields {
            if field.is_object() {
                continue;
            }
            mapping.add(field.id as usize, &field.name);
        }

        // The type name must be set after the fields: its slot is dynamic,
        // the field indexes are not.
        mapping.set_type_name(collection_name);

        return Ok((mapping, desc));
    }

    if parsed.name.as_ref() == commit::LINKS_FIELD {
        for (index, field) in commit::LINKS_FIELDS.iter().enumerate() {
            mapping.add(index, field);
        }
        mapping.set_type_name(commit::LINKS_FIELD);
    } else {
        for (index, field) in commit::VERSION_FIELDS.iter().enumerate() {
            mapping.add(index, field);
        }
        mapping.set_type_name(commit::TYPE_NAME);
    }

    Ok((mapping, CollectionDescription::default()))
}

/// Convert the selection's direct children into requestables and deferred
/// aggregate requests, recording render keys as it goes.
///
/// Aggregate targets cannot be evaluated until all requested fields are
/// known, so aggregates are only noted here and resolved in a later pass.
fn get_requestables(
    repo: &mut DescriptionsRepo<'_>,
    parsed: &UnresolvedSelect,
    mapping: &mut DocumentMapping,
    desc: &CollectionDescription,
) -> Result<(Vec<Requestable>, Vec<crate::aggregate::AggregateRequest>)> {
    let mut fields = Vec::new();
    let mut aggregate_requests = Vec::new();

    // If this selection is itself an aggregate, record it as if it were a
    // field of its own (a quirk of the parsed shape of top-level
    // aggregates).
    if aggregates::is_aggregate(&parsed.name) {
        let index = mapping.next_index();
        let request = get_aggregate_request(index, parsed)?;
        mapping.add_render_key(RenderKey::new(index, parsed.alias.as_ref()));
        mapping.add(index, &parsed.name);
        aggregate_requests.push(request);
    }

    for child in &parsed.fields {
        match child {
            UnresolvedRequestable::Field(field) => {
                // Plain fields support no value modifiers, so the first
                // (and usually only) index suffices. They were already
                // mapped by get_top_level_info.
                let index = mapping.first_index_of_name(&field.name);
                fields.push(Requestable::Field(Field::new(index, field.name.as_ref())));
                mapping.add_render_key(RenderKey::new(index, field.alias.as_ref()));
            }
            UnresolvedRequestable::Select(select) => {
                let index = mapping.next_index();

                if aggregates::is_aggregate(&select.name) {
                    let request = get_aggregate_request(index, select)?;
                    aggregate_requests.push(request);
                } else {
                    let inner = lower_select(repo, index, select, &desc.name)?;
                    mapping.set_child_at(index, inner.mapping.clone());
                    fields.push(Requestable::Select(Box::new(inner)));
                }

                mapping.add_render_key(RenderKey::new(index, select.alias.as_ref()));
                mapping.add(index, &select.name);
            }
        }
    }

    Ok((fields, aggregate_requests))
}

/// Map fields referenced by the filter that were missed due to not being
/// requested, appending synthesized joins to `fields` as needed.
fn resolve_filter_dependencies(
    repo: &mut DescriptionsRepo<'_>,
    parent_collection_name: &str,
    parsed: &UnresolvedSelect,
    mapping: &mut DocumentMapping,
    fields: &mut Vec<Requestable>,
) -> Result<()> {
    let Some(filter) = &parsed.filter else {
        return Ok(());
    };
    resolve_inner_filter_dependencies(
        repo,
        parent_collection_name,
        &filter.conditions,
        mapping,
        fields,
    )
}

fn resolve_inner_filter_dependencies(
    repo: &mut DescriptionsRepo<'_>,
    parent_collection_name: &str,
    source: &serde_json::Map<String, serde_json::Value>,
    mapping: &mut DocumentMapping,
    fields: &mut Vec<Requestable>,
) -> Result<()> {
    for (key, clause) in source {
        if is_operator_key(key) {
            continue;
        }

        if !mapping.contains_name(key) {
            let index = mapping.next_index();

            let dummy_parsed = UnresolvedSelect::new(key);
            let child_collection_name =
                get_collection_name(repo, &dummy_parsed, parent_collection_name)?;
            let (child_mapping, _) = get_top_level_info(repo, &dummy_parsed, &child_collection_name)?;
            let child_mapping = child_mapping.clone_without_render();
            mapping.set_child_at(index, child_mapping.clone());

            debug!(field = %key, index, "synthesizing filter dependency join");
            fields.push(Requestable::Select(Box::new(Select {
                targetable: Targetable::from_field(Field::new(index, key)),
                collection_name: child_collection_name,
                mapping: child_mapping,
                cid: None,
                fields: Vec::new(),
            })));
            mapping.add(index, key);
        }

        let key_index = mapping.first_index_of_name(key);
        if mapping.child_at(key_index).is_none() {
            // Not a relation/join: no child properties to process.
            continue;
        }

        let Some(child_filter) = clause.as_object() else {
            // Not a child filter: no inner dependencies to add.
            continue;
        };

        let dummy_parsed = UnresolvedSelect::new(key);
        let child_collection_name =
            get_collection_name(repo, &dummy_parsed, parent_collection_name)?;

        // The nested filter may reference properties of the joined child
        // that need lazy joins of their own; those accumulate on the host
        // select's field list.
        let host_position = fields
            .iter()
            .position(|field| field.index() == key_index && field.as_select().is_some())
            .ok_or_else(|| {
                QueryError::Internal(format!("failed to find filter host field: {key}"))
            })?;
        {
            let host = fields[host_position]
                .as_select_mut()
                .ok_or_else(|| QueryError::Internal("host must be a select".to_string()))?;
            resolve_inner_filter_dependencies(
                repo,
                &child_collection_name,
                child_filter,
                &mut host.mapping,
                &mut host.fields,
            )?;
        }

        // The child scope may have grown; re-install it so the parent's
        // view of the child mapping stays authoritative.
        let host_mapping = fields[host_position]
            .as_select()
            .map(|select| select.mapping.clone())
            .unwrap_or_default();
        mapping.set_child_at(key_index, host_mapping);
    }

    Ok(())
}

/// Map order-condition join fields that were missed due to not being
/// requested.
fn resolve_order_dependencies(
    repo: &mut DescriptionsRepo<'_>,
    collection_name: &str,
    parsed: &UnresolvedSelect,
    mapping: &mut DocumentMapping,
    fields: &mut Vec<Requestable>,
) -> Result<()> {
    let Some(order_by) = &parsed.order_by else {
        return Ok(());
    };

    for condition in &order_by.conditions {
        let mut segments = condition.field.split('.');
        let join_field = segments.next().unwrap_or_default();
        if segments.next().is_none() {
            // Single-segment paths cannot cross a join.
            continue;
        }

        if !mapping.contains_name(join_field) {
            let index = mapping.next_index();
            mapping.add(index, join_field);

            debug!(field = %join_field, index, "synthesizing order dependency join");
            let dummy_parsed = UnresolvedSelect::new(join_field);
            let inner = lower_select(repo, index, &dummy_parsed, collection_name)?;
            mapping.set_child_at(index, inner.mapping.clone());
            fields.push(Requestable::Select(Box::new(inner)));
        }
    }

    Ok(())
}

fn to_targetable(index: usize, parsed: &UnresolvedSelect, mapping: &DocumentMapping) -> Targetable {
    Targetable {
        field: Field::new(index, parsed.name.as_ref()),
        doc_keys: parsed.doc_keys.clone(),
        filter: to_filter(parsed.filter.as_ref(), mapping),
        limit: parsed.limit,
        order_by: to_order_by(parsed.order_by.as_ref(), mapping),
        group_by: to_group_by(parsed.group_by.as_ref(), mapping),
    }
}

/// Resolve group-by field names against the mapping.
fn to_group_by(source: Option<&UnresolvedGroupBy>, mapping: &DocumentMapping) -> Option<GroupBy> {
    let source = source?;
    let fields = source
        .fields
        .iter()
        // The first index wins for duplicate names; the consumer has no way
        // to disambiguate.
        .map(|name| Field::new(mapping.first_index_of_name(name), name))
        .collect();
    Some(GroupBy { fields })
}

/// Resolve dot-delimited order paths into index chains.
///
/// Each path segment resolves against the current mapping and advances into
/// the child mapping at that index; the chain length always equals the
/// path's dot-arity. Unresolvable segments are preserved as
/// [`UNMAPPED_INDEX`] for the executor to reject.
pub(crate) fn to_order_by(
    source: Option<&UnresolvedOrderBy>,
    mapping: &DocumentMapping,
) -> Option<OrderBy> {
    let source = source?;

    let conditions = source
        .conditions
        .iter()
        .map(|condition| {
            if condition.field.is_empty() {
                // Inline-array ordering: a direction with no path.
                return OrderCondition {
                    field_indexes: Vec::new(),
                    direction: condition.direction,
                };
            }

            let segments: Vec<&str> = condition.field.split('.').collect();
            let mut field_indexes = Vec::with_capacity(segments.len());
            let mut current: Option<&DocumentMapping> = Some(mapping);

            for (position, segment) in segments.iter().enumerate() {
                let index =
                    current.map_or(UNMAPPED_INDEX, |scope| scope.first_index_of_name(segment));
                field_indexes.push(index);

                // No need to descend for the last segment.
                if position != segments.len() - 1 {
                    current = match index {
                        UNMAPPED_INDEX => None,
                        _ => current.and_then(|scope| scope.child_at(index)),
                    };
                }
            }

            OrderCondition {
                field_indexes,
                direction: condition.direction,
            }
        })
        .collect();

    Some(OrderBy { conditions })
}
