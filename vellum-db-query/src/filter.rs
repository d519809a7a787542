//! Filter translation and evaluation
//!
//! Converts the consumer's name-keyed filter trees into index-keyed trees
//! over a [`DocumentMapping`], and evaluates the converted form against
//! rendered documents.
//!
//! Translation rules:
//! - Keys starting with `_` (except the document-key field) are operators;
//!   array-valued operators (`_and`, `_or`) recurse element-wise, map-valued
//!   operators recurse key-by-key under the same mapping.
//! - All other keys are properties, resolved to their first bound index.
//!   Map-valued entries under a property recurse, descending into the
//!   property's child mapping at join boundaries.
//! - The original name-keyed tree is preserved verbatim on the result for
//!   diagnostics and structural-equality checks.

use serde_json::{Map, Value};

use vellum_db_core::DocumentMapping;

use crate::ast::UnresolvedFilter;
use crate::error::{QueryError, Result};
use vellum_vocab::fields;

/// A key within an index-keyed filter tree.
///
/// Two keys are equal iff they are of the same variant and their payloads
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKey {
    /// A property, identified by its index in the relevant mapping.
    PropertyIndex(usize),
    /// A logical or comparison operator (`_and`, `_eq`, ...).
    Operator(String),
}

impl FilterKey {
    /// Create an operator key.
    pub fn operator(op: impl Into<String>) -> Self {
        FilterKey::Operator(op.into())
    }
}

/// A value within an index-keyed filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A nested condition map.
    Conditions(Vec<(FilterKey, FilterValue)>),
    /// An array of clauses (operator values such as `_and`/`_or`, or `_in`
    /// operand lists).
    List(Vec<FilterValue>),
    /// A scalar leaf, kept as raw JSON.
    Scalar(Value),
}

/// An index-keyed filter with its original name-keyed form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    /// The index-keyed condition tree consumed by the executor.
    pub conditions: Vec<(FilterKey, FilterValue)>,
    /// The original name-keyed conditions, preserved verbatim.
    pub external_conditions: Map<String, Value>,
}

impl Filter {
    /// Structural equality of two optional filters by their converted
    /// conditions.
    ///
    /// Key order does not participate: two trees are equal when every
    /// condition of one has a matching condition in the other.
    pub fn options_equal(a: Option<&Filter>, b: Option<&Filter>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => conditions_equal(&a.conditions, &b.conditions),
            _ => false,
        }
    }
}

/// Returns true if the given key names an operator rather than a property.
///
/// The document-key field starts with the operator prefix but is a
/// property.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(fields::OPERATOR_PREFIX) && key != fields::DOC_KEY
}

/// Convert a name-keyed filter into an index-keyed one under `mapping`.
///
/// Returns `None` for an absent source so callers can pass optional filters
/// straight through.
pub fn to_filter(source: Option<&UnresolvedFilter>, mapping: &DocumentMapping) -> Option<Filter> {
    let source = source?;
    let conditions = source
        .conditions
        .iter()
        .map(|(key, clause)| to_filter_entry(key, clause, mapping))
        .collect();

    Some(Filter {
        conditions,
        external_conditions: source.conditions.clone(),
    })
}

/// Convert a single name-keyed entry into an index-keyed one.
fn to_filter_entry(key: &str, clause: &Value, mapping: &DocumentMapping) -> (FilterKey, FilterValue) {
    if is_operator_key(key) {
        let converted = match clause {
            // Array-valued operators recurse element-wise; plain elements
            // are carried as-is.
            Value::Array(clauses) => FilterValue::List(
                clauses
                    .iter()
                    .map(|inner| match inner {
                        Value::Object(entries) => FilterValue::Conditions(
                            entries
                                .iter()
                                .map(|(k, v)| to_filter_entry(k, v, mapping))
                                .collect(),
                        ),
                        other => FilterValue::Scalar(other.clone()),
                    })
                    .collect(),
            ),
            // Map-valued operators recurse key-by-key under the same
            // mapping.
            Value::Object(entries) => FilterValue::Conditions(
                entries
                    .iter()
                    .map(|(k, v)| to_filter_entry(k, v, mapping))
                    .collect(),
            ),
            other => FilterValue::Scalar(other.clone()),
        };
        (FilterKey::operator(key), converted)
    } else {
        // Multiple properties of one name cannot be told apart by the
        // consumer, so the first index wins.
        let index = mapping.first_index_of_name(key);
        let converted = match clause {
            Value::Object(entries) => FilterValue::Conditions(
                entries
                    .iter()
                    .map(|(inner_key, inner_value)| {
                        // A map-valued entry means this key refers to a join
                        // host and deeper keys name properties of the child
                        // items.
                        let inner_mapping = match inner_value {
                            Value::Object(_) => mapping.child_at(index).unwrap_or(mapping),
                            _ => mapping,
                        };
                        to_filter_entry(inner_key, inner_value, inner_mapping)
                    })
                    .collect(),
            ),
            other => FilterValue::Scalar(other.clone()),
        };
        (FilterKey::PropertyIndex(index), converted)
    }
}

/// Order-insensitive deep equality of two condition trees.
pub fn conditions_equal(
    a: &[(FilterKey, FilterValue)],
    b: &[(FilterKey, FilterValue)],
) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().all(|(key, value)| {
        b.iter()
            .any(|(other_key, other_value)| key == other_key && values_deep_equal(value, other_value))
    })
}

fn values_deep_equal(a: &FilterValue, b: &FilterValue) -> bool {
    match (a, b) {
        (FilterValue::Conditions(a), FilterValue::Conditions(b)) => conditions_equal(a, b),
        (FilterValue::List(a), FilterValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_deep_equal(x, y))
        }
        (FilterValue::Scalar(a), FilterValue::Scalar(b)) => a == b,
        _ => false,
    }
}

/// Evaluate `filter` against a rendered document.
///
/// The document is the positional form produced by the executor: a JSON
/// array whose position `i` holds the value of the field at index `i`, with
/// sub-documents nested as arrays. An absent filter matches everything.
pub fn run_filter(doc: &Value, filter: Option<&Filter>) -> Result<bool> {
    match filter {
        None => Ok(true),
        Some(filter) => eval_conditions(doc, &filter.conditions),
    }
}

static NULL: Value = Value::Null;

fn field_value(scope: &Value, index: usize) -> &Value {
    scope
        .as_array()
        .and_then(|fields| fields.get(index))
        .unwrap_or(&NULL)
}

fn eval_conditions(scope: &Value, conditions: &[(FilterKey, FilterValue)]) -> Result<bool> {
    for (key, value) in conditions {
        let matched = match key {
            FilterKey::PropertyIndex(index) => eval_value(field_value(scope, *index), value)?,
            FilterKey::Operator(op) => eval_operator(scope, op, value)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_value(scope: &Value, value: &FilterValue) -> Result<bool> {
    match value {
        FilterValue::Conditions(conditions) => {
            // Conditions referencing properties of an array scope apply
            // existentially over the array's sub-documents.
            if let Value::Array(items) = scope {
                let references_properties = conditions
                    .iter()
                    .any(|(key, _)| matches!(key, FilterKey::PropertyIndex(_)));
                if references_properties {
                    for item in items {
                        if eval_conditions(item, conditions)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
            }
            eval_conditions(scope, conditions)
        }
        // A bare scalar clause is an implicit equality.
        FilterValue::Scalar(expected) => Ok(scope == expected),
        FilterValue::List(_) => Err(QueryError::InvalidFilter(
            "array clause outside an operator".to_string(),
        )),
    }
}

fn eval_operator(scope: &Value, op: &str, operand: &FilterValue) -> Result<bool> {
    match (op, operand) {
        ("_and", FilterValue::List(clauses)) => {
            for clause in clauses {
                if !eval_value(scope, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ("_or", FilterValue::List(clauses)) => {
            for clause in clauses {
                if eval_value(scope, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ("_not", FilterValue::Conditions(conditions)) => {
            Ok(!eval_conditions(scope, conditions)?)
        }
        ("_eq", FilterValue::Scalar(expected)) => Ok(scope == expected),
        ("_ne", FilterValue::Scalar(expected)) => Ok(scope != expected),
        ("_gt", FilterValue::Scalar(expected)) => compare_numbers(scope, expected, |o| o > 0.0),
        ("_ge", FilterValue::Scalar(expected)) => compare_numbers(scope, expected, |o| o >= 0.0),
        ("_lt", FilterValue::Scalar(expected)) => compare_numbers(scope, expected, |o| o < 0.0),
        ("_le", FilterValue::Scalar(expected)) => compare_numbers(scope, expected, |o| o <= 0.0),
        ("_in", FilterValue::List(options)) => Ok(options
            .iter()
            .any(|option| matches!(option, FilterValue::Scalar(v) if v == scope))),
        ("_nin", FilterValue::List(options)) => Ok(!options
            .iter()
            .any(|option| matches!(option, FilterValue::Scalar(v) if v == scope))),
        (op, _) => Err(QueryError::InvalidFilter(format!(
            "unsupported operator: {op}"
        ))),
    }
}

fn compare_numbers(scope: &Value, expected: &Value, check: impl Fn(f64) -> bool) -> Result<bool> {
    match (scope.as_f64(), expected.as_f64()) {
        (Some(actual), Some(expected)) => Ok(check(actual - expected)),
        // Null (or non-numeric) values never satisfy an ordering
        // comparison.
        _ => Ok(false),
    }
}
