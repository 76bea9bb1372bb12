/// NoteQuery Filter Implementation
///
/// A filter specification is a small tree: predicate strings at the leaves,
/// combined with `and`/`or`/`not` nodes. A bare list is an implicit AND and
/// a mapping without a combinator key is an equality check per property.
///
/// ```yaml
/// filters:
///   and:
///     - file.path.startsWith("Music")
///     - or:
///         - rating >= 4
///         - artist: Foxing
///     - not:
///         - image.isEmpty()
/// ```

use crate::predicate;
use crate::record::Record;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Recursive filter specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Predicate string, see [`predicate::evaluate`]
    Expression(String),
    /// Every element must pass
    All(Vec<FilterSpec>),
    And { and: Vec<FilterSpec> },
    Or { or: Vec<FilterSpec> },
    /// Passes when none of the elements pass
    Not { not: Vec<FilterSpec> },
    /// Property name to required value, compared strictly
    Equals(IndexMap<String, Value>),
}

impl FilterSpec {
    pub fn expression(expr: impl Into<String>) -> Self {
        FilterSpec::Expression(expr.into())
    }

    pub fn and(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::And { and: filters }
    }

    pub fn or(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::Or { or: filters }
    }

    pub fn not(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::Not { not: filters }
    }

    /// Evaluate this filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        evaluate_filter(record, self)
    }
}

impl From<&str> for FilterSpec {
    fn from(expr: &str) -> Self {
        FilterSpec::Expression(expr.to_string())
    }
}

/// Evaluate a filter specification against a record.
///
/// AND and OR short-circuit left to right. An empty predicate string is no
/// filter at all and passes.
pub fn evaluate_filter(record: &Record, spec: &FilterSpec) -> bool {
    match spec {
        FilterSpec::Expression(expr) if expr.is_empty() => true,
        FilterSpec::Expression(expr) => predicate::evaluate(record, expr),
        FilterSpec::All(filters) | FilterSpec::And { and: filters } => {
            filters.iter().all(|f| evaluate_filter(record, f))
        }
        FilterSpec::Or { or: filters } => filters.iter().any(|f| evaluate_filter(record, f)),
        FilterSpec::Not { not: filters } => !filters.iter().any(|f| evaluate_filter(record, f)),
        FilterSpec::Equals(expected) => expected.iter().all(|(key, value)| {
            record
                .lookup(key)
                .map_or(false, |actual| actual.strict_eq(value))
        }),
    }
}

/// Evaluate an optional filter. No filter lets every record through.
pub fn passes(record: &Record, spec: Option<&FilterSpec>) -> bool {
    spec.map_or(true, |spec| evaluate_filter(record, spec))
}

/// Keep the records that pass the filter, in their original order.
pub fn filter_records(records: &[Record], spec: Option<&FilterSpec>) -> Vec<Record> {
    records
        .iter()
        .filter(|record| passes(record, spec))
        .cloned()
        .collect()
}
