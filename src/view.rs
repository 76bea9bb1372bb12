/// NoteQuery View Implementation
///
/// A view turns a record collection into display-ready rows:
/// filter, sort, group, summarize, then resolve the column order.
/// Views never mutate their input and hold no state between calls, so
/// applying the same view twice to the same records gives the same result.

use crate::collate::locale_compare;
use crate::filter::{passes, FilterSpec};
use crate::record::Record;
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;

/// Group key for records whose group property is missing or falsy.
pub const UNGROUPED: &str = "Ungrouped";

/// Marker fields carried by serialized group header rows.
pub const GROUP_HEADER_MARKER: &str = "__isGroupHeader";
pub const GROUP_KEY_FIELD: &str = "__groupKey";

/// Keys computed for every view result; pass-through keys may not shadow them.
const RESULT_KEYS: [&str; 7] = [
    "name",
    "columns",
    "data",
    "summaries",
    "viewType",
    "groupBy",
    "indentProperties",
];

/// Sort direction specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order (smallest first, nulls last)
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Ascending,
    /// Descending order (largest first, nulls first)
    #[serde(rename = "DESC", alias = "desc")]
    Descending,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// A single sort rule specifying a property and direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRule {
    pub property: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortRule {
    pub fn ascending(property: impl Into<String>) -> Self {
        SortRule {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        SortRule {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Grouping specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub property: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl GroupSpec {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        GroupSpec {
            property: property.into(),
            direction,
        }
    }
}

/// Aggregations available to group summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Average,
    Count,
    Min,
    Max,
}

impl Aggregation {
    /// Parse an aggregation name, ignoring case. `avg` is accepted for `average`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sum" => Some(Aggregation::Sum),
            "average" | "avg" => Some(Aggregation::Average),
            "count" => Some(Aggregation::Count),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            _ => None,
        }
    }

    /// Aggregate a list of numbers. Returns None for an empty list.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let sum = || values.iter().sum::<f64>();
        let result = match self {
            Aggregation::Sum => sum(),
            Aggregation::Average => sum() / values.len() as f64,
            Aggregation::Count => values.len() as f64,
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(result)
    }
}

/// View specification as found in a `.base` file or frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    /// Display hint, `table` when absent
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub view_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupSpec>,
    /// Column name to aggregation name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_properties: Option<serde_json::Value>,
    /// Renderer-specific keys (`image`, `columnSize`, ...) passed through untouched
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl ViewSpec {
    pub fn view_type(&self) -> &str {
        self.view_type.as_deref().unwrap_or("table")
    }

    /// Apply this view to a record collection.
    pub fn apply(&self, records: &[Record]) -> ViewResult {
        apply_view(records, self)
    }
}

/// One row of view output
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRow {
    /// Marks the start of a group's members
    GroupHeader { key: String, property: String },
    Record(Record),
}

impl ViewRow {
    pub fn is_group_header(&self) -> bool {
        matches!(self, ViewRow::GroupHeader { .. })
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ViewRow::Record(record) => Some(record),
            ViewRow::GroupHeader { .. } => None,
        }
    }
}

impl Serialize for ViewRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ViewRow::Record(record) => record.serialize(serializer),
            ViewRow::GroupHeader { key, property } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry(GROUP_HEADER_MARKER, &true)?;
                map.serialize_entry(GROUP_KEY_FIELD, key)?;
                if property != GROUP_HEADER_MARKER && property != GROUP_KEY_FIELD {
                    map.serialize_entry(property, key)?;
                }
                map.end()
            }
        }
    }
}

/// Display-ready output of a view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub data: Vec<ViewRow>,
    /// Group key to column to aggregate
    pub summaries: IndexMap<String, IndexMap<String, Option<f64>>>,
    pub view_type: String,
    pub group_by: Option<GroupSpec>,
    pub indent_properties: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl ViewResult {
    /// Records in output order, without group headers.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.data.iter().filter_map(ViewRow::as_record)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Apply a view to a record collection.
pub fn apply_view(records: &[Record], view: &ViewSpec) -> ViewResult {
    let mut rows: Vec<&Record> = records
        .iter()
        .filter(|record| passes(record, view.filters.as_ref()))
        .collect();

    if !view.sort.is_empty() {
        sort_records(&mut rows, &view.sort);
    }

    log::debug!(
        "View {:?}: {} of {} records after filtering",
        view.name.as_deref().unwrap_or(""),
        rows.len(),
        records.len()
    );

    let columns = resolve_columns(view, rows.first().copied());

    let mut summaries = IndexMap::new();
    let data = match &view.group_by {
        Some(group_by) => {
            let groups = group_records(&rows, group_by);
            if let Some(spec) = &view.summaries {
                summaries = summarize(&groups, spec);
            }
            flatten_groups(groups, &group_by.property)
        }
        None => rows.into_iter().cloned().map(ViewRow::Record).collect(),
    };

    ViewResult {
        name: view.name.clone(),
        columns,
        data,
        summaries,
        view_type: view.view_type().to_string(),
        group_by: view.group_by.clone(),
        indent_properties: view.indent_properties.clone(),
        extra: passthrough_keys(&view.extra),
    }
}

fn passthrough_keys(extra: &IndexMap<String, serde_json::Value>) -> IndexMap<String, serde_json::Value> {
    extra
        .iter()
        .filter(|(key, _)| {
            let reserved = RESULT_KEYS.contains(&key.as_str());
            if reserved {
                log::debug!("Ignoring view key {:?}, it names a computed field", key);
            }
            !reserved
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Stable multi-key sort.
pub fn sort_records(records: &mut [&Record], rules: &[SortRule]) {
    records.sort_by(|a, b| {
        for rule in rules {
            let cmp = compare_by_rule(a, b, rule);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
}

/// Compare two records on one sort rule.
///
/// Null and missing values rank above everything else before the direction
/// is applied, so they land last under ASC and first under DESC. Numbers
/// rank below every other non-null value and compare numerically; the rest
/// compare as display text. The result is a total order for any mix of types.
fn compare_by_rule(a: &Record, b: &Record, rule: &SortRule) -> Ordering {
    let val_a = a.lookup(&rule.property).filter(|v| !v.is_null());
    let val_b = b.lookup(&rule.property).filter(|v| !v.is_null());

    let base_cmp = match (val_a.as_deref(), val_b.as_deref()) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x.total_cmp(y),
        (Some(Value::Number(_)), Some(_)) => Ordering::Less,
        (Some(_), Some(Value::Number(_))) => Ordering::Greater,
        (Some(x), Some(y)) => locale_compare(&x.to_display(), &y.to_display()),
    };

    rule.direction.apply(base_cmp)
}

/// Group key for a record: the property's display text, or `Ungrouped`
/// when the value is missing or falsy.
pub fn group_key(record: &Record, property: &str) -> String {
    match record.lookup(property) {
        Some(value) if value.is_truthy() => value.to_display(),
        _ => UNGROUPED.to_string(),
    }
}

/// Partition records by group key, members keeping their sorted order and
/// groups ordered by key.
fn group_records<'r>(records: &[&'r Record], group_by: &GroupSpec) -> IndexMap<String, Vec<&'r Record>> {
    let mut groups: IndexMap<String, Vec<&Record>> = IndexMap::new();
    for record in records {
        groups
            .entry(group_key(record, &group_by.property))
            .or_default()
            .push(*record);
    }
    groups.sort_by(|a, _, b, _| group_by.direction.apply(locale_compare(a, b)));
    groups
}

fn flatten_groups(groups: IndexMap<String, Vec<&Record>>, property: &str) -> Vec<ViewRow> {
    let mut data = Vec::new();
    for (key, members) in groups {
        data.push(ViewRow::GroupHeader {
            key,
            property: property.to_string(),
        });
        data.extend(members.into_iter().cloned().map(ViewRow::Record));
    }
    data
}

/// Aggregate each summarized column per group over its numeric values only.
fn summarize(
    groups: &IndexMap<String, Vec<&Record>>,
    spec: &IndexMap<String, String>,
) -> IndexMap<String, IndexMap<String, Option<f64>>> {
    groups
        .iter()
        .map(|(key, members)| {
            let cells = spec
                .iter()
                .map(|(column, aggregation)| {
                    let values: Vec<f64> = members
                        .iter()
                        .filter_map(|record| record.lookup(column).and_then(|v| v.as_f64()))
                        .collect();
                    let result = Aggregation::parse(aggregation).and_then(|agg| agg.apply(&values));
                    (column.clone(), result)
                })
                .collect();
            (key.clone(), cells)
        })
        .collect()
}

/// `order`, else `properties`, else the keys of the first record.
fn resolve_columns(view: &ViewSpec, first: Option<&Record>) -> Vec<String> {
    if let Some(order) = &view.order {
        return order.clone();
    }
    if let Some(properties) = &view.properties {
        return properties.clone();
    }
    first
        .map(|record| record.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().cloned().collect()
    }

    fn values(result: &ViewResult, property: &str) -> Vec<Value> {
        result
            .records()
            .map(|r| r.get(property).cloned().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_multi_key_sort_is_stable() {
        let records = vec![
            rec(&[("r", Value::Number(2.0)), ("a", Value::from("b"))]),
            rec(&[("r", Value::Number(1.0)), ("a", Value::from("a"))]),
            rec(&[("r", Value::Number(2.0)), ("a", Value::from("a"))]),
        ];
        let view = ViewSpec {
            sort: vec![SortRule::ascending("r"), SortRule::ascending("a")],
            ..Default::default()
        };
        let result = apply_view(&records, &view);
        assert_eq!(values(&result, "r"), vec![Value::Number(1.0), Value::Number(2.0), Value::Number(2.0)]);
        assert_eq!(values(&result, "a"), vec![Value::from("a"), Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records: Vec<Record> = ["x", "y", "z"]
            .iter()
            .map(|id| rec(&[("id", Value::from(*id)), ("k", Value::Number(1.0))]))
            .collect();
        let view = ViewSpec {
            sort: vec![SortRule::descending("k")],
            ..Default::default()
        };
        let result = apply_view(&records, &view);
        assert_eq!(values(&result, "id"), vec![Value::from("x"), Value::from("y"), Value::from("z")]);
    }

    #[test]
    fn test_null_ordering() {
        let records = vec![
            rec(&[("v", Value::Number(1.0))]),
            rec(&[("v", Value::Null)]),
            rec(&[("v", Value::Number(2.0))]),
        ];
        let asc = apply_view(&records, &ViewSpec { sort: vec![SortRule::ascending("v")], ..Default::default() });
        assert_eq!(values(&asc, "v"), vec![Value::Number(1.0), Value::Number(2.0), Value::Null]);

        let desc = apply_view(&records, &ViewSpec { sort: vec![SortRule::descending("v")], ..Default::default() });
        assert_eq!(values(&desc, "v"), vec![Value::Null, Value::Number(2.0), Value::Number(1.0)]);
    }

    #[test]
    fn test_numbers_rank_before_text() {
        let records = vec![
            rec(&[("d", Value::from("2014-05-01"))]),
            rec(&[("d", Value::Number(2005.0))]),
            rec(&[("d", Value::from("1998-09-01"))]),
            rec(&[("d", Value::Number(1999.0))]),
        ];
        let result = apply_view(&records, &ViewSpec { sort: vec![SortRule::ascending("d")], ..Default::default() });
        assert_eq!(
            values(&result, "d"),
            vec![
                Value::Number(1999.0),
                Value::Number(2005.0),
                Value::from("1998-09-01"),
                Value::from("2014-05-01"),
            ]
        );
    }

    #[test]
    fn test_large_mixed_column_sorts_without_panicking() {
        let records: Vec<Record> = (0..2000)
            .map(|n| {
                let v = if n % 2 == 0 { Value::Number(n as f64) } else { Value::from(n.to_string()) };
                rec(&[("v", v)])
            })
            .chain(std::iter::once(rec(&[("v", Value::Number(f64::NAN))])))
            .collect();

        for rule in [SortRule::ascending("v"), SortRule::descending("v")] {
            let result = apply_view(&records, &ViewSpec { sort: vec![rule.clone()], ..Default::default() });
            let sorted = values(&result, "v");
            assert_eq!(sorted.len(), records.len());
            let first_text = sorted.iter().position(|v| matches!(v, Value::String(_))).unwrap();
            let last_number = sorted.iter().rposition(|v| matches!(v, Value::Number(_))).unwrap();
            if rule.direction == SortDirection::Ascending {
                assert!(last_number < first_text);
                assert_eq!(sorted[0], Value::Number(0.0));
            } else {
                assert!(first_text < last_number);
            }
        }
    }

    #[test]
    fn test_text_sort_ignores_case() {
        let records = vec![
            rec(&[("artist", Value::from("foxing"))]),
            rec(&[("artist", Value::from("Deftones"))]),
            rec(&[("artist", Value::from("Interpol"))]),
        ];
        let result = apply_view(&records, &ViewSpec { sort: vec![SortRule::ascending("artist")], ..Default::default() });
        assert_eq!(
            values(&result, "artist"),
            vec![Value::from("Deftones"), Value::from("foxing"), Value::from("Interpol")]
        );
    }

    #[test]
    fn test_grouping() {
        let records = vec![
            rec(&[("id", Value::Number(1.0)), ("category", Value::from("b"))]),
            rec(&[("id", Value::Number(2.0)), ("category", Value::from("a"))]),
            rec(&[("id", Value::Number(3.0)), ("category", Value::from("a"))]),
        ];
        let view = ViewSpec {
            group_by: Some(GroupSpec::new("category", SortDirection::Ascending)),
            ..Default::default()
        };
        let result = apply_view(&records, &view);

        assert_eq!(result.data.len(), 5);
        assert_eq!(
            result.data[0],
            ViewRow::GroupHeader { key: "a".to_string(), property: "category".to_string() }
        );
        assert_eq!(result.data[1].as_record().and_then(|r| r.get("id")), Some(&Value::Number(2.0)));
        assert_eq!(result.data[2].as_record().and_then(|r| r.get("id")), Some(&Value::Number(3.0)));
        assert!(matches!(&result.data[3], ViewRow::GroupHeader { key, .. } if key == "b"));
        assert_eq!(result.data[4].as_record().and_then(|r| r.get("id")), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_grouping_descending_with_ungrouped() {
        let records = vec![
            rec(&[("category", Value::from("apple"))]),
            rec(&[("other", Value::from("x"))]),
            rec(&[("category", Value::from(""))]),
            rec(&[("category", Value::from("zebra"))]),
        ];
        let view = ViewSpec {
            group_by: Some(GroupSpec::new("category", SortDirection::Descending)),
            ..Default::default()
        };
        let result = apply_view(&records, &view);
        let headers: Vec<&str> = result
            .data
            .iter()
            .filter_map(|row| match row {
                ViewRow::GroupHeader { key, .. } => Some(key.as_str()),
                ViewRow::Record(_) => None,
            })
            .collect();
        assert_eq!(headers, vec!["zebra", UNGROUPED, "apple"]);
        assert_eq!(result.data.len(), 7);
    }

    #[test]
    fn test_summaries() {
        let records = vec![
            rec(&[("g", Value::from("x")), ("rating", Value::Number(4.0))]),
            rec(&[("g", Value::from("x")), ("rating", Value::Null)]),
            rec(&[("g", Value::from("x")), ("rating", Value::Number(5.0))]),
            rec(&[("g", Value::from("y")), ("rating", Value::from("7"))]),
        ];
        let view: ViewSpec = serde_yaml::from_str(
            "groupBy:\n  property: g\nsummaries:\n  rating: average\n  missing: sum\n  other: median\n",
        )
        .unwrap();
        let result = apply_view(&records, &view);

        let x = &result.summaries["x"];
        assert!((x["rating"].unwrap() - 4.5).abs() < 1e-9);
        assert_eq!(x["missing"], None);
        assert_eq!(x["other"], None);
        // text is not a number for summaries
        assert_eq!(result.summaries["y"]["rating"], None);
    }

    #[test]
    fn test_aggregations() {
        let values = [4.0, -1.0, 5.0];
        assert_eq!(Aggregation::parse("SUM").and_then(|a| a.apply(&values)), Some(8.0));
        assert_eq!(Aggregation::parse("avg").and_then(|a| a.apply(&[4.0, 5.0])), Some(4.5));
        assert_eq!(Aggregation::parse("count").and_then(|a| a.apply(&values)), Some(3.0));
        assert_eq!(Aggregation::parse("Min").and_then(|a| a.apply(&values)), Some(-1.0));
        assert_eq!(Aggregation::parse("max").and_then(|a| a.apply(&values)), Some(5.0));
        assert_eq!(Aggregation::Sum.apply(&[]), None);
        assert_eq!(Aggregation::parse("median"), None);
    }

    #[test]
    fn test_summaries_need_grouping() {
        let records = vec![rec(&[("rating", Value::Number(4.0))])];
        let view: ViewSpec = serde_yaml::from_str("summaries:\n  rating: sum\n").unwrap();
        assert!(apply_view(&records, &view).summaries.is_empty());
    }

    #[test]
    fn test_column_resolution() {
        let records = vec![
            rec(&[("b", Value::Number(2.0)), ("a", Value::Number(1.0))]),
            rec(&[("a", Value::Number(0.0)), ("c", Value::Number(3.0))]),
        ];
        let order = ViewSpec { order: Some(vec!["a".into()]), properties: Some(vec!["c".into()]), ..Default::default() };
        assert_eq!(apply_view(&records, &order).columns, vec!["a"]);

        let properties = ViewSpec { properties: Some(vec!["c".into()]), ..Default::default() };
        assert_eq!(apply_view(&records, &properties).columns, vec!["c"]);

        let sorted = ViewSpec { sort: vec![SortRule::ascending("a")], ..Default::default() };
        assert_eq!(apply_view(&records, &sorted).columns, vec!["a", "c"]);

        assert!(apply_view(&[], &ViewSpec::default()).columns.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let view: ViewSpec = serde_yaml::from_str(
            "filters: rating > 3\nsort:\n  - property: rating\n    direction: DESC\ngroupBy:\n  property: artist\nsummaries:\n  rating: sum\n",
        )
        .unwrap();
        let result = apply_view(&[], &view);
        assert!(result.data.is_empty());
        assert!(result.summaries.is_empty());
        assert!(result.columns.is_empty());
    }

    #[test]
    fn test_view_filters() {
        let records = vec![
            rec(&[("rating", Value::Number(5.0))]),
            rec(&[("rating", Value::Number(2.0))]),
            rec(&[("other", Value::Number(9.0))]),
        ];
        let view = ViewSpec { filters: Some(FilterSpec::expression("rating > 3")), ..Default::default() };
        let result = apply_view(&records, &view);
        assert_eq!(values(&result, "rating"), vec![Value::Number(5.0)]);
    }

    #[test]
    fn test_view_spec_deserialize() {
        let view: ViewSpec = serde_yaml::from_str(
            r#"
type: cards
name: Albums
order:
  - artist
  - rating
sort:
  - property: rating
    direction: asc
  - property: artist
    direction: DESC
groupBy:
  property: artist
indentProperties: true
image: note.image
columnSize:
  note.artist: 120
"#,
        )
        .unwrap();
        assert_eq!(view.view_type(), "cards");
        assert_eq!(view.sort[0].direction, SortDirection::Ascending);
        assert_eq!(view.sort[1], SortRule::descending("artist"));
        assert_eq!(view.group_by.as_ref().map(|g| g.direction), Some(SortDirection::Ascending));
        assert_eq!(view.indent_properties, Some(serde_json::json!(true)));
        assert_eq!(view.extra.get("image"), Some(&serde_json::json!("note.image")));
        assert!(view.extra.contains_key("columnSize"));
        assert_eq!(ViewSpec::default().view_type(), "table");
    }

    #[test]
    fn test_result_serialization() {
        let records = vec![rec(&[("artist", Value::from("Foxing")), ("rating", Value::Number(4.0))])];
        let view: ViewSpec = serde_yaml::from_str("groupBy:\n  property: artist\nimage: note.image\n").unwrap();
        let json = serde_json::to_value(apply_view(&records, &view)).unwrap();

        assert_eq!(json["viewType"], "table");
        assert_eq!(json["columns"], serde_json::json!(["artist", "rating"]));
        assert_eq!(
            json["data"][0],
            serde_json::json!({"__isGroupHeader": true, "__groupKey": "Foxing", "artist": "Foxing"})
        );
        assert_eq!(json["data"][1], serde_json::json!({"artist": "Foxing", "rating": 4}));
        assert_eq!(json["groupBy"], serde_json::json!({"property": "artist", "direction": "ASC"}));
        assert_eq!(json["indentProperties"], serde_json::Value::Null);
        assert_eq!(json["image"], "note.image");
    }

    #[test]
    fn test_view_keys_cannot_shadow_computed_fields() {
        let records = vec![rec(&[("artist", Value::from("Foxing"))])];
        let view: ViewSpec =
            serde_yaml::from_str("columns: [nope]\ndata: 5\nviewType: gallery\nimage: note.image\n").unwrap();
        assert!(view.extra.contains_key("columns"));

        let result = apply_view(&records, &view);
        assert!(!result.extra.contains_key("columns"));
        assert!(!result.extra.contains_key("data"));
        assert!(!result.extra.contains_key("viewType"));

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json.matches("\"columns\"").count(), 1);
        let json: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(json["columns"], serde_json::json!(["artist"]));
        assert_eq!(json["data"], serde_json::json!([{"artist": "Foxing"}]));
        assert_eq!(json["viewType"], "table");
        assert_eq!(json["image"], "note.image");
    }

    #[test]
    fn test_idempotent() {
        let records = vec![
            rec(&[("a", Value::from("b")), ("n", Value::Number(2.0))]),
            rec(&[("a", Value::from("a")), ("n", Value::Null)]),
        ];
        let view = ViewSpec {
            sort: vec![SortRule::descending("n")],
            group_by: Some(GroupSpec::new("a", SortDirection::Ascending)),
            ..Default::default()
        };
        assert_eq!(apply_view(&records, &view), apply_view(&records, &view));
    }
}
