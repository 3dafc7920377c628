//! Query model and evaluation shared by the bundled backends.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stored document. Always a JSON object.
pub type Document = Value;

/// A single filter clause. All clauses of a query must match.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value.
    Eq {
        /// Top-level field name.
        field: String,
        /// Value to compare against.
        value: Value,
    },
    /// Field is strictly greater than value.
    Gt {
        /// Top-level field name.
        field: String,
        /// Lower bound (exclusive).
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// Top-level field name.
        field: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// Document ID is one of the given IDs.
    IdIn(Vec<String>),
}

impl Filter {
    fn in_size(&self) -> usize {
        match self {
            Filter::In { values, .. } => values.len(),
            Filter::IdIn(ids) => ids.len(),
            _ => 0,
        }
    }

    fn matches(&self, id: &str, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc
                .get(field)
                .is_some_and(|v| compare_values(v, value) == Ordering::Equal),
            Filter::Gt { field, value } => doc.get(field).is_some_and(|v| {
                same_kind(v, value) && compare_values(v, value) == Ordering::Greater
            }),
            Filter::In { field, values } => doc.get(field).is_some_and(|v| {
                values
                    .iter()
                    .any(|candidate| compare_values(v, candidate) == Ordering::Equal)
            }),
            Filter::IdIn(ids) => ids.iter().any(|candidate| candidate == id),
        }
    }
}

/// Where a cursor-paged query resumes.
///
/// Ordered queries carry the order-field value of the last row seen, so the
/// position survives later edits to that row. Unordered queries only need
/// the ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    /// Order-field value of the last row seen.
    pub value: Option<Value>,
    /// Document ID of the last row seen.
    pub id: String,
}

/// Sort direction for ordered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A collection query.
///
/// Results are ordered by `order_by` (ties broken by document ID) or by
/// document ID when no ordering is given. `start_after` names the last row
/// of the previous page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter clauses (conjunction).
    pub filters: Vec<Filter>,
    /// Ordering field and direction.
    pub order_by: Option<(String, Direction)>,
    /// Resume after this row.
    pub start_after: Option<Cursor>,
    /// Number of matching documents to skip.
    pub offset: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query that matches every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a greater-than filter.
    #[must_use]
    pub fn where_gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an "in" filter on a field.
    #[must_use]
    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In {
            field: field.into(),
            values,
        });
        self
    }

    /// Adds an "in" filter on the document ID.
    #[must_use]
    pub fn where_id_in(mut self, ids: Vec<String>) -> Self {
        self.filters.push(Filter::IdIn(ids));
        self
    }

    /// Orders results by a field.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Resumes after the given document ID (unordered queries).
    #[must_use]
    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(Cursor {
            value: None,
            id: id.into(),
        });
        self
    }

    /// Resumes after the row `(value, id)` in `order_by` order.
    #[must_use]
    pub fn start_after_row(mut self, value: impl Into<Value>, id: impl Into<String>) -> Self {
        self.start_after = Some(Cursor {
            value: Some(value.into()),
            id: id.into(),
        });
        self
    }

    /// Skips the first `offset` matches.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Limits the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the largest number of values carried by any "in" clause.
    pub fn in_query_size(&self) -> usize {
        self.filters.iter().map(Filter::in_size).max().unwrap_or(0)
    }

    /// Checks the query against a backend's "in" limit.
    ///
    /// # Errors
    ///
    /// Returns `InQueryTooLarge` when an "in" clause exceeds `max_in`.
    pub fn check_in_limit(&self, max_in: usize) -> StoreResult<()> {
        let actual = self.in_query_size();
        if actual > max_in {
            return Err(StoreError::InQueryTooLarge {
                max: max_in,
                actual,
            });
        }
        Ok(())
    }
}

/// Evaluates a query against one collection's documents.
pub(crate) fn execute(
    docs: &BTreeMap<String, Document>,
    query: &Query,
) -> StoreResult<Vec<(String, Document)>> {
    let mut matched: Vec<(&String, &Document)> = docs
        .iter()
        .filter(|(id, doc)| query.filters.iter().all(|f| f.matches(id, doc)))
        .collect();

    if let Some((field, direction)) = &query.order_by {
        matched.sort_by(|a, b| order_key(field, *direction, a, b));
    }

    let mut start = 0;
    if let Some(cursor) = &query.start_after {
        start = match &query.order_by {
            Some((field, direction)) => {
                let value = cursor.value.as_ref().ok_or_else(|| {
                    StoreError::InvalidQuery(format!(
                        "cursor {:?} on an ordered query needs the {field} value",
                        cursor.id
                    ))
                })?;
                matched
                    .iter()
                    .position(|(id, doc)| {
                        order_cmp(*direction, doc.get(field), id, Some(value), &cursor.id)
                            == Ordering::Greater
                    })
                    .unwrap_or(matched.len())
            }
            None => matched
                .iter()
                .position(|(id, _)| id.as_str() > cursor.id.as_str())
                .unwrap_or(matched.len()),
        };
    }

    let limit = query.limit.unwrap_or(usize::MAX);
    Ok(matched
        .into_iter()
        .skip(start.saturating_add(query.offset))
        .take(limit)
        .map(|(id, doc)| (id.clone(), doc.clone()))
        .collect())
}

fn order_key(
    field: &str,
    direction: Direction,
    a: &(&String, &Document),
    b: &(&String, &Document),
) -> Ordering {
    order_cmp(direction, a.1.get(field), a.0, b.1.get(field), b.0)
}

fn order_cmp(
    direction: Direction,
    a: Option<&Value>,
    a_id: &str,
    b: Option<&Value>,
    b_id: &str,
) -> Ordering {
    let primary = match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let primary = match direction {
        Direction::Ascending => primary,
        Direction::Descending => primary.reverse(),
    };
    primary.then_with(|| a_id.cmp(b_id))
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Orders JSON values: null < bool < number < string < array < object.
///
/// Objects only compare by size; they are never used as sort keys.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> BTreeMap<String, Document> {
        let mut docs = BTreeMap::new();
        docs.insert("a".into(), json!({"category": "bedtime", "updatedAt": 30}));
        docs.insert("b".into(), json!({"category": "nature", "updatedAt": 10}));
        docs.insert("c".into(), json!({"category": "bedtime", "updatedAt": 20}));
        docs.insert("d".into(), json!({"category": "magic"}));
        docs
    }

    fn ids(results: &[(String, Document)]) -> Vec<&str> {
        results.iter().map(|(id, _)| id.as_str()).collect()
    }

    #[test]
    fn default_order_is_by_id() {
        let results = execute(&docs(), &Query::new()).unwrap();
        assert_eq!(ids(&results), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn equality_and_in_filters() {
        let results = execute(&docs(), &Query::new().where_eq("category", "bedtime")).unwrap();
        assert_eq!(ids(&results), vec!["a", "c"]);

        let query = Query::new().where_in("category", vec![json!("nature"), json!("magic")]);
        let results = execute(&docs(), &query).unwrap();
        assert_eq!(ids(&results), vec!["b", "d"]);

        let query = Query::new().where_id_in(vec!["d".into(), "a".into(), "zz".into()]);
        let results = execute(&docs(), &query).unwrap();
        assert_eq!(ids(&results), vec!["a", "d"]);
    }

    #[test]
    fn greater_than_skips_missing_fields() {
        let query = Query::new()
            .where_gt("updatedAt", 15)
            .order_by("updatedAt", Direction::Ascending);
        let results = execute(&docs(), &query).unwrap();
        assert_eq!(ids(&results), vec!["c", "a"]);
    }

    #[test]
    fn cursor_pagination_over_ordered_field() {
        let base = Query::new()
            .where_gt("updatedAt", 0)
            .order_by("updatedAt", Direction::Ascending)
            .limit(2);
        let first = execute(&docs(), &base).unwrap();
        assert_eq!(ids(&first), vec!["b", "c"]);

        let next = base.clone().start_after_row(20, "c");
        let second = execute(&docs(), &next).unwrap();
        assert_eq!(ids(&second), vec!["a"]);
    }

    #[test]
    fn ordered_cursor_ignores_later_edits_to_its_row() {
        let mut docs = BTreeMap::new();
        for (id, ts) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
            docs.insert(id.to_string(), json!({ "updatedAt": ts }));
        }
        let base = Query::new()
            .order_by("updatedAt", Direction::Ascending)
            .limit(1);
        let first = execute(&docs, &base).unwrap();
        assert_eq!(ids(&first), vec!["a"]);

        docs.insert("a".into(), json!({ "updatedAt": 35 }));
        let rest = execute(&docs, &Query { limit: None, ..base }.start_after_row(10, "a")).unwrap();
        assert_eq!(ids(&rest), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn ordered_cursor_without_value_is_rejected() {
        let query = Query::new()
            .order_by("updatedAt", Direction::Ascending)
            .start_after("a");
        assert!(matches!(
            execute(&docs(), &query),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn id_cursor_survives_deleted_anchor() {
        let query = Query::new().start_after("bb");
        let results = execute(&docs(), &query).unwrap();
        assert_eq!(ids(&results), vec!["c", "d"]);
    }

    #[test]
    fn offset_and_limit() {
        let results = execute(&docs(), &Query::new().offset(1).limit(2)).unwrap();
        assert_eq!(ids(&results), vec!["b", "c"]);
    }

    #[test]
    fn in_limit_check() {
        let ids: Vec<String> = (0..11).map(|i| format!("s{i}")).collect();
        let query = Query::new().where_id_in(ids);
        assert_eq!(query.in_query_size(), 11);
        assert!(matches!(
            query.check_in_limit(10),
            Err(StoreError::InQueryTooLarge { max: 10, actual: 11 })
        ));
        assert!(query.check_in_limit(11).is_ok());
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!(1), &json!(1.5)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!(1)), Ordering::Greater);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn cursor_pages_visit_every_document_once(
                stamps in proptest::collection::btree_map("[a-z]{1,6}", 0u64..20, 0..40),
                page in 1usize..7,
            ) {
                let docs: BTreeMap<String, Document> = stamps
                    .iter()
                    .map(|(id, ts)| (id.clone(), json!({"updatedAt": ts})))
                    .collect();

                let base = Query::new()
                    .order_by("updatedAt", Direction::Ascending)
                    .limit(page);
                let mut seen = Vec::new();
                let mut cursor: Option<(Value, String)> = None;
                loop {
                    let query = match &cursor {
                        Some((value, id)) => base.clone().start_after_row(value.clone(), id.clone()),
                        None => base.clone(),
                    };
                    let batch = execute(&docs, &query).unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    cursor = batch
                        .last()
                        .map(|(id, doc)| (doc["updatedAt"].clone(), id.clone()));
                    seen.extend(batch.into_iter().map(|(id, _)| id));
                }

                let mut expected: Vec<(u64, String)> =
                    stamps.iter().map(|(id, ts)| (*ts, id.clone())).collect();
                expected.sort();
                let expected: Vec<String> = expected.into_iter().map(|(_, id)| id).collect();
                prop_assert_eq!(seen, expected);
            }
        }
    }
}
