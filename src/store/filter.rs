//! Filter, order and limit evaluation shared by the bundled store backends.
//!
//! Numbers compare numerically and strings lexicographically. Timestamp objects compare
//! chronologically; anything else compares only by equality.
//! A record missing a filtered or ordered field never matches.

use super::query::{Filter, FilterOp, QueryDescriptor, SortDirection};
use super::trait_def::RawRecord;
use crate::entities::dates::coerce_timestamp;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

fn field_value<'a>(record: &'a RawRecord, field: &str) -> Option<Cow<'a, Value>> {
    match record.get(field) {
        Some(value) => Some(Cow::Borrowed(value)),
        None if field == "id" => Some(Cow::Owned(Value::String(record.id.clone()))),
        None => None,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        // Timestamp objects against any other date encoding
        (Value::Object(_), _) | (_, Value::Object(_)) => {
            match (coerce_timestamp(a), coerce_timestamp(b)) {
                (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                _ if a == b => Some(Ordering::Equal),
                _ => None,
            }
        }
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Whether a single clause holds for `record`.
pub fn matches_filter(record: &RawRecord, filter: &Filter) -> bool {
    let Some(actual) = field_value(record, &filter.field) else {
        return false;
    };
    let expected = &filter.value;

    match filter.op {
        FilterOp::Eq => values_equal(&actual, expected),
        FilterOp::Ne => !values_equal(&actual, expected),
        FilterOp::Lt => compare_values(&actual, expected) == Some(Ordering::Less),
        FilterOp::Le => matches!(
            compare_values(&actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Gt => compare_values(&actual, expected) == Some(Ordering::Greater),
        FilterOp::Ge => matches!(
            compare_values(&actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => match expected {
            Value::Array(candidates) => candidates.iter().any(|c| values_equal(&actual, c)),
            _ => false,
        },
        FilterOp::ArrayContains => match actual.as_ref() {
            Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
            _ => false,
        },
    }
}

/// Apply every clause of `query` to `records`, then order and limit.
pub fn apply_query(
    query: &QueryDescriptor,
    records: impl IntoIterator<Item = RawRecord>,
) -> Vec<RawRecord> {
    let mut matched: Vec<RawRecord> = records
        .into_iter()
        .filter(|record| query.filters().iter().all(|f| matches_filter(record, f)))
        .collect();

    if let Some(order) = query.order() {
        matched.retain(|record| field_value(record, &order.field).is_some());
        // Stable sort keeps insertion order for ties
        matched.sort_by(|a, b| {
            let ordering = match (field_value(a, &order.field), field_value(b, &order.field)) {
                (Some(x), Some(y)) => compare_values(&x, &y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = query.max_results() {
        matched.truncate(limit);
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, value: Value) -> RawRecord {
        match value {
            Value::Object(fields) => RawRecord::new(id, fields),
            _ => panic!("record fixture must be an object"),
        }
    }

    fn sample() -> Vec<RawRecord> {
        vec![
            record("a-1", json!({"classId": "c-1", "points": 10, "tags": ["quiz"]})),
            record("a-2", json!({"classId": "c-2", "points": 30, "tags": ["essay"]})),
            record("a-3", json!({"classId": "c-1", "points": 20})),
        ]
    }

    #[test]
    fn test_equality_and_range_filters() {
        let query = QueryDescriptor::collection("assignments")
            .where_eq("classId", "c-1")
            .filter("points", FilterOp::Gt, 15);
        let ids: Vec<String> = apply_query(&query, sample()).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a-3"]);
    }

    #[test]
    fn test_in_and_array_contains() {
        let query = QueryDescriptor::collection("assignments").filter(
            "classId",
            FilterOp::In,
            json!(["c-2", "c-9"]),
        );
        assert_eq!(apply_query(&query, sample()).len(), 1);

        let query =
            QueryDescriptor::collection("assignments").filter("tags", FilterOp::ArrayContains, "quiz");
        let matched = apply_query(&query, sample());
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a-1");
    }

    #[test]
    fn test_id_filter_falls_back_to_document_id() {
        let query = QueryDescriptor::collection("assignments").where_eq("id", "a-2");
        let matched = apply_query(&query, sample());
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a-2");
    }

    #[test]
    fn test_order_and_limit() {
        let query = QueryDescriptor::collection("assignments")
            .order_by("points", SortDirection::Desc)
            .limit(2);
        let ids: Vec<String> = apply_query(&query, sample()).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a-2", "a-3"]);
    }

    #[test]
    fn test_timestamp_objects_order_chronologically() {
        let records = vec![
            record("late", json!({"dueDate": {"seconds": 2_000, "nanoseconds": 0}})),
            record("early", json!({"dueDate": {"_seconds": 1_000, "_nanoseconds": 0}})),
        ];
        let query =
            QueryDescriptor::collection("assignments").order_by("dueDate", SortDirection::Asc);
        let ids: Vec<String> = apply_query(&query, records).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_missing_field_never_matches() {
        let query =
            QueryDescriptor::collection("assignments").filter("tags", FilterOp::Ne, json!(["quiz"]));
        let ids: Vec<String> = apply_query(&query, sample()).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a-2"]);
    }
}
