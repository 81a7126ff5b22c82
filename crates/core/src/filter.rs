//! Metadata filtering shared by all backends

use crate::types::{Filters, Metadata};
use serde_json::Value;

/// Check whether a record's metadata satisfies every filter.
///
/// - Scalar filter value: metadata value must be equal
/// - Array filter value: metadata value must equal any element
/// - Missing metadata key: no match
///
/// Numbers compare by value, so `3` matches `3.0`.
pub fn matches_filters(metadata: &Metadata, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| match metadata.get(key) {
        None => false,
        Some(actual) => match expected {
            Value::Array(options) => options.iter().any(|o| values_equal(actual, o)),
            _ => values_equal(actual, expected),
        },
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}
