//! Group keys: extraction of key tuples from rows and their (fallible) ordering.
//!
//! Sort, reduce and join all order rows by the tuple of values of a list of named fields.

use std::cmp::Ordering;

use crate::error::{GraphError, GraphResult};
use crate::types::{Row, Value};

/// The tuple of key-field values of one row, in key-list order.
pub type Key = Vec<Value>;

/// Extract the key tuple of `row`; a missing key field is attributed to `operator`.
pub fn extract_key(row: &Row, keys: &[String], operator: &str) -> GraphResult<Key> {
    keys.iter()
        .map(|k| {
            row.field(k)
                .cloned()
                .map_err(|e| e.in_operator(operator))
        })
        .collect()
}

/// Compare two key tuples field by field.
///
/// Fails with [`GraphError::IncomparableKey`] when two values of the same key position
/// cannot be ordered against each other.
pub fn compare_keys(a: &[Value], b: &[Value], keys: &[String]) -> GraphResult<Ordering> {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        match x.try_cmp(y) {
            Some(Ordering::Equal) => continue,
            Some(ord) => return Ok(ord),
            None => {
                return Err(GraphError::IncomparableKey {
                    field: keys.get(i).cloned().unwrap_or_default(),
                    left: x.type_name(),
                    right: y.type_name(),
                });
            }
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// Infallible counterpart of [`compare_keys`] used for in-memory chunk sorting.
pub(crate) fn total_cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Whether a stream known to be sorted by `sorted_by` is also sorted by `keys`.
pub(crate) fn is_prefix(keys: &[String], sorted_by: &[String]) -> bool {
    keys.len() <= sorted_by.len() && keys.iter().zip(sorted_by).all(|(a, b)| a == b)
}

pub(crate) fn owned_keys<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter().map(Into::into).collect()
}
