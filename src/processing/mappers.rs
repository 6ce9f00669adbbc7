//! Built-in row functions for map and flat-map stages.
//!
//! Each constructor returns a boxed closure that plugs straight into
//! [`crate::Graph::map`] / [`crate::Graph::flat_map`].
//!
//! ```rust
//! use compgraph::processing::mappers;
//! use compgraph::{Graph, Bindings, row};
//!
//! let words = Graph::source("docs")
//!     .flat_map(mappers::split("text"))
//!     .map(mappers::lowercase("text"));
//!
//! let out: Vec<_> = words
//!     .run(Bindings::new().bind("docs", vec![row! { "text" => "Hello  World" }]))
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(out, vec![row! { "text" => "hello" }, row! { "text" => "world" }]);
//! ```

use crate::error::{GraphError, GraphResult};
use crate::types::{Row, Value};

pub type BoxedMapper = Box<dyn Fn(Row) -> GraphResult<Row> + Send + Sync>;
pub type BoxedFlatMapper = Box<dyn Fn(Row) -> GraphResult<Vec<Row>> + Send + Sync>;

/// Characters [`split`] breaks text on.
pub const DEFAULT_SEPARATORS: &str = "\n\t\u{a0} ";

/// One row per whitespace-separated token of `column`; the other fields are copied.
///
/// Empty tokens (runs of separators, leading or trailing separators) are skipped.
pub fn split(column: impl Into<String>) -> BoxedFlatMapper {
    split_on(column, DEFAULT_SEPARATORS)
}

/// Like [`split`], breaking on any character of `separators`.
pub fn split_on(column: impl Into<String>, separators: impl Into<String>) -> BoxedFlatMapper {
    let column = column.into();
    let separators = separators.into();
    Box::new(move |row: Row| -> GraphResult<Vec<Row>> {
        let text = row.get_str(&column)?;
        Ok(text
            .split(|c: char| separators.contains(c))
            .filter(|token| !token.is_empty())
            .map(|token| row.clone().with(column.clone(), token))
            .collect())
    })
}

/// Lowercases the string in `column`.
pub fn lowercase(column: impl Into<String>) -> BoxedMapper {
    let column = column.into();
    Box::new(move |row: Row| -> GraphResult<Row> {
        let lowered = row.get_str(&column)?.to_lowercase();
        Ok(row.with(column.clone(), lowered))
    })
}

/// Keeps only letters, digits and spaces in the string in `column`.
pub fn filter_punctuation(column: impl Into<String>) -> BoxedMapper {
    let column = column.into();
    Box::new(move |row: Row| -> GraphResult<Row> {
        let kept: String = row
            .get_str(&column)?
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ' ')
            .collect();
        Ok(row.with(column.clone(), kept))
    })
}

/// Keeps exactly `columns`, in that order; a missing one is an error.
pub fn project<I, S>(columns: I) -> BoxedMapper
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    Box::new(move |row: Row| -> GraphResult<Row> {
        columns
            .iter()
            .map(|c| Ok((c.clone(), row.field(c)?.clone())))
            .collect()
    })
}

/// Removes `column` if present.
pub fn drop_column(column: impl Into<String>) -> BoxedMapper {
    let column = column.into();
    Box::new(move |mut row: Row| -> GraphResult<Row> {
        row.remove(&column);
        Ok(row)
    })
}

/// Sets `column` to a constant.
pub fn add_column(column: impl Into<String>, value: impl Into<Value>) -> BoxedMapper {
    let column = column.into();
    let value = value.into();
    Box::new(move |row: Row| -> GraphResult<Row> {
        Ok(row.with(column.clone(), value.clone()))
    })
}

/// Writes the product of `columns` to `output`.
///
/// Integer inputs give an integer product (widened to a float on overflow); any float input
/// makes the product a float. Nulls and non-numeric values are type errors.
pub fn product<I, S>(columns: I, output: impl Into<String>) -> BoxedMapper
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    let output = output.into();
    Box::new(move |row: Row| -> GraphResult<Row> {
        let mut acc = Value::Int64(1);
        for c in &columns {
            acc = match (acc, row.field(c)?) {
                (Value::Int64(a), Value::Int64(b)) => match a.checked_mul(*b) {
                    Some(p) => Value::Int64(p),
                    None => Value::Float64(a as f64 * *b as f64),
                },
                (acc, value) => match (acc.as_f64(), value.as_f64()) {
                    (Some(a), Some(b)) => Value::Float64(a * b),
                    _ => {
                        return Err(GraphError::TypeMismatch {
                            field: c.clone(),
                            expected: "number",
                            found: value.type_name(),
                            operator: None,
                        });
                    }
                },
            };
        }
        Ok(row.with(output.clone(), acc))
    })
}
