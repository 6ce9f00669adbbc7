//! Built-in reducers.
//!
//! Every reducer here copies the group-key fields (from the group's first row) into each
//! output row, so it satisfies the group-key contract checked by the reduce stage.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{GraphError, GraphResult};
use crate::types::{Row, Value};

use super::Reducer;

/// Built-in aggregate operations over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Count all rows of the group (including nulls).
    Count,
    /// Sum numeric values, ignoring nulls.
    Sum,
    /// Minimum numeric value, ignoring nulls.
    Min,
    /// Maximum numeric value, ignoring nulls.
    Max,
}

/// One aggregate per group: `{<keys>, <output>: op(column)}`.
///
/// - `Sum`/`Min`/`Max` keep [`Value::Int64`] while every input is an integer and switch to
///   [`Value::Float64`] once a float is seen (or an integer sum overflows).
/// - Nulls are skipped; a group whose values are all null aggregates to [`Value::Null`].
/// - A non-numeric, non-null value fails with [`GraphError::TypeMismatch`].
#[derive(Debug, Clone)]
pub struct Aggregate {
    column: String,
    op: ReduceOp,
    output: String,
}

impl Aggregate {
    pub fn new(column: impl Into<String>, op: ReduceOp, output: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            output: output.into(),
        }
    }

    /// Number of rows per group, written to `output`.
    pub fn count(output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new(output.clone(), ReduceOp::Count, output)
    }

    /// Sum of `column`, written back under the same name.
    pub fn sum(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(column.clone(), ReduceOp::Sum, column)
    }

    pub fn min(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(column.clone(), ReduceOp::Min, column)
    }

    pub fn max(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(column.clone(), ReduceOp::Max, column)
    }

    pub fn op(&self) -> ReduceOp {
        self.op
    }
}

impl Reducer for Aggregate {
    fn reduce(&self, keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let value = aggregate(rows, &self.column, self.op)?;
        Ok(vec![key_fields(first, keys)?.with(self.output.clone(), value)])
    }
}

#[derive(Clone, Copy)]
enum Acc {
    Empty,
    Int(i64),
    Float(f64),
}

fn aggregate(rows: &[Row], column: &str, op: ReduceOp) -> GraphResult<Value> {
    if op == ReduceOp::Count {
        return Ok(Value::from(rows.len()));
    }

    let mut acc = Acc::Empty;
    for row in rows {
        let value = row.field(column)?;
        acc = match (acc, value) {
            (acc, Value::Null) => acc,
            (Acc::Empty, Value::Int64(v)) => Acc::Int(*v),
            (Acc::Empty, Value::Float64(v)) => Acc::Float(*v),
            (Acc::Int(a), Value::Int64(v)) => match op {
                ReduceOp::Sum => a.checked_add(*v).map_or(Acc::Float(a as f64 + *v as f64), Acc::Int),
                ReduceOp::Min => Acc::Int(a.min(*v)),
                ReduceOp::Max => Acc::Int(a.max(*v)),
                ReduceOp::Count => unreachable!("count handled above"),
            },
            (Acc::Int(a), Value::Float64(v)) => Acc::Float(combine_float(op, a as f64, *v)),
            (Acc::Float(a), Value::Int64(v)) => Acc::Float(combine_float(op, a, *v as f64)),
            (Acc::Float(a), Value::Float64(v)) => Acc::Float(combine_float(op, a, *v)),
            (_, other) => {
                return Err(GraphError::TypeMismatch {
                    field: column.to_string(),
                    expected: "number",
                    found: other.type_name(),
                    operator: None,
                });
            }
        };
    }

    Ok(match acc {
        Acc::Empty => Value::Null,
        Acc::Int(v) => Value::Int64(v),
        Acc::Float(v) => Value::Float64(v),
    })
}

fn combine_float(op: ReduceOp, a: f64, v: f64) -> f64 {
    match op {
        ReduceOp::Sum => a + v,
        ReduceOp::Min => a.min(v),
        ReduceOp::Max => a.max(v),
        ReduceOp::Count => unreachable!("count handled above"),
    }
}

/// Emits the first row of every group unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct First;

impl Reducer for First {
    fn reduce(&self, _keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>> {
        Ok(rows.first().cloned().into_iter().collect())
    }
}

/// Emits the `n` rows with the largest `column` values, largest first; equal values keep
/// input order.
#[derive(Debug, Clone)]
pub struct TopN {
    column: String,
    n: usize,
}

impl TopN {
    pub fn new(column: impl Into<String>, n: usize) -> Self {
        Self {
            column: column.into(),
            n,
        }
    }
}

impl Reducer for TopN {
    fn reduce(&self, _keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>> {
        let mut ranked = rows
            .iter()
            .map(|row| Ok((row.field(&self.column)?, row)))
            .collect::<GraphResult<Vec<(&Value, &Row)>>>()?;

        // Neighbours in the total order cover every pair that could fail to compare.
        ranked.sort_by(|a, b| b.0.total_cmp(a.0));
        for pair in ranked.windows(2) {
            if pair[0].0.try_cmp(pair[1].0).is_none() {
                return Err(GraphError::IncomparableKey {
                    field: self.column.clone(),
                    left: pair[0].0.type_name(),
                    right: pair[1].0.type_name(),
                });
            }
        }

        Ok(ranked
            .into_iter()
            .take(self.n)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

/// Relative frequency of each word of a group.
///
/// Emits one row per distinct value of `words_column`, in order of first appearance: the
/// first row carrying that word, with `output` set to `occurrences / group size`.
#[derive(Debug, Clone)]
pub struct TermFrequency {
    words_column: String,
    output: String,
}

impl TermFrequency {
    pub fn new(words_column: impl Into<String>) -> Self {
        Self::with_output(words_column, "tf")
    }

    pub fn with_output(words_column: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            words_column: words_column.into(),
            output: output.into(),
        }
    }
}

impl Reducer for TermFrequency {
    fn reduce(&self, _keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut firsts: Vec<(&str, &Row)> = Vec::new();
        for row in rows {
            let word = row.get_str(&self.words_column)?;
            let count = counts.entry(word).or_insert(0);
            if *count == 0 {
                firsts.push((word, row));
            }
            *count += 1;
        }

        let total = rows.len() as f64;
        Ok(firsts
            .into_iter()
            .map(|(word, row)| {
                let tf = counts[word] as f64 / total;
                row.clone().with(self.output.clone(), tf)
            })
            .collect())
    }
}

fn key_fields(row: &Row, keys: &[String]) -> GraphResult<Row> {
    keys.iter()
        .map(|k| Ok((k.clone(), row.field(k)?.clone())))
        .collect()
}
