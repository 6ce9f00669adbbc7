//! Row mapping stages.
//!
//! [`MapStream`] is strictly one row in, one row out. [`FlatMapStream`] lets a function emit
//! any number of rows per input row (tokenizers, explode-style mappers).

use crate::error::GraphResult;
use crate::types::Row;

use super::{FlatMapFn, MapFn, RowStream};

/// Applies a [`MapFn`] to every upstream row, preserving order.
pub struct MapStream<'a> {
    input: RowStream<'a>,
    mapper: MapFn,
    done: bool,
}

impl<'a> MapStream<'a> {
    pub fn new(input: RowStream<'a>, mapper: MapFn) -> Self {
        Self {
            input,
            mapper,
            done: false,
        }
    }
}

impl Iterator for MapStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let out = match self.input.next()? {
            Ok(row) => (self.mapper)(row).map_err(|e| e.in_operator("map")),
            Err(e) => Err(e),
        };
        self.done = out.is_err();
        Some(out)
    }
}

/// Applies a [`FlatMapFn`] to every upstream row and emits its output rows in order.
pub struct FlatMapStream<'a> {
    input: RowStream<'a>,
    mapper: FlatMapFn,
    pending: std::vec::IntoIter<Row>,
    done: bool,
}

impl<'a> FlatMapStream<'a> {
    pub fn new(input: RowStream<'a>, mapper: FlatMapFn) -> Self {
        Self {
            input,
            mapper,
            pending: Vec::new().into_iter(),
            done: false,
        }
    }
}

impl Iterator for FlatMapStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            let mapped = match self.input.next()? {
                Ok(row) => (self.mapper)(row).map_err(|e| e.in_operator("flat_map")),
                Err(e) => Err(e),
            };
            match mapped {
                Ok(rows) => self.pending = rows.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FlatMapStream, MapStream};
    use crate::error::{GraphError, GraphResult};
    use crate::processing::RowStream;
    use crate::row;
    use crate::types::Row;

    fn ids(n: i64) -> RowStream<'static> {
        Box::new((0..n).map(|i| Ok(row! { "id" => i })))
    }

    #[test]
    fn map_preserves_order_and_length() {
        let out: Vec<Row> = MapStream::new(
            ids(5),
            Arc::new(|row: Row| -> GraphResult<Row> {
                Ok(row! { "id" => row.get_i64("id")? * 10 })
            }),
        )
        .collect::<GraphResult<_>>()
        .unwrap();
        let values: Vec<i64> = out.iter().map(|r| r.get_i64("id").unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn map_attributes_missing_field_and_stops() {
        let mut stream = MapStream::new(
            ids(3),
            Arc::new(|row: Row| -> GraphResult<Row> {
                row.field("nope")?;
                Ok(row)
            }),
        );
        match stream.next() {
            Some(Err(GraphError::MissingField { field, operator })) => {
                assert_eq!(field, "nope");
                assert_eq!(operator.as_deref(), Some("map"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(stream.next().is_none());
    }

    #[test]
    fn flat_map_expands_and_drops_rows() {
        let out: Vec<Row> = FlatMapStream::new(
            ids(4),
            Arc::new(|row: Row| -> GraphResult<Vec<Row>> {
                let n = row.get_i64("id")?;
                Ok((0..n).map(|i| row! { "id" => n, "copy" => i }).collect())
            }),
        )
        .collect::<GraphResult<_>>()
        .unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], row! { "id" => 1, "copy" => 0 });
        assert_eq!(out[5], row! { "id" => 3, "copy" => 2 });
    }

    #[test]
    fn upstream_error_passes_through_once() {
        let input: RowStream<'static> = Box::new(
            vec![Ok(row! { "id" => 1 }), Err(GraphError::function("boom")), Ok(row! { "id" => 2 })]
                .into_iter(),
        );
        let items: Vec<GraphResult<Row>> =
            MapStream::new(input, Arc::new(|row: Row| -> GraphResult<Row> { Ok(row) })).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().to_string(), "boom");
    }
}
