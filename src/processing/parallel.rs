//! Order-preserving batched execution of map and filter stages on a rayon pool.

use std::sync::Arc;

use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::{GraphError, GraphResult};
use crate::types::Row;

use super::{MapFn, PredicateFn, RowStream};

/// The per-row work a [`ParallelStream`] fans out.
#[derive(Clone)]
pub(crate) enum Stage {
    Map(MapFn),
    Filter(PredicateFn),
}

impl Stage {
    fn apply(&self, row: Row) -> GraphResult<Option<Row>> {
        match self {
            Stage::Map(f) => f(row).map(Some).map_err(|e| e.in_operator("map")),
            Stage::Filter(p) => match p(&row) {
                Ok(true) => Ok(Some(row)),
                Ok(false) => Ok(None),
                Err(e) => Err(e.in_operator("filter")),
            },
        }
    }
}

/// Pulls up to `batch_rows` upstream rows, processes the batch on the pool and hands the
/// results out in input order.
///
/// An upstream error ends the batch it interrupts; the rows pulled before it are still
/// processed and emitted first.
pub(crate) struct ParallelStream<'a> {
    input: RowStream<'a>,
    stage: Stage,
    pool: Arc<ThreadPool>,
    batch_rows: usize,
    pending: std::vec::IntoIter<Row>,
    deferred: Option<GraphError>,
    exhausted: bool,
}

impl<'a> ParallelStream<'a> {
    pub(crate) fn new(
        input: RowStream<'a>,
        stage: Stage,
        pool: Arc<ThreadPool>,
        batch_rows: usize,
    ) -> Self {
        Self {
            input,
            stage,
            pool,
            batch_rows: batch_rows.max(1),
            pending: Vec::new().into_iter(),
            deferred: None,
            exhausted: false,
        }
    }

    fn fill(&mut self) {
        let mut batch = Vec::with_capacity(self.batch_rows);
        while batch.len() < self.batch_rows {
            match self.input.next() {
                Some(Ok(row)) => batch.push(row),
                Some(Err(e)) => {
                    self.deferred = Some(e);
                    self.exhausted = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            return;
        }

        let stage = &self.stage;
        let results: Vec<GraphResult<Option<Row>>> = self
            .pool
            .install(|| batch.into_par_iter().map(|row| stage.apply(row)).collect());

        let mut out = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(Some(row)) => out.push(row),
                Ok(None) => {}
                Err(e) => {
                    self.deferred = Some(e);
                    self.exhausted = true;
                    break;
                }
            }
        }
        self.pending = out.into_iter();
    }
}

impl Iterator for ParallelStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            if let Some(e) = self.deferred.take() {
                return Some(Err(e));
            }
            if self.exhausted {
                return None;
            }
            self.fill();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rayon::ThreadPoolBuilder;

    use super::{ParallelStream, Stage};
    use crate::error::{GraphError, GraphResult};
    use crate::processing::RowStream;
    use crate::row;
    use crate::types::Row;

    fn ids(n: i64) -> RowStream<'static> {
        Box::new((0..n).map(|i| -> GraphResult<Row> { Ok(row! { "id" => i }) }))
    }

    fn pool() -> Arc<rayon::ThreadPool> {
        Arc::new(ThreadPoolBuilder::new().num_threads(4).build().unwrap())
    }

    #[test]
    fn parallel_map_preserves_order_across_batches() {
        let stage = Stage::Map(Arc::new(|row: Row| -> GraphResult<Row> {
            let id = row.get_i64("id")?;
            Ok(row.with("double", id * 2))
        }));
        let out: Vec<Row> = ParallelStream::new(ids(1_000), stage, pool(), 64)
            .collect::<GraphResult<_>>()
            .unwrap();
        assert_eq!(out.len(), 1_000);
        for (i, row) in out.iter().enumerate() {
            assert_eq!(row.get_i64("id").unwrap(), i as i64);
            assert_eq!(row.get_i64("double").unwrap(), 2 * i as i64);
        }
    }

    #[test]
    fn parallel_filter_matches_sequential_filter() {
        let stage = Stage::Filter(Arc::new(|row: &Row| -> GraphResult<bool> {
            Ok(row.get_i64("id")? % 3 == 0)
        }));
        let out: Vec<i64> = ParallelStream::new(ids(100), stage, pool(), 7)
            .map(|r| r.and_then(|r| r.get_i64("id")))
            .collect::<GraphResult<_>>()
            .unwrap();
        let expected: Vec<i64> = (0..100).filter(|i| i % 3 == 0).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn rows_before_a_failure_are_emitted_then_the_error() {
        let stage = Stage::Map(Arc::new(|row: Row| -> GraphResult<Row> {
            if row.get_i64("id")? == 5 {
                return Err(GraphError::function("five"));
            }
            Ok(row)
        }));
        let items: Vec<GraphResult<Row>> =
            ParallelStream::new(ids(20), stage, pool(), 8).collect();
        assert_eq!(items.len(), 6);
        assert!(items[..5].iter().all(|r| r.is_ok()));
        assert_eq!(items[5].as_ref().unwrap_err().to_string(), "five");
    }

    #[test]
    fn upstream_error_follows_rows_already_pulled() {
        let input: RowStream<'static> = Box::new(
            vec![
                Ok(row! { "id" => 1 }),
                Ok(row! { "id" => 2 }),
                Err(GraphError::function("source failed")),
                Ok(row! { "id" => 3 }),
            ]
            .into_iter(),
        );
        let stage = Stage::Map(Arc::new(|row: Row| -> GraphResult<Row> { Ok(row) }));
        let items: Vec<GraphResult<Row>> = ParallelStream::new(input, stage, pool(), 16).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].as_ref().unwrap_err().to_string(), "source failed");
    }
}
