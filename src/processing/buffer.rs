use std::rc::Rc;

use crate::error::GraphResult;
use crate::execution::RunContext;
use crate::types::Row;

/// The one buffering primitive used by grouping and joining.
///
/// Every buffered row is accounted against the run's live-row gauge, which enforces
/// `ExecutionOptions::max_buffered_rows` and feeds the peak-buffer metric. Rows are released
/// when the buffer (or the iterator it turns into) is dropped.
pub(crate) struct RowBuffer {
    rows: Vec<Row>,
    ctx: Rc<RunContext>,
    operator: &'static str,
}

impl RowBuffer {
    pub(crate) fn new(ctx: Rc<RunContext>, operator: &'static str) -> Self {
        Self {
            rows: Vec::new(),
            ctx,
            operator,
        }
    }

    pub(crate) fn push(&mut self, row: Row) -> GraphResult<()> {
        self.ctx.reserve_buffered(self.operator)?;
        self.rows.push(row);
        Ok(())
    }

    pub(crate) fn as_slice(&self) -> &[Row] {
        &self.rows
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Hand the rows out one by one, releasing each as it leaves.
    pub(crate) fn into_rows(mut self) -> BufferedRows {
        let rows = std::mem::take(&mut self.rows);
        BufferedRows {
            rows: rows.into_iter(),
            ctx: Rc::clone(&self.ctx),
        }
    }
}

impl Drop for RowBuffer {
    fn drop(&mut self) {
        self.ctx.release_buffered(self.rows.len());
    }
}

pub(crate) struct BufferedRows {
    rows: std::vec::IntoIter<Row>,
    ctx: Rc<RunContext>,
}

impl Iterator for BufferedRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row = self.rows.next()?;
        self.ctx.release_buffered(1);
        Some(row)
    }
}

impl Drop for BufferedRows {
    fn drop(&mut self) {
        self.ctx.release_buffered(self.rows.len());
    }
}

#[cfg(test)]
mod tests {
    use super::RowBuffer;
    use crate::error::GraphError;
    use crate::execution::{ExecutionOptions, RunContext};
    use crate::row;

    #[test]
    fn buffer_enforces_limit_across_live_buffers() {
        let ctx = RunContext::for_tests(ExecutionOptions {
            max_buffered_rows: Some(3),
            ..Default::default()
        });
        let mut a = RowBuffer::new(ctx.clone(), "join");
        let mut b = RowBuffer::new(ctx.clone(), "join");
        a.push(row! { "k" => 1 }).unwrap();
        a.push(row! { "k" => 1 }).unwrap();
        b.push(row! { "k" => 2 }).unwrap();
        let err = b.push(row! { "k" => 2 }).unwrap_err();
        assert!(matches!(err, GraphError::MemoryLimitExceeded { limit: 3, .. }));

        drop(a);
        b.push(row! { "k" => 2 }).unwrap();
        assert_eq!(b.len(), 2);
        assert_eq!(ctx.metrics.snapshot().max_buffered_rows, 3);
    }

    #[test]
    fn into_rows_releases_as_rows_leave() {
        let ctx = RunContext::for_tests(ExecutionOptions {
            max_buffered_rows: Some(2),
            ..Default::default()
        });
        let mut a = RowBuffer::new(ctx.clone(), "reduce");
        a.push(row! { "k" => 1 }).unwrap();
        a.push(row! { "k" => 2 }).unwrap();

        let mut rows = a.into_rows();
        assert_eq!(rows.next(), Some(row! { "k" => 1 }));

        let mut b = RowBuffer::new(ctx.clone(), "reduce");
        b.push(row! { "k" => 3 }).unwrap();
        assert!(b.push(row! { "k" => 4 }).is_err());

        drop(rows);
        b.push(row! { "k" => 4 }).unwrap();
    }
}
