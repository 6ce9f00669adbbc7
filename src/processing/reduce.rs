//! Grouped reduce over a stream sorted by the group keys.

use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::execution::RunContext;
use crate::key::Key;
use crate::types::Row;

use super::RowStream;
use super::group::GroupedRows;

/// Turns the rows of one key group into zero or more output rows.
///
/// `keys` is the reduce key list; every row of `rows` carries equal values for those fields.
/// Output rows must carry every key field with the group's value.
///
/// Any `Fn(&[String], &[Row]) -> GraphResult<Vec<Row>>` closure is a reducer; see
/// [`crate::processing::reducers`] for the built-in ones.
pub trait Reducer: Send + Sync {
    fn reduce(&self, keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>>;
}

impl<F> Reducer for F
where
    F: Fn(&[String], &[Row]) -> GraphResult<Vec<Row>> + Send + Sync,
{
    fn reduce(&self, keys: &[String], rows: &[Row]) -> GraphResult<Vec<Row>> {
        self(keys, rows)
    }
}

/// Applies a [`Reducer`] group by group and checks the group-key contract on its output.
pub(crate) struct ReduceStream<'a> {
    groups: GroupedRows<'a>,
    keys: Arc<[String]>,
    reducer: Arc<dyn Reducer>,
    ctx: Rc<RunContext>,
    pending: std::vec::IntoIter<Row>,
    done: bool,
}

impl<'a> ReduceStream<'a> {
    pub(crate) fn new(
        input: RowStream<'a>,
        keys: Arc<[String]>,
        reducer: Arc<dyn Reducer>,
        ctx: Rc<RunContext>,
    ) -> Self {
        Self {
            groups: GroupedRows::new(input, Arc::clone(&keys), Rc::clone(&ctx), "reduce"),
            keys,
            reducer,
            ctx,
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    fn reduce_next_group(&mut self) -> GraphResult<bool> {
        let Some(group) = self.groups.next_group()? else {
            return Ok(false);
        };
        self.ctx.metrics.on_group_reduced();

        let out = self
            .reducer
            .reduce(&self.keys, group.rows.as_slice())
            .map_err(|e| e.in_operator("reduce"))?;
        for row in &out {
            check_group_key(row, &self.keys, &group.key)?;
        }
        drop(group);
        self.pending = out.into_iter();
        Ok(true)
    }
}

impl Iterator for ReduceStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            if self.done {
                return None;
            }
            match self.reduce_next_group() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn check_group_key(row: &Row, keys: &[String], key: &Key) -> GraphResult<()> {
    for (name, expected) in keys.iter().zip(key) {
        match row.get(name) {
            None => {
                return Err(GraphError::ReducerContractViolation {
                    field: name.clone(),
                    message: "output row lacks the group key field".to_string(),
                });
            }
            Some(value) if value.try_cmp(expected) != Some(Ordering::Equal) => {
                return Err(GraphError::ReducerContractViolation {
                    field: name.clone(),
                    message: format!("output value {value} differs from group key {expected}"),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
