use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::execution::RunContext;
use crate::key::{Key, compare_keys, extract_key};
use crate::types::Row;

use super::RowStream;
use super::buffer::RowBuffer;

/// One run of consecutive rows sharing a key tuple.
pub(crate) struct Group {
    pub(crate) key: Key,
    pub(crate) rows: RowBuffer,
}

/// Splits a key-sorted stream into groups, holding one group (plus one lookahead row) at a
/// time.
///
/// A key that compares less than the previous group's key fails with
/// [`GraphError::UnsortedInput`]; any failure ends the grouping.
pub(crate) struct GroupedRows<'a> {
    input: RowStream<'a>,
    keys: Arc<[String]>,
    ctx: Rc<RunContext>,
    operator: &'static str,
    lookahead: Option<(Key, Row)>,
    exhausted: bool,
}

impl<'a> GroupedRows<'a> {
    pub(crate) fn new(
        input: RowStream<'a>,
        keys: Arc<[String]>,
        ctx: Rc<RunContext>,
        operator: &'static str,
    ) -> Self {
        Self {
            input,
            keys,
            ctx,
            operator,
            lookahead: None,
            exhausted: false,
        }
    }

    pub(crate) fn next_group(&mut self) -> GraphResult<Option<Group>> {
        let result = self.read_group();
        if result.is_err() {
            self.exhausted = true;
            self.lookahead = None;
        }
        result
    }

    fn read_group(&mut self) -> GraphResult<Option<Group>> {
        let (key, first) = match self.lookahead.take() {
            Some(entry) => entry,
            None => match self.pull()? {
                Some(entry) => entry,
                None => return Ok(None),
            },
        };

        let mut rows = RowBuffer::new(Rc::clone(&self.ctx), self.operator);
        rows.push(first)?;
        while let Some((next_key, row)) = self.pull()? {
            match compare_keys(&next_key, &key, &self.keys)? {
                Ordering::Equal => rows.push(row)?,
                Ordering::Greater => {
                    self.lookahead = Some((next_key, row));
                    break;
                }
                Ordering::Less => {
                    return Err(GraphError::UnsortedInput {
                        operator: self.operator.to_string(),
                        keys: self.keys.to_vec(),
                    });
                }
            }
        }
        Ok(Some(Group { key, rows }))
    }

    fn pull(&mut self) -> GraphResult<Option<(Key, Row)>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.input.next() {
            None => {
                self.exhausted = true;
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            Some(Ok(row)) => {
                let key = extract_key(&row, &self.keys, self.operator)?;
                Ok(Some((key, row)))
            }
        }
    }
}
