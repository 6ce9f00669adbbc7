//! Row filtering.

use crate::error::GraphResult;
use crate::types::Row;

use super::{PredicateFn, RowStream};

/// Emits upstream rows for which the predicate holds, unchanged and in order.
pub struct FilterStream<'a> {
    input: RowStream<'a>,
    predicate: PredicateFn,
    done: bool,
}

impl<'a> FilterStream<'a> {
    pub fn new(input: RowStream<'a>, predicate: PredicateFn) -> Self {
        Self {
            input,
            predicate,
            done: false,
        }
    }
}

impl Iterator for FilterStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let row = match self.input.next()? {
                Ok(row) => row,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match (self.predicate)(&row) {
                Ok(true) => return Some(Ok(row)),
                Ok(false) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.in_operator("filter")));
                }
            }
        }
    }
}
