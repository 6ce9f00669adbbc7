//! Whole-stream folding into a single row.

use crate::error::GraphResult;
use crate::types::Row;

use super::{FoldFn, RowStream};

/// Consumes the entire upstream into an accumulator row and emits the final state once.
///
/// An empty upstream yields the initial state.
pub struct FoldStream<'a> {
    input: RowStream<'a>,
    folder: FoldFn,
    state: Option<Row>,
}

impl<'a> FoldStream<'a> {
    pub fn new(input: RowStream<'a>, initial: Row, folder: FoldFn) -> Self {
        Self {
            input,
            folder,
            state: Some(initial),
        }
    }
}

impl Iterator for FoldStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.state.take()?;
        for row in self.input.by_ref() {
            let folded = row.and_then(|row| (self.folder)(state, &row).map_err(|e| e.in_operator("fold")));
            match folded {
                Ok(next) => state = next,
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(state))
    }
}
