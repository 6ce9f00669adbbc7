//! Sort-merge join of two key-sorted streams.
//!
//! Both sides are walked group by group in one synchronized pass. Matching groups are
//! buffered and their cross product is emitted lazily in left-major order; unmatched groups
//! are emitted unchanged or dropped depending on the [`JoinKind`]. Memory is bounded by the
//! largest key group on each side.

use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::execution::RunContext;
use crate::key::compare_keys;
use crate::types::{Row, Value};

use super::RowStream;
use super::buffer::{BufferedRows, RowBuffer};
use super::group::{Group, GroupedRows};

/// Which unmatched rows survive a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Only rows whose key appears on both sides.
    Inner,
    /// Inner rows plus unmatched left rows.
    Left,
    /// Inner rows plus unmatched right rows.
    Right,
    /// Inner rows plus unmatched rows of both sides.
    Outer,
}

impl JoinKind {
    fn keeps_left(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Outer)
    }

    fn keeps_right(self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Outer)
    }
}

/// Naming of non-key columns present on both sides of a join.
///
/// A colliding column `score` becomes `score<left_suffix>` (left value) and
/// `score<right_suffix>` (right value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    pub left_suffix: String,
    pub right_suffix: String,
}

impl JoinOptions {
    pub fn with_suffixes(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left_suffix: left.into(),
            right_suffix: right.into(),
        }
    }
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self::with_suffixes("_1", "_2")
    }
}

/// Combine one left row and one right row sharing the join key.
///
/// Left fields come first in their order, then the right row's non-key fields. Key fields
/// appear once, with the left value. Fails with [`GraphError::ColumnCollision`] when a
/// suffixed name (or a plain right-side name) is already taken by another output column.
pub fn merge_rows(
    left: &Row,
    right: &Row,
    keys: &[String],
    options: &JoinOptions,
) -> GraphResult<Row> {
    let is_key = |name: &str| keys.iter().any(|k| k == name);

    let mut out = Row::new();
    for (name, value) in left.iter() {
        if !is_key(name) && right.contains(name) {
            put(&mut out, format!("{name}{}", options.left_suffix), value)?;
        } else {
            put(&mut out, name.to_string(), value)?;
        }
    }
    for (name, value) in right.iter() {
        if is_key(name) {
            continue;
        }
        if left.contains(name) {
            put(&mut out, format!("{name}{}", options.right_suffix), value)?;
        } else {
            put(&mut out, name.to_string(), value)?;
        }
    }
    Ok(out)
}

fn put(out: &mut Row, name: String, value: &Value) -> GraphResult<()> {
    if out.contains(&name) {
        return Err(GraphError::ColumnCollision { column: name });
    }
    out.insert(name, value.clone());
    Ok(())
}

pub(crate) struct JoinStream<'a> {
    left: GroupedRows<'a>,
    right: GroupedRows<'a>,
    left_head: Option<Group>,
    right_head: Option<Group>,
    keys: Arc<[String]>,
    kind: JoinKind,
    options: Arc<JoinOptions>,
    pending: Pending,
    done: bool,
}

enum Pending {
    Empty,
    Unmatched(BufferedRows),
    Cross(CrossProduct),
}

/// Lazy left-major cross product of two matching groups.
struct CrossProduct {
    left: RowBuffer,
    right: RowBuffer,
    i: usize,
    j: usize,
}

impl CrossProduct {
    fn next_pair(&mut self) -> Option<(&Row, &Row)> {
        let (left, right) = (self.left.as_slice(), self.right.as_slice());
        if self.i >= left.len() || right.is_empty() {
            return None;
        }
        let pair = (&left[self.i], &right[self.j]);
        self.j += 1;
        if self.j == right.len() {
            self.j = 0;
            self.i += 1;
        }
        Some(pair)
    }
}

impl<'a> JoinStream<'a> {
    pub(crate) fn new(
        left: RowStream<'a>,
        right: RowStream<'a>,
        keys: Arc<[String]>,
        kind: JoinKind,
        options: Arc<JoinOptions>,
        ctx: Rc<RunContext>,
    ) -> Self {
        Self {
            left: GroupedRows::new(left, Arc::clone(&keys), Rc::clone(&ctx), "join"),
            right: GroupedRows::new(right, Arc::clone(&keys), ctx, "join"),
            left_head: None,
            right_head: None,
            keys,
            kind,
            options,
            pending: Pending::Empty,
            done: false,
        }
    }

    /// Sets up the next batch of output; `false` once both sides are exhausted.
    fn advance(&mut self) -> GraphResult<bool> {
        self.pending = Pending::Empty;
        if self.left_head.is_none() {
            self.left_head = self.left.next_group()?;
        }
        if self.right_head.is_none() {
            self.right_head = self.right.next_group()?;
        }

        match (self.left_head.take(), self.right_head.take()) {
            (None, None) => return Ok(false),
            (Some(left), None) => self.unmatched(left, self.kind.keeps_left()),
            (None, Some(right)) => self.unmatched(right, self.kind.keeps_right()),
            (Some(left), Some(right)) => match compare_keys(&left.key, &right.key, &self.keys)? {
                Ordering::Equal => {
                    self.pending = Pending::Cross(CrossProduct {
                        left: left.rows,
                        right: right.rows,
                        i: 0,
                        j: 0,
                    });
                }
                Ordering::Less => {
                    self.right_head = Some(right);
                    self.unmatched(left, self.kind.keeps_left());
                }
                Ordering::Greater => {
                    self.left_head = Some(left);
                    self.unmatched(right, self.kind.keeps_right());
                }
            },
        }
        Ok(true)
    }

    fn unmatched(&mut self, group: Group, keep: bool) {
        if keep {
            self.pending = Pending::Unmatched(group.rows.into_rows());
        }
    }
}

impl Iterator for JoinStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.pending {
                Pending::Empty => {}
                Pending::Unmatched(rows) => {
                    if let Some(row) = rows.next() {
                        return Some(Ok(row));
                    }
                }
                Pending::Cross(cross) => {
                    if let Some((left, right)) = cross.next_pair() {
                        let merged = merge_rows(left, right, &self.keys, &self.options);
                        if merged.is_err() {
                            self.done = true;
                            self.pending = Pending::Empty;
                        }
                        return Some(merged);
                    }
                }
            }
            if self.done {
                return None;
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    self.pending = Pending::Empty;
                    return Some(Err(e));
                }
            }
        }
    }
}
