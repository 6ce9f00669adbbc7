//! Operator implementations over lazy row streams.
//!
//! Every operator is a pull-based iterator over `GraphResult<Row>`: it does no work until its
//! consumer asks for the next row, and it stops after handing out the first error.
//!
//! - [`map`]: one row in, one row out; plus flat-map (zero or more rows out)
//! - [`filter`]: keep rows matching a predicate
//! - [`fold`]: collapse a whole stream into one row
//! - [`reduce`]: grouped reduce over a stream sorted by the group keys
//! - [`sort`]: external (spilling) sort
//! - [`join`]: sort-merge join
//! - [`mappers`] / [`reducers`]: ready-made functions for the stages above
//!
//! Streams are wired together by [`crate::execution::ExecutionEngine`]; callers normally only
//! touch the function types and built-ins exported here.

use std::sync::Arc;

use crate::error::GraphResult;
use crate::types::Row;

pub(crate) mod buffer;
pub mod filter;
pub mod fold;
pub(crate) mod group;
pub mod join;
pub mod map;
pub mod mappers;
pub(crate) mod parallel;
pub mod reduce;
pub mod reducers;
pub mod sort;

pub use join::{JoinKind, JoinOptions};
pub use reduce::Reducer;
pub use reducers::{Aggregate, First, ReduceOp, TermFrequency, TopN};

/// A lazy, single-pass stream of rows; the first error ends the stream.
pub type RowStream<'a> = Box<dyn Iterator<Item = GraphResult<Row>> + 'a>;

/// Row-to-row function used by map stages.
pub type MapFn = Arc<dyn Fn(Row) -> GraphResult<Row> + Send + Sync>;

/// Row-to-rows function used by flat-map stages.
pub type FlatMapFn = Arc<dyn Fn(Row) -> GraphResult<Vec<Row>> + Send + Sync>;

/// Predicate used by filter stages.
pub type PredicateFn = Arc<dyn Fn(&Row) -> GraphResult<bool> + Send + Sync>;

/// Accumulator used by fold stages: `(state, row) -> state`.
pub type FoldFn = Arc<dyn Fn(Row, &Row) -> GraphResult<Row> + Send + Sync>;
