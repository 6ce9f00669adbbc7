//! `compgraph` is a library for lazy map/reduce computation graphs over streams of rows.
//!
//! A [`Graph`] describes a pipeline (map, flat-map, filter, fold, grouped reduce, sort and
//! join) without running it. Running the graph against a set of [`Bindings`] (named row
//! sequences) returns a lazy, single-pass stream of output rows.
//!
//! Grouping and joining work on key-sorted streams, so memory stays bounded by the largest
//! key group rather than by the input size. The sort that puts streams in order spills to
//! temporary files once its input outgrows one in-memory chunk.
//!
//! ## Word count
//!
//! ```rust
//! use compgraph::processing::{mappers, Aggregate};
//! use compgraph::{row, Bindings, Graph};
//!
//! # fn main() -> Result<(), compgraph::GraphError> {
//! let graph = Graph::source("docs")
//!     .map(mappers::filter_punctuation("text"))
//!     .map(mappers::lowercase("text"))
//!     .flat_map(mappers::split("text"))
//!     .reduce(["text"], Aggregate::count("count"));
//!
//! let docs = vec![
//!     row! { "doc_id" => 1, "text" => "Hello, world!" },
//!     row! { "doc_id" => 2, "text" => "hello again" },
//! ];
//! let rows = graph.run(Bindings::new().bind("docs", docs))?.collect_rows()?;
//!
//! assert_eq!(rows.len(), 3);
//! assert_eq!(rows[1], row! { "text" => "hello", "count" => 2 });
//! # Ok(())
//! # }
//! ```
//!
//! ## Joins
//!
//! Both inputs of a join are sorted by the join keys automatically. Non-key columns present
//! on both sides are suffixed (`_1` for the left side, `_2` for the right side by default):
//!
//! ```rust
//! use compgraph::{row, Bindings, Graph, JoinKind};
//!
//! # fn main() -> Result<(), compgraph::GraphError> {
//! let users = Graph::source("users");
//! let orders = Graph::source("orders");
//! let graph = users.join(JoinKind::Inner, &orders, ["user_id"]);
//!
//! let bindings = Bindings::new()
//!     .bind("users", vec![row! { "user_id" => 1, "name" => "Ada" }])
//!     .bind("orders", vec![
//!         row! { "user_id" => 1, "name" => "lamp" },
//!         row! { "user_id" => 2, "name" => "desk" },
//!     ]);
//! let rows = graph.run(bindings)?.collect_rows()?;
//!
//! assert_eq!(rows, vec![row! { "user_id" => 1, "name_1" => "Ada", "name_2" => "lamp" }]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution options
//!
//! [`ExecutionEngine`] carries the resource knobs: sort chunk size, spill directory, a
//! ceiling on buffered rows and an optional rayon pool for map/filter stages.
//!
//! ```rust
//! use compgraph::{row, Bindings, ExecutionEngine, ExecutionOptions, Graph};
//!
//! # fn main() -> Result<(), compgraph::GraphError> {
//! let engine = ExecutionEngine::try_new(ExecutionOptions {
//!     sort_chunk_rows: 2,
//!     max_buffered_rows: Some(100),
//!     ..ExecutionOptions::default()
//! })?;
//! let graph = Graph::source("nums").sort(["n"]);
//! let nums = (0..5).rev().map(|n| row! { "n" => n });
//! let rows = engine.run(&graph, Bindings::new().bind("nums", nums))?.collect_rows()?;
//! assert_eq!(rows.first(), Some(&row! { "n" => 0 }));
//! assert!(engine.metrics().snapshot().spill_runs > 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: the [`Graph`] value and the named-table [`GraphBuilder`]
//! - [`execution`]: the engine, bindings, observer events and metrics
//! - [`processing`]: operator streams plus ready-made mappers and reducers
//! - [`ingestion`]: NDJSON and CSV row readers
//! - [`types`] / [`key`]: rows, values and key ordering
//! - [`error`]: the crate error type

pub mod error;
pub mod execution;
pub mod graph;
pub mod ingestion;
pub mod key;
pub mod processing;
pub mod types;

pub use error::{GraphError, GraphResult};
pub use execution::{Bindings, ExecutionEngine, ExecutionOptions, RunOutput};
pub use graph::{Graph, GraphBuilder};
pub use processing::{JoinKind, JoinOptions};
pub use types::{Row, Value};
