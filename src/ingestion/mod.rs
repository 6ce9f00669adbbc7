//! Row readers and writers for binding files to graph sources.
//!
//! Readers are lazy iterators of `GraphResult<Row>`, so they can be handed straight to
//! [`crate::Bindings::bind_results`] and are only pulled as far as the run needs:
//!
//! - [`json`]: newline-delimited JSON objects, plus [`json::write_ndjson`] for output
//! - [`csv`]: headered CSV with per-cell type inference

pub mod csv;
pub mod json;

pub use self::csv::{CsvRows, read_csv, read_csv_path};
pub use self::json::{NdjsonRows, read_ndjson, read_ndjson_path, write_ndjson};
