//! CSV rows.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::GraphResult;
use crate::types::{Row, Value};

/// Lazy CSV row reader.
///
/// Rules:
///
/// - CSV must have headers; they become the row's field names, in column order.
/// - Every record must have as many fields as the header (a ragged record is a
///   [`crate::GraphError::Csv`] error that ends the stream).
/// - Cell types are inferred per cell with [`infer_value`].
pub struct CsvRows<R> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
    done: bool,
}

/// Read rows from any reader. The header line is read eagerly.
pub fn read_csv<R: Read>(reader: R) -> GraphResult<CsvRows<R>> {
    let rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    from_reader(rdr)
}

/// Open `path` and read its rows lazily.
pub fn read_csv_path(path: impl AsRef<Path>) -> GraphResult<CsvRows<File>> {
    let rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    from_reader(rdr)
}

fn from_reader<R: Read>(mut rdr: csv::Reader<R>) -> GraphResult<CsvRows<R>> {
    let headers = rdr.headers()?.iter().map(str::to_owned).collect();
    Ok(CsvRows {
        headers,
        records: rdr.into_records(),
        done: false,
    })
}

impl<R> CsvRows<R> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.records.next()? {
            Ok(record) => Some(Ok(self
                .headers
                .iter()
                .zip(record.iter())
                .map(|(name, raw)| (name.as_str(), infer_value(raw)))
                .collect())),
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Type a raw cell: empty cells are null, then integer, float and `true`/`false` are tried
/// in that order; anything else stays a string. Surrounding whitespace is trimmed.
pub fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int64(v);
    }
    // `f64::from_str` also accepts "inf" and "NaN"; only numerals are treated as floats.
    if trimmed.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = trimmed.parse::<f64>() {
            return Value::Float64(v);
        }
    }
    match parse_bool(trimmed) {
        Some(b) => Value::Bool(b),
        None => Value::Utf8(trimmed.to_owned()),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
