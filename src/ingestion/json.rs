//! Newline-delimited JSON (NDJSON) rows.
//!
//! Every non-blank line must hold one JSON object; it becomes one [`Row`] with the object's
//! keys in file order. Numbers without a fractional part become [`crate::Value::Int64`],
//! arrays become lists and nested objects become maps.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::Path;

use crate::error::{GraphError, GraphResult};
use crate::types::Row;

/// Lazy NDJSON row reader; the first malformed line ends it with [`GraphError::Json`].
pub struct NdjsonRows<R> {
    lines: Lines<R>,
    line_no: usize,
    done: bool,
}

/// Read rows from any buffered reader.
pub fn read_ndjson<R: BufRead>(reader: R) -> NdjsonRows<R> {
    NdjsonRows {
        lines: reader.lines(),
        line_no: 0,
        done: false,
    }
}

/// Open `path` and read its rows lazily. Fails right away if the file cannot be opened.
pub fn read_ndjson_path(path: impl AsRef<Path>) -> GraphResult<NdjsonRows<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(read_ndjson(BufReader::new(file)))
}

impl<R: BufRead> Iterator for NdjsonRows<R> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed = serde_json::from_str::<serde_json::Value>(trimmed)
                .map_err(|e| e.to_string())
                .and_then(|v| match v {
                    serde_json::Value::Object(map) => Ok(Row::from_json_object(map)),
                    other => Err(format!("expected a json object, found {other}")),
                });
            return Some(parsed.map_err(|message| {
                self.done = true;
                GraphError::Json {
                    line: self.line_no,
                    message,
                }
            }));
        }
    }
}

/// Write rows as NDJSON, one object per line, and return how many were written.
///
/// Accepts fallible streams (such as a run's output) and stops at the first error.
pub fn write_ndjson<W, I>(mut writer: W, rows: I) -> GraphResult<usize>
where
    W: Write,
    I: IntoIterator<Item = GraphResult<Row>>,
{
    let mut written = 0;
    for row in rows {
        let row = row?;
        serde_json::to_writer(&mut writer, &row.to_json()).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::{read_ndjson, read_ndjson_path, write_ndjson};
    use crate::error::{GraphError, GraphResult};
    use crate::row;
    use crate::types::{Row, Value};

    #[test]
    fn reads_objects_and_skips_blank_lines() {
        let input = "{\"doc\": 1, \"text\": \"hello\"}\n\n  \n{\"doc\": 2, \"tags\": [\"a\"], \"w\": 0.5}\n";
        let rows: Vec<Row> = read_ndjson(input.as_bytes()).collect::<GraphResult<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row! { "doc" => 1, "text" => "hello" });
        assert_eq!(
            rows[1].get("tags"),
            Some(&Value::List(vec![Value::Utf8("a".to_string())]))
        );
        assert_eq!(rows[1].get("w"), Some(&Value::Float64(0.5)));
    }

    #[test]
    fn malformed_line_reports_its_number_and_stops() {
        let input = "{\"a\": 1}\n\n{not json}\n{\"a\": 2}\n";
        let mut rows = read_ndjson(input.as_bytes());
        assert!(rows.next().unwrap().is_ok());
        match rows.next() {
            Some(Err(GraphError::Json { line, .. })) => assert_eq!(line, 3),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(rows.next().is_none());
    }

    #[test]
    fn non_object_line_is_rejected() {
        let err = read_ndjson("[1, 2]\n".as_bytes()).next().unwrap().unwrap_err();
        assert!(err.to_string().contains("expected a json object"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_ndjson_path("/definitely/not/here.ndjson").err().unwrap();
        assert!(matches!(err, GraphError::Io(_)));
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let rows = vec![
            row! { "w" => "a", "n" => 2 },
            row! { "w" => "b", "n" => 1 },
        ];
        let mut buf = Vec::new();
        let n = write_ndjson(&mut buf, rows.clone().into_iter().map(Ok)).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(buf.clone()).unwrap(),
            "{\"w\":\"a\",\"n\":2}\n{\"w\":\"b\",\"n\":1}\n"
        );
        let back: Vec<Row> = read_ndjson(buf.as_slice()).collect::<GraphResult<_>>().unwrap();
        assert_eq!(back, rows);
    }
}
