//! External sort.
//!
//! Rows are read in chunks of `ExecutionOptions::sort_chunk_rows`. When the whole input fits
//! in one chunk it is sorted in memory; otherwise every sorted chunk is spilled to a
//! temporary JSON-lines file and the runs are k-way merged, one buffered row per run. When
//! there are more runs than `ExecutionOptions::merge_fan_in`, consecutive runs are first
//! merged into longer runs, pass after pass, so no more than `merge_fan_in` spill files are
//! open at once.
//!
//! The sort is stable: chunks are sorted with a stable sort and merge ties go to the run that
//! was spilled first. Spill files live exactly as long as the stream that owns them.
//!
//! Rows are ordered with the infallible [`total_cmp_keys`] and every pair of neighbours in
//! that order is then checked with [`compare_keys`]. Mutually orderable values always sit
//! next to each other in the total order, so a sequence whose neighbours all compare has no
//! incomparable pair anywhere.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use tempfile::TempPath;

use crate::error::{GraphError, GraphResult};
use crate::execution::{ExecutionEvent, RunContext};
use crate::key::{Key, compare_keys, extract_key, total_cmp_keys};
use crate::types::Row;

use super::RowStream;

const SPILL_PREFIX: &str = "compgraph-sort-";
const SPILL_SUFFIX: &str = ".jsonl";

pub(crate) struct SortStream<'a> {
    state: State<'a>,
    keys: Arc<[String]>,
    ctx: Rc<RunContext>,
}

enum State<'a> {
    Unread(RowStream<'a>),
    InMemory(std::vec::IntoIter<(Key, Row)>),
    Merging(Merge),
    Done,
}

impl<'a> SortStream<'a> {
    pub(crate) fn new(input: RowStream<'a>, keys: Arc<[String]>, ctx: Rc<RunContext>) -> Self {
        Self {
            state: State::Unread(input),
            keys,
            ctx,
        }
    }

    fn read_all(&self, mut input: RowStream<'a>) -> GraphResult<State<'a>> {
        let chunk_rows = self.ctx.options.sort_chunk_rows.max(1);

        let (first, exhausted) = self.read_chunk(&mut input, chunk_rows)?;
        if exhausted {
            return Ok(State::InMemory(first.into_iter()));
        }

        let dir = self
            .ctx
            .options
            .spill_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let mut runs = vec![self.spill(first, &dir, 0)?];
        loop {
            let (chunk, exhausted) = self.read_chunk(&mut input, chunk_rows)?;
            if !chunk.is_empty() {
                runs.push(self.spill(chunk, &dir, runs.len())?);
            }
            if exhausted {
                break;
            }
        }

        let fan_in = self.ctx.options.merge_fan_in.max(2);
        while runs.len() > fan_in {
            runs = self.merge_pass(runs, fan_in, &dir)?;
        }

        self.ctx.emit(ExecutionEvent::MergeStarted { runs: runs.len() });
        Ok(State::Merging(Merge::open(runs, &self.keys)?))
    }

    /// Reads and sorts up to `limit` rows; the flag tells whether the input ended.
    fn read_chunk(
        &self,
        input: &mut RowStream<'a>,
        limit: usize,
    ) -> GraphResult<(Vec<(Key, Row)>, bool)> {
        let mut chunk = Vec::new();
        let mut exhausted = false;
        while chunk.len() < limit {
            match input.next() {
                Some(row) => {
                    let row = row?;
                    let key = extract_key(&row, &self.keys, "sort")?;
                    chunk.push((key, row));
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        chunk.sort_by(|a, b| total_cmp_keys(&a.0, &b.0));
        for pair in chunk.windows(2) {
            compare_keys(&pair[0].0, &pair[1].0, &self.keys)?;
        }
        Ok((chunk, exhausted))
    }

    fn spill(&self, chunk: Vec<(Key, Row)>, dir: &Path, run: usize) -> GraphResult<SpilledRun> {
        let (spilled, rows) = write_run(dir, chunk.into_iter().map(|(_, row)| Ok(row)))?;
        self.ctx.metrics.on_spill(rows);
        self.ctx.emit(ExecutionEvent::SpillWritten { run, rows });
        Ok(spilled)
    }

    /// Merges each group of `fan_in` consecutive runs into one longer run.
    fn merge_pass(
        &self,
        runs: Vec<SpilledRun>,
        fan_in: usize,
        dir: &Path,
    ) -> GraphResult<Vec<SpilledRun>> {
        self.ctx.emit(ExecutionEvent::MergeStarted { runs: runs.len() });

        let mut merged = Vec::with_capacity(runs.len().div_ceil(fan_in));
        let mut pending = runs.into_iter();
        loop {
            let group: Vec<SpilledRun> = pending.by_ref().take(fan_in).collect();
            match group.len() {
                0 => break,
                1 => merged.extend(group),
                _ => {
                    let mut merge = Merge::open(group, &self.keys)?;
                    let rows = std::iter::from_fn(|| merge.next_row().transpose());
                    let (run, _) = write_run(dir, rows)?;
                    merged.push(run);
                }
            }
        }
        Ok(merged)
    }
}

impl Iterator for SortStream<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Unread(_) => {
                    let State::Unread(input) = std::mem::replace(&mut self.state, State::Done) else {
                        unreachable!("state checked above");
                    };
                    match self.read_all(input) {
                        Ok(state) => self.state = state,
                        Err(e) => return Some(Err(e)),
                    }
                }
                State::InMemory(rows) => return rows.next().map(|(_, row)| Ok(row)),
                State::Merging(merge) => {
                    let item = merge.next_row().transpose();
                    if matches!(item, Some(Err(_)) | None) {
                        self.state = State::Done;
                    }
                    return item;
                }
                State::Done => return None,
            }
        }
    }
}

/// A sorted run on disk. It holds no open file; the file is deleted on drop.
struct SpilledRun {
    path: TempPath,
}

/// Writes `rows` to a new spill file in `dir` and returns it with its row count.
fn write_run(
    dir: &Path,
    rows: impl IntoIterator<Item = GraphResult<Row>>,
) -> GraphResult<(SpilledRun, usize)> {
    let file = tempfile::Builder::new()
        .prefix(SPILL_PREFIX)
        .suffix(SPILL_SUFFIX)
        .tempfile_in(dir)
        .map_err(GraphError::spill)?;

    let mut count = 0;
    let mut writer = BufWriter::new(file.as_file());
    for row in rows {
        serde_json::to_writer(&mut writer, &row?).map_err(GraphError::spill)?;
        writer.write_all(b"\n").map_err(GraphError::spill)?;
        count += 1;
    }
    writer.flush().map_err(GraphError::spill)?;
    drop(writer);

    Ok((
        SpilledRun {
            path: file.into_temp_path(),
        },
        count,
    ))
}

/// Sequential reader over one spilled run; owns the run so its file is deleted on drop.
struct RunReader {
    lines: Lines<BufReader<File>>,
    keys: Arc<[String]>,
    _run: SpilledRun,
}

impl RunReader {
    fn open(run: SpilledRun, keys: Arc<[String]>) -> GraphResult<Self> {
        let file = File::open(&run.path).map_err(GraphError::spill)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            keys,
            _run: run,
        })
    }

    fn next_entry(&mut self) -> GraphResult<Option<(Key, Row)>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };
        let line = line.map_err(GraphError::spill)?;
        let row: Row = serde_json::from_str(&line).map_err(GraphError::spill)?;
        let key = extract_key(&row, &self.keys, "sort")?;
        Ok(Some((key, row)))
    }
}

/// K-way merge of sorted runs holding one head row per run.
struct Merge {
    runs: Vec<RunReader>,
    heads: Vec<Option<(Key, Row)>>,
    last: Option<Key>,
    keys: Arc<[String]>,
}

impl Merge {
    fn open(runs: Vec<SpilledRun>, keys: &Arc<[String]>) -> GraphResult<Self> {
        let mut readers = runs
            .into_iter()
            .map(|run| RunReader::open(run, Arc::clone(keys)))
            .collect::<GraphResult<Vec<_>>>()?;
        let heads = readers
            .iter_mut()
            .map(RunReader::next_entry)
            .collect::<GraphResult<Vec<_>>>()?;
        Ok(Self {
            runs: readers,
            heads,
            last: None,
            keys: Arc::clone(keys),
        })
    }

    fn next_row(&mut self) -> GraphResult<Option<Row>> {
        let mut best: Option<usize> = None;
        for (i, head) in self.heads.iter().enumerate() {
            let Some((key, _)) = head else { continue };
            let better = match best.and_then(|b| self.heads[b].as_ref()) {
                None => true,
                Some((best_key, _)) => total_cmp_keys(key, best_key) == Ordering::Less,
            };
            if better {
                best = Some(i);
            }
        }

        let Some(i) = best else {
            return Ok(None);
        };
        let next = self.runs[i].next_entry()?;
        let Some((key, row)) = std::mem::replace(&mut self.heads[i], next) else {
            return Ok(None);
        };
        if let Some(last) = &self.last {
            compare_keys(last, &key, &self.keys)?;
        }
        self.last = Some(key);
        Ok(Some(row))
    }
}
