use std::collections::BTreeMap;
use std::fmt;

use crate::error::GraphResult;
use crate::processing::RowStream;
use crate::types::Row;

/// Row streams for the named sources of a graph, supplied per run.
///
/// Streams are consumed lazily by the run they are passed to. Binding a name twice keeps the
/// last stream.
#[derive(Default)]
pub struct Bindings<'a> {
    sources: BTreeMap<String, RowStream<'a>>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an infallible row sequence (a `Vec<Row>`, an iterator, ...).
    pub fn bind<I>(mut self, name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: 'a,
    {
        self.sources
            .insert(name.into(), Box::new(rows.into_iter().map(Ok)));
        self
    }

    /// Bind a fallible row stream, e.g. one of the [`crate::ingestion`] readers. The first
    /// error ends the run's output with that error.
    pub fn bind_results<I>(mut self, name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = GraphResult<Row>>,
        I::IntoIter: 'a,
    {
        self.sources.insert(name.into(), Box::new(rows.into_iter()));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<RowStream<'a>> {
        self.sources.remove(name)
    }
}

impl fmt::Debug for Bindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
