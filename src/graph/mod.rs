//! Computation graphs.
//!
//! A [`Graph`] is an immutable description of a pipeline: every builder call returns a new
//! graph whose node points at the receiver (and, for joins, at the other graph). Nothing is
//! read or computed until the graph is run with [`Graph::run`] or
//! [`crate::ExecutionEngine::run`].
//!
//! Grouping operators need key-sorted input. [`Graph::reduce`] and [`Graph::join`] insert a
//! sort on every input that is not already known to be sorted by a key list starting with the
//! requested keys.

mod builder;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::GraphResult;
use crate::execution::{Bindings, ExecutionEngine, RunOutput};
use crate::key::{is_prefix, owned_keys};
use crate::processing::{
    FlatMapFn, FoldFn, JoinKind, JoinOptions, MapFn, PredicateFn, Reducer,
};
use crate::types::Row;

pub use builder::GraphBuilder;

/// A node of the computation DAG and everything downstream code needs to evaluate it.
#[derive(Clone)]
pub(crate) enum Operator {
    Source {
        name: String,
    },
    Map(MapFn),
    FlatMap(FlatMapFn),
    Filter(PredicateFn),
    Fold {
        initial: Row,
        folder: FoldFn,
    },
    Reduce {
        keys: Arc<[String]>,
        reducer: Arc<dyn Reducer>,
    },
    Sort {
        keys: Arc<[String]>,
    },
    Join {
        kind: JoinKind,
        keys: Arc<[String]>,
        options: Arc<JoinOptions>,
    },
}

impl Operator {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Operator::Source { .. } => "source",
            Operator::Map(_) => "map",
            Operator::FlatMap(_) => "flat_map",
            Operator::Filter(_) => "filter",
            Operator::Fold { .. } => "fold",
            Operator::Reduce { .. } => "reduce",
            Operator::Sort { .. } => "sort",
            Operator::Join { .. } => "join",
        }
    }
}

pub(crate) struct Node {
    pub(crate) op: Operator,
    pub(crate) inputs: Vec<Graph>,
    pub(crate) sorted_by: Option<Arc<[String]>>,
}

/// An immutable, shareable computation graph.
///
/// Cloning is cheap; a graph can be reused as a join input, as a template for several
/// pipelines, or run concurrently from several threads.
#[derive(Clone)]
pub struct Graph {
    pub(crate) node: Arc<Node>,
}

impl Graph {
    fn from_node(op: Operator, inputs: Vec<Graph>, sorted_by: Option<Arc<[String]>>) -> Self {
        Self {
            node: Arc::new(Node {
                op,
                inputs,
                sorted_by,
            }),
        }
    }

    /// A graph that reads the rows bound to `name` at run time.
    pub fn source(name: impl Into<String>) -> Self {
        Self::from_node(Operator::Source { name: name.into() }, Vec::new(), None)
    }

    /// One output row per input row.
    pub fn map<F>(&self, mapper: F) -> Self
    where
        F: Fn(Row) -> GraphResult<Row> + Send + Sync + 'static,
    {
        self.map_arc(Arc::new(mapper))
    }

    pub(crate) fn map_arc(&self, mapper: MapFn) -> Self {
        Self::from_node(Operator::Map(mapper), vec![self.clone()], None)
    }

    /// Zero or more output rows per input row.
    pub fn flat_map<F>(&self, mapper: F) -> Self
    where
        F: Fn(Row) -> GraphResult<Vec<Row>> + Send + Sync + 'static,
    {
        self.flat_map_arc(Arc::new(mapper))
    }

    pub(crate) fn flat_map_arc(&self, mapper: FlatMapFn) -> Self {
        Self::from_node(Operator::FlatMap(mapper), vec![self.clone()], None)
    }

    /// Keeps the rows for which `predicate` holds. Sortedness is preserved.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Row) -> GraphResult<bool> + Send + Sync + 'static,
    {
        self.filter_arc(Arc::new(predicate))
    }

    pub(crate) fn filter_arc(&self, predicate: PredicateFn) -> Self {
        Self::from_node(
            Operator::Filter(predicate),
            vec![self.clone()],
            self.node.sorted_by.clone(),
        )
    }

    /// Folds the whole input into one row, starting from `initial`.
    pub fn fold<F>(&self, initial: Row, folder: F) -> Self
    where
        F: Fn(Row, &Row) -> GraphResult<Row> + Send + Sync + 'static,
    {
        self.fold_arc(initial, Arc::new(folder))
    }

    pub(crate) fn fold_arc(&self, initial: Row, folder: FoldFn) -> Self {
        Self::from_node(Operator::Fold { initial, folder }, vec![self.clone()], None)
    }

    /// Groups rows by `keys` and hands each group to `reducer`.
    ///
    /// The output is sorted by `keys`.
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty.
    pub fn reduce<I, S, R>(&self, keys: I, reducer: R) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: Reducer + 'static,
    {
        self.reduce_arc(owned_keys(keys), Arc::new(reducer))
    }

    pub(crate) fn reduce_arc(&self, keys: Vec<String>, reducer: Arc<dyn Reducer>) -> Self {
        let keys = non_empty_keys(keys, "reduce");
        let input = self.sorted_input(&keys);
        Self::from_node(
            Operator::Reduce {
                keys: Arc::clone(&keys),
                reducer,
            },
            vec![input],
            Some(keys),
        )
    }

    /// Stable sort by `keys`, spilling to disk for large inputs.
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty.
    pub fn sort<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_owned(owned_keys(keys))
    }

    pub(crate) fn sort_owned(&self, keys: Vec<String>) -> Self {
        let keys = non_empty_keys(keys, "sort");
        Self::from_node(
            Operator::Sort {
                keys: Arc::clone(&keys),
            },
            vec![self.clone()],
            Some(keys),
        )
    }

    /// Joins this graph (left) with `right` on `keys`, suffixing colliding columns with
    /// `_1` / `_2`.
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty.
    pub fn join<I, S>(&self, kind: JoinKind, right: &Graph, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.join_with(kind, right, keys, JoinOptions::default())
    }

    /// [`Graph::join`] with explicit [`JoinOptions`].
    ///
    /// # Panics
    ///
    /// Panics if `keys` is empty.
    pub fn join_with<I, S>(&self, kind: JoinKind, right: &Graph, keys: I, options: JoinOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = non_empty_keys(owned_keys(keys), "join");
        let left = self.sorted_input(&keys);
        let right = right.sorted_input(&keys);
        Self::from_node(
            Operator::Join {
                kind,
                keys: Arc::clone(&keys),
                options: Arc::new(options),
            },
            vec![left, right],
            Some(keys),
        )
    }

    /// Names of the sources this graph reads, sorted and deduplicated.
    pub fn sources(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(graph) = stack.pop() {
            if !seen.insert(Arc::as_ptr(&graph.node)) {
                continue;
            }
            if let Operator::Source { name } = &graph.node.op {
                names.insert(name.clone());
            }
            stack.extend(graph.node.inputs.iter());
        }
        names.into_iter().collect()
    }

    /// Key list the output is known to be sorted by, if any.
    pub fn sorted_by(&self) -> Option<&[String]> {
        self.node.sorted_by.as_deref()
    }

    /// Whether the output is known to be sorted by `keys` (or by a longer list starting with
    /// them).
    pub fn is_sorted_by<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        !keys.is_empty() && self.sorted_by().is_some_and(|sorted| is_prefix(&keys, sorted))
    }

    /// Runs the graph with a default [`ExecutionEngine`].
    pub fn run<'a>(&self, bindings: Bindings<'a>) -> GraphResult<RunOutput<'a>> {
        ExecutionEngine::default().run(self, bindings)
    }

    fn sorted_input(&self, keys: &[String]) -> Graph {
        if self.sorted_by().is_some_and(|sorted| is_prefix(keys, sorted)) {
            self.clone()
        } else {
            self.sort_owned(keys.to_vec())
        }
    }
}

fn non_empty_keys(keys: Vec<String>, operator: &str) -> Arc<[String]> {
    assert!(!keys.is_empty(), "{operator} requires at least one key");
    keys.into()
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Graph");
        s.field("op", &self.node.op.label());
        match &self.node.op {
            Operator::Source { name } => {
                s.field("name", name);
            }
            Operator::Reduce { keys, .. } | Operator::Sort { keys } => {
                s.field("keys", keys);
            }
            Operator::Join { kind, keys, .. } => {
                s.field("kind", kind).field("keys", keys);
            }
            _ => {}
        }
        if !self.node.inputs.is_empty() {
            s.field("inputs", &self.node.inputs);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Graph, Operator};
    use crate::error::GraphResult;
    use crate::processing::{Aggregate, JoinKind};
    use crate::types::Row;

    fn op_labels(graph: &Graph) -> Vec<&'static str> {
        let mut labels = Vec::new();
        let mut current = Some(graph);
        while let Some(g) = current {
            labels.push(g.node.op.label());
            current = g.node.inputs.first();
        }
        labels
    }

    #[test]
    fn reduce_inserts_sort_for_unsorted_input() {
        let g = Graph::source("words").reduce(["w"], Aggregate::count("n"));
        assert_eq!(op_labels(&g), vec!["reduce", "sort", "source"]);
        assert!(g.is_sorted_by(&["w"]));
    }

    #[test]
    fn reduce_reuses_sorted_prefix() {
        let g = Graph::source("words")
            .sort(["w", "doc"])
            .filter(|_: &Row| -> GraphResult<bool> { Ok(true) })
            .reduce(["w"], Aggregate::count("n"));
        assert_eq!(op_labels(&g), vec!["reduce", "filter", "sort", "source"]);
    }

    #[test]
    fn map_forgets_sortedness() {
        let g = Graph::source("a").sort(["k"]).map(|row: Row| -> GraphResult<Row> { Ok(row) });
        assert!(!g.is_sorted_by(&["k"]));
        assert_eq!(g.sorted_by(), None);
    }

    #[test]
    fn join_sorts_only_unsorted_sides() {
        let left = Graph::source("left").sort(["id"]);
        let right = Graph::source("right");
        let joined = left.join(JoinKind::Inner, &right, ["id"]);

        let inputs = &joined.node.inputs;
        assert_eq!(inputs[0].node.op.label(), "sort");
        assert!(matches!(inputs[0].node.inputs[0].node.op, Operator::Source { .. }));
        assert_eq!(inputs[1].node.op.label(), "sort");
        assert!(joined.is_sorted_by(&["id"]));
    }

    #[test]
    fn sources_are_sorted_and_unique() {
        let a = Graph::source("b");
        let g = a.join(JoinKind::Left, &Graph::source("a"), ["k"]).join(JoinKind::Inner, &a, ["k"]);
        assert_eq!(g.sources(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    #[should_panic(expected = "sort requires at least one key")]
    fn empty_sort_keys_panic() {
        let _ = Graph::source("a").sort(Vec::<String>::new());
    }

    #[test]
    fn debug_shows_structure() {
        let g = Graph::source("docs").sort(["k"]);
        let text = format!("{g:?}");
        assert!(text.contains("\"sort\""));
        assert!(text.contains("\"docs\""));
    }
}
