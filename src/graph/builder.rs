use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::key::owned_keys;
use crate::processing::{
    FlatMapFn, FoldFn, JoinKind, JoinOptions, MapFn, PredicateFn, Reducer,
};
use crate::types::Row;

use super::Graph;

/// Builds a [`Graph`] from named table definitions that may reference each other in any
/// order.
///
/// Definitions are only checked by [`GraphBuilder::build`], which fails with
/// [`GraphError::UnknownTable`], [`GraphError::DuplicateTable`] or
/// [`GraphError::CyclicGraph`] before anything runs.
///
/// ```rust
/// use compgraph::{GraphBuilder, JoinKind};
/// use compgraph::processing::Aggregate;
///
/// let graph = GraphBuilder::new()
///     .source("clicks")
///     .source("users")
///     .join("enriched", JoinKind::Inner, "clicks", "users", ["user_id"])
///     .reduce("per_user", "enriched", ["user_id"], Aggregate::count("clicks"))
///     .build("per_user")
///     .unwrap();
/// assert_eq!(graph.sources(), vec!["clicks".to_string(), "users".to_string()]);
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    tables: HashMap<String, Table>,
    duplicates: BTreeSet<String>,
}

enum Table {
    Source,
    Map { input: String, mapper: MapFn },
    FlatMap { input: String, mapper: FlatMapFn },
    Filter { input: String, predicate: PredicateFn },
    Fold { input: String, initial: Row, folder: FoldFn },
    Reduce { input: String, keys: Vec<String>, reducer: Arc<dyn Reducer> },
    Sort { input: String, keys: Vec<String> },
    Join {
        left: String,
        right: String,
        kind: JoinKind,
        keys: Vec<String>,
        options: JoinOptions,
    },
}

impl Table {
    fn inputs(&self) -> Vec<&str> {
        match self {
            Table::Source => Vec::new(),
            Table::Map { input, .. }
            | Table::FlatMap { input, .. }
            | Table::Filter { input, .. }
            | Table::Fold { input, .. }
            | Table::Reduce { input, .. }
            | Table::Sort { input, .. } => vec![input.as_str()],
            Table::Join { left, right, .. } => vec![left.as_str(), right.as_str()],
        }
    }

    fn keys(&self) -> Option<&[String]> {
        match self {
            Table::Reduce { keys, .. } | Table::Sort { keys, .. } | Table::Join { keys, .. } => {
                Some(keys)
            }
            _ => None,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn define(mut self, name: impl Into<String>, table: Table) -> Self {
        let name = name.into();
        if self.tables.contains_key(&name) {
            self.duplicates.insert(name);
        } else {
            self.tables.insert(name, table);
        }
        self
    }

    /// A table read from the source binding of the same name.
    pub fn source(self, name: impl Into<String>) -> Self {
        self.define(name, Table::Source)
    }

    pub fn map<F>(self, name: impl Into<String>, input: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(Row) -> GraphResult<Row> + Send + Sync + 'static,
    {
        let input = input.into();
        self.define(name, Table::Map { input, mapper: Arc::new(mapper) })
    }

    pub fn flat_map<F>(self, name: impl Into<String>, input: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(Row) -> GraphResult<Vec<Row>> + Send + Sync + 'static,
    {
        let input = input.into();
        self.define(name, Table::FlatMap { input, mapper: Arc::new(mapper) })
    }

    pub fn filter<F>(self, name: impl Into<String>, input: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Row) -> GraphResult<bool> + Send + Sync + 'static,
    {
        let input = input.into();
        self.define(
            name,
            Table::Filter {
                input,
                predicate: Arc::new(predicate),
            },
        )
    }

    pub fn fold<F>(
        self,
        name: impl Into<String>,
        input: impl Into<String>,
        initial: Row,
        folder: F,
    ) -> Self
    where
        F: Fn(Row, &Row) -> GraphResult<Row> + Send + Sync + 'static,
    {
        let input = input.into();
        self.define(
            name,
            Table::Fold {
                input,
                initial,
                folder: Arc::new(folder),
            },
        )
    }

    /// An empty `keys` list makes [`GraphBuilder::build`] fail with
    /// [`GraphError::EmptyKeys`].
    pub fn reduce<I, S, R>(
        self,
        name: impl Into<String>,
        input: impl Into<String>,
        keys: I,
        reducer: R,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        R: Reducer + 'static,
    {
        let input = input.into();
        self.define(
            name,
            Table::Reduce {
                input,
                keys: owned_keys(keys),
                reducer: Arc::new(reducer),
            },
        )
    }

    pub fn sort<I, S>(self, name: impl Into<String>, input: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let input = input.into();
        self.define(
            name,
            Table::Sort {
                input,
                keys: owned_keys(keys),
            },
        )
    }

    pub fn join<I, S>(
        self,
        name: impl Into<String>,
        kind: JoinKind,
        left: impl Into<String>,
        right: impl Into<String>,
        keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.join_with(name, kind, left, right, keys, JoinOptions::default())
    }

    pub fn join_with<I, S>(
        self,
        name: impl Into<String>,
        kind: JoinKind,
        left: impl Into<String>,
        right: impl Into<String>,
        keys: I,
        options: JoinOptions,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (left, right) = (left.into(), right.into());
        self.define(
            name,
            Table::Join {
                left,
                right,
                kind,
                keys: owned_keys(keys),
                options,
            },
        )
    }

    /// Resolves `output` and everything it depends on into a [`Graph`].
    ///
    /// A table referenced from several places becomes one shared node, so it is evaluated
    /// once per run.
    pub fn build(&self, output: &str) -> GraphResult<Graph> {
        if let Some(name) = self.duplicates.iter().next() {
            return Err(GraphError::DuplicateTable { name: name.clone() });
        }
        if !self.tables.contains_key(output) {
            return Err(GraphError::UnknownTable {
                name: output.to_string(),
                referenced_by: "build".to_string(),
            });
        }

        let mut built = HashMap::new();
        let mut visiting = Vec::new();
        self.visit(output, &mut visiting, &mut built)
    }

    fn visit(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        built: &mut HashMap<String, Graph>,
    ) -> GraphResult<Graph> {
        if let Some(graph) = built.get(name) {
            return Ok(graph.clone());
        }
        if let Some(pos) = visiting.iter().position(|n| n == name) {
            let mut path = visiting[pos..].to_vec();
            path.push(name.to_string());
            return Err(GraphError::CyclicGraph { path });
        }

        let table = self.tables.get(name).ok_or_else(|| GraphError::UnknownTable {
            name: name.to_string(),
            referenced_by: visiting.last().cloned().unwrap_or_default(),
        })?;

        if table.keys().is_some_and(|keys| keys.is_empty()) {
            return Err(GraphError::EmptyKeys {
                table: name.to_string(),
            });
        }

        visiting.push(name.to_string());
        let mut inputs = Vec::new();
        for input in table.inputs() {
            inputs.push(self.visit(input, visiting, built)?);
        }
        visiting.pop();

        let graph = match (table, inputs.as_slice()) {
            (Table::Source, []) => Graph::source(name),
            (Table::Map { mapper, .. }, [input]) => input.map_arc(Arc::clone(mapper)),
            (Table::FlatMap { mapper, .. }, [input]) => input.flat_map_arc(Arc::clone(mapper)),
            (Table::Filter { predicate, .. }, [input]) => input.filter_arc(Arc::clone(predicate)),
            (Table::Fold { initial, folder, .. }, [input]) => {
                input.fold_arc(initial.clone(), Arc::clone(folder))
            }
            (Table::Reduce { keys, reducer, .. }, [input]) => {
                input.reduce_arc(keys.clone(), Arc::clone(reducer))
            }
            (Table::Sort { keys, .. }, [input]) => input.sort_owned(keys.clone()),
            (Table::Join { kind, keys, options, .. }, [left, right]) => {
                left.join_with(*kind, right, keys.iter().cloned(), options.clone())
            }
            _ => unreachable!("inputs are resolved from Table::inputs"),
        };
        built.insert(name.to_string(), graph.clone());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::GraphBuilder;
    use crate::error::{GraphError, GraphResult};
    use crate::processing::{Aggregate, JoinKind};
    use crate::types::Row;

    fn identity(row: Row) -> GraphResult<Row> {
        Ok(row)
    }

    #[test]
    fn definitions_may_come_in_any_order() {
        let graph = GraphBuilder::new()
            .reduce("counts", "words", ["w"], Aggregate::count("n"))
            .map("words", "docs", identity)
            .source("docs")
            .build("counts")
            .unwrap();
        assert_eq!(graph.sources(), vec!["docs".to_string()]);
        assert!(graph.is_sorted_by(&["w"]));
    }

    #[test]
    fn cycle_is_reported_with_its_path() {
        let err = GraphBuilder::new()
            .source("docs")
            .map("a", "c", identity)
            .map("b", "a", identity)
            .map("c", "b", identity)
            .build("c")
            .unwrap_err();
        match err {
            GraphError::CyclicGraph { path } => assert_eq!(path, vec!["c", "b", "a", "c"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = GraphBuilder::new()
            .map("loop", "loop", identity)
            .build("loop")
            .unwrap_err();
        assert_eq!(err.to_string(), "cyclic graph: loop -> loop");
    }

    #[test]
    fn unknown_table_names_its_referrer() {
        let err = GraphBuilder::new()
            .map("a", "missing", identity)
            .build("a")
            .unwrap_err();
        match err {
            GraphError::UnknownTable { name, referenced_by } => {
                assert_eq!(name, "missing");
                assert_eq!(referenced_by, "a");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = GraphBuilder::new().source("a").build("b").unwrap_err();
        assert!(matches!(err, GraphError::UnknownTable { .. }));
    }

    #[test]
    fn duplicate_definition_fails() {
        let err = GraphBuilder::new()
            .source("a")
            .map("a", "a", identity)
            .build("a")
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTable { ref name } if name == "a"));
    }

    #[test]
    fn empty_key_list_is_a_build_error() {
        let err = GraphBuilder::new()
            .source("docs")
            .sort("sorted", "docs", Vec::<String>::new())
            .build("sorted")
            .unwrap_err();
        assert!(matches!(err, GraphError::EmptyKeys { ref table } if table == "sorted"));

        let err = GraphBuilder::new()
            .source("a")
            .source("b")
            .join("both", JoinKind::Inner, "a", "b", Vec::<&str>::new())
            .build("both")
            .unwrap_err();
        assert_eq!(err.to_string(), "table 'both' has an empty key list");
    }

    #[test]
    fn shared_tables_become_one_node() {
        let graph = GraphBuilder::new()
            .source("docs")
            .map("clean", "docs", identity)
            .join("self", JoinKind::Inner, "clean", "clean", ["id"])
            .build("self")
            .unwrap();
        let sorts = &graph.node.inputs;
        let left = &sorts[0].node.inputs[0];
        let right = &sorts[1].node.inputs[0];
        assert!(Arc::ptr_eq(&left.node, &right.node));
    }
}
