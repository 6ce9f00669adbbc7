use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::graph::{Graph, Node, Operator};

/// One operator of a lowered graph; `inputs` index into [`Plan::nodes`].
pub(crate) struct PlanNode {
    pub(crate) op: Operator,
    pub(crate) inputs: Vec<usize>,
    /// How many streams read this node's output (the run's output counts as one).
    pub(crate) consumers: usize,
}

/// A graph flattened into an arena in topological order: every node comes after its inputs
/// and the output node is last.
pub(crate) struct Plan {
    pub(crate) nodes: Vec<PlanNode>,
}

impl Plan {
    /// Lower `graph`, merging nodes that are the same `Arc` and sources with the same name.
    pub(crate) fn lower(graph: &Graph) -> Self {
        let mut nodes: Vec<PlanNode> = Vec::new();
        let mut index: HashMap<*const Node, usize> = HashMap::new();
        let mut sources: HashMap<String, usize> = HashMap::new();
        let mut stack: Vec<(&Graph, bool)> = vec![(graph, false)];

        while let Some((g, expanded)) = stack.pop() {
            let ptr = Arc::as_ptr(&g.node);
            if index.contains_key(&ptr) {
                continue;
            }

            if let Operator::Source { name } = &g.node.op {
                let idx = *sources.entry(name.clone()).or_insert_with(|| {
                    nodes.push(PlanNode {
                        op: g.node.op.clone(),
                        inputs: Vec::new(),
                        consumers: 0,
                    });
                    nodes.len() - 1
                });
                index.insert(ptr, idx);
                continue;
            }

            if !expanded {
                stack.push((g, true));
                for input in g.node.inputs.iter().rev() {
                    if !index.contains_key(&Arc::as_ptr(&input.node)) {
                        stack.push((input, false));
                    }
                }
                continue;
            }

            let inputs = g
                .node
                .inputs
                .iter()
                .map(|input| index[&Arc::as_ptr(&input.node)])
                .collect();
            nodes.push(PlanNode {
                op: g.node.op.clone(),
                inputs,
                consumers: 0,
            });
            index.insert(ptr, nodes.len() - 1);
        }

        for i in 0..nodes.len() {
            for j in nodes[i].inputs.clone() {
                nodes[j].consumers += 1;
            }
        }
        if let Some(root) = nodes.last_mut() {
            root.consumers += 1;
        }

        Self { nodes }
    }

    pub(crate) fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Distinct source names, sorted.
    pub(crate) fn source_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.op {
                Operator::Source { name } => Some(name.clone()),
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Plan;
    use crate::error::GraphResult;
    use crate::graph::Graph;
    use crate::processing::JoinKind;
    use crate::types::Row;

    #[test]
    fn chain_lowers_in_topological_order() {
        let g = Graph::source("a")
            .map(|r: Row| -> GraphResult<Row> { Ok(r) })
            .sort(["k"]);
        let plan = Plan::lower(&g);
        let labels: Vec<&str> = plan.nodes.iter().map(|n| n.op.label()).collect();
        assert_eq!(labels, vec!["source", "map", "sort"]);
        assert_eq!(plan.nodes[1].inputs, vec![0]);
        assert!(plan.nodes.iter().all(|n| n.consumers == 1));
    }

    #[test]
    fn shared_node_is_lowered_once_with_two_consumers() {
        let shared = Graph::source("a").map(|r: Row| -> GraphResult<Row> { Ok(r) });
        let g = shared.join(JoinKind::Inner, &shared.filter(|_: &Row| -> GraphResult<bool> { Ok(true) }), ["k"]);
        let plan = Plan::lower(&g);

        let maps: Vec<usize> = plan
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.op.label() == "map")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(maps.len(), 1);
        assert_eq!(plan.nodes[maps[0]].consumers, 2);
        assert_eq!(plan.nodes[plan.root()].op.label(), "join");
        for (i, node) in plan.nodes.iter().enumerate() {
            assert!(node.inputs.iter().all(|&j| j < i));
        }
    }

    #[test]
    fn sources_with_same_name_merge() {
        let g = Graph::source("a").join(JoinKind::Inner, &Graph::source("a"), ["k"]);
        let plan = Plan::lower(&g);
        let sources = plan.nodes.iter().filter(|n| n.op.label() == "source").count();
        assert_eq!(sources, 1);
        assert_eq!(plan.source_names(), vec!["a".to_string()]);
        assert_eq!(plan.nodes[0].consumers, 2);
    }
}
