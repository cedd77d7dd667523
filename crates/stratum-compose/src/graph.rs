//! Resource dependency graph using `petgraph`.
//!
//! Builds a directed acyclic graph from the deferred inputs of a
//! component's nodes and resolves the order in which they are submitted.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::Urn;

/// A dependency graph of resource nodes.
#[derive(Debug)]
pub struct ResourceGraph {
    owner: String,
    /// Internal petgraph representation.
    graph: petgraph::Graph<Urn, ()>,
    index: HashMap<Urn, NodeIndex>,
}

impl ResourceGraph {
    /// Creates an empty graph for the component named `owner`.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            graph: petgraph::Graph::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a resource node to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a node with the same URN already exists.
    pub fn add_node(&mut self, urn: Urn) -> Result<NodeIndex> {
        if self.index.contains_key(&urn) {
            return Err(StratumError::DuplicateName {
                scope: format!("component \"{}\"", self.owner),
                name: urn.name().to_string(),
            });
        }
        let idx = self.graph.add_node(urn.clone());
        let _ = self.index.insert(urn, idx);
        Ok(idx)
    }

    /// Returns the index of `urn`, if present.
    #[must_use]
    pub fn node(&self, urn: &Urn) -> Option<NodeIndex> {
        self.index.get(urn).copied()
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that dependencies are ordered first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependency, dependent, ());
    }

    /// Returns the nodes `urn` directly depends on, in insertion order.
    #[must_use]
    pub fn dependencies_of(&self, urn: &Urn) -> Vec<Urn> {
        let Some(idx) = self.node(urn) else {
            return Vec::new();
        };
        let mut deps: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        deps.sort_unstable();
        deps.into_iter()
            .filter_map(|d| self.graph.node_weight(d).cloned())
            .collect()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the submission order.
    ///
    /// Dependencies appear before the nodes that read them. Among nodes
    /// with no ordering constraint between them, the one added first comes
    /// first, so the order is stable across runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn resolve_order(&self) -> Result<Vec<Urn>> {
        let mut indegree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| indegree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let remaining = &mut indegree[next.index()];
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(StratumError::config(
                &self.owner,
                "resources",
                "cyclic dependency detected in resource graph",
                "break the cycle by removing one of the references between the resources",
            ));
        }
        let urns = order
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect();
        tracing::debug!(owner = %self.owner, ?urns, "resource order resolved");
        Ok(urns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::new("app", "test", "test:Node", name)
    }

    fn names(order: &[Urn]) -> Vec<&str> {
        order.iter().map(Urn::name).collect()
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = ResourceGraph::new("Db");
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn linear_dependency_chain() {
        let mut graph = ResourceGraph::new("Db");
        let instance = graph.add_node(urn("instance")).expect("add");
        let group = graph.add_node(urn("group")).expect("add");
        graph.add_dependency(instance, group);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(names(&order), vec!["group", "instance"]);
        assert_eq!(graph.dependencies_of(&urn("instance")), vec![urn("group")]);
    }

    #[test]
    fn independent_nodes_keep_insertion_order() {
        let mut graph = ResourceGraph::new("Db");
        for name in ["subnets", "params", "password"] {
            let _ = graph.add_node(urn(name)).expect("add");
        }
        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(names(&order), vec!["subnets", "params", "password"]);
    }

    #[test]
    fn diamond_dependency() {
        let mut graph = ResourceGraph::new("Db");
        let a = graph.add_node(urn("a")).expect("add");
        let b = graph.add_node(urn("b")).expect("add");
        let c = graph.add_node(urn("c")).expect("add");
        let d = graph.add_node(urn("d")).expect("add");
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(names(&order), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn repeated_edges_do_not_stall_ordering() {
        let mut graph = ResourceGraph::new("Db");
        let a = graph.add_node(urn("a")).expect("add");
        let b = graph.add_node(urn("b")).expect("add");
        graph.add_dependency(a, b);
        graph.add_dependency(a, b);
        assert_eq!(names(&graph.resolve_order().expect("resolve")), vec!["b", "a"]);
    }

    #[test]
    fn cycle_detection() {
        let mut graph = ResourceGraph::new("Db");
        let a = graph.add_node(urn("a")).expect("add");
        let b = graph.add_node(urn("b")).expect("add");
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut graph = ResourceGraph::new("Db");
        let _ = graph.add_node(urn("a")).expect("add");
        let err = graph.add_node(urn("a")).unwrap_err();
        assert!(matches!(err, StratumError::DuplicateName { .. }));
    }
}
