//! Execution graph over task specs
//!
//! Owns the validated DAG of a workflow definition and answers the
//! topological queries the decision builder needs. Nodes keep declaration
//! order, so every query below is deterministic.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;

use windlass_core::TaskSpec;

/// Errors raised while building an execution graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two task specs share an id
    #[error("duplicate task id `{0}`")]
    DuplicateTaskId(String),

    /// A `requires` entry references a task outside the graph
    #[error("task `{task}` requires unknown task `{dependency}`")]
    UnresolvedDependency { task: String, dependency: String },

    /// The dependency relation contains a cycle
    #[error("workflow definition contains a dependency cycle")]
    Cycle,
}

/// Validated DAG over the task specs of one workflow definition
///
/// Built once before the first decision round and immutable afterwards.
pub struct ExecutionGraph {
    graph: DiGraph<TaskSpec, ()>,
    nodes_by_id: HashMap<String, NodeIndex>,
}

impl ExecutionGraph {
    /// Build and validate the graph from declared task specs
    ///
    /// Validation rejects duplicate ids, `requires` entries that do not
    /// resolve within the graph, and dependency cycles.
    pub fn from_tasks(tasks: Vec<TaskSpec>) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut nodes_by_id = HashMap::with_capacity(tasks.len());

        for task in tasks {
            let id = task.id().to_string();
            let node = graph.add_node(task);
            if nodes_by_id.insert(id.clone(), node).is_some() {
                return Err(GraphError::DuplicateTaskId(id));
            }
        }

        // Edges run dependency -> dependent.
        let mut edges = Vec::new();
        for node in graph.node_indices() {
            for dependency in graph[node].requires() {
                let dependency_node = nodes_by_id.get(dependency).ok_or_else(|| {
                    GraphError::UnresolvedDependency {
                        task: graph[node].id().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                edges.push((*dependency_node, node));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(GraphError::Cycle);
        }

        Ok(Self { graph, nodes_by_id })
    }

    /// Source tasks (no predecessors), in declaration order
    pub fn first_tasks(&self) -> Vec<&TaskSpec> {
        self.graph
            .node_indices()
            .filter(|&node| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|node| &self.graph[node])
            .collect()
    }

    /// Sink tasks (no successors), in declaration order
    pub fn outgoing_vertices(&self) -> Vec<&TaskSpec> {
        self.graph
            .node_indices()
            .filter(|&node| {
                self.graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .map(|node| &self.graph[node])
            .collect()
    }

    /// Direct dependents of `id`, in declaration order
    ///
    /// Unknown ids have no dependents.
    pub fn successors(&self, id: &str) -> Vec<&TaskSpec> {
        let Some(&node) = self.nodes_by_id.get(id) else {
            return Vec::new();
        };
        let mut successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        successors.sort_unstable();
        successors.dedup();
        successors.into_iter().map(|node| &self.graph[node]).collect()
    }

    /// The spec behind `id`, if it is part of this graph
    pub fn task_by_id(&self, id: &str) -> Option<&TaskSpec> {
        self.nodes_by_id.get(id).map(|&node| &self.graph[node])
    }

    /// Declared predecessor ids of `id`, if it is part of this graph
    pub fn requires(&self, id: &str) -> Option<&[String]> {
        self.task_by_id(id).map(TaskSpec::requires)
    }

    /// All task specs, in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.graph.node_indices().map(|node| &self.graph[node])
    }
}
