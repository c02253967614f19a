//! Step dependency graph
//!
//! Edges point from a dependency to the step that depends on it, so a
//! topological order lists prerequisites first. Dependencies naming unknown
//! steps are kept aside as dangling references instead of becoming nodes.

use aide_types::Step;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Graph errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Dependency relation is cyclic; `step` lies on a cycle
    #[error("circular dependency involving step {step}")]
    CircularDependency { step: String },
}

/// Dependency reference to a step that does not exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingDependency {
    pub step: String,
    pub dependency: String,
}

/// Directed graph over the steps of one plan
#[derive(Debug, Clone)]
pub struct StepGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    dangling: Vec<DanglingDependency>,
}

impl StepGraph {
    /// Build from plan steps
    #[must_use]
    pub fn from_steps(steps: &[Step]) -> Self {
        let mut graph = DiGraph::with_capacity(steps.len(), steps.len());
        let mut index = HashMap::with_capacity(steps.len());
        for step in steps {
            index
                .entry(step.id.clone())
                .or_insert_with(|| graph.add_node(step.id.clone()));
        }

        let mut dangling = Vec::new();
        for step in steps {
            let to = index[&step.id];
            for dep in &step.dependencies {
                match index.get(dep) {
                    Some(&from) => {
                        graph.update_edge(from, to, ());
                    }
                    None => dangling.push(DanglingDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    }),
                }
            }
        }

        Self {
            graph,
            index,
            dangling,
        }
    }

    /// Number of distinct steps
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of resolved dependency edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Dependencies naming unknown steps, in plan order
    #[must_use]
    pub fn dangling(&self) -> &[DanglingDependency] {
        &self.dangling
    }

    /// Whether the dependency relation contains a cycle (self-dependency included)
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_err()
    }

    /// Steps ordered so that every dependency precedes its dependents
    ///
    /// # Errors
    /// [`GraphError::CircularDependency`] if the graph is cyclic
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        // petgraph's toposort walks with an explicit stack, so long chains
        // cannot overflow the call stack.
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| self.graph[n].clone()).collect())
            .map_err(|cycle| GraphError::CircularDependency {
                step: self.graph[cycle.node_id()].clone(),
            })
    }

    /// Steps with no resolved dependencies
    #[must_use]
    pub fn entry_steps(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    /// Direct dependents of a step
    #[must_use]
    pub fn dependents(&self, step: &str) -> Vec<&str> {
        self.index.get(step).map_or_else(Vec::new, |&n| {
            self.graph
                .neighbors_directed(n, Direction::Outgoing)
                .map(|m| self.graph[m].as_str())
                .collect()
        })
    }
}
