//! Dependency graph over logical resource names
//!
//! An edge `a -> b` means "a depends on b". Ordering is deterministic: among
//! the resources whose dependencies are already placed, the smallest name goes
//! first.

use crate::error::{CloudError, CycleError, Result};
use crate::state::AppliedState;
use infraflow_core::{ResourceSpec, ValidationError};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of desired resources: explicit `depends_on` plus reference edges
    ///
    /// Every dependency must name one of `specs`.
    pub fn from_specs<'a>(specs: impl IntoIterator<Item = &'a ResourceSpec>) -> Result<Self> {
        let specs: Vec<&ResourceSpec> = specs.into_iter().collect();
        let mut graph = Self::new();
        for spec in &specs {
            graph.add_node(&spec.name);
        }
        for spec in &specs {
            for dep in spec.dependencies() {
                if !graph.contains(&dep) {
                    return Err(CloudError::Validation(ValidationError::resource(
                        &spec.name,
                        format!("depends on unknown resource '{dep}'"),
                    )));
                }
                graph.add_edge(&spec.name, &dep);
            }
        }
        Ok(graph)
    }

    /// Graph of applied records, using the dependencies recorded at apply time
    ///
    /// Dependencies on names that are no longer applied are dropped.
    pub fn from_applied<'a>(records: impl IntoIterator<Item = &'a AppliedState>) -> Self {
        let records: Vec<&AppliedState> = records.into_iter().collect();
        let mut graph = Self::new();
        for record in &records {
            graph.add_node(&record.name);
        }
        for record in &records {
            for dep in &record.depends_on {
                if graph.contains(dep) {
                    graph.add_edge(&record.name, dep);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.node_map.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.node_map.insert(name.to_string(), index);
        index
    }

    /// Record that `from` depends on `to`, adding missing nodes
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Fail with every name that takes part in a cycle
    pub fn check_acyclic(&self) -> std::result::Result<(), CycleError> {
        let mut members = BTreeSet::new();
        for scc in tarjan_scc(&self.graph) {
            let self_loop = scc.len() == 1 && self.graph.find_edge(scc[0], scc[0]).is_some();
            if scc.len() > 1 || self_loop {
                members.extend(scc.into_iter().map(|index| self.graph[index].clone()));
            }
        }
        if members.is_empty() {
            Ok(())
        } else {
            Err(CycleError {
                members: members.into_iter().collect(),
            })
        }
    }

    /// Dependencies before dependents, ties broken by name
    pub fn topological_order(&self) -> std::result::Result<Vec<String>, CycleError> {
        self.check_acyclic()?;

        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|index| {
                let deps = self.graph.neighbors_directed(index, Direction::Outgoing).count();
                (index, deps)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(String, NodeIndex)>> = remaining
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(index, _)| Reverse((self.graph[*index].clone(), *index)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((name, index))) = ready.pop() {
            order.push(name);
            for dependent in self.graph.neighbors_directed(index, Direction::Incoming) {
                if let Some(deps) = remaining.get_mut(&dependent) {
                    *deps -= 1;
                    if *deps == 0 {
                        ready.push(Reverse((self.graph[dependent].clone(), dependent)));
                    }
                }
            }
        }
        Ok(order)
    }

    /// Dependents before their dependencies; the order deletes run in
    pub fn reverse_order(&self) -> std::result::Result<Vec<String>, CycleError> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }

    /// Resources that directly depend on `name`
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Everything that depends on `name`, directly or not
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = self.dependents_of(name).into_iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.dependents_of(&next));
            }
        }
        seen
    }

    fn neighbors(&self, name: &str, direction: Direction) -> BTreeSet<String> {
        match self.node_map.get(name) {
            Some(index) => self
                .graph
                .neighbors_directed(*index, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }
}
