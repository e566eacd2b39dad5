//! Dependency analysis of a set of passes.
//!
//! Edges are derived from the resources each pass reads and writes:
//! * A pass that reads a resource depends on the passes registered before it that write it. If no earlier pass writes
//!   it, the read is of a resource produced later in registration order and the reader depends on every writer.
//! * Consecutive writers of a resource are ordered, so the final contents are deterministic.
//! * A pass that overwrites a resource must wait for the readers of the previous contents.
//!
//! Passes never depend on themselves, even if they read and write the same resource. The barrier builder still
//! sees both accesses.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fmt::{Display, Formatter};

use anyhow::Result;
use multimap::MultiMap;
use petgraph::{Direction, Graph};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::Error;
use crate::graph::pass::Pass;

/// Kind of hazard an edge in the dependency graph protects against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
}

/// An edge in the dependency graph, from the pass that must run first to the pass that depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    /// Resource the dependency is on.
    pub resource: String,
    pub kind: DependencyKind,
}

impl Display for DependencyEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DependencyKind::ReadAfterWrite => "RAW",
            DependencyKind::WriteAfterWrite => "WAW",
            DependencyKind::WriteAfterRead => "WAR",
        };
        write!(f, "{} ({})", self.resource, kind)
    }
}

/// Directed graph over passes. Node `i` is the pass at index `i` of the slice the graph was built from.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    pub(crate) graph: Graph<String, DependencyEdge>,
}

impl DependencyGraph {
    /// Build the dependency graph over these passes, in registration order.
    pub fn build(passes: &[Pass<'_>]) -> Self {
        let mut graph = Graph::with_capacity(passes.len(), passes.len() * 2);
        for pass in passes {
            graph.add_node(pass.name.clone());
        }

        // Index writers and pure readers of every resource. Both lists are in registration order.
        let mut writers: MultiMap<&str, usize> = MultiMap::new();
        let mut readers: MultiMap<&str, usize> = MultiMap::new();
        let mut resources: Vec<&str> = Vec::new();
        for (index, pass) in passes.iter().enumerate() {
            for resource in pass.resources() {
                let name = resource.name();
                if !resources.contains(&name) {
                    resources.push(name);
                }
                if pass.is_writer(name) {
                    writers.insert(name, index);
                } else {
                    readers.insert(name, index);
                }
            }
        }

        let mut edges: HashSet<(usize, usize, DependencyEdge)> = HashSet::new();
        let mut add = |src: usize, dst: usize, resource: &str, kind: DependencyKind| {
            if src == dst {
                return;
            }
            let edge = DependencyEdge {
                resource: resource.to_owned(),
                kind,
            };
            if edges.insert((src, dst, edge.clone())) {
                graph.add_edge(NodeIndex::new(src), NodeIndex::new(dst), edge);
            }
        };

        for resource in resources {
            let resource_writers = writers.get_vec(resource).map(Vec::as_slice).unwrap_or_default();
            let resource_readers = readers.get_vec(resource).map(Vec::as_slice).unwrap_or_default();

            for pair in resource_writers.windows(2) {
                add(pair[0], pair[1], resource, DependencyKind::WriteAfterWrite);
                if passes[pair[1]].is_reader(resource) {
                    add(pair[0], pair[1], resource, DependencyKind::ReadAfterWrite);
                }
            }

            for &reader in resource_readers {
                let prior = resource_writers.iter().filter(|&&writer| writer < reader);
                if prior.clone().next().is_none() {
                    for &writer in resource_writers {
                        add(writer, reader, resource, DependencyKind::ReadAfterWrite);
                    }
                    continue;
                }
                for &writer in prior {
                    add(writer, reader, resource, DependencyKind::ReadAfterWrite);
                }
                if let Some(&next) = resource_writers.iter().find(|&&writer| writer > reader) {
                    add(reader, next, resource, DependencyKind::WriteAfterRead);
                }
            }
        }

        Self {
            graph,
        }
    }

    /// Number of passes in the graph.
    pub fn pass_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All edges as `(from, to, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, &DependencyEdge)> {
        self.graph
            .edge_references()
            .map(|edge| (edge.source().index(), edge.target().index(), edge.weight()))
    }

    fn neighbors(&self, pass: usize, direction: Direction) -> Vec<usize> {
        let mut neighbors = self
            .graph
            .neighbors_directed(NodeIndex::new(pass), direction)
            .map(|node| node.index())
            .collect::<Vec<_>>();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Passes this pass directly depends on, in ascending index order.
    pub fn predecessors(&self, pass: usize) -> Vec<usize> {
        self.neighbors(pass, Direction::Incoming)
    }

    /// Passes that directly depend on this pass, in ascending index order.
    pub fn successors(&self, pass: usize) -> Vec<usize> {
        self.neighbors(pass, Direction::Outgoing)
    }

    /// Sort the passes so every pass comes after all passes it depends on.
    /// Whenever several passes are ready, the one registered first goes first, so the result is deterministic.
    /// # Errors
    /// Fails with [`Error::GraphHasCycle`] if the dependencies form a cycle. The error names the passes on it.
    pub fn topological_sort(&self) -> Result<Vec<usize>> {
        let count = self.pass_count();
        let mut remaining = (0..count)
            .map(|pass| self.predecessors(pass).len())
            .collect::<Vec<_>>();
        let mut ready = (0..count)
            .filter(|&pass| remaining[pass] == 0)
            .map(Reverse)
            .collect::<BinaryHeap<_>>();
        let mut order = Vec::with_capacity(count);

        while let Some(Reverse(pass)) = ready.pop() {
            order.push(pass);
            for next in self.successors(pass) {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < count {
            return Err(Error::GraphHasCycle(self.find_cycle(&remaining)).into());
        }
        Ok(order)
    }

    /// Names of the passes on one cycle among the passes that could not be sorted.
    /// Every such pass still has an unsorted predecessor, so walking predecessors must revisit a pass.
    fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
        let Some(start) = remaining.iter().position(|&count| count > 0) else {
            return Vec::new();
        };
        let mut path = vec![start];
        let mut on_path = HashSet::from([start]);
        loop {
            let Some(&current) = path.last() else {
                return Vec::new();
            };
            let Some(pred) = self
                .predecessors(current)
                .into_iter()
                .find(|&pred| remaining[pred] > 0)
            else {
                return Vec::new();
            };
            if on_path.contains(&pred) {
                let first = path.iter().position(|&pass| pass == pred).unwrap_or_default();
                // The walk went against the edges.
                return path[first..]
                    .iter()
                    .rev()
                    .map(|&pass| self.graph[NodeIndex::new(pass)].clone())
                    .collect();
            }
            on_path.insert(pred);
            path.push(pred);
        }
    }

    /// Compute the dependency level of every pass, indexed by pass. A pass without dependencies is at level zero,
    /// every other pass is one level above the highest of the passes it depends on.
    /// `order` must be a topological order of the graph.
    pub fn dependency_levels(&self, order: &[usize]) -> Vec<u32> {
        let mut levels = vec![0; self.pass_count()];
        for &pass in order {
            levels[pass] = self
                .predecessors(pass)
                .into_iter()
                .map(|pred| levels[pred] + 1)
                .max()
                .unwrap_or(0);
        }
        levels
    }

    /// Find all passes whose output contributes to one of the root passes, following read-after-write edges backwards.
    /// Returns a flag per pass. Roots are always live.
    pub fn live_passes(&self, roots: &[usize]) -> Vec<bool> {
        let mut live = vec![false; self.pass_count()];
        let mut stack = roots.to_vec();
        while let Some(pass) = stack.pop() {
            if live[pass] {
                continue;
            }
            live[pass] = true;
            for edge in self
                .graph
                .edges_directed(NodeIndex::new(pass), Direction::Incoming)
            {
                if edge.weight().kind == DependencyKind::ReadAfterWrite && !live[edge.source().index()] {
                    stack.push(edge.source().index());
                }
            }
        }
        live
    }
}
