//! Graph view over a wire map, for diagnostics and tooling.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use modwire_core::wire::WireMap;
use modwire_core::world::{ResourceId, World};

/// A resolved module in the graph.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct WireNode {
    pub resource: ResourceId,
    pub label: String,
}

/// Edge label: the namespace of the wired requirement.
#[derive(Debug, Clone)]
pub struct WireEdge {
    pub namespace: String,
}

/// A resolution result rendered as a petgraph `DiGraph`, one node per
/// resource, one edge per wire.
pub struct WireGraph {
    graph: DiGraph<WireNode, WireEdge>,
    index: HashMap<ResourceId, NodeIndex>,
}

impl WireGraph {
    pub fn from_wire_map(world: &World, wire_map: &WireMap) -> Self {
        let mut g = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };
        let mut resources: Vec<ResourceId> = wire_map.keys().copied().collect();
        resources.sort();
        for resource in resources {
            let from = g.add_node(world, resource);
            let mut wires = wire_map[&resource].clone();
            wires.sort_by_key(|w| (w.provider, w.capability));
            for wire in wires {
                let to = g.add_node(world, wire.provider);
                if !g.graph.edges(from).any(|e| e.target() == to) {
                    g.graph.add_edge(
                        from,
                        to,
                        WireEdge {
                            namespace: world.requirement(wire.requirement).namespace.clone(),
                        },
                    );
                }
            }
        }
        g
    }

    fn add_node(&mut self, world: &World, resource: ResourceId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&resource) {
            return idx;
        }
        let idx = self.graph.add_node(WireNode {
            resource,
            label: world.resource(resource).to_string(),
        });
        self.index.insert(resource, idx);
        idx
    }

    pub fn find(&self, resource: ResourceId) -> Option<NodeIndex> {
        self.index.get(&resource).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &WireNode {
        &self.graph[idx]
    }

    /// Direct providers of a resource.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Who is wired to a resource.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Print the provider tree below one resource.
    pub fn print_tree(&self, root: ResourceId, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(root) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx].label));
        let mut visited = HashSet::new();
        visited.insert(idx);
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(&mut output, *child, "", is_last, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx].label));

        if let Some(max) = max_depth {
            if depth >= max {
                return;
            }
        }
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, _)) in deps.iter().enumerate() {
            let is_last = i == count - 1;
            self.print_subtree(
                output,
                *child,
                &child_prefix,
                is_last,
                depth + 1,
                max_depth,
                visited,
            );
        }
        visited.remove(&idx);
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
