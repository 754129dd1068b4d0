//! The explored state-space graph (spec.md §3, §9).
//!
//! Nodes live in a [`petgraph::stable_graph::StableDiGraph`] arena rather
//! than behind owning `Rc`/back-reference pointers — a [`NodeId`] is a
//! cheap, copyable index, matching the Design Notes' "arena-of-indices"
//! guidance. `inbound`/`outbound` are graph queries rather than stored
//! fields, since petgraph already keeps an adjacency index.

use crate::ast::Fairness;
use crate::process::Process;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

pub type NodeId = petgraph::stable_graph::NodeIndex;

/// Payload attached to each explored state.
#[derive(Debug, Clone)]
pub struct NodeData {
    /// `None` only for a synthetic node an adapter constructs directly
    /// (e.g. the blank fixtures this module's own tests use); the processor
    /// itself never produces one — a duplicate state reuses the existing
    /// [`NodeId`] found in the visited table instead of minting a
    /// pass-through node that would need a later removal pass.
    pub process: Option<Process>,
    pub action_depth: u32,
    pub fork_depth: u32,
    pub name: String,
    pub is_init: bool,
    /// `witness[file_index][invariant_index]`, copied from the originating
    /// `Process` at the moment the node is created (spec.md §4.5).
    pub witness: Vec<Vec<bool>>,
    /// `true` if exploration stopped at this node only because
    /// `max_actions`/`max_nodes` was reached, not because no action was
    /// available — a terminal node with this set is never a deadlock.
    pub capped: bool,
}

impl NodeData {
    pub fn is_terminal_for(&self, graph: &Graph, id: NodeId) -> bool {
        graph.outbound(id).next().is_none()
    }
}

/// Payload attached to each transition edge.
#[derive(Debug, Clone)]
pub struct LinkData {
    /// Name of the action (or `"yield"`/`"crash"`) that produced this edge.
    pub name: String,
    pub labels: Vec<String>,
    pub fairness: Fairness,
}

impl LinkData {
    pub fn new(name: impl Into<String>) -> Self {
        LinkData {
            name: name.into(),
            labels: Vec::new(),
            fairness: Fairness::None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    inner: StableDiGraph<NodeData, LinkData>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            inner: StableDiGraph::new(),
        }
    }

    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        self.inner.add_node(data)
    }

    pub fn add_link(&mut self, from: NodeId, to: NodeId, data: LinkData) {
        self.inner.add_edge(from, to, data);
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.inner.node_weight(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.inner.node_weight_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inner.node_indices()
    }

    pub fn outbound(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &LinkData)> {
        self.inner
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
    }

    pub fn inbound(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &LinkData)> {
        self.inner
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
    }

    pub fn is_terminal(&self, id: NodeId) -> bool {
        self.outbound(id).next().is_none()
    }

    pub fn has_strongly_fair_outbound(&self, id: NodeId) -> bool {
        self.outbound(id)
            .any(|(_, link)| link.fairness == Fairness::Strong)
    }

    /// Tarjan's algorithm, delegated to petgraph. Used by liveness checking
    /// to find terminal cycles a fairness-respecting scheduler could get
    /// stuck in forever (spec.md §4.5).
    pub fn strongly_connected_components(&self) -> Vec<Vec<NodeId>> {
        petgraph::algo::tarjan_scc(&self.inner)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_node(name: &str) -> NodeData {
        NodeData {
            process: None,
            action_depth: 0,
            fork_depth: 0,
            name: name.to_string(),
            is_init: false,
            witness: Vec::new(),
            capped: false,
        }
    }

    #[test]
    fn outbound_and_inbound_agree_on_a_single_edge() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node("a"));
        let b = g.add_node(blank_node("b"));
        g.add_link(a, b, LinkData::new("step"));

        let targets: Vec<NodeId> = g.outbound(a).map(|(t, _)| t).collect();
        assert_eq!(targets, vec![b]);
        let sources: Vec<NodeId> = g.inbound(b).map(|(s, _)| s).collect();
        assert_eq!(sources, vec![a]);
    }
}
