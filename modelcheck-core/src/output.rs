//! Rendering an explored [`Graph`] to the two artifact shapes external
//! tooling consumes (spec.md §6): a Graphviz `.dot` source for visualizing
//! the state space, and a JSON failure-path report. Pure data assembly —
//! no file I/O happens in this module, callers write the returned strings.

use crate::error::ModelError;
use crate::graph::{Graph, NodeId};
use crate::process::Process;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: usize,
    pub name: String,
    pub is_init: bool,
    pub is_terminal: bool,
    pub action_depth: u32,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub from: usize,
    pub to: usize,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub kind: String,
    pub file_index: usize,
    pub invariant_index: usize,
    pub path: Vec<NodeSummary>,
}

/// A human-readable one-line state label: the heap's canonical JSON. Used
/// both for dot-node labels and for quick diffing between nodes.
pub fn state_string(process: &Process) -> String {
    process.heap.canonical_json().to_string()
}

fn node_summary(graph: &Graph, id: NodeId) -> Option<NodeSummary> {
    let data = graph.node(id)?;
    Some(NodeSummary {
        id: id.index(),
        name: data.name.clone(),
        is_init: data.is_init,
        is_terminal: graph.is_terminal(id),
        action_depth: data.action_depth,
        state: data.process.as_ref().map(state_string).unwrap_or_default(),
    })
}

pub fn node_summaries(graph: &Graph) -> Vec<NodeSummary> {
    graph.node_indices().filter_map(|id| node_summary(graph, id)).collect()
}

pub fn link_summaries(graph: &Graph) -> Vec<LinkSummary> {
    graph
        .node_indices()
        .flat_map(|id| {
            graph
                .outbound(id)
                .map(move |(target, link)| LinkSummary {
                    from: id.index(),
                    to: target.index(),
                    name: link.name.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Build a `.dot` source for the explored graph. Terminal nodes get a
/// thicker border; a node colors red if it's in `highlight` (an invariant
/// failure or deadlock), green if any of its witness bits are set (a
/// liveness witness), black otherwise — exactly the red/invariant-failure,
/// green/live-witness, black/neutral scheme spec.md §6 specifies.
pub fn to_dot(graph: &Graph, highlight: &[NodeId]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph model {{");
    let _ = writeln!(out, "  rankdir=LR;");

    for id in graph.node_indices() {
        let Some(data) = graph.node(id) else { continue };
        let color = if highlight.contains(&id) {
            "red"
        } else if data.witness.iter().flatten().any(|&w| w) {
            "green"
        } else {
            "black"
        };
        let width = if graph.is_terminal(id) { 3 } else { 1 };
        let label = data
            .process
            .as_ref()
            .map(state_string)
            .unwrap_or_else(|| data.name.clone());
        let _ = writeln!(
            out,
            "  n{} [label=\"{}\", color=\"{}\", penwidth={}];",
            id.index(),
            escape(&label),
            color,
            width
        );
    }

    for id in graph.node_indices() {
        for (target, link) in graph.outbound(id) {
            let _ = writeln!(
                out,
                "  n{} -> n{} [label=\"{}\"];",
                id.index(),
                target.index(),
                escape(&link.name)
            );
        }
    }

    let _ = writeln!(out, "}}");
    out
}

/// Per-node record of the "large graph" dump (spec.md §6.4): `to_dot`'s
/// single monolithic string doesn't scale past a few thousand nodes, so a
/// large run instead writes one row per node/link, plain `serde`-serializable
/// structs rather than real protobuf (no `.proto` schema or codegen in this
/// crate — the name matches spec.md's vocabulary for the artifact shape).
#[derive(Debug, Clone, Serialize)]
pub struct NodeProto {
    pub id: usize,
    pub name: String,
    pub is_init: bool,
    pub is_terminal: bool,
    pub action_depth: u32,
    pub fork_depth: u32,
    pub witness: Vec<Vec<bool>>,
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkProto {
    pub from: usize,
    pub to: usize,
    pub name: String,
}

/// Flatten `graph` into the per-node/per-link proto rows spec.md §6.4 calls
/// for when the graph is too large for a single `.dot` file to be useful.
pub fn to_node_link_protos(graph: &Graph) -> (Vec<NodeProto>, Vec<LinkProto>) {
    let nodes = graph
        .node_indices()
        .filter_map(|id| {
            let data = graph.node(id)?;
            Some(NodeProto {
                id: id.index(),
                name: data.name.clone(),
                is_init: data.is_init,
                is_terminal: graph.is_terminal(id),
                action_depth: data.action_depth,
                fork_depth: data.fork_depth,
                witness: data.witness.clone(),
                state: data.process.as_ref().map(state_string).unwrap_or_default(),
            })
        })
        .collect();

    let links = graph
        .node_indices()
        .flat_map(|id| {
            graph
                .outbound(id)
                .map(move |(target, link)| LinkProto {
                    from: id.index(),
                    to: target.index(),
                    name: link.name.clone(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    (nodes, links)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a [`ModelError::Assertion`]/[`ModelError::Liveness`] failure as a
/// JSON report suitable for writing to disk.
pub fn failure_report(graph: &Graph, error: &ModelError) -> Option<FailureReport> {
    match error {
        ModelError::Assertion {
            file_index,
            invariant_index,
            path,
            ..
        } => Some(FailureReport {
            kind: "safety".to_string(),
            file_index: *file_index,
            invariant_index: *invariant_index,
            path: path.iter().filter_map(|&id| node_summary(graph, id)).collect(),
        }),
        ModelError::Liveness {
            file_index,
            invariant_index,
            path,
        } => Some(FailureReport {
            kind: "liveness".to_string(),
            file_index: *file_index,
            invariant_index: *invariant_index,
            path: path.iter().filter_map(|&id| node_summary(graph, id)).collect(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkData, NodeData};

    fn blank_node(name: &str, is_init: bool) -> NodeData {
        NodeData {
            process: None,
            action_depth: 0,
            fork_depth: 0,
            name: name.to_string(),
            is_init,
            witness: Vec::new(),
            capped: false,
        }
    }

    #[test]
    fn dot_output_includes_every_node_and_edge() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node("init", true));
        let b = g.add_node(blank_node("Incr", false));
        g.add_link(a, b, LinkData::new("Incr"));

        let dot = to_dot(&g, &[]);
        assert!(dot.contains("digraph model"));
        assert!(dot.contains(&format!("n{}", a.index())));
        assert!(dot.contains(&format!("n{} -> n{}", a.index(), b.index())));
    }

    #[test]
    fn highlighted_node_renders_red() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node("init", true));
        let dot = to_dot(&g, &[a]);
        assert!(dot.contains("color=\"red\""));
    }

    #[test]
    fn witnessed_node_renders_green_and_others_black() {
        let mut g = Graph::new();
        let mut a = blank_node("init", true);
        a.witness = vec![vec![true]];
        let a = g.add_node(a);
        let b = g.add_node(blank_node("other", false));
        g.add_link(a, b, LinkData::new("step"));

        let dot = to_dot(&g, &[]);
        assert!(dot.contains(&format!("n{} [label=\"init\", color=\"green\"", a.index())));
        assert!(dot.contains(&format!("n{} [label=\"other\", color=\"black\"", b.index())));
    }

    #[test]
    fn node_link_protos_cover_every_node_and_edge() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node("init", true));
        let b = g.add_node(blank_node("Incr", false));
        g.add_link(a, b, LinkData::new("Incr"));

        let (nodes, links) = to_node_link_protos(&g);
        assert_eq!(nodes.len(), 2);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].from, a.index());
        assert_eq!(links[0].to, b.index());
    }
}
