//! Markov-chain analysis over an explored [`Graph`] (spec.md §4.6): treats
//! the graph's edges as a discrete-time Markov chain, solves for the
//! steady-state occupancy of each node by power iteration, and uses that
//! occupancy to report long-run expected values for the counters declared
//! in a [`PerformanceModel`].

use crate::ast::{LabelConfig, PerformanceModel};
use crate::graph::{Graph, NodeId};
use std::collections::HashMap;

const MAX_ITERATIONS: usize = 10_000;
const CONVERGENCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Default)]
pub struct MarkovReport {
    /// Long-run fraction of time the chain spends at each node. Terminal
    /// nodes are modeled as absorbing (a self-loop of probability 1), so
    /// this still sums to 1 even over a graph with dead ends.
    pub steady_state: HashMap<NodeId, f64>,
    /// `label -> expected value`, the steady-state-weighted sum of each
    /// counter declared for edges carrying that label.
    pub expected_counters: HashMap<String, f64>,
}

/// Per-node outbound transition probabilities, derived from each edge's
/// configured `probability` (falling back to an even split of whatever
/// probability mass the explicit ones didn't claim).
fn transition_weights(graph: &Graph, model: &PerformanceModel, id: NodeId) -> Vec<(NodeId, f64)> {
    let outbound: Vec<(NodeId, &str)> = graph
        .outbound(id)
        .map(|(target, link)| (target, link.name.as_str()))
        .collect();
    if outbound.is_empty() {
        return vec![(id, 1.0)];
    }

    let explicit: Vec<Option<f64>> = outbound
        .iter()
        .map(|(_, name)| model.configs.get(*name).and_then(|cfg| cfg.probability))
        .collect();
    let claimed: f64 = explicit.iter().filter_map(|p| *p).sum();
    let unclaimed_count = explicit.iter().filter(|p| p.is_none()).count();
    let remaining = (1.0 - claimed).max(0.0);
    let even_share = if unclaimed_count > 0 {
        remaining / unclaimed_count as f64
    } else {
        0.0
    };

    outbound
        .into_iter()
        .zip(explicit)
        .map(|((target, _), p)| (target, p.unwrap_or(even_share)))
        .collect()
}

/// Power-iterate the transition matrix from a uniform start over `roots`
/// until the distribution stabilizes (spec.md §4.6).
pub fn analyze(graph: &Graph, model: &PerformanceModel, roots: &[NodeId]) -> MarkovReport {
    let node_ids: Vec<NodeId> = graph.node_indices().collect();
    if node_ids.is_empty() || roots.is_empty() {
        return MarkovReport::default();
    }

    let weights: HashMap<NodeId, Vec<(NodeId, f64)>> = node_ids
        .iter()
        .map(|&id| (id, transition_weights(graph, model, id)))
        .collect();

    let mut current: HashMap<NodeId, f64> = HashMap::new();
    let initial_mass = 1.0 / roots.len() as f64;
    for &r in roots {
        *current.entry(r).or_insert(0.0) += initial_mass;
    }

    for _ in 0..MAX_ITERATIONS {
        let mut next: HashMap<NodeId, f64> = HashMap::new();
        for (&id, &mass) in &current {
            if mass == 0.0 {
                continue;
            }
            for &(target, p) in weights.get(&id).into_iter().flatten() {
                *next.entry(target).or_insert(0.0) += mass * p;
            }
        }

        let delta: f64 = node_ids
            .iter()
            .map(|id| (next.get(id).copied().unwrap_or(0.0) - current.get(id).copied().unwrap_or(0.0)).abs())
            .sum();
        current = next;
        if delta < CONVERGENCE_EPSILON {
            break;
        }
    }

    let expected_counters = expected_counter_values(graph, model, &weights, &current);
    MarkovReport {
        steady_state: current,
        expected_counters,
    }
}

fn expected_counter_values(
    graph: &Graph,
    model: &PerformanceModel,
    weights: &HashMap<NodeId, Vec<(NodeId, f64)>>,
    steady_state: &HashMap<NodeId, f64>,
) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for (&id, edges) in weights {
        let occupancy = steady_state.get(&id).copied().unwrap_or(0.0);
        if occupancy == 0.0 {
            continue;
        }
        for (target, &(_, p)) in graph.outbound(id).zip(edges.iter()) {
            let (_, link) = target;
            let Some(config) = model.configs.get(&link.name) else {
                continue;
            };
            accumulate_counters(&mut totals, config, occupancy * p);
        }
    }
    totals
}

fn accumulate_counters(totals: &mut HashMap<String, f64>, config: &LabelConfig, flow: f64) {
    for (counter_name, counter) in &config.counters {
        *totals.entry(counter_name.clone()).or_insert(0.0) += flow * counter.numeric;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkData, NodeData};

    fn blank_node() -> NodeData {
        NodeData {
            process: None,
            action_depth: 0,
            fork_depth: 0,
            name: "n".to_string(),
            is_init: false,
            witness: Vec::new(),
            capped: false,
        }
    }

    #[test]
    fn absorbing_terminal_state_gets_all_steady_state_mass() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node());
        let b = g.add_node(blank_node());
        g.add_link(a, b, LinkData::new("step"));

        let report = analyze(&g, &PerformanceModel::default(), &[a]);
        assert!((report.steady_state.get(&b).copied().unwrap_or(0.0) - 1.0).abs() < 1e-6);
        assert!(report.steady_state.get(&a).copied().unwrap_or(0.0) < 1e-6);
    }

    #[test]
    fn even_split_over_unweighted_branches() {
        let mut g = Graph::new();
        let a = g.add_node(blank_node());
        let b = g.add_node(blank_node());
        let c = g.add_node(blank_node());
        g.add_link(a, b, LinkData::new("left"));
        g.add_link(a, c, LinkData::new("right"));

        let report = analyze(&g, &PerformanceModel::default(), &[a]);
        let pb = report.steady_state.get(&b).copied().unwrap_or(0.0);
        let pc = report.steady_state.get(&c).copied().unwrap_or(0.0);
        assert!((pb - pc).abs() < 1e-6);
        assert!((pb - 0.5).abs() < 1e-6);
    }
}
