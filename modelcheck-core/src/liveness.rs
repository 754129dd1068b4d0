//! Safety and liveness analysis over an already-explored [`Graph`] (spec.md
//! §4.5). Safety is checked incrementally as nodes are discovered
//! ([`check_safety`]); liveness and deadlock detection run once exploration
//! is complete, since both need the full reachable graph.

use crate::ast::{Fairness, File, Invariant, LivenessMode};
use crate::env::Env;
use crate::error::ModelError;
use crate::evaluator::Evaluator;
use crate::graph::{Graph, NodeId};
use crate::process::Process;
use std::collections::{HashSet, VecDeque};

/// `env` visible to an invariant predicate: heap state plus the last
/// function-call return value, mirroring what a `PyStmt` sees (spec.md §4.3).
fn invariant_env(process: &Process) -> Env {
    let mut env = process.heap.as_env().deep_clone();
    env.merge(&process.returns);
    env
}

/// Evaluate one invariant's predicate against `process`'s current state
/// (spec.md §4.5). A temporal wrapper (`nested` set, no source of its own)
/// defers entirely to the wrapped invariant. An assertion-style invariant
/// (`block` set) is compiled as `{py_code}\n__retval__ = {name}()\n` and run
/// through `exec_stmt`, reading the result back out of the mutated env,
/// exactly like a `PyStmt` would — a plain `py_expr` invariant is evaluated
/// directly. Invariants with no source at all are vacuously true.
pub fn eval_invariant_now(
    inv: &Invariant,
    file_index: usize,
    evaluator: &dyn Evaluator,
    process: &Process,
) -> Result<bool, ModelError> {
    if let Some(nested) = &inv.nested {
        return eval_invariant_now(nested, file_index, evaluator, process);
    }

    let filename = format!("file{file_index}");
    let env = invariant_env(process);

    if inv.block.is_some() {
        let code = inv.py_code.as_deref().ok_or_else(|| {
            ModelError::Config(format!(
                "invariant `{}` declares a block but no py_code to compile",
                inv.name
            ))
        })?;
        let source = format!("{code}\n__retval__ = {}()\n", inv.name);
        let env_out = evaluator.exec_stmt(&filename, &source, &env)?;
        let value = env_out.get("__retval__").ok_or_else(|| {
            ModelError::Config(format!(
                "assertion-style invariant `{}` did not set __retval__",
                inv.name
            ))
        })?;
        return Ok(value.truthy());
    }

    let Some(source) = inv.py_expr.as_deref() else {
        return Ok(true);
    };
    let value = evaluator.eval_expr(&filename, source, &env)?;
    Ok(value.truthy())
}

/// Evaluate every invariant of every file against `process`'s current
/// state. Returns `witness[file_index][invariant_index]`.
pub fn evaluate_all(
    files: &[File],
    evaluator: &dyn Evaluator,
    process: &Process,
) -> Result<Vec<Vec<bool>>, ModelError> {
    files
        .iter()
        .enumerate()
        .map(|(file_index, file)| {
            file.invariants
                .iter()
                .map(|inv| eval_invariant_now(inv, file_index, evaluator, process))
                .collect::<Result<Vec<bool>, ModelError>>()
        })
        .collect()
}

/// First `always` invariant currently violated, if any (spec.md §4.5,
/// "Invariant & liveness" safety check — checked at every node as it's
/// discovered, not deferred to the end of exploration).
pub fn first_safety_violation(files: &[File], satisfied: &[Vec<bool>]) -> Option<(usize, usize)> {
    for (file_index, file) in files.iter().enumerate() {
        for (inv_index, inv) in file.invariants.iter().enumerate() {
            if inv.always && !inv.is_eventually_always() {
                let ok = satisfied
                    .get(file_index)
                    .and_then(|v| v.get(inv_index))
                    .copied()
                    .unwrap_or(true);
                if !ok {
                    return Some((file_index, inv_index));
                }
            }
        }
    }
    None
}

/// A node with no outbound edges whose process never actually reached
/// termination (it still has unfinished threads) — exploration stopped
/// there only because nothing could legally continue it, which is a
/// deadlock rather than a clean stop (spec.md §4.5).
pub fn find_deadlocks(graph: &Graph) -> Vec<NodeId> {
    graph
        .node_indices()
        .filter(|&id| {
            graph.is_terminal(id)
                && graph
                    .node(id)
                    .map(|n| {
                        !n.capped
                            && !n
                                .process
                                .as_ref()
                                .map(Process::is_terminal)
                                .unwrap_or(true)
                    })
                    .unwrap_or(false)
        })
        .collect()
}

/// Strict (cycle-based) always-eventually liveness check for one invariant
/// (spec.md §4.5, fixed `CheckStrictLiveness`): a terminal cycle — no
/// strongly-fair edge lets a scheduler escape it — in which the invariant's
/// witness is never set anywhere in the cycle is a counterexample. Returns
/// the offending cycle if found.
pub fn check_always_eventually(
    graph: &Graph,
    file_index: usize,
    invariant_index: usize,
) -> Option<Vec<NodeId>> {
    for scc in graph.strongly_connected_components() {
        let is_cycle = scc.len() > 1
            || scc
                .first()
                .map(|&n| graph.outbound(n).any(|(t, _)| t == n))
                .unwrap_or(false);
        if !is_cycle {
            continue;
        }

        let witnessed = scc.iter().any(|&n| {
            graph
                .node(n)
                .and_then(|d| d.witness.get(file_index))
                .and_then(|v| v.get(invariant_index))
                .copied()
                .unwrap_or(false)
        });
        if witnessed {
            continue;
        }

        let escapable_under_fairness = scc.iter().any(|&n| {
            graph
                .outbound(n)
                .any(|(t, link)| link.fairness == Fairness::Strong && !scc.contains(&t))
        });
        if escapable_under_fairness {
            continue;
        }

        return Some(scc);
    }
    None
}

fn is_cycle(graph: &Graph, scc: &[NodeId]) -> bool {
    scc.len() > 1
        || scc
            .first()
            .map(|&n| graph.outbound(n).any(|(t, _)| t == n))
            .unwrap_or(false)
}

/// Walk `scc` (already known to be a cycle) looking for an explicit,
/// edge-followable path that revisits its own start — spec.md §4.5's
/// general "DFS or BFS that, upon revisiting a node already on the current
/// path, invokes the callback with that path slice". `use_bfs` selects the
/// traversal strategy, distinguishing [`LivenessMode::Strict`] (DFS) from
/// [`LivenessMode::StrictBfs`] (BFS); both explore only edges staying inside
/// `scc` so the returned path is itself a legal cycle.
fn find_cycle_path(graph: &Graph, scc: &[NodeId], use_bfs: bool) -> Option<Vec<NodeId>> {
    let start = *scc.first()?;
    let in_scc: HashSet<NodeId> = scc.iter().copied().collect();
    if graph.outbound(start).any(|(t, _)| t == start) {
        return Some(vec![start]);
    }

    if use_bfs {
        let mut queue: VecDeque<Vec<NodeId>> = VecDeque::new();
        queue.push_back(vec![start]);
        while let Some(path) = queue.pop_front() {
            let last = *path.last().expect("path is never empty");
            for (next, _) in graph.outbound(last) {
                if !in_scc.contains(&next) {
                    continue;
                }
                if next == start {
                    return Some(path);
                }
                if path.contains(&next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(next);
                queue.push_back(extended);
            }
        }
        None
    } else {
        let mut path = vec![start];
        let mut on_path: HashSet<NodeId> = HashSet::from([start]);
        dfs_cycle(graph, &in_scc, start, &mut path, &mut on_path)
    }
}

fn dfs_cycle(
    graph: &Graph,
    in_scc: &HashSet<NodeId>,
    node: NodeId,
    path: &mut Vec<NodeId>,
    on_path: &mut HashSet<NodeId>,
) -> Option<Vec<NodeId>> {
    let start = path[0];
    let neighbors: Vec<NodeId> = graph.outbound(node).map(|(t, _)| t).collect();
    for next in neighbors {
        if !in_scc.contains(&next) {
            continue;
        }
        if next == start && path.len() > 1 {
            return Some(path.clone());
        }
        if on_path.contains(&next) {
            continue;
        }
        path.push(next);
        on_path.insert(next);
        if let Some(found) = dfs_cycle(graph, in_scc, next, path, on_path) {
            return Some(found);
        }
        path.pop();
        on_path.remove(&next);
    }
    None
}

/// General (`Strict`/`StrictBfs`) "eventually-always" liveness check (spec.md
/// §4.5): `Predicate(node) = (relevant = all threads idle, value =
/// witness[i][j])`; a cycle is bad iff *any* node on it is relevant and
/// value-false — unlike `check_always_eventually`'s "no node is
/// relevant+true", since "eventually always p" demands p hold at every
/// stable state from some point on, not merely infinitely often.
pub fn check_eventually_always(
    graph: &Graph,
    file_index: usize,
    invariant_index: usize,
    use_bfs: bool,
) -> Option<Vec<NodeId>> {
    for scc in graph.strongly_connected_components() {
        if !is_cycle(graph, &scc) {
            continue;
        }
        let bad = scc.iter().any(|&n| {
            let Some(data) = graph.node(n) else { return false };
            let relevant = data.process.as_ref().map(Process::all_idle).unwrap_or(true);
            if !relevant {
                return false;
            }
            let value = data
                .witness
                .get(file_index)
                .and_then(|v| v.get(invariant_index))
                .copied()
                .unwrap_or(false);
            !value
        });
        if !bad {
            continue;
        }
        return Some(find_cycle_path(graph, &scc, use_bfs).unwrap_or(scc));
    }
    None
}

/// Check every liveness-flavored invariant of `file` against the
/// fully-explored `graph`: `always-eventually` invariants (and any bare
/// `eventually` one, which the fairness-aware method also handles) go
/// through the fast SCC-based [`check_always_eventually`]; `eventually-
/// always` invariants go through the general, mode-selected
/// [`check_eventually_always`] (spec.md §4.5 gives no fast-path shortcut for
/// that temporal shape, so `mode` picks DFS vs BFS there).
pub fn check_liveness_for_file(
    graph: &Graph,
    file_index: usize,
    file: &File,
    mode: LivenessMode,
) -> Vec<ModelError> {
    let mut errors = Vec::new();
    let use_bfs = mode == LivenessMode::StrictBfs;
    for (invariant_index, inv) in file.invariants.iter().enumerate() {
        if inv.eventually || inv.is_always_eventually() {
            if let Some(path) = check_always_eventually(graph, file_index, invariant_index) {
                errors.push(ModelError::Liveness {
                    file_index,
                    invariant_index,
                    path,
                });
            }
        }
        if inv.is_eventually_always() {
            if let Some(path) = check_eventually_always(graph, file_index, invariant_index, use_bfs) {
                errors.push(ModelError::Liveness {
                    file_index,
                    invariant_index,
                    path,
                });
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkData, NodeData};

    fn node(witness: Vec<Vec<bool>>) -> NodeData {
        NodeData {
            process: None,
            action_depth: 0,
            fork_depth: 0,
            name: "n".to_string(),
            is_init: false,
            witness,
            capped: false,
        }
    }

    #[test]
    fn detects_witness_free_cycle() {
        let mut g = Graph::new();
        let a = g.add_node(node(vec![vec![false]]));
        let b = g.add_node(node(vec![vec![false]]));
        g.add_link(a, b, LinkData::new("step"));
        g.add_link(b, a, LinkData::new("step"));

        let cycle = check_always_eventually(&g, 0, 0);
        assert!(cycle.is_some());
    }

    #[test]
    fn witnessed_cycle_is_not_a_violation() {
        let mut g = Graph::new();
        let a = g.add_node(node(vec![vec![true]]));
        let b = g.add_node(node(vec![vec![false]]));
        g.add_link(a, b, LinkData::new("step"));
        g.add_link(b, a, LinkData::new("step"));

        assert!(check_always_eventually(&g, 0, 0).is_none());
    }

    #[test]
    fn eventually_always_flags_a_cycle_that_revisits_a_false_node() {
        let mut g = Graph::new();
        let a = g.add_node(node(vec![vec![true]]));
        let b = g.add_node(node(vec![vec![false]]));
        g.add_link(a, b, LinkData::new("step"));
        g.add_link(b, a, LinkData::new("step"));

        assert!(check_eventually_always(&g, 0, 0, false).is_some());
        assert!(check_eventually_always(&g, 0, 0, true).is_some());
    }

    #[test]
    fn eventually_always_clears_a_cycle_that_is_always_true() {
        let mut g = Graph::new();
        let a = g.add_node(node(vec![vec![true]]));
        let b = g.add_node(node(vec![vec![true]]));
        g.add_link(a, b, LinkData::new("step"));
        g.add_link(b, a, LinkData::new("step"));

        assert!(check_eventually_always(&g, 0, 0, false).is_none());
    }

    #[test]
    fn strongly_fair_escape_clears_the_cycle() {
        let mut g = Graph::new();
        let a = g.add_node(node(vec![vec![false]]));
        let b = g.add_node(node(vec![vec![false]]));
        let exit = g.add_node(node(vec![vec![true]]));
        g.add_link(a, b, LinkData::new("step"));
        let mut fair_exit = LinkData::new("heads");
        fair_exit.fairness = Fairness::Strong;
        g.add_link(b, exit, fair_exit);
        g.add_link(b, a, LinkData::new("tails"));

        assert!(check_always_eventually(&g, 0, 0).is_none());
    }
}
