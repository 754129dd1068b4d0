//! Breadth-first exploration driver (spec.md §4.4): seeds the initial
//! state from `[States]`, then repeatedly expands the BFS frontier by
//! either resuming an in-flight thread or, once a state is fully idle,
//! trying every action as the next nondeterministic step. Structural
//! duplicates are merged into the existing graph node rather than
//! re-expanded.

use crate::ast::{ExplorationOptions, File, Flow, LivenessMode};
use crate::env::Env;
use crate::error::ModelError;
use crate::evaluator::Evaluator;
use crate::graph::{Graph, LinkData, NodeData, NodeId};
use crate::liveness;
use crate::process::Process;
use crate::thread::{self, Thread};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// The result of a completed exploration run.
#[derive(Debug, Default)]
pub struct ModelCheckReport {
    pub nodes_visited: usize,
    pub edges: usize,
    pub safety_failures: Vec<ModelError>,
    pub liveness_failures: Vec<ModelError>,
    pub deadlocks: Vec<NodeId>,
    pub graph: Graph,
}

pub struct ModelChecker {
    files: Arc<Vec<File>>,
    evaluator: Arc<dyn Evaluator>,
    options: ExplorationOptions,
    liveness_mode: LivenessMode,
}

/// Structural identity used by the visited table (spec.md §3): hash,
/// current-thread hash, and the sorted thread-hash multiset must all agree.
type VisitKey = ([u8; 32], [u8; 32], Vec<[u8; 32]>);

impl ModelChecker {
    pub fn new(
        files: Vec<File>,
        evaluator: Arc<dyn Evaluator>,
        options: ExplorationOptions,
        liveness_mode: LivenessMode,
    ) -> Self {
        Self {
            files: Arc::new(files),
            evaluator,
            options,
            liveness_mode,
        }
    }

    /// Run exploration to completion (or until `max_nodes` is hit) and
    /// report safety/liveness/deadlock findings.
    pub fn run(&self) -> Result<ModelCheckReport, ModelError> {
        let mut graph = Graph::new();
        let mut visited: HashMap<VisitKey, NodeId> = HashMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let mut safety_failures = Vec::new();

        let init = self.initial_process()?;
        let witness = liveness::evaluate_all(&self.files, self.evaluator.as_ref(), &init)?;
        let mut init_process = init;
        init_process.witness = witness.clone();
        let init_key = init_process.structural_key();
        let init_id = graph.add_node(NodeData {
            process: Some(init_process),
            action_depth: 0,
            fork_depth: 0,
            name: "init".to_string(),
            is_init: true,
            witness,
            capped: false,
        });
        visited.insert(init_key, init_id);
        queue.push_back(init_id);

        while let Some(id) = queue.pop_front() {
            if let Some(max_nodes) = self.options.max_nodes {
                if graph.node_count() as u64 >= max_nodes {
                    warn!(max_nodes, "stopped exploration: max_nodes reached");
                    break;
                }
            }
            self.expand(&mut graph, &mut visited, &mut queue, &mut safety_failures, id)?;
        }

        let mut liveness_failures = Vec::new();
        if self.liveness_mode != LivenessMode::Off {
            for (file_index, file) in self.files.iter().enumerate() {
                liveness_failures.extend(liveness::check_liveness_for_file(
                    &graph,
                    file_index,
                    file,
                    self.liveness_mode,
                ));
            }
        }
        let deadlocks = liveness::find_deadlocks(&graph);

        Ok(ModelCheckReport {
            nodes_visited: graph.node_count(),
            edges: graph.edge_count(),
            safety_failures,
            liveness_failures,
            deadlocks,
            graph,
        })
    }

    fn initial_process(&self) -> Result<Process, ModelError> {
        let mut process = Process::new("init", Arc::clone(&self.files), Arc::clone(&self.evaluator));
        let states: Vec<_> = self
            .files
            .iter()
            .flat_map(|f| f.states.iter().cloned())
            .collect();
        let globals: Env = self.evaluator.exec_init(&states)?;
        process.heap.init(globals);
        Ok(process)
    }

    /// Expand one BFS frontier node: continue an in-flight thread if one
    /// exists, otherwise try every action as a fresh, independent choice.
    /// Every fork `thread::execute` produces is materialized as its own
    /// graph node (spec.md §4.4) rather than driven to its eventual yield
    /// in memory — a `ONEOF`/`PARALLEL` fork point is itself an observable
    /// state the visited table must dedup against.
    fn expand(
        &self,
        graph: &mut Graph,
        visited: &mut HashMap<VisitKey, NodeId>,
        queue: &mut VecDeque<NodeId>,
        safety_failures: &mut Vec<ModelError>,
        id: NodeId,
    ) -> Result<(), ModelError> {
        let (base, action_depth, fork_depth, is_init) = {
            let data = graph
                .node(id)
                .ok_or_else(|| ModelError::Config("dangling node id in BFS queue".to_string()))?;
            let process = data
                .process
                .clone()
                .ok_or_else(|| ModelError::Config("frontier node has no process snapshot".to_string()))?;
            (process, data.action_depth, data.fork_depth, data.is_init)
        };

        if let Some(thread_idx) = base.threads.iter().position(|t| !t.is_idle()) {
            let mut fork = base.fork();
            let outcome = thread::execute(&mut fork, thread_idx)?;
            return self.dispatch_outcome(
                graph,
                visited,
                queue,
                safety_failures,
                id,
                fork,
                outcome,
                action_depth,
                fork_depth,
                "yield",
            );
        }

        if action_depth >= self.options.max_actions {
            if let Some(data) = graph.node_mut(id) {
                data.capped = true;
            }
            return Ok(());
        }

        // spec.md §4.4's Init special case: only file₀'s actions are tried
        // from the initial state, not every file's.
        let file_count = if is_init { self.files.len().min(1) } else { self.files.len() };
        for file_index in 0..file_count {
            let action_count = self.files[file_index].actions.len();
            for action_index in 0..action_count {
                let name = self.files[file_index].actions[action_index].name.clone();
                let mut fork = base.fork();
                fork.threads.push(Thread::with_entry(
                    file_index,
                    format!("Actions[{action_index}]"),
                    Flow::Atomic,
                ));
                let thread_idx = fork.threads.len() - 1;
                let outcome = thread::execute(&mut fork, thread_idx)?;
                self.dispatch_outcome(
                    graph,
                    visited,
                    queue,
                    safety_failures,
                    id,
                    fork,
                    outcome,
                    action_depth + 1,
                    0,
                    &name,
                )?;
            }
        }
        Ok(())
    }

    /// Route one `thread::execute` outcome to the graph: a plain yield
    /// updates `base` in place and records it; forks (yielded or not) are
    /// each materialized as their own `fork_depth + 1` child, invariant
    /// checking only the ones that actually yielded (spec.md §4.4: "if
    /// yielded, check invariants").
    #[allow(clippy::too_many_arguments)]
    fn dispatch_outcome(
        &self,
        graph: &mut Graph,
        visited: &mut HashMap<VisitKey, NodeId>,
        queue: &mut VecDeque<NodeId>,
        safety_failures: &mut Vec<ModelError>,
        parent: NodeId,
        base: Process,
        outcome: thread::ExecOutcome,
        action_depth: u32,
        parent_fork_depth: u32,
        link_name: &str,
    ) -> Result<(), ModelError> {
        if outcome.forks.is_empty() {
            return self.record_child(
                graph,
                visited,
                queue,
                safety_failures,
                parent,
                base,
                link_name,
                action_depth,
                parent_fork_depth,
            );
        }

        let child_fork_depth = parent_fork_depth + 1;
        let yielded = outcome.yielded;
        for forked in outcome.forks {
            if yielded {
                self.record_child(
                    graph,
                    visited,
                    queue,
                    safety_failures,
                    parent,
                    forked,
                    link_name,
                    action_depth,
                    child_fork_depth,
                )?;
            } else {
                self.record_fork_child(graph, visited, queue, parent, forked, action_depth, child_fork_depth)?;
            }
        }
        Ok(())
    }

    /// Record a fork child that has not itself yielded: a nondeterministic
    /// choice point in flight (spec.md §4.4). Not invariant-checked — safety
    /// and witness evaluation only happen at yielded states.
    fn record_fork_child(
        &self,
        graph: &mut Graph,
        visited: &mut HashMap<VisitKey, NodeId>,
        queue: &mut VecDeque<NodeId>,
        parent: NodeId,
        state: Process,
        action_depth: u32,
        fork_depth: u32,
    ) -> Result<(), ModelError> {
        let key = state.structural_key();
        if let Some(&existing_id) = visited.get(&key) {
            graph.add_link(parent, existing_id, LinkData::new("fork"));
            return Ok(());
        }

        let witness = empty_witness(&self.files);
        let node_id = graph.add_node(NodeData {
            process: Some(state),
            action_depth,
            fork_depth,
            name: "fork".to_string(),
            is_init: false,
            witness,
            capped: false,
        });
        visited.insert(key, node_id);
        graph.add_link(parent, node_id, LinkData::new("fork"));
        queue.push_back(node_id);
        debug!(node = ?node_id, "discovered fork state");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record_child(
        &self,
        graph: &mut Graph,
        visited: &mut HashMap<VisitKey, NodeId>,
        queue: &mut VecDeque<NodeId>,
        safety_failures: &mut Vec<ModelError>,
        parent: NodeId,
        mut state: Process,
        link_name: &str,
        action_depth: u32,
        fork_depth: u32,
    ) -> Result<(), ModelError> {
        let fresh = liveness::evaluate_all(&self.files, self.evaluator.as_ref(), &state)?;
        // spec.md §4.5: only an `eventually`-flavored invariant observed
        // while every thread is idle counts as a witness — a transient,
        // still-in-flight state must not mark liveness satisfied.
        let idle = state.all_idle();
        for (file_index, per_file) in fresh.iter().enumerate() {
            for (inv_index, &satisfied) in per_file.iter().enumerate() {
                if satisfied && idle && self.files[file_index].invariants[inv_index].eventually {
                    state.witness[file_index][inv_index] = true;
                }
            }
        }

        let key = state.structural_key();
        if let Some(&existing_id) = visited.get(&key) {
            if let Some(data) = graph.node_mut(existing_id) {
                for (file_index, per_file) in state.witness.iter().enumerate() {
                    for (inv_index, &satisfied) in per_file.iter().enumerate() {
                        if satisfied {
                            if let Some(slot) = data
                                .witness
                                .get_mut(file_index)
                                .and_then(|v| v.get_mut(inv_index))
                            {
                                *slot = true;
                            }
                        }
                    }
                }
            }
            graph.add_link(parent, existing_id, LinkData::new(link_name));
            return Ok(());
        }

        if !self.options.ignore_invariant_failures {
            if let Some((file_index, invariant_index)) = liveness::first_safety_violation(&self.files, &fresh) {
                let path = vec![parent];
                let err = ModelError::Assertion {
                    file_index,
                    invariant_index,
                    node: parent,
                    path,
                };
                safety_failures.push(err);
                if !self.options.continue_on_invariant_failure {
                    return Ok(());
                }
            }
        }

        let witness = state.witness.clone();
        let crash_base = if self.options.emit_crash_forks && !state.threads.is_empty() {
            Some(state.fork())
        } else {
            None
        };
        let node_id = graph.add_node(NodeData {
            process: Some(state),
            action_depth,
            fork_depth,
            name: link_name.to_string(),
            is_init: false,
            witness,
            capped: false,
        });
        visited.insert(key, node_id);
        graph.add_link(parent, node_id, LinkData::new(link_name));
        queue.push_back(node_id);
        debug!(node = ?node_id, link = link_name, "discovered state");

        if let Some(mut crashed) = crash_base {
            crashed.threads.clear();
            self.record_child(
                graph,
                visited,
                queue,
                safety_failures,
                node_id,
                crashed,
                "crash",
                action_depth,
                fork_depth + 1,
            )?;
        }
        Ok(())
    }
}

fn empty_witness(files: &[File]) -> Vec<Vec<bool>> {
    files.iter().map(|f| vec![false; f.invariants.len()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Action, Block, File, PyStmt, Statement};
    use crate::evaluator::arith::ArithEvaluator;

    fn counter_file() -> File {
        File {
            states: vec![crate::ast::StateDecl {
                name: "count".to_string(),
                py_expr: "0".to_string(),
            }],
            actions: vec![Action {
                name: "Incr".to_string(),
                block: Block {
                    flow: Flow::Atomic,
                    stmts: vec![Statement::PyStmt(PyStmt {
                        code: "count = count + 1".to_string(),
                    })],
                },
            }],
            functions: vec![],
            invariants: vec![],
        }
    }

    #[test]
    fn atomic_counter_visits_two_states() {
        let mut options = ExplorationOptions::default();
        options.max_actions = 1;
        options.emit_crash_forks = false;
        let checker = ModelChecker::new(
            vec![counter_file()],
            Arc::new(ArithEvaluator),
            options,
            LivenessMode::Off,
        );
        let report = checker.run().expect("exploration succeeds");
        assert_eq!(report.nodes_visited, 2);
        assert!(report.safety_failures.is_empty());
    }
}
