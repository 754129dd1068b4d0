//! `Process` — a heap, an ordered thread set, and the bookkeeping a single
//! exploration point needs: invariant witnesses, a shared evaluator, the
//! return-value env, and the per-file failed-invariant index (spec.md §3).

use crate::ast::File;
use crate::env::Env;
use crate::evaluator::Evaluator;
use crate::heap::Heap;
use crate::thread::Thread;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct Process {
    pub name: String,
    pub heap: Heap,
    pub threads: Vec<Thread>,
    /// Index into `threads` of the thread currently being stepped.
    pub current: usize,
    pub files: Arc<Vec<File>>,
    pub evaluator: Arc<dyn Evaluator>,
    pub returns: Env,
    /// `witness[file_index][invariant_index]`.
    pub witness: Vec<Vec<bool>>,
    pub labels: Vec<String>,
    pub failed_invariants: BTreeMap<usize, Vec<usize>>,
    pub symbol_table: Env,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("threads", &self.threads.len())
            .field("current", &self.current)
            .field("labels", &self.labels)
            .finish()
    }
}

impl Process {
    pub fn new(name: impl Into<String>, files: Arc<Vec<File>>, evaluator: Arc<dyn Evaluator>) -> Self {
        let witness = files
            .iter()
            .map(|f| vec![false; f.invariants.len()])
            .collect();
        Process {
            name: name.into(),
            heap: Heap::new(),
            threads: Vec::new(),
            current: 0,
            files,
            evaluator,
            returns: Env::new(),
            witness,
            labels: Vec::new(),
            failed_invariants: BTreeMap::new(),
            symbol_table: Env::new(),
        }
    }

    pub fn current_thread(&self) -> Option<&Thread> {
        self.threads.get(self.current)
    }

    pub fn current_thread_mut(&mut self) -> Option<&mut Thread> {
        self.threads.get_mut(self.current)
    }

    pub fn is_terminal(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn all_idle(&self) -> bool {
        self.threads.iter().all(Thread::is_idle)
    }

    /// A deep, independent snapshot: every `Value`-bearing structure is
    /// cloned so mutating the fork never aliases `self` (spec.md §3
    /// "Lifecycles"). `files` and `evaluator` are shared `Arc`s — the AST is
    /// read-only input and the evaluator is required to behave as a pure
    /// function of `(code, env)` (spec.md §5), so neither needs cloning.
    pub fn fork(&self) -> Process {
        Process {
            name: self.name.clone(),
            heap: self.heap.deep_clone(),
            threads: self.threads.iter().map(Thread::deep_clone).collect(),
            current: self.current,
            files: Arc::clone(&self.files),
            evaluator: Arc::clone(&self.evaluator),
            returns: self.returns.deep_clone(),
            witness: self.witness.clone(),
            labels: self.labels.clone(),
            failed_invariants: self.failed_invariants.clone(),
            symbol_table: self.symbol_table.deep_clone(),
        }
    }

    /// sha-256 of `hash(current thread) ‖ sorted thread hashes ‖
    /// JSON(returns) ‖ heap hash` (spec.md §3).
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.current_thread_hash());
        for h in self.sorted_thread_hashes() {
            hasher.update(h);
        }
        hasher.update(self.returns.canonical_json().to_string().as_bytes());
        hasher.update(self.heap.hash());
        hasher.finalize().into()
    }

    pub fn current_thread_hash(&self) -> [u8; 32] {
        self.current_thread().map(Thread::hash).unwrap_or([0u8; 32])
    }

    pub fn sorted_thread_hashes(&self) -> Vec<[u8; 32]> {
        let mut hashes: Vec<[u8; 32]> = self.threads.iter().map(Thread::hash).collect();
        hashes.sort();
        hashes
    }

    /// Structural identity used by the visited table: two processes with the
    /// same `hash()` must also agree on `current_thread_hash` and the sorted
    /// thread-hash multiset to be considered the same state (spec.md §3 —
    /// this tolerates thread-list permutation while preserving which thread
    /// is "current").
    pub fn structural_key(&self) -> ([u8; 32], [u8; 32], Vec<[u8; 32]>) {
        (self.hash(), self.current_thread_hash(), self.sorted_thread_hashes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::arith::ArithEvaluator;

    fn blank_process() -> Process {
        Process::new("p", Arc::new(vec![File {
            states: vec![],
            actions: vec![],
            functions: vec![],
            invariants: vec![],
        }]), Arc::new(ArithEvaluator))
    }

    #[test]
    fn fork_is_independent_of_original() {
        let mut base = blank_process();
        base.heap.init({
            let mut env = Env::new();
            env.insert("x", Arc::new(crate::evaluator::arith::IntValue(1)));
            env
        });
        let mut fork = base.fork();
        fork.heap.update("x", Arc::new(crate::evaluator::arith::IntValue(2)));

        assert_eq!(base.heap.get("x").unwrap().canonical_string(), "1");
        assert_eq!(fork.heap.get("x").unwrap().canonical_string(), "2");
    }

    #[test]
    fn hash_is_order_independent_over_thread_permutation() {
        let mut a = blank_process();
        let mut b = blank_process();
        a.threads.push(Thread::with_entry(0, "Actions[0]", crate::ast::Flow::Atomic));
        a.threads.push(Thread::with_entry(0, "Actions[1]", crate::ast::Flow::Atomic));
        a.current = 0;
        b.threads.push(Thread::with_entry(0, "Actions[1]", crate::ast::Flow::Atomic));
        b.threads.push(Thread::with_entry(0, "Actions[0]", crate::ast::Flow::Atomic));
        b.current = 1;

        assert_eq!(a.sorted_thread_hashes(), b.sorted_thread_hashes());
        assert_eq!(a.current_thread_hash(), b.current_thread_hash());
        assert_eq!(a.hash(), b.hash());
    }
}
