//! `Heap` — the state variables declared at init. The key set is fixed once
//! [`Heap::init`] runs; thereafter only [`Heap::update`] is legal, and it
//! only succeeds for keys that already exist (spec.md §3 invariant).

use crate::env::Env;
use crate::value::Value;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct Heap {
    globals: Env,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the heap from the evaluator's `exec_init` result. Only
    /// callable once, before any `update`.
    pub fn init(&mut self, globals: Env) {
        self.globals = globals;
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Value>> {
        self.globals.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.globals.contains(key)
    }

    /// Update an existing heap key in place. Returns `false` (no-op) if the
    /// key was never declared at init — the heap's key set never grows.
    pub fn update(&mut self, key: &str, value: Arc<dyn Value>) -> bool {
        if self.globals.contains(key) {
            self.globals.insert(key.to_string(), value);
            true
        } else {
            false
        }
    }

    pub fn as_env(&self) -> &Env {
        &self.globals
    }

    pub fn deep_clone(&self) -> Heap {
        Heap {
            globals: self.globals.deep_clone(),
        }
    }

    pub fn canonical_json(&self) -> serde_json::Value {
        self.globals.canonical_json()
    }

    /// sha-256 of the canonical JSON (spec.md §3).
    pub fn hash(&self) -> [u8; 32] {
        self.globals.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::arith::IntValue;

    #[test]
    fn update_rejects_undeclared_keys() {
        let mut heap = Heap::new();
        let mut init = Env::new();
        init.insert("count", Arc::new(IntValue(0)));
        heap.init(init);

        assert!(heap.update("count", Arc::new(IntValue(1))));
        assert!(!heap.update("never_declared", Arc::new(IntValue(1))));
        assert!(!heap.contains("never_declared"));
    }

    #[test]
    fn clone_is_independent() {
        let mut heap = Heap::new();
        let mut init = Env::new();
        init.insert("count", Arc::new(IntValue(0)));
        heap.init(init);

        let mut clone = heap.deep_clone();
        clone.update("count", Arc::new(IntValue(1)));

        assert_eq!(heap.get("count").unwrap().canonical_string(), "0");
        assert_eq!(clone.get("count").unwrap().canonical_string(), "1");
    }
}
