//! Lexical `Scope` — a chain of variable bindings plus the per-block
//! `PARALLEL` bookkeeping (`skip_stmts`), linked to a parent scope.

use crate::ast::Flow;
use crate::env::{hash_json, Env};
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Scope {
    pub parent: Option<Box<Scope>>,
    pub flow: Flow,
    pub vars: Env,
    /// Sibling statement indices within a `PARALLEL` block already spawned
    /// as their own fork (spec.md §4.2 end-of-statement, `PARALLEL` case).
    pub skip_stmts: BTreeSet<usize>,
}

impl Scope {
    pub fn new_child(parent: Scope, flow: Flow) -> Scope {
        Scope {
            parent: Some(Box::new(parent)),
            flow,
            vars: Env::new(),
            skip_stmts: BTreeSet::new(),
        }
    }

    pub fn root(flow: Flow) -> Scope {
        Scope {
            parent: None,
            flow,
            vars: Env::new(),
            skip_stmts: BTreeSet::new(),
        }
    }

    /// Pop to the parent scope, or `None` if this was the outermost scope of
    /// the frame (spec.md §4.2 "End-of-block": "ascend scope chain; when
    /// scope becomes null, pop the call frame").
    pub fn into_parent(self) -> Option<Scope> {
        self.parent.map(|p| *p)
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn Value>> {
        self.vars
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup(name)))
    }

    /// Walk the chain from innermost to outermost, replacing `name` in the
    /// first scope that declares it. Returns whether a scope was found.
    pub fn update_if_declared(&mut self, name: &str, value: Arc<dyn Value>) -> bool {
        if self.vars.contains(name) {
            self.vars.insert(name.to_string(), value);
            true
        } else if let Some(parent) = &mut self.parent {
            parent.update_if_declared(name, value)
        } else {
            false
        }
    }

    /// All variables visible from this scope outward to the root, innermost
    /// wins on name collision.
    pub fn all_visible_vars(&self) -> Env {
        let mut dict = Env::new();
        self.collect_visible_into(&mut dict);
        dict
    }

    fn collect_visible_into(&self, dict: &mut Env) {
        if let Some(parent) = &self.parent {
            parent.collect_visible_into(dict);
        }
        dict.merge(&self.vars);
    }

    /// Incremental hash over the parent chain, the vars JSON, and the
    /// sorted `skip_stmts` (spec.md §3).
    pub fn hash(&self) -> [u8; 32] {
        let parent_hash = self
            .parent
            .as_ref()
            .map(|p| p.hash())
            .unwrap_or([0u8; 32]);
        let payload = serde_json::json!({
            "parent": hex(&parent_hash),
            "flow": format!("{:?}", self.flow),
            "vars": self.vars.canonical_json(),
            "skip_stmts": self.skip_stmts.iter().collect::<Vec<_>>(),
        });
        hash_json(&payload)
    }

    pub fn deep_clone(&self) -> Scope {
        Scope {
            parent: self.parent.as_ref().map(|p| Box::new(p.deep_clone())),
            flow: self.flow,
            vars: self.vars.deep_clone(),
            skip_stmts: self.skip_stmts.clone(),
        }
    }
}

fn hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::arith::IntValue;

    #[test]
    fn update_if_declared_walks_to_parent() {
        let mut root = Scope::root(Flow::Atomic);
        root.vars.insert("x", Arc::new(IntValue(1)));
        let mut child = Scope::new_child(root, Flow::Atomic);

        assert!(child.update_if_declared("x", Arc::new(IntValue(2))));
        assert!(!child.vars.contains("x"));
        assert_eq!(
            child.lookup("x").unwrap().canonical_string(),
            IntValue(2).canonical_string()
        );
    }

    #[test]
    fn hash_is_sensitive_to_skip_stmts() {
        let mut scope_a = Scope::root(Flow::Parallel);
        let mut scope_b = scope_a.clone();
        scope_a.skip_stmts.insert(0);
        scope_b.skip_stmts.insert(1);
        assert_ne!(scope_a.hash(), scope_b.hash());
    }
}
