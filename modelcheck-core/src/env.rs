//! `Env` — a mapping from identifier to [`Value`], with canonical
//! (key-sorted) JSON projection and a stable hash.

use crate::value::{canonical_json, clone_value, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mapping from variable name to value. Insertion order is irrelevant;
/// `BTreeMap` gives us sorted iteration for free, which is exactly the
/// canonical-JSON ordering spec.md §3 requires.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vars: BTreeMap<String, Arc<dyn Value>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Value>> {
        self.vars.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Arc<dyn Value>) {
        self.vars.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn Value>> {
        self.vars.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Value>)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }

    /// Merge `other` on top of `self`, overwriting any shared keys. Used to
    /// scatter an evaluator's returned env back over heap/scope (spec.md
    /// §4.3 builds the base differently, but both consumers of `merge`
    /// want "later wins").
    pub fn merge(&mut self, other: &Env) {
        for (k, v) in other.iter() {
            self.vars.insert(k.clone(), clone_value(v));
        }
    }

    /// A fresh, independently-mutable copy. Every contained `Value` is
    /// deep-cloned via [`clone_value`] so that forking never aliases set
    /// storage across processes (spec.md §3, "Lifecycles").
    pub fn deep_clone(&self) -> Env {
        Env {
            vars: self
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), clone_value(v)))
                .collect(),
        }
    }

    /// Canonical JSON object: keys sorted (guaranteed by `BTreeMap`
    /// iteration), set values projected as sorted bracketed lists.
    pub fn canonical_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), canonical_json(v)))
            .collect();
        serde_json::Value::Object(map)
    }

    /// `sha256(canonical_json)`.
    pub fn hash(&self) -> [u8; 32] {
        hash_json(&self.canonical_json())
    }
}

/// Shared by [`Env::hash`] and [`crate::heap::Heap::hash`]: sha256 of the
/// JSON's canonical (serde_json preserves insertion order, which for us is
/// always the sorted `BTreeMap` order) serialization.
pub fn hash_json(value: &serde_json::Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::arith::IntValue;

    #[test]
    fn canonical_json_sorts_keys() {
        let mut env = Env::new();
        env.insert("b", Arc::new(IntValue(2)));
        env.insert("a", Arc::new(IntValue(1)));
        let json = env.canonical_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn round_trip_json_is_stable() {
        let mut env = Env::new();
        env.insert("x", Arc::new(IntValue(42)));
        let first = env.canonical_json();
        let reparsed: serde_json::Value =
            serde_json::from_str(&first.to_string()).expect("valid json");
        assert_eq!(first, reparsed);
    }
}
