//! Opaque value handles produced by the external [`Evaluator`](crate::evaluator::Evaluator).
//!
//! The checker never interprets a value's payload directly — it only asks
//! for the five capabilities spec'd in spec.md §3/§6: a type tag, equality,
//! truthiness, a canonical string projection (stable across calls, used for
//! hashing and for the sorted-set JSON projection), and iteration for
//! set/list/range-shaped values. A `Value` must also be cheaply,
//! independently cloneable — forking a [`Process`](crate::process::Process)
//! deep-clones every set it holds so that mutating one fork's copy never
//! aliases another's.

use std::fmt;
use std::sync::Arc;

/// A handle to a value living inside the external evaluator.
///
/// Implementors are expected to be cheap `Arc`-friendly wrappers; the engine
/// only ever holds `Arc<dyn Value>`, never an owned `Box<dyn Value>`, because
/// the common case (scalars copied between scopes) should not force a deep
/// clone — only [`clone_value`] does that, and only when the type tag says
/// cloning is actually necessary (sets).
pub trait Value: fmt::Debug + Send + Sync {
    /// A short, stable tag identifying the dynamic type ("int", "bool",
    /// "str", "set", "list", "range", ...).
    fn type_tag(&self) -> &str;

    /// Python-style truthiness.
    fn truthy(&self) -> bool;

    /// Canonical string projection. Must be stable across calls for the same
    /// logical value, and is what hashing/canonical-JSON rely on. Set
    /// elements must be sorted-by-string within the projection so that
    /// iteration order never leaks into structural identity.
    fn canonical_string(&self) -> String;

    /// Structural equality, defined purely in terms of `canonical_string`
    /// plus `type_tag` — two values of different dynamic type are never
    /// equal even if their projections coincide.
    fn value_eq(&self, other: &dyn Value) -> bool {
        self.type_tag() == other.type_tag() && self.canonical_string() == other.canonical_string()
    }

    /// Iterate the elements of a set/list/range-shaped value. Returns `None`
    /// for scalar types.
    fn iter_values(&self) -> Option<Vec<Arc<dyn Value>>> {
        None
    }

    /// Produce an independent snapshot. The default forwards to
    /// `clone_value`'s caller via `dyn_clone`; most scalar implementations
    /// can simply `Arc::new(self.clone())` since `Arc<dyn Value>` is already
    /// shared — mutation never happens through the trait, only replacement.
    fn dyn_clone(&self) -> Arc<dyn Value>;
}

/// Deep-clone a value handle. For scalars this is just `Arc::clone`'s cousin
/// (a fresh, value-identical handle); for sets it must produce storage that
/// can be mutated independently of the original — see spec.md §3
/// ("essential for sets").
pub fn clone_value(v: &Arc<dyn Value>) -> Arc<dyn Value> {
    v.dyn_clone()
}

impl PartialEq for dyn Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

/// Canonical JSON projection of a single value, used by [`crate::env::Env`]
/// and [`crate::heap::Heap`] hashing. Sets project as a sorted bracketed
/// list of their elements' canonical strings (spec.md §3).
pub fn canonical_json(v: &Arc<dyn Value>) -> serde_json::Value {
    if let Some(elems) = v.iter_values() {
        let mut strings: Vec<String> = elems.iter().map(|e| e.canonical_string()).collect();
        strings.sort();
        serde_json::Value::Array(strings.into_iter().map(serde_json::Value::String).collect())
    } else {
        serde_json::Value::String(v.canonical_string())
    }
}
