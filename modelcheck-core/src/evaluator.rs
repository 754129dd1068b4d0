//! The external, pluggable `Evaluator` collaborator (spec.md §1/§6).
//!
//! The checker treats the dynamic-language runtime as a sandboxed
//! interface: `exec_init` establishes the heap, `exec_stmt` runs a `PyStmt`
//! and returns the mutated environment, `eval_expr` evaluates a pure
//! expression (branch conditions, `AnyStmt`/`ForStmt` iterables, invariant
//! predicates). The real production evaluator — a full dynamic-language
//! interpreter — is out of scope (spec.md §1); [`arith`] ships a small
//! reference implementation so the engine is exercisable and testable on
//! its own.

pub mod arith;

use crate::ast::StateDecl;
use crate::env::Env;
use crate::error::ModelError;
use crate::value::Value;
use std::sync::Arc;

/// Adapter to the external dynamic-language engine (spec.md §6).
///
/// Implementations must behave as a pure function of `(code, env)` — the
/// same evaluator instance is shared across every [`crate::process::Process`]
/// explored in a run, so it must either be genuinely stateless or reset
/// itself between calls (spec.md §5).
pub trait Evaluator: Send + Sync {
    /// Establish initial variable bindings from the `[States]` declarations.
    fn exec_init(&self, states: &[StateDecl]) -> Result<Env, ModelError>;

    /// Execute a block of imperative code (a `PyStmt`) and return the
    /// mutated environment, including any newly declared names.
    fn exec_stmt(&self, filename: &str, code: &str, env_in: &Env) -> Result<Env, ModelError>;

    /// Evaluate an expression purely with respect to `env_in`.
    fn eval_expr(
        &self,
        filename: &str,
        expr: &str,
        env_in: &Env,
    ) -> Result<Arc<dyn Value>, ModelError>;
}
