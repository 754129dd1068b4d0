//! The AST schema (spec.md §6): a read-only input produced by an external
//! compiler and deserialized from JSON. Field names are capitalized to
//! match the dotted-path vocabulary of [`crate::path`] exactly
//! (`Actions[2].Block.Stmts[1].AnyStmt.Block.Stmts[0]`), so path strings
//! built for diagnostics read the same as the source schema.

use serde::{Deserialize, Serialize};

/// Sequencing discipline of a [`Block`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Atomic,
    Serial,
    Oneof,
    Parallel,
}

/// Fairness annotation on a graph link (spec.md §3/§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Fairness {
    #[default]
    None,
    Weak,
    Strong,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    #[serde(default)]
    pub states: Vec<StateDecl>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub invariants: Vec<Invariant>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateDecl {
    pub name: String,
    /// Source expression the evaluator uses to compute the initial value.
    pub py_expr: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub flow: Flow,
    #[serde(default)]
    pub stmts: Vec<Statement>,
}

/// A statement is a sum type; exactly one variant is populated, mirroring
/// the external compiler's tagged-union encoding. We model it as a Rust
/// enum directly rather than an `Option`-per-field struct.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Statement {
    PyStmt(PyStmt),
    Block(Block),
    IfStmt(IfStmt),
    AnyStmt(AnyStmt),
    ForStmt(ForStmt),
    WhileStmt(WhileStmt),
    ReturnStmt(ReturnStmt),
    BreakStmt,
    ContinueStmt,
    CallStmt(CallStmt),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PyStmt {
    pub code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IfStmt {
    pub flow: Flow,
    pub branches: Vec<Branch>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Branch {
    pub condition: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnyStmt {
    pub flow: Flow,
    pub loop_vars: Vec<String>,
    pub py_expr: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForStmt {
    pub flow: Flow,
    pub loop_vars: Vec<String>,
    pub py_expr: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WhileStmt {
    pub flow: Flow,
    pub condition: String,
    pub block: Block,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnStmt {
    #[serde(default)]
    pub py_expr: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallStmt {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invariant {
    pub name: String,
    #[serde(default)]
    pub always: bool,
    #[serde(default)]
    pub eventually: bool,
    /// Nested temporal operator, e.g. "eventually-always" wraps "always".
    #[serde(default)]
    pub nested: Option<Box<Invariant>>,
    #[serde(default)]
    pub py_expr: Option<String>,
    #[serde(default)]
    pub block: Option<Block>,
    #[serde(default)]
    pub py_code: Option<String>,
    #[serde(default)]
    pub temporal_operators: Vec<String>,
}

impl Invariant {
    pub fn is_eventually_always(&self) -> bool {
        self.temporal_operators
            .iter()
            .any(|op| op == "eventually-always")
    }

    pub fn is_always_eventually(&self) -> bool {
        self.temporal_operators
            .iter()
            .any(|op| op == "always-eventually")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LivenessMode {
    #[default]
    Off,
    Strict,
    StrictBfs,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StateSpaceOptions {
    #[serde(default)]
    pub options: ExplorationOptions,
    #[serde(default)]
    pub liveness: LivenessMode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExplorationOptions {
    #[serde(default = "default_max_actions")]
    pub max_actions: u32,
    #[serde(default)]
    pub max_concurrent_actions: Option<u32>,
    #[serde(default)]
    pub ignore_invariant_failures: bool,
    #[serde(default)]
    pub continue_on_invariant_failure: bool,
    #[serde(default)]
    pub max_nodes: Option<u64>,
    /// Schedule an all-threads-dropped child after every yielded state
    /// (spec.md §4.4, "crash fork"), modeling a process that simply stops
    /// responding. Defaults on, per the Design Notes' guidance (spec.md §9)
    /// to keep it behind a mode flag rather than dropping it.
    #[serde(default = "default_emit_crash_forks")]
    pub emit_crash_forks: bool,
}

fn default_max_actions() -> u32 {
    100
}

fn default_emit_crash_forks() -> bool {
    true
}

impl Default for ExplorationOptions {
    fn default() -> Self {
        Self {
            max_actions: default_max_actions(),
            max_concurrent_actions: None,
            ignore_invariant_failures: false,
            continue_on_invariant_failure: false,
            max_nodes: None,
            emit_crash_forks: default_emit_crash_forks(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PerformanceModel {
    #[serde(default)]
    pub configs: std::collections::BTreeMap<String, LabelConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LabelConfig {
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub counters: std::collections::BTreeMap<String, CounterConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CounterConfig {
    pub numeric: f64,
}
