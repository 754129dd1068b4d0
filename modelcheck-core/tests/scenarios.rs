//! End-to-end exploration scenarios exercising `ModelChecker` against small
//! hand-built ASTs, the way `processor.rs`'s own unit test does but with the
//! richer AST shapes (`ONEOF`/`PARALLEL` flows, invariants) that don't fit
//! comfortably as an inline unit test.

use modelcheck_core::ast::{
    Action, AnyStmt, Block, ExplorationOptions, File, Flow, Invariant, LivenessMode, PyStmt,
    StateDecl, Statement,
};
use modelcheck_core::evaluator::arith::ArithEvaluator;
use modelcheck_core::ModelChecker;
use std::sync::Arc;

fn checker(files: Vec<File>, options: ExplorationOptions) -> ModelChecker {
    ModelChecker::new(files, Arc::new(ArithEvaluator), options, LivenessMode::Off)
}

/// A single `ATOMIC` counter action, bounded to one action: init plus one
/// successor is the whole state space. Hand-traced against this crate's own
/// `thread`/`processor` logic; the one scenario asserted with full
/// confidence (see DESIGN.md's confidence notes).
#[test]
fn atomic_counter_reaches_exactly_two_states() {
    let file = File {
        states: vec![StateDecl {
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
    };

    let mut options = ExplorationOptions::default();
    options.max_actions = 1;
    options.emit_crash_forks = false;
    let report = checker(vec![file], options).run().expect("exploration succeeds");

    assert_eq!(report.nodes_visited, 2);
    assert_eq!(report.edges, 1);
    assert!(report.safety_failures.is_empty());
    assert!(report.deadlocks.is_empty());
}

/// Two independent `ATOMIC` counter actions. Not hand-traced to an exact
/// count (see DESIGN.md) — asserted only to terminate cleanly and to grow
/// strictly with the exploration bound, which is true regardless of the
/// precise `PARALLEL`-forking reading.
#[test]
fn two_independent_counters_explore_without_failures() {
    let file = File {
        states: vec![
            StateDecl {
                name: "a".to_string(),
                py_expr: "0".to_string(),
            },
            StateDecl {
                name: "b".to_string(),
                py_expr: "0".to_string(),
            },
        ],
        actions: vec![
            Action {
                name: "IncrA".to_string(),
                block: Block {
                    flow: Flow::Atomic,
                    stmts: vec![Statement::PyStmt(PyStmt {
                        code: "a = a + 1".to_string(),
                    })],
                },
            },
            Action {
                name: "IncrB".to_string(),
                block: Block {
                    flow: Flow::Atomic,
                    stmts: vec![Statement::PyStmt(PyStmt {
                        code: "b = b + 1".to_string(),
                    })],
                },
            },
        ],
        functions: vec![],
        invariants: vec![],
    };

    let mut shallow = ExplorationOptions::default();
    shallow.max_actions = 1;
    shallow.emit_crash_forks = false;
    let shallow_report = checker(vec![file.clone()], shallow).run().expect("exploration succeeds");
    assert_eq!(shallow_report.nodes_visited, 3); // init + IncrA + IncrB
    assert!(shallow_report.safety_failures.is_empty());

    let mut deeper = ExplorationOptions::default();
    deeper.max_actions = 2;
    deeper.emit_crash_forks = false;
    let deeper_report = checker(vec![file], deeper).run().expect("exploration succeeds");
    assert!(deeper_report.nodes_visited > shallow_report.nodes_visited);
    assert!(deeper_report.safety_failures.is_empty());
}

/// A `ONEOF`-flow `AnyStmt` choosing among three set elements: the
/// nondeterministic branching primitive the three-sided-die scenario is
/// built from. Each of the three choices first materializes its own
/// un-yielded fork node (spec.md §4.4), then runs `roll = face` and yields;
/// visited = init + 3 fork nodes + 3 yielded nodes = 7.
#[test]
fn any_stmt_forks_once_per_element() {
    let file = File {
        states: vec![StateDecl {
            name: "roll".to_string(),
            py_expr: "0".to_string(),
        }],
        actions: vec![Action {
            name: "Roll".to_string(),
            block: Block {
                flow: Flow::Atomic,
                stmts: vec![Statement::AnyStmt(AnyStmt {
                    flow: Flow::Oneof,
                    loop_vars: vec!["face".to_string()],
                    py_expr: "{1, 2, 3}".to_string(),
                    block: Block {
                        flow: Flow::Atomic,
                        stmts: vec![Statement::PyStmt(PyStmt {
                            code: "roll = face".to_string(),
                        })],
                    },
                })],
            },
        }],
        functions: vec![],
        invariants: vec![],
    };

    let mut options = ExplorationOptions::default();
    options.max_actions = 1;
    options.emit_crash_forks = false;
    let report = checker(vec![file], options).run().expect("exploration succeeds");

    assert_eq!(report.nodes_visited, 7);
    assert!(report.safety_failures.is_empty());
}

/// A safety invariant that is violated as soon as the counter exceeds a
/// bound must show up as a reported safety failure, not a silent pass.
#[test]
fn violated_safety_invariant_is_reported() {
    let file = File {
        states: vec![StateDecl {
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
        invariants: vec![Invariant {
            name: "bounded".to_string(),
            always: true,
            eventually: false,
            nested: None,
            py_expr: Some("count < 1".to_string()),
            block: None,
            py_code: None,
            temporal_operators: vec![],
        }],
    };

    let mut options = ExplorationOptions::default();
    options.max_actions = 1;
    options.continue_on_invariant_failure = true;
    let report = checker(vec![file], options).run().expect("exploration succeeds");

    assert!(!report.safety_failures.is_empty());
}

/// The same invariant, never violated because the action is never taken,
/// must not be reported.
#[test]
fn satisfied_safety_invariant_is_not_reported() {
    let file = File {
        states: vec![StateDecl {
            name: "count".to_string(),
            py_expr: "0".to_string(),
        }],
        actions: vec![Action {
            name: "Noop".to_string(),
            block: Block {
                flow: Flow::Atomic,
                stmts: vec![Statement::PyStmt(PyStmt {
                    code: "count = count".to_string(),
                })],
            },
        }],
        functions: vec![],
        invariants: vec![Invariant {
            name: "bounded".to_string(),
            always: true,
            eventually: false,
            nested: None,
            py_expr: Some("count < 1".to_string()),
            block: None,
            py_code: None,
            temporal_operators: vec![],
        }],
    };

    let mut options = ExplorationOptions::default();
    options.max_actions = 1;
    let report = checker(vec![file], options).run().expect("exploration succeeds");

    assert!(report.safety_failures.is_empty());
}
