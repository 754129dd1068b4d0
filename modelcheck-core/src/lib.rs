//! Explicit-state model checker for a small imperative language with
//! Python-like embedded expressions, evaluated through an external
//! [`Evaluator`](evaluator::Evaluator). A [`processor::ModelChecker`] walks
//! the reachable state space breadth-first, building a [`graph::Graph`] of
//! [`process::Process`] snapshots, then runs safety and liveness analysis
//! over the result.

pub mod ast;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod heap;
pub mod liveness;
pub mod markov;
pub mod output;
pub mod path;
pub mod process;
pub mod processor;
pub mod scope;
pub mod stack;
pub mod thread;
pub mod value;

pub use error::ModelError;
pub use processor::{ModelChecker, ModelCheckReport};
