//! Structured error types for the checker.
//!
//! The exploration engine never lets a host-language exception carry the
//! program counter across a call boundary (spec §9, "Exceptions as control
//! flow"): every fallible operation returns a [`ModelError`], and the one
//! variant that originates deep inside statement execution
//! ([`ModelError::Evaluator`]) carries its own simulated stack trace.

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

/// One frame of the simulated call stack, captured at the point an
/// [`ModelError::Evaluator`] was raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrameTrace {
    pub file_index: usize,
    pub pc: String,
}

/// The full error surface of `modelcheck-core`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluator error at {pc}: {message}")]
    Evaluator {
        pc: String,
        message: String,
        backtrace: Vec<StackFrameTrace>,
    },

    #[error("safety invariant {invariant_index} in file {file_index} failed at node {node:?}")]
    Assertion {
        file_index: usize,
        invariant_index: usize,
        node: NodeId,
        path: Vec<NodeId>,
    },

    #[error("liveness invariant {invariant_index} in file {file_index} failed")]
    Liveness {
        file_index: usize,
        invariant_index: usize,
        path: Vec<NodeId>,
    },

    #[error("deadlock at node {0:?}")]
    Deadlock(NodeId),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl ModelError {
    pub fn evaluator(pc: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::Evaluator {
            pc: pc.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    /// Attach (or replace) the simulated stack trace on an evaluator error.
    /// No-op for every other variant.
    pub fn with_backtrace(mut self, frames: Vec<StackFrameTrace>) -> Self {
        if let ModelError::Evaluator { backtrace, .. } = &mut self {
            *backtrace = frames;
        }
        self
    }
}
