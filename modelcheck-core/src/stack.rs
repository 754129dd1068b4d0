//! `CallFrame` and `Stack` — the sequence of frames a [`crate::thread::Thread`]
//! is executing. `pc` is a dotted path into the [`crate::ast::File`] AST
//! (spec.md §3); the terminal token `.$` denotes "past the last statement of
//! the enclosing block".

use crate::env::hash_json;
use crate::scope::Scope;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug)]
pub struct CallFrame {
    pub file_index: usize,
    pub pc: String,
    pub scope: Scope,
}

impl CallFrame {
    pub fn new(file_index: usize, pc: impl Into<String>, scope: Scope) -> Self {
        Self {
            file_index,
            pc: pc.into(),
            scope,
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        let payload = serde_json::json!({
            "file_index": self.file_index,
            "pc": self.pc,
            "scope": hex(&self.scope.hash()),
        });
        hash_json(&payload)
    }

    pub fn deep_clone(&self) -> CallFrame {
        CallFrame {
            file_index: self.file_index,
            pc: self.pc.clone(),
            scope: self.scope.deep_clone(),
        }
    }
}

fn hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Ordered sequence of call frames; the last element is "current".
#[derive(Clone, Debug, Default)]
pub struct Stack {
    frames: Vec<CallFrame>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Every frame, innermost (top) first. Used to build a simulated stack
    /// trace when an evaluator error bubbles up (spec.md §7).
    pub fn frames_innermost_first(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter().rev()
    }

    pub fn top_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// sha-256 over the concatenation of every frame hash, top to bottom
    /// (spec.md §3).
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for frame in &self.frames {
            hasher.update(frame.hash());
        }
        hasher.finalize().into()
    }

    pub fn deep_clone(&self) -> Stack {
        Stack {
            frames: self.frames.iter().map(CallFrame::deep_clone).collect(),
        }
    }
}
