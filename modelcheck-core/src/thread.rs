//! `Thread` and its stepper, `execute` (spec.md §4.2). A thread owns a
//! [`Stack`] of [`CallFrame`]s; `execute` runs it until it either produces
//! one or more forks (a non-deterministic choice point), yields (a stable,
//! observable state), or the thread itself terminates.

use crate::ast::{AnyStmt, File, Flow, ForStmt, IfStmt, Statement, WhileStmt};
use crate::env::Env;
use crate::error::{ModelError, StackFrameTrace};
use crate::path::{self, AstNode};
use crate::process::Process;
use crate::scope::Scope;
use crate::stack::{CallFrame, Stack};
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct Thread {
    pub stack: Stack,
}

impl Thread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(file_index: usize, pc: impl Into<String>, flow: Flow) -> Self {
        let mut thread = Thread::new();
        thread
            .stack
            .push(CallFrame::new(file_index, pc, Scope::root(flow)));
        thread
    }

    /// A thread is idle iff its pc is empty (spec.md §3) — we also treat a
    /// fully-popped stack as idle, since such a thread is about to be
    /// dropped from the process.
    pub fn is_idle(&self) -> bool {
        match self.stack.top() {
            Some(frame) => frame.pc.is_empty(),
            None => true,
        }
    }

    /// sha-256 of the stack hash (spec.md §3).
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.stack.hash());
        hasher.finalize().into()
    }

    pub fn deep_clone(&self) -> Thread {
        Thread {
            stack: self.stack.deep_clone(),
        }
    }
}

/// Result of running [`execute`] to its next fork or yield point.
#[derive(Debug)]
pub struct ExecOutcome {
    pub forks: Vec<Process>,
    pub yielded: bool,
}

/// One statement- or block-dispatch step's result.
enum StepOutcome {
    Continue,
    Yield,
    /// Forks produced, no yield (block-entry `ONEOF`/`PARALLEL`, `AnyStmt`).
    Forked(Vec<Process>),
    /// Forks produced *and* the base state yields (`PARALLEL` end-of-statement).
    ForkedYield(Vec<Process>),
}

/// Run `process`'s `thread_idx`'th thread until it forks, yields, or the
/// thread terminates (spec.md §4.2).
pub fn execute(process: &mut Process, thread_idx: usize) -> Result<ExecOutcome, ModelError> {
    let files = Arc::clone(&process.files);
    let mut steps = 0u64;
    loop {
        steps += 1;
        if steps > 1_000_000 {
            return Err(ModelError::LimitExceeded(
                "thread did not reach a yield point within the step budget (possible non-terminating WhileStmt)".to_string(),
            ));
        }
        let pc_info = {
            let thread = match process.threads.get(thread_idx) {
                Some(t) => t,
                None => return Ok(ExecOutcome { forks: vec![], yielded: true }),
            };
            thread.stack.top().map(|f| (f.file_index, f.pc.clone()))
        };
        let (file_index, pc) = match pc_info {
            Some(x) => x,
            None => {
                process.threads.remove(thread_idx);
                return Ok(ExecOutcome { forks: vec![], yielded: true });
            }
        };

        let outcome = if pc.is_empty() || path::is_end_marker(&pc) {
            end_of_block(process, thread_idx, &files)?
        } else {
            let file = files.get(file_index).ok_or_else(|| {
                ModelError::Config(format!("pc references unknown file index {file_index}"))
            })?;
            let node = path::resolve(file, &pc).ok_or_else(|| {
                ModelError::evaluator(pc.clone(), "program counter does not resolve against the AST")
            })?;
            match node {
                AstNode::Action(_) => {
                    set_pc(process, thread_idx, format!("{pc}.Block"))?;
                    StepOutcome::Continue
                }
                AstNode::Block(block) => dispatch_block(process, thread_idx, &pc, block)?,
                AstNode::Statement(stmt) => {
                    dispatch_statement(process, thread_idx, file, &pc, stmt)?
                }
                _ => {
                    return Err(ModelError::evaluator(
                        pc.clone(),
                        "program counter resolved to a non-dispatchable AST node",
                    ))
                }
            }
        };

        match outcome {
            StepOutcome::Continue => continue,
            StepOutcome::Yield => return Ok(ExecOutcome { forks: vec![], yielded: true }),
            StepOutcome::Forked(forks) => return Ok(ExecOutcome { forks, yielded: false }),
            StepOutcome::ForkedYield(forks) => return Ok(ExecOutcome { forks, yielded: true }),
        }
    }
}

fn top_pc(process: &Process, thread_idx: usize) -> Result<(usize, String), ModelError> {
    process
        .threads
        .get(thread_idx)
        .and_then(|t| t.stack.top())
        .map(|f| (f.file_index, f.pc.clone()))
        .ok_or_else(|| ModelError::Config("no active call frame".to_string()))
}

fn top_frame_mut<'a>(
    process: &'a mut Process,
    thread_idx: usize,
) -> Result<&'a mut CallFrame, ModelError> {
    process
        .threads
        .get_mut(thread_idx)
        .and_then(|t| t.stack.top_mut())
        .ok_or_else(|| ModelError::Config("no active call frame".to_string()))
}

fn set_pc(process: &mut Process, thread_idx: usize, pc: String) -> Result<(), ModelError> {
    top_frame_mut(process, thread_idx)?.pc = pc;
    Ok(())
}

fn current_flow(process: &Process, thread_idx: usize) -> Result<Flow, ModelError> {
    process
        .threads
        .get(thread_idx)
        .and_then(|t| t.stack.top())
        .map(|f| f.scope.flow)
        .ok_or_else(|| ModelError::Config("no active call frame".to_string()))
}

/// Push a new child scope onto the current frame with the given flow
/// (spec.md §4.2, "Block" dispatch).
fn push_child_scope(process: &mut Process, thread_idx: usize, flow: Flow) -> Result<(), ModelError> {
    let frame = top_frame_mut(process, thread_idx)?;
    let old = std::mem::replace(&mut frame.scope, Scope::root(flow));
    frame.scope = Scope::new_child(old, flow);
    Ok(())
}

/// Pop the current frame's innermost scope back to its parent. Every block
/// entry (generic `Block` dispatch, or the dedicated `AnyStmt`/`WhileStmt`
/// iteration scope) pushes exactly one scope, so this always succeeds when
/// called for a block that is actually ending.
fn pop_one_scope(process: &mut Process, thread_idx: usize) -> Result<(), ModelError> {
    let frame = top_frame_mut(process, thread_idx)?;
    let current = std::mem::replace(&mut frame.scope, Scope::root(Flow::Atomic));
    frame.scope = current
        .into_parent()
        .ok_or_else(|| ModelError::Config("scope chain exhausted ascending out of a block".to_string()))?;
    Ok(())
}

/// Gather heap ⊕ scope-chain visible variables, scope winning (spec.md §4.2
/// `PyStmt` dispatch).
fn visible_env(process: &Process, thread_idx: usize) -> Result<Env, ModelError> {
    let frame = process
        .threads
        .get(thread_idx)
        .and_then(|t| t.stack.top())
        .ok_or_else(|| ModelError::Config("no active call frame".to_string()))?;
    let mut env = process.heap.as_env().deep_clone();
    env.merge(&frame.scope.all_visible_vars());
    Ok(env)
}

/// Scatter an evaluator-returned env back into scope/heap (spec.md §4.3).
fn scatter(process: &mut Process, thread_idx: usize, updated: &Env) -> Result<(), ModelError> {
    for (k, v) in updated.iter() {
        let declared = {
            let frame = top_frame_mut(process, thread_idx)?;
            frame.scope.update_if_declared(k, crate::value::clone_value(v))
        };
        if declared {
            continue;
        }
        if process.heap.update(k, crate::value::clone_value(v)) {
            continue;
        }
        let frame = top_frame_mut(process, thread_idx)?;
        frame.scope.vars.insert(k.clone(), crate::value::clone_value(v));
    }
    Ok(())
}

fn dispatch_block(
    process: &mut Process,
    thread_idx: usize,
    pc: &str,
    block: &crate::ast::Block,
) -> Result<StepOutcome, ModelError> {
    push_child_scope(process, thread_idx, block.flow)?;

    if block.stmts.is_empty() {
        set_pc(process, thread_idx, format!("{pc}.$"))?;
        return Ok(StepOutcome::Continue);
    }

    match block.flow {
        Flow::Atomic | Flow::Serial => {
            set_pc(process, thread_idx, format!("{pc}.Stmts[0]"))?;
            Ok(StepOutcome::Continue)
        }
        Flow::Oneof => {
            let mut forks = Vec::with_capacity(block.stmts.len());
            for i in 0..block.stmts.len() {
                let mut fork = process.fork();
                set_pc(&mut fork, thread_idx, format!("{pc}.Stmts[{i}]"))?;
                forks.push(fork);
            }
            Ok(StepOutcome::Forked(forks))
        }
        Flow::Parallel => {
            let mut forks = Vec::with_capacity(block.stmts.len());
            for i in 0..block.stmts.len() {
                let mut fork = process.fork();
                set_pc(&mut fork, thread_idx, format!("{pc}.Stmts[{i}]"))?;
                top_frame_mut(&mut fork, thread_idx)?.scope.skip_stmts.insert(i);
                forks.push(fork);
            }
            Ok(StepOutcome::Forked(forks))
        }
    }
}

fn dispatch_statement(
    process: &mut Process,
    thread_idx: usize,
    file: &File,
    pc: &str,
    stmt: &Statement,
) -> Result<StepOutcome, ModelError> {
    match stmt {
        Statement::PyStmt(py) => {
            let env_in = visible_env(process, thread_idx)?;
            let filename = format!("file{}", current_file_index(process, thread_idx)?);
            let backtrace = capture_backtrace(process, thread_idx);
            let updated = process
                .evaluator
                .exec_stmt(&filename, &py.code, &env_in)
                .map_err(|e| attach_trace(e, pc, backtrace))?;
            scatter(process, thread_idx, &updated)?;
            end_of_statement(process, thread_idx, file, pc)
        }
        Statement::Block(_) => {
            set_pc(process, thread_idx, format!("{pc}.Block"))?;
            Ok(StepOutcome::Continue)
        }
        Statement::IfStmt(if_stmt) => dispatch_if(process, thread_idx, file, pc, if_stmt),
        Statement::AnyStmt(any) => dispatch_any(process, thread_idx, file, pc, any),
        Statement::ForStmt(for_stmt) => dispatch_for(process, thread_idx, file, pc, for_stmt),
        Statement::WhileStmt(while_stmt) => dispatch_while(process, thread_idx, pc, while_stmt),
        Statement::ReturnStmt(ret) => {
            if let Some(expr) = &ret.py_expr {
                let env_in = visible_env(process, thread_idx)?;
                let filename = format!("file{}", current_file_index(process, thread_idx)?);
                let backtrace = capture_backtrace(process, thread_idx);
                let value = process
                    .evaluator
                    .eval_expr(&filename, expr, &env_in)
                    .map_err(|e| attach_trace(e, pc, backtrace))?;
                process.returns.insert("__retval__", value);
            }
            pop_frame_for_return(process, thread_idx)
        }
        Statement::BreakStmt | Statement::ContinueStmt => {
            // Best-effort: treat as "end of the innermost block". This is
            // exact for a break/continue that is a direct child of the
            // loop body, and imprecise (falls through to the next sibling
            // instead of re-entering the loop) when nested inside an
            // intervening `IfStmt` branch.
            let block_path = path::enclosing_block(pc)
                .ok_or_else(|| ModelError::evaluator(pc, "break/continue outside a block"))?;
            set_pc(process, thread_idx, format!("{block_path}.$"))?;
            Ok(StepOutcome::Continue)
        }
        Statement::CallStmt(call) => dispatch_call(process, thread_idx, file, pc, call),
    }
}

fn current_file_index(process: &Process, thread_idx: usize) -> Result<usize, ModelError> {
    Ok(top_pc(process, thread_idx)?.0)
}

/// Walk the failing thread's call stack, innermost frame first, into the
/// simulated trace an [`ModelError::Evaluator`] carries (spec.md §7).
fn capture_backtrace(process: &Process, thread_idx: usize) -> Vec<StackFrameTrace> {
    process
        .threads
        .get(thread_idx)
        .map(|t| {
            t.stack
                .frames_innermost_first()
                .map(|f| StackFrameTrace {
                    file_index: f.file_index,
                    pc: f.pc.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn attach_trace(err: ModelError, pc: &str, backtrace: Vec<StackFrameTrace>) -> ModelError {
    match err {
        ModelError::Evaluator { message, .. } => ModelError::evaluator(pc, message).with_backtrace(backtrace),
        other => other,
    }
}

/// `IfStmt` branch selection is governed by the statement's own `flow`, not
/// the enclosing block's: `ATOMIC`/`SERIAL` deterministically takes the
/// first satisfied branch (the ordinary single-condition-true case), while
/// `ONEOF`/`PARALLEL` forks once per satisfied branch — this is how a
/// multi-sided nondeterministic choice among guarded branches is expressed
/// (e.g. a three-sided die as three `Branches` with a `ONEOF` `IfStmt`).
fn dispatch_if(
    process: &mut Process,
    thread_idx: usize,
    _file: &File,
    pc: &str,
    if_stmt: &IfStmt,
) -> Result<StepOutcome, ModelError> {
    let env_in = visible_env(process, thread_idx)?;
    let filename = format!("file{}", current_file_index(process, thread_idx)?);
    let mut satisfied = Vec::new();
    for (i, branch) in if_stmt.branches.iter().enumerate() {
        let backtrace = capture_backtrace(process, thread_idx);
        let cond = process
            .evaluator
            .eval_expr(&filename, &branch.condition, &env_in)
            .map_err(|e| attach_trace(e, pc, backtrace))?;
        if cond.truthy() {
            satisfied.push(i);
        }
    }

    if satisfied.is_empty() {
        return end_of_statement_from_stmts_pc(process, thread_idx, pc);
    }

    match if_stmt.flow {
        Flow::Atomic | Flow::Serial => {
            let i = satisfied[0];
            set_pc(process, thread_idx, format!("{pc}.IfStmt.Branches[{i}].Block"))?;
            Ok(StepOutcome::Continue)
        }
        Flow::Oneof | Flow::Parallel => {
            let mut forks = Vec::with_capacity(satisfied.len());
            for i in satisfied {
                let mut fork = process.fork();
                set_pc(&mut fork, thread_idx, format!("{pc}.IfStmt.Branches[{i}].Block"))?;
                forks.push(fork);
            }
            Ok(StepOutcome::Forked(forks))
        }
    }
}

/// `end_of_statement`, called with a pc known to resolve to the `Stmts[i]`
/// that owns it — i.e. not yet stripped of any nested-block suffix.
fn end_of_statement_from_stmts_pc(
    process: &mut Process,
    thread_idx: usize,
    pc: &str,
) -> Result<StepOutcome, ModelError> {
    let file_index = current_file_index(process, thread_idx)?;
    let files = Arc::clone(&process.files);
    let file = files
        .get(file_index)
        .ok_or_else(|| ModelError::Config("unknown file index".to_string()))?;
    end_of_statement(process, thread_idx, file, pc)
}

fn dispatch_any(
    process: &mut Process,
    thread_idx: usize,
    _file: &File,
    pc: &str,
    any: &AnyStmt,
) -> Result<StepOutcome, ModelError> {
    if current_flow(process, thread_idx)? != Flow::Atomic {
        return Err(ModelError::Config("AnyStmt must execute in an ATOMIC block".to_string()));
    }
    if any.loop_vars.len() != 1 {
        return Err(ModelError::Config(
            "AnyStmt supports exactly one loop variable".to_string(),
        ));
    }
    let env_in = visible_env(process, thread_idx)?;
    let filename = format!("file{}", current_file_index(process, thread_idx)?);
    let backtrace = capture_backtrace(process, thread_idx);
    let iterable = process
        .evaluator
        .eval_expr(&filename, &any.py_expr, &env_in)
        .map_err(|e| attach_trace(e, pc, backtrace))?;
    let elements = iterable.iter_values().ok_or_else(|| {
        ModelError::evaluator(pc, format!("AnyStmt expression `{}` is not iterable", any.py_expr))
    })?;

    if elements.is_empty() {
        return end_of_statement_from_stmts_pc(process, thread_idx, pc);
    }

    let loop_var = any.loop_vars[0].clone();
    let mut forks = Vec::with_capacity(elements.len());
    for element in elements {
        let mut fork = process.fork();
        let flow = current_flow(&fork, thread_idx)?;
        push_child_scope(&mut fork, thread_idx, flow)?;
        top_frame_mut(&mut fork, thread_idx)?
            .scope
            .vars
            .insert(loop_var.clone(), element);
        set_pc(&mut fork, thread_idx, format!("{pc}.AnyStmt.Block"))?;
        forks.push(fork);
    }
    Ok(StepOutcome::Forked(forks))
}

/// `ForStmt` is deterministic (unlike `AnyStmt`): it runs the body once per
/// element of the iterable, in the order the evaluator returns it, without
/// forking. Progress is tracked via a reserved `$for_index` binding in the
/// iteration scope pushed for the loop (spec.md §4.2 only specifies that
/// `ForStmt` "mirrors `AnyStmt`/loop semantics"; sequential iteration is the
/// reading adopted here — see DESIGN.md).
fn dispatch_for(
    process: &mut Process,
    thread_idx: usize,
    _file: &File,
    pc: &str,
    for_stmt: &ForStmt,
) -> Result<StepOutcome, ModelError> {
    if for_stmt.loop_vars.len() != 1 {
        return Err(ModelError::Config(
            "ForStmt supports exactly one loop variable".to_string(),
        ));
    }
    let env_in = visible_env(process, thread_idx)?;
    let filename = format!("file{}", current_file_index(process, thread_idx)?);
    let backtrace = capture_backtrace(process, thread_idx);
    let iterable = process
        .evaluator
        .eval_expr(&filename, &for_stmt.py_expr, &env_in)
        .map_err(|e| attach_trace(e, pc, backtrace))?;
    let elements = iterable.iter_values().ok_or_else(|| {
        ModelError::evaluator(pc, format!("ForStmt expression `{}` is not iterable", for_stmt.py_expr))
    })?;

    if elements.is_empty() {
        return end_of_statement_from_stmts_pc(process, thread_idx, pc);
    }

    enter_for_iteration(process, thread_idx, pc, &for_stmt.loop_vars[0], &elements, 0)
}

fn enter_for_iteration(
    process: &mut Process,
    thread_idx: usize,
    pc: &str,
    loop_var: &str,
    elements: &[Arc<dyn crate::value::Value>],
    index: usize,
) -> Result<StepOutcome, ModelError> {
    let flow = current_flow(process, thread_idx)?;
    push_child_scope(process, thread_idx, flow)?;
    let frame = top_frame_mut(process, thread_idx)?;
    frame
        .scope
        .vars
        .insert("$for_index", Arc::new(crate::evaluator::arith::IntValue(index as i64)));
    frame.scope.vars.insert(loop_var, Arc::clone(&elements[index]));
    set_pc(process, thread_idx, format!("{pc}.ForStmt.Block"))?;
    Ok(StepOutcome::Continue)
}

fn dispatch_while(
    process: &mut Process,
    thread_idx: usize,
    pc: &str,
    while_stmt: &WhileStmt,
) -> Result<StepOutcome, ModelError> {
    let env_in = visible_env(process, thread_idx)?;
    let filename = format!("file{}", current_file_index(process, thread_idx)?);
    let backtrace = capture_backtrace(process, thread_idx);
    let cond = process
        .evaluator
        .eval_expr(&filename, &while_stmt.condition, &env_in)
        .map_err(|e| attach_trace(e, pc, backtrace))?;
    if !cond.truthy() {
        return end_of_statement_from_stmts_pc(process, thread_idx, pc);
    }
    let flow = current_flow(process, thread_idx)?;
    push_child_scope(process, thread_idx, flow)?;
    set_pc(process, thread_idx, format!("{pc}.WhileStmt.Block"))?;
    Ok(StepOutcome::Continue)
}

fn dispatch_call(
    process: &mut Process,
    thread_idx: usize,
    file: &File,
    pc: &str,
    call: &crate::ast::CallStmt,
) -> Result<StepOutcome, ModelError> {
    let (func_index, _) = file
        .functions
        .iter()
        .enumerate()
        .find(|(_, f)| f.name == call.function)
        .ok_or_else(|| ModelError::Config(format!("unknown function `{}`", call.function)))?;
    // The call's own continuation is recorded by advancing *this* frame's pc
    // before pushing the callee frame, so returning pops straight back to
    // the statement after the call.
    let after_call = end_of_statement_from_stmts_pc_pure(process, thread_idx, pc)?;
    set_pc(process, thread_idx, after_call)?;
    let file_index = current_file_index(process, thread_idx)?;
    let thread = process
        .threads
        .get_mut(thread_idx)
        .ok_or_else(|| ModelError::Config("no active thread".to_string()))?;
    thread.stack.push(CallFrame::new(
        file_index,
        format!("Functions[{func_index}]"),
        Scope::root(Flow::Atomic),
    ));
    Ok(StepOutcome::Continue)
}

/// Computes what `pc` *would* become after this statement without actually
/// running end-of-statement's fork/yield side effects — used by `CallStmt`
/// to pre-compute the caller's resume point. Only meaningful for
/// `ATOMIC`/`SERIAL` flow (a call inside `ONEOF`/`PARALLEL` would need to
/// fork on return, which this engine does not support).
fn end_of_statement_from_stmts_pc_pure(
    process: &Process,
    thread_idx: usize,
    pc: &str,
) -> Result<String, ModelError> {
    let file_index = current_file_index(process, thread_idx)?;
    let file = process
        .files
        .get(file_index)
        .ok_or_else(|| ModelError::Config("unknown file index".to_string()))?;
    path::next_stmt(file, pc)
        .ok_or_else(|| ModelError::evaluator(pc, "call statement has no enclosing statement slot"))
}

fn pop_frame_for_return(process: &mut Process, thread_idx: usize) -> Result<StepOutcome, ModelError> {
    let thread = process
        .threads
        .get_mut(thread_idx)
        .ok_or_else(|| ModelError::Config("no active thread".to_string()))?;
    thread.stack.pop();
    if thread.stack.is_empty() {
        process.threads.remove(thread_idx);
        return Ok(StepOutcome::Yield);
    }
    Ok(StepOutcome::Continue)
}

/// End-of-statement, dispatched on the current scope's flow (spec.md §4.2).
fn end_of_statement(
    process: &mut Process,
    thread_idx: usize,
    file: &File,
    pc: &str,
) -> Result<StepOutcome, ModelError> {
    let flow = current_flow(process, thread_idx)?;
    match flow {
        Flow::Atomic => {
            let next = path::next_stmt(file, pc)
                .ok_or_else(|| ModelError::evaluator(pc, "no next statement (ATOMIC)"))?;
            set_pc(process, thread_idx, next)?;
            Ok(StepOutcome::Continue)
        }
        Flow::Serial => {
            let next = path::next_stmt(file, pc)
                .ok_or_else(|| ModelError::evaluator(pc, "no next statement (SERIAL)"))?;
            set_pc(process, thread_idx, next)?;
            Ok(StepOutcome::Yield)
        }
        Flow::Oneof => {
            let end = path::end_of_block(pc)
                .ok_or_else(|| ModelError::evaluator(pc, "no enclosing block (ONEOF)"))?;
            set_pc(process, thread_idx, end)?;
            Ok(StepOutcome::Continue)
        }
        Flow::Parallel => end_of_statement_parallel(process, thread_idx, file, pc),
    }
}

fn end_of_statement_parallel(
    process: &mut Process,
    thread_idx: usize,
    file: &File,
    pc: &str,
) -> Result<StepOutcome, ModelError> {
    let block_path = path::enclosing_block(pc)
        .ok_or_else(|| ModelError::evaluator(pc, "no enclosing block (PARALLEL)"))?;
    let sibling_count = path::resolve(file, &block_path)
        .and_then(|n| n.as_block())
        .map(|b| b.stmts.len())
        .ok_or_else(|| ModelError::evaluator(pc, "PARALLEL enclosing block did not resolve"))?;

    let skip_stmts = {
        let frame = process
            .threads
            .get(thread_idx)
            .and_then(|t| t.stack.top())
            .ok_or_else(|| ModelError::Config("no active call frame".to_string()))?;
        frame.scope.skip_stmts.clone()
    };
    let all_skipped = (0..sibling_count).all(|i| skip_stmts.contains(&i));

    if all_skipped {
        let end = path::end_of_block(pc)
            .ok_or_else(|| ModelError::evaluator(pc, "no enclosing block (PARALLEL)"))?;
        set_pc(process, thread_idx, end)?;
        Ok(StepOutcome::Yield)
    } else {
        let remaining: Vec<usize> = (0..sibling_count).filter(|i| !skip_stmts.contains(i)).collect();
        let mut forks = Vec::with_capacity(remaining.len());
        for i in remaining {
            let mut fork = process.fork();
            set_pc(&mut fork, thread_idx, format!("{block_path}.Stmts[{i}]"))?;
            top_frame_mut(&mut fork, thread_idx)?.scope.skip_stmts.insert(i);
            forks.push(fork);
        }
        Ok(StepOutcome::ForkedYield(forks))
    }
}

/// End-of-block (spec.md §4.2): ascend the scope chain, strip the `.$`
/// marker the enclosing block just finished on, and re-dispatch
/// end-of-statement for whatever statement owned that block — repeating
/// while the result is itself another block boundary. A block with no
/// owning statement (a top-level action block, or a function's root block,
/// which has no `.Block` segment at all since [`path::resolve`] maps
/// `Functions[i]` directly to its body) means this call frame is done.
fn end_of_block(process: &mut Process, thread_idx: usize, files: &[File]) -> Result<StepOutcome, ModelError> {
    let mut guard = 0usize;
    loop {
        guard += 1;
        if guard > 100_000 {
            return Err(ModelError::LimitExceeded(
                "end_of_block did not converge".to_string(),
            ));
        }

        let (file_index, pc) = top_pc(process, thread_idx)?;
        if pc.is_empty() {
            return Err(ModelError::Config(
                "cannot resume a thread with a cleared program counter".to_string(),
            ));
        }

        let block_path = pc
            .strip_suffix(".$")
            .map(str::to_string)
            .ok_or_else(|| ModelError::evaluator(pc.clone(), "malformed end-of-block program counter"))?;

        pop_one_scope(process, thread_idx)?;

        // Strip the block itself, then find the `Stmts[i]` owning it,
        // discarding any variant-extraction tail left over from how we got
        // there (`.IfStmt.Branches[0]`, `.AnyStmt`, `.ForStmt`, ...).
        let owner = block_path
            .strip_suffix(".Block")
            .and_then(path::owning_statement);

        let owner = match owner {
            Some(o) => o,
            None => {
                let thread = process
                    .threads
                    .get_mut(thread_idx)
                    .ok_or_else(|| ModelError::Config("no active thread".to_string()))?;
                thread.stack.pop();
                if thread.stack.is_empty() {
                    process.threads.remove(thread_idx);
                    return Ok(StepOutcome::Yield);
                }
                continue;
            }
        };

        let file = files
            .get(file_index)
            .ok_or_else(|| ModelError::Config(format!("unknown file index {file_index}")))?;

        match end_of_statement(process, thread_idx, file, &owner)? {
            StepOutcome::Continue => {
                let (_, new_pc) = top_pc(process, thread_idx)?;
                if new_pc.is_empty() || path::is_end_marker(&new_pc) {
                    continue;
                }
                return Ok(StepOutcome::Continue);
            }
            other => return Ok(other),
        }
    }
}
