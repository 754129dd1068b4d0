//! AST path navigator (spec.md §4.1). Addresses any substructure of a
//! [`File`] by a dotted path where array indices are `[i]` and fields are
//! capitalized names (`Actions[0].Block.Stmts[2].IfStmt.Branches[1].Block`).
//! Every operation here is a pure string manipulation plus an AST
//! membership check — no interpretation of statement semantics happens in
//! this module.

use crate::ast::{Action, AnyStmt, Block, Branch, File, ForStmt, IfStmt, Statement, WhileStmt};

/// One parsed path segment.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Seg {
    Actions(usize),
    Functions(usize),
    Block,
    Stmts(usize),
    IfStmt,
    AnyStmt,
    ForStmt,
    WhileStmt,
    Branches(usize),
    /// The "past the last statement of the enclosing block" sentinel.
    End,
}

fn parse_segment(s: &str) -> Option<Seg> {
    if s == "$" {
        return Some(Seg::End);
    }
    if let Some(open) = s.find('[') {
        let name = &s[..open];
        let close = s.find(']')?;
        let idx: usize = s[open + 1..close].parse().ok()?;
        return match name {
            "Actions" => Some(Seg::Actions(idx)),
            "Functions" => Some(Seg::Functions(idx)),
            "Stmts" => Some(Seg::Stmts(idx)),
            "Branches" => Some(Seg::Branches(idx)),
            _ => None,
        };
    }
    match s {
        "Block" => Some(Seg::Block),
        "IfStmt" => Some(Seg::IfStmt),
        "AnyStmt" => Some(Seg::AnyStmt),
        "ForStmt" => Some(Seg::ForStmt),
        "WhileStmt" => Some(Seg::WhileStmt),
        _ => None,
    }
}

fn parse_path(path: &str) -> Option<Vec<Seg>> {
    if path.is_empty() {
        return Some(Vec::new());
    }
    path.split('.').map(parse_segment).collect()
}

/// A resolved AST substructure. Variant-extraction segments (`.IfStmt`,
/// `.AnyStmt`, ...) step from a [`Statement`] into the inner struct, the
/// same "cast" the dotted path vocabulary implies.
#[derive(Clone, Copy, Debug)]
pub enum AstNode<'a> {
    Action(&'a Action),
    Block(&'a Block),
    Statement(&'a Statement),
    IfStmt(&'a IfStmt),
    AnyStmt(&'a AnyStmt),
    ForStmt(&'a ForStmt),
    WhileStmt(&'a WhileStmt),
    Branch(&'a Branch),
}

impl<'a> AstNode<'a> {
    pub fn as_block(&self) -> Option<&'a Block> {
        match self {
            AstNode::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_statement(&self) -> Option<&'a Statement> {
        match self {
            AstNode::Statement(s) => Some(s),
            _ => None,
        }
    }
}

fn step<'a>(node: AstNode<'a>, seg: &Seg, file: &'a File) -> Option<AstNode<'a>> {
    match (node, seg) {
        (AstNode::Action(a), Seg::Block) => Some(AstNode::Block(&a.block)),
        (AstNode::Block(b), Seg::Stmts(i)) => b.stmts.get(*i).map(AstNode::Statement),
        (AstNode::Statement(Statement::IfStmt(s)), Seg::IfStmt) => Some(AstNode::IfStmt(s)),
        (AstNode::Statement(Statement::AnyStmt(s)), Seg::AnyStmt) => Some(AstNode::AnyStmt(s)),
        (AstNode::Statement(Statement::ForStmt(s)), Seg::ForStmt) => Some(AstNode::ForStmt(s)),
        (AstNode::Statement(Statement::WhileStmt(s)), Seg::WhileStmt) => {
            Some(AstNode::WhileStmt(s))
        }
        (AstNode::Statement(Statement::Block(b)), Seg::Block) => Some(AstNode::Block(b)),
        (AstNode::IfStmt(s), Seg::Branches(i)) => s.branches.get(*i).map(AstNode::Branch),
        (AstNode::Branch(b), Seg::Block) => Some(AstNode::Block(&b.block)),
        (AstNode::AnyStmt(s), Seg::Block) => Some(AstNode::Block(&s.block)),
        (AstNode::ForStmt(s), Seg::Block) => Some(AstNode::Block(&s.block)),
        (AstNode::WhileStmt(s), Seg::Block) => Some(AstNode::Block(&s.block)),
        _ => {
            let _ = file;
            None
        }
    }
}

/// Resolve a dotted path against `file`. Returns `None` if any segment is
/// missing, out-of-range, or doesn't match the node it's applied to.
pub fn resolve<'a>(file: &'a File, path: &str) -> Option<AstNode<'a>> {
    let segs = parse_path(path)?;
    let mut iter = segs.into_iter();
    let first = iter.next()?;
    let mut node = match first {
        Seg::Actions(i) => AstNode::Action(file.actions.get(i)?),
        Seg::Functions(i) => AstNode::Block(&file.functions.get(i)?.block),
        _ => return None,
    };
    for seg in iter {
        node = step(node, &seg, file)?;
    }
    Some(node)
}

/// Find the byte range of the last top-level `Stmts[i]` segment.
fn rfind_stmts_segment(path: &str) -> Option<(usize, usize, usize)> {
    // Walk segments so we parse indices structurally rather than via
    // string search, which would be fooled by indices that are themselves
    // multi-digit substrings of other numbers.
    let mut start = 0usize;
    let mut best: Option<(usize, usize, usize)> = None;
    for part in path.split('.') {
        let end = start + part.len();
        if let Some(open) = part.find('[') {
            if &part[..open] == "Stmts" {
                if let Some(close) = part.find(']') {
                    if let Ok(idx) = part[open + 1..close].parse::<usize>() {
                        best = Some((start, end, idx));
                    }
                }
            }
        }
        start = end + 1; // +1 for the '.'
    }
    best
}

/// The block a `Stmts[i]` segment belongs to — the path text before that
/// segment. Unlike [`parent_block`] this doesn't require the path to
/// literally end in `.Block`; it locates the block via the rightmost
/// `Stmts[i]` token, so it also works on a statement path that has extra
/// trailing segments (`.IfStmt.Branches[0]`, `.AnyStmt`, ...).
pub fn enclosing_block(path: &str) -> Option<String> {
    let (start, _end, _idx) = rfind_stmts_segment(path)?;
    Some(path[..start.saturating_sub(if start > 0 { 1 } else { 0 })].to_string())
}

/// The nearest enclosing `Stmts[i]` path — `path` truncated right after that
/// segment, discarding any trailing variant-extraction tail
/// (`.IfStmt.Branches[0]`, `.AnyStmt`, `.ForStmt.Block`, ...). `None` if
/// `path` contains no `Stmts[i]` segment at all, which is the case for a
/// top-level action or function block — those have no owning statement.
pub fn owning_statement(path: &str) -> Option<String> {
    let (_start, end, _idx) = rfind_stmts_segment(path)?;
    Some(path[..end].to_string())
}

/// Given a path ending in `Stmts[i]`, return `Stmts[i+1]` within the same
/// block, or the block's end marker if `i+1` is out of range (spec.md
/// §4.1). Returns `None` if `path` does not contain a `Stmts[i]` segment or
/// the enclosing block cannot be resolved.
pub fn next_stmt(file: &File, path: &str) -> Option<String> {
    let (start, end, idx) = rfind_stmts_segment(path)?;
    let block_path = &path[..start.saturating_sub(if start > 0 { 1 } else { 0 })];
    let block = resolve(file, block_path)?.as_block()?;
    if idx + 1 < block.stmts.len() {
        Some(format!("{}.Stmts[{}]", block_path, idx + 1))
    } else {
        let _ = end;
        Some(format!("{}.$", block_path))
    }
}

/// Truncate to the nearest `...Block` suffix.
pub fn parent_block(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split('.').collect();
    for end in (1..=parts.len()).rev() {
        if parts[end - 1] == "Block" {
            return Some(parts[..end].join("."));
        }
    }
    None
}

/// Replace the last `Stmts[i]` with `$`.
pub fn end_of_block(path: &str) -> Option<String> {
    let (start, _end, _idx) = rfind_stmts_segment(path)?;
    let block_path = &path[..start.saturating_sub(if start > 0 { 1 } else { 0 })];
    Some(format!("{}.$", block_path))
}

/// Truncate at the last occurrence of a `.Block` suffix, dropping it.
pub fn remove_last_block(path: &str) -> Option<String> {
    let block = parent_block(path)?;
    let trimmed = block.strip_suffix(".Block").unwrap_or(&block);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Truncate at the last occurrence of `.ForStmt`.
pub fn for_stmt(path: &str) -> Option<String> {
    truncate_at_suffix(path, "ForStmt")
}

/// Truncate at the last occurrence of `.WhileStmt`.
pub fn while_stmt(path: &str) -> Option<String> {
    truncate_at_suffix(path, "WhileStmt")
}

fn truncate_at_suffix(path: &str, token: &str) -> Option<String> {
    let parts: Vec<&str> = path.split('.').collect();
    for end in (1..=parts.len()).rev() {
        if parts[end - 1] == token {
            return Some(parts[..end].join("."));
        }
    }
    None
}

/// `true` iff `path` is the "past the last statement" sentinel (ends with
/// literal `$`), i.e. `Block.$`.
pub fn is_end_marker(path: &str) -> bool {
    path.ends_with(".$") || path == "$"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Flow, PyStmt};

    fn sample_file() -> File {
        File {
            states: vec![],
            actions: vec![Action {
                name: "Incr".to_string(),
                block: Block {
                    flow: Flow::Atomic,
                    stmts: vec![
                        Statement::PyStmt(PyStmt {
                            code: "count = count + 1".to_string(),
                        }),
                        Statement::PyStmt(PyStmt {
                            code: "count = count + 1".to_string(),
                        }),
                    ],
                },
            }],
            functions: vec![],
            invariants: vec![],
        }
    }

    #[test]
    fn resolve_action_block_stmt() {
        let file = sample_file();
        let node = resolve(&file, "Actions[0].Block.Stmts[1]").unwrap();
        assert!(matches!(node, AstNode::Statement(Statement::PyStmt(_))));
    }

    #[test]
    fn resolve_out_of_range_is_none() {
        let file = sample_file();
        assert!(resolve(&file, "Actions[5]").is_none());
        assert!(resolve(&file, "Actions[0].Block.Stmts[9]").is_none());
    }

    #[test]
    fn next_stmt_advances_then_hits_end_marker() {
        let file = sample_file();
        let next = next_stmt(&file, "Actions[0].Block.Stmts[0]").unwrap();
        assert_eq!(next, "Actions[0].Block.Stmts[1]");
        let past_end = next_stmt(&file, "Actions[0].Block.Stmts[1]").unwrap();
        assert_eq!(past_end, "Actions[0].Block.$");
        assert!(is_end_marker(&past_end));
    }

    #[test]
    fn end_of_block_replaces_stmts_index() {
        let path = "Actions[0].Block.Stmts[1]";
        assert_eq!(end_of_block(path).unwrap(), "Actions[0].Block.$");
    }

    #[test]
    fn parent_block_truncates_to_nearest_block() {
        let path = "Actions[0].Block.Stmts[1].IfStmt.Branches[0].Block";
        assert_eq!(parent_block(path).unwrap(), path);
        let path2 = "Actions[0].Block.Stmts[1]";
        assert_eq!(parent_block(path2).unwrap(), "Actions[0].Block");
    }
}
