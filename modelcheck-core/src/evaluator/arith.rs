//! `ArithEvaluator` — a small reference [`Evaluator`] covering integers,
//! booleans, strings, and sets, with the handful of operators the spec's
//! concrete test scenarios need (`+ - * / == != < > <= >= and or not in`,
//! assignment, and set/range literals). It is not a general-purpose
//! dynamic-language runtime — that remains the out-of-scope external
//! collaborator (spec.md §1) — but it is a real, working `Evaluator` that
//! lets the engine run end to end without a fake.

use super::Evaluator;
use crate::ast::StateDecl;
use crate::env::Env;
use crate::error::ModelError;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------- values --

#[derive(Clone, Debug, PartialEq)]
pub struct BoolValue(pub bool);

impl Value for BoolValue {
    fn type_tag(&self) -> &str {
        "bool"
    }
    fn truthy(&self) -> bool {
        self.0
    }
    fn canonical_string(&self) -> String {
        if self.0 { "True".to_string() } else { "False".to_string() }
    }
    fn dyn_clone(&self) -> Arc<dyn Value> {
        Arc::new(self.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntValue(pub i64);

impl Value for IntValue {
    fn type_tag(&self) -> &str {
        "int"
    }
    fn truthy(&self) -> bool {
        self.0 != 0
    }
    fn canonical_string(&self) -> String {
        self.0.to_string()
    }
    fn dyn_clone(&self) -> Arc<dyn Value> {
        Arc::new(self.clone())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StrValue(pub String);

impl Value for StrValue {
    fn type_tag(&self) -> &str {
        "str"
    }
    fn truthy(&self) -> bool {
        !self.0.is_empty()
    }
    fn canonical_string(&self) -> String {
        self.0.clone()
    }
    fn dyn_clone(&self) -> Arc<dyn Value> {
        Arc::new(self.clone())
    }
}

/// A set is the one type that must support real iteration and must be
/// deep-cloned on fork (spec.md §3): mutating one fork's set must never be
/// visible to another fork holding the "same" variable.
#[derive(Clone, Debug)]
pub struct SetValue(pub Vec<Arc<dyn Value>>);

impl Value for SetValue {
    fn type_tag(&self) -> &str {
        "set"
    }
    fn truthy(&self) -> bool {
        !self.0.is_empty()
    }
    fn canonical_string(&self) -> String {
        let mut strings: Vec<String> = self.0.iter().map(|v| v.canonical_string()).collect();
        strings.sort();
        format!("{{{}}}", strings.join(", "))
    }
    fn iter_values(&self) -> Option<Vec<Arc<dyn Value>>> {
        Some(self.0.iter().map(|v| v.dyn_clone()).collect())
    }
    fn dyn_clone(&self) -> Arc<dyn Value> {
        Arc::new(SetValue(self.0.iter().map(|v| v.dyn_clone()).collect()))
    }
}

// -------------------------------------------------------------- tokenizer --

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    Sym(&'static str),
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Vec<Tok> {
        let mut toks = Vec::new();
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.chars.next();
            }
            let Some(&c) = self.chars.peek() else {
                toks.push(Tok::Eof);
                break;
            };
            if c.is_ascii_digit() {
                let mut s = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    s.push(self.chars.next().unwrap());
                }
                toks.push(Tok::Int(s.parse().unwrap_or(0)));
            } else if c.is_alphabetic() || c == '_' {
                let mut s = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
                    s.push(self.chars.next().unwrap());
                }
                toks.push(Tok::Ident(s));
            } else if c == '"' || c == '\'' {
                let quote = c;
                self.chars.next();
                let mut s = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c == quote {
                        self.chars.next();
                        break;
                    }
                    s.push(self.chars.next().unwrap());
                }
                toks.push(Tok::Str(s));
            } else {
                let two: String = {
                    let mut it = self.chars.clone();
                    let a = it.next();
                    let b = it.next();
                    match (a, b) {
                        (Some(a), Some(b)) => format!("{a}{b}"),
                        _ => String::new(),
                    }
                };
                let sym = match two.as_str() {
                    "==" | "!=" | "<=" | ">=" => {
                        self.chars.next();
                        self.chars.next();
                        match two.as_str() {
                            "==" => "==",
                            "!=" => "!=",
                            "<=" => "<=",
                            _ => ">=",
                        }
                    }
                    _ => {
                        self.chars.next();
                        match c {
                            '=' => "=",
                            '<' => "<",
                            '>' => ">",
                            '+' => "+",
                            '-' => "-",
                            '*' => "*",
                            '/' => "/",
                            '(' => "(",
                            ')' => ")",
                            '{' => "{",
                            '}' => "}",
                            ',' => ",",
                            ';' => ";",
                            _ => continue,
                        }
                    }
                };
                toks.push(Tok::Sym(sym));
            }
        }
        toks
    }
}

// ----------------------------------------------------------------- parser --

#[derive(Clone, Debug)]
enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    Ident(String),
    Set(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn new(toks: Vec<Tok>) -> Self {
        Self { toks, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat_sym(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Tok::Sym(x) if *x == s) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        loop {
            if matches!(self.peek(), Tok::Ident(s) if s == "or") {
                self.bump();
                let rhs = self.parse_and()?;
                lhs = Expr::Binary("or", Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        loop {
            if matches!(self.peek(), Tok::Ident(s) if s == "and") {
                self.bump();
                let rhs = self.parse_not()?;
                lhs = Expr::Binary("and", Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Tok::Ident(s) if s == "not") {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary("not", Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.eat_sym(op) {
                let rhs = self.parse_additive()?;
                let op_static: &'static str = match op {
                    "==" => "==",
                    "!=" => "!=",
                    "<=" => "<=",
                    ">=" => ">=",
                    "<" => "<",
                    _ => ">",
                };
                return Ok(Expr::Binary(op_static, Box::new(lhs), Box::new(rhs)));
            }
        }
        if matches!(self.peek(), Tok::Ident(s) if s == "in") {
            self.bump();
            let rhs = self.parse_additive()?;
            return Ok(Expr::Binary("in", Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            if self.eat_sym("+") {
                let rhs = self.parse_multiplicative()?;
                lhs = Expr::Binary("+", Box::new(lhs), Box::new(rhs));
            } else if self.eat_sym("-") {
                let rhs = self.parse_multiplicative()?;
                lhs = Expr::Binary("-", Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_sym("*") {
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary("*", Box::new(lhs), Box::new(rhs));
            } else if self.eat_sym("/") {
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary("/", Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat_sym("-") {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary("-", Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Ident(s) if s == "True" => Ok(Expr::Bool(true)),
            Tok::Ident(s) if s == "False" => Ok(Expr::Bool(false)),
            Tok::Ident(s) => Ok(Expr::Ident(s)),
            Tok::Sym("(") => {
                let e = self.parse_expr()?;
                if !self.eat_sym(")") {
                    return Err("expected ')'".to_string());
                }
                Ok(e)
            }
            Tok::Sym("{") => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Tok::Sym("}")) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_sym(",") {
                            break;
                        }
                    }
                }
                if !self.eat_sym("}") {
                    return Err("expected '}'".to_string());
                }
                if items.len() == 1 {
                    if let Some(first) = items.pop() {
                        return Ok(Expr::Set(vec![first]));
                    }
                }
                Ok(Expr::Set(items))
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }
}

/// `range(a, b)` sugar, parsed as a two-argument call.
fn try_parse_range(toks: &[Tok]) -> Option<Expr> {
    if let [Tok::Ident(name), Tok::Sym("("), rest @ ..] = toks {
        if name == "range" {
            let close = rest.iter().position(|t| matches!(t, Tok::Sym(")")))?;
            let inner = &rest[..close];
            let comma = inner.iter().position(|t| matches!(t, Tok::Sym(",")))?;
            let mut lo = Parser::new(inner[..comma].iter().cloned().chain([Tok::Eof]).collect());
            let mut hi = Parser::new(
                inner[comma + 1..]
                    .iter()
                    .cloned()
                    .chain([Tok::Eof])
                    .collect(),
            );
            let lo = lo.parse_expr().ok()?;
            let hi = hi.parse_expr().ok()?;
            return Some(Expr::Range(Box::new(lo), Box::new(hi)));
        }
    }
    None
}

fn parse_expr_str(src: &str) -> Result<Expr, String> {
    let toks = Lexer::new(src).tokenize();
    if let Some(range) = try_parse_range(&toks) {
        return Ok(range);
    }
    let mut parser = Parser::new(toks);
    parser.parse_expr()
}

// -------------------------------------------------------------- evaluate --

fn eval(expr: &Expr, env: &Env, filename: &str) -> Result<Arc<dyn Value>, ModelError> {
    match expr {
        Expr::Int(n) => Ok(Arc::new(IntValue(*n))),
        Expr::Str(s) => Ok(Arc::new(StrValue(s.clone()))),
        Expr::Bool(b) => Ok(Arc::new(BoolValue(*b))),
        Expr::Ident(name) => env.get(name).map(Arc::clone).ok_or_else(|| {
            ModelError::evaluator(filename, format!("name '{name}' is not defined"))
        }),
        Expr::Set(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env, filename)?);
            }
            Ok(Arc::new(SetValue(values)))
        }
        Expr::Range(lo, hi) => {
            let lo = as_int(&eval(lo, env, filename)?, filename)?;
            let hi = as_int(&eval(hi, env, filename)?, filename)?;
            let values: Vec<Arc<dyn Value>> =
                (lo..hi).map(|n| Arc::new(IntValue(n)) as Arc<dyn Value>).collect();
            Ok(Arc::new(SetValue(values)))
        }
        Expr::Unary("not", inner) => {
            let v = eval(inner, env, filename)?;
            Ok(Arc::new(BoolValue(!v.truthy())))
        }
        Expr::Unary("-", inner) => {
            let v = as_int(&eval(inner, env, filename)?, filename)?;
            Ok(Arc::new(IntValue(-v)))
        }
        Expr::Unary(op, _) => Err(ModelError::evaluator(filename, format!("bad unary op {op}"))),
        Expr::Binary("and", lhs, rhs) => {
            let l = eval(lhs, env, filename)?;
            if !l.truthy() {
                return Ok(l);
            }
            eval(rhs, env, filename)
        }
        Expr::Binary("or", lhs, rhs) => {
            let l = eval(lhs, env, filename)?;
            if l.truthy() {
                return Ok(l);
            }
            eval(rhs, env, filename)
        }
        Expr::Binary("in", lhs, rhs) => {
            let needle = eval(lhs, env, filename)?;
            let haystack = eval(rhs, env, filename)?;
            let elems = haystack.iter_values().ok_or_else(|| {
                ModelError::evaluator(filename, "right side of 'in' is not iterable")
            })?;
            Ok(Arc::new(BoolValue(
                elems.iter().any(|e| e.value_eq(needle.as_ref())),
            )))
        }
        Expr::Binary(op @ ("==" | "!="), lhs, rhs) => {
            let l = eval(lhs, env, filename)?;
            let r = eval(rhs, env, filename)?;
            let eq = l.value_eq(r.as_ref());
            Ok(Arc::new(BoolValue(if *op == "==" { eq } else { !eq })))
        }
        Expr::Binary(op @ ("<" | ">" | "<=" | ">="), lhs, rhs) => {
            let l = as_int(&eval(lhs, env, filename)?, filename)?;
            let r = as_int(&eval(rhs, env, filename)?, filename)?;
            let result = match *op {
                "<" => l < r,
                ">" => l > r,
                "<=" => l <= r,
                _ => l >= r,
            };
            Ok(Arc::new(BoolValue(result)))
        }
        Expr::Binary(op @ ("+" | "-" | "*" | "/"), lhs, rhs) => {
            let l = as_int(&eval(lhs, env, filename)?, filename)?;
            let r = as_int(&eval(rhs, env, filename)?, filename)?;
            let result = match *op {
                "+" => l + r,
                "-" => l - r,
                "*" => l * r,
                _ => {
                    if r == 0 {
                        return Err(ModelError::evaluator(filename, "division by zero"));
                    }
                    l / r
                }
            };
            Ok(Arc::new(IntValue(result)))
        }
        Expr::Binary(op, _, _) => {
            Err(ModelError::evaluator(filename, format!("bad binary op {op}")))
        }
    }
}

fn as_int(v: &Arc<dyn Value>, filename: &str) -> Result<i64, ModelError> {
    v.canonical_string()
        .parse::<i64>()
        .map_err(|_| ModelError::evaluator(filename, format!("expected int, got {}", v.type_tag())))
}

/// A small reference [`Evaluator`]. See module docs.
#[derive(Debug, Default)]
pub struct ArithEvaluator;

impl Evaluator for ArithEvaluator {
    fn exec_init(&self, states: &[StateDecl]) -> Result<Env, ModelError> {
        let mut env = Env::new();
        for decl in states {
            let expr = parse_expr_str(&decl.py_expr)
                .map_err(|e| ModelError::evaluator("init", e))?;
            let value = eval(&expr, &env, "init")?;
            env.insert(decl.name.clone(), value);
        }
        Ok(env)
    }

    fn exec_stmt(&self, filename: &str, code: &str, env_in: &Env) -> Result<Env, ModelError> {
        let mut env = env_in.clone();
        for stmt in code.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let Some((lhs, rhs)) = split_assignment(stmt) else {
                return Err(ModelError::evaluator(
                    filename,
                    format!("unsupported statement: {stmt}"),
                ));
            };
            let expr = parse_expr_str(rhs).map_err(|e| ModelError::evaluator(filename, e))?;
            let value = eval(&expr, &env, filename)?;
            env.insert(lhs.trim().to_string(), value);
        }
        Ok(env)
    }

    fn eval_expr(
        &self,
        filename: &str,
        expr: &str,
        env_in: &Env,
    ) -> Result<Arc<dyn Value>, ModelError> {
        let parsed = parse_expr_str(expr).map_err(|e| ModelError::evaluator(filename, e))?;
        eval(&parsed, env_in, filename)
    }
}

/// Splits `name = expr` on the first top-level `=` that isn't part of
/// `==`, `!=`, `<=`, `>=`.
fn split_assignment(stmt: &str) -> Option<(&str, &str)> {
    let bytes = stmt.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            let prev = if i > 0 { bytes[i - 1] } else { 0 };
            let next = if i + 1 < bytes.len() { bytes[i + 1] } else { 0 };
            if next != b'=' && !matches!(prev, b'=' | b'!' | b'<' | b'>') {
                return Some((&stmt[..i], &stmt[i + 1..]));
            }
        }
        i += 1;
    }
    None
}

impl fmt::Display for BoolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_and_arithmetic() {
        let ev = ArithEvaluator;
        let mut env = Env::new();
        env.insert("count", Arc::new(IntValue(0)));
        let out = ev.exec_stmt("t", "count = count + 1", &env).unwrap();
        assert_eq!(out.get("count").unwrap().canonical_string(), "1");
    }

    #[test]
    fn set_membership_and_iteration() {
        let ev = ArithEvaluator;
        let env = Env::new();
        let v = ev.eval_expr("t", "2 in {1, 2, 3}", &env).unwrap();
        assert!(v.truthy());
        let set = ev.eval_expr("t", "{1, 2, 3}", &env).unwrap();
        assert_eq!(set.iter_values().unwrap().len(), 3);
    }

    #[test]
    fn range_expands_to_set() {
        let ev = ArithEvaluator;
        let env = Env::new();
        let v = ev.eval_expr("t", "range(0, 3)", &env).unwrap();
        let elems = v.iter_values().unwrap();
        assert_eq!(elems.len(), 3);
    }

    #[test]
    fn multiple_statements_separated_by_semicolons() {
        let ev = ArithEvaluator;
        let mut env = Env::new();
        env.insert("a", Arc::new(IntValue(0)));
        env.insert("b", Arc::new(IntValue(0)));
        let out = ev.exec_stmt("t", "a = a + 1; b = b + 2", &env).unwrap();
        assert_eq!(out.get("a").unwrap().canonical_string(), "1");
        assert_eq!(out.get("b").unwrap().canonical_string(), "2");
    }
}
