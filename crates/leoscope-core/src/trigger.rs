//! Trigger evaluator. A small boolean grammar over a live key/value
//! snapshot:
//!
//! ```text
//! expr   := conj ( 'or'  conj )*
//! conj   := atom ( 'and' atom )*
//! atom   := ident cmp literal | '(' expr ')'
//! ident  := [A-Za-z_][A-Za-z_0-9.]*
//! cmp    := '>' | '<' | '>=' | '<=' | '==' | '!='
//! literal:= number | quoted-string
//! ```
//!
//! Parsing is recursive descent over a space-separated token stream.
//! Mixed-type comparisons and unresolved identifiers fail closed to
//! `false` rather than erroring — only a genuine grammar error at parse
//! time is an error.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

/// The live environmental snapshot the evaluator reads from, passed by
/// reference rather than held as ambient global state, with
/// last-writer-wins per-key updates.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    values: HashMap<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone)]
enum Ast {
    Atom {
        ident: String,
        cmp: Cmp,
        literal: Literal,
    },
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

#[derive(Debug)]
pub struct TriggerParseError(String);

impl fmt::Display for TriggerParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger parse error: {}", self.0)
    }
}

impl std::error::Error for TriggerParseError {}

struct Tokens<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            tokens: tokenize(src),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a str> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, lit: &str) -> Result<(), TriggerParseError> {
        match self.next() {
            Some(t) if t == lit => Ok(()),
            other => Err(TriggerParseError(format!(
                "expected '{lit}', found {other:?}"
            ))),
        }
    }
}

/// Splits on whitespace but keeps parens attached to neighbouring tokens
/// separated, so `(foo` becomes `(` and `foo`.
fn tokenize(src: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for word in src.split_whitespace() {
        let mut rest = word;
        while let Some(stripped) = rest.strip_prefix('(') {
            out.push("(");
            rest = stripped;
        }
        let mut trailing = 0;
        while rest.ends_with(')') {
            rest = &rest[..rest.len() - 1];
            trailing += 1;
        }
        if !rest.is_empty() {
            out.push(rest);
        }
        for _ in 0..trailing {
            out.push(")");
        }
    }
    out
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return false,
    }
    chars.all(is_ident_char)
}

fn parse_cmp(tok: &str) -> Option<Cmp> {
    match tok {
        ">" => Some(Cmp::Gt),
        "<" => Some(Cmp::Lt),
        ">=" => Some(Cmp::Ge),
        "<=" => Some(Cmp::Le),
        "==" => Some(Cmp::Eq),
        "!=" => Some(Cmp::Ne),
        _ => None,
    }
}

fn parse_literal(tok: &str) -> Result<Literal, TriggerParseError> {
    if let Some(inner) = tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Literal::Text(inner.to_string()));
    }
    tok.parse::<f64>()
        .map(Literal::Number)
        .map_err(|_| TriggerParseError(format!("invalid literal: {tok}")))
}

fn parse_expr(t: &mut Tokens) -> Result<Ast, TriggerParseError> {
    let mut node = parse_conj(t)?;
    while let Some("or") = t.peek() {
        t.next();
        let rhs = parse_conj(t)?;
        node = Ast::Or(Box::new(node), Box::new(rhs));
    }
    Ok(node)
}

fn parse_conj(t: &mut Tokens) -> Result<Ast, TriggerParseError> {
    let mut node = parse_atom(t)?;
    while let Some("and") = t.peek() {
        t.next();
        let rhs = parse_atom(t)?;
        node = Ast::And(Box::new(node), Box::new(rhs));
    }
    Ok(node)
}

fn parse_atom(t: &mut Tokens) -> Result<Ast, TriggerParseError> {
    if let Some("(") = t.peek() {
        t.next();
        let inner = parse_expr(t)?;
        t.expect(")")?;
        return Ok(inner);
    }

    let ident = t
        .next()
        .ok_or_else(|| TriggerParseError("unexpected end of expression".into()))?;
    if !valid_ident(ident) {
        return Err(TriggerParseError(format!("invalid identifier: {ident}")));
    }

    let cmp_tok = t
        .next()
        .ok_or_else(|| TriggerParseError("expected comparison operator".into()))?;
    let cmp = parse_cmp(cmp_tok)
        .ok_or_else(|| TriggerParseError(format!("invalid comparison operator: {cmp_tok}")))?;

    let literal_tok = t
        .next()
        .ok_or_else(|| TriggerParseError("expected literal".into()))?;
    let literal = parse_literal(literal_tok)?;

    Ok(Ast::Atom {
        ident: ident.to_string(),
        cmp,
        literal,
    })
}

fn parse(src: &str) -> Result<Ast, TriggerParseError> {
    let mut tokens = Tokens::new(src);
    let ast = parse_expr(&mut tokens)?;
    if tokens.peek().is_some() {
        return Err(TriggerParseError(format!(
            "unexpected trailing token: {:?}",
            tokens.peek()
        )));
    }
    Ok(ast)
}

/// Parses only — used at admission time to reject malformed trigger
/// expressions before they are ever evaluated.
pub fn verify_trigger(expr: &str) -> Result<(), TriggerParseError> {
    parse(expr).map(|_| ())
}

fn eval_cmp_number(cmp: Cmp, a: f64, b: f64) -> bool {
    match cmp {
        Cmp::Gt => a > b,
        Cmp::Lt => a < b,
        Cmp::Ge => a >= b,
        Cmp::Le => a <= b,
        Cmp::Eq => a == b,
        Cmp::Ne => a != b,
    }
}

fn eval_cmp_text(cmp: Cmp, a: &str, b: &str) -> bool {
    match cmp {
        Cmp::Eq => a == b,
        Cmp::Ne => a != b,
        // Ordering comparisons on strings are outside the fixed grammar's
        // intent; fail closed rather than guess a collation.
        _ => false,
    }
}

fn eval_ast(ast: &Ast, snapshot: &Snapshot) -> bool {
    match ast {
        Ast::And(l, r) => eval_ast(l, snapshot) && eval_ast(r, snapshot),
        Ast::Or(l, r) => eval_ast(l, snapshot) || eval_ast(r, snapshot),
        Ast::Atom {
            ident,
            cmp,
            literal,
        } => {
            let Some(value) = snapshot.get(ident) else {
                return false; // unresolved ident fails closed
            };
            match (value, literal) {
                (Value::Number(a), Literal::Number(b)) => eval_cmp_number(*cmp, *a, *b),
                (Value::Text(a), Literal::Text(b)) => eval_cmp_text(*cmp, a, b),
                _ => false, // mixed-type comparison fails closed
            }
        }
    }
}

/// Parses and evaluates `expr` against `snapshot`, just-in-time before a
/// firing. A parse error also evaluates to `false` — the coordinator
/// already rejected unparseable triggers at admission (`verify_trigger`),
/// so reaching this point with a bad expression means the definition
/// changed after admission; fail closed rather than crash the executor.
pub fn evaluate(expr: &str, snapshot: &Snapshot) -> bool {
    match parse(expr) {
        Ok(ast) => eval_ast(&ast, snapshot),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        assert!(verify_trigger("satellite_elevation > 30").is_ok());
    }

    #[test]
    fn parses_and_or_with_parens() {
        assert!(verify_trigger("(a > 1 and b < 2) or c == \"x\"").is_ok());
    }

    #[test]
    fn rejects_malformed_expression() {
        assert!(verify_trigger("a >").is_err());
        assert!(verify_trigger("a > 1 and").is_err());
        assert!(verify_trigger("1 > 2 3").is_err());
    }

    #[test]
    fn unresolved_ident_fails_closed() {
        let snap = Snapshot::new();
        assert!(!evaluate("satellite_elevation > 30", &snap));
    }

    #[test]
    fn evaluates_numeric_threshold() {
        let mut snap = Snapshot::new();
        snap.set("satellite_elevation", Value::Number(12.0));
        assert!(!evaluate("satellite_elevation > 30", &snap));
        snap.set("satellite_elevation", Value::Number(45.0));
        assert!(evaluate("satellite_elevation > 30", &snap));
    }

    #[test]
    fn mixed_type_comparison_fails_closed() {
        let mut snap = Snapshot::new();
        snap.set("mode", Value::Text("clear".into()));
        assert!(!evaluate("mode > 3", &snap));
    }

    #[test]
    fn and_or_precedence_and_dotted_idents() {
        let mut snap = Snapshot::new();
        snap.set("sat.elevation", Value::Number(40.0));
        snap.set("weather.clear", Value::Number(1.0));
        snap.set("wind", Value::Number(50.0));
        // or binds loosest: (a and b) or c
        assert!(evaluate(
            "sat.elevation > 30 and weather.clear == 1 or wind > 100",
            &snap
        ));
    }

    #[test]
    fn round_trip_stability_reparses_same_result() {
        let expr = "a > 1 and (b == \"x\" or c != 2)";
        assert!(verify_trigger(expr).is_ok());
        assert!(verify_trigger(expr).is_ok());
    }
}
