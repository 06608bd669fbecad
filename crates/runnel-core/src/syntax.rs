//! The expression language used inside `{{ ... }}` outputs and tag arguments.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or-expr     := and-expr ("or" and-expr)*
//! and-expr    := comparison ("and" comparison)*
//! comparison  := unary (("==" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "contains") unary)?
//! unary       := "not" unary | primary
//! primary     := literal | path | "(" or-expr (".." or-expr)? ")"
//! path        := ident ("." ident | "[" or-expr "]")*
//! ```
//!
//! Value expressions always evaluate synchronously. Only the filter pipeline
//! of an output (`{{ x | f: a | g }}`) can suspend, because filters may be
//! asynchronous — each stage feeds the next stage's input, strictly left to
//! right.
//!
//! ## Truthiness
//!
//! The falsy values are exactly `nil` (absent/undefined, `Null`) and `false`.
//! Everything else is truthy — including `0`, the empty string, the empty
//! array, and the empty object. This is a fixed contract; see the tests.

use serde_json::Value;

use crate::error::TemplateError;
use crate::filter::FilterRegistry;
use crate::scope::{PathStep, Scope};

/// A parsed value expression. Immutable after parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Path(Vec<Segment>),
    Range(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

/// One segment of a variable path. Bracket segments holding a non-literal
/// expression stay dynamic and are evaluated before resolution continues.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(i64),
    Dynamic(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    And,
    Or,
}

/// One filter invocation in an output pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
}

/// A full output expression: a value expression plus its filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputExpr {
    pub expr: Expression,
    pub filters: Vec<FilterCall>,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lex {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(Sym),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sym {
    Pipe,
    Colon,
    Comma,
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

pub(crate) fn lex(raw: &str) -> Result<Vec<Lex>, TemplateError> {
    let mut out = Vec::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(TemplateError::parse_message(format!(
                        "unterminated string in expression '{}'",
                        raw.trim()
                    )));
                }
                out.push(Lex::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                out.push(Lex::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                if c == '-' {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut float = false;
                if i < chars.len() && chars[i] == '.' && next_is_digit(&chars, i) {
                    float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if float {
                    out.push(Lex::Float(text.parse().map_err(|_| bad_number(&text))?));
                } else {
                    out.push(Lex::Int(text.parse().map_err(|_| bad_number(&text))?));
                }
            }
            '|' => {
                out.push(Lex::Sym(Sym::Pipe));
                i += 1;
            }
            ':' => {
                out.push(Lex::Sym(Sym::Colon));
                i += 1;
            }
            ',' => {
                out.push(Lex::Sym(Sym::Comma));
                i += 1;
            }
            '[' => {
                out.push(Lex::Sym(Sym::LBracket));
                i += 1;
            }
            ']' => {
                out.push(Lex::Sym(Sym::RBracket));
                i += 1;
            }
            '(' => {
                out.push(Lex::Sym(Sym::LParen));
                i += 1;
            }
            ')' => {
                out.push(Lex::Sym(Sym::RParen));
                i += 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    out.push(Lex::Sym(Sym::DotDot));
                    i += 2;
                } else {
                    out.push(Lex::Sym(Sym::Dot));
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                out.push(Lex::Sym(Sym::Eq));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                out.push(Lex::Sym(Sym::Ne));
                i += 2;
            }
            '<' => {
                match chars.get(i + 1) {
                    Some('=') => {
                        out.push(Lex::Sym(Sym::Le));
                        i += 2;
                    }
                    Some('>') => {
                        out.push(Lex::Sym(Sym::Ne));
                        i += 2;
                    }
                    _ => {
                        out.push(Lex::Sym(Sym::Lt));
                        i += 1;
                    }
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Lex::Sym(Sym::Ge));
                    i += 2;
                } else {
                    out.push(Lex::Sym(Sym::Gt));
                    i += 1;
                }
            }
            other => {
                return Err(TemplateError::parse_message(format!(
                    "unexpected character '{}' in expression '{}'",
                    other,
                    raw.trim()
                )));
            }
        }
    }
    Ok(out)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

fn bad_number(text: &str) -> TemplateError {
    TemplateError::parse_message(format!("malformed number literal '{}'", text))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub(crate) struct Cursor {
    lexemes: Vec<Lex>,
    idx: usize,
}

impl Cursor {
    pub(crate) fn new(lexemes: Vec<Lex>) -> Self {
        Self { lexemes, idx: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Lex> {
        self.lexemes.get(self.idx)
    }

    pub(crate) fn next(&mut self) -> Option<Lex> {
        let lexeme = self.lexemes.get(self.idx).cloned();
        if lexeme.is_some() {
            self.idx += 1;
        }
        lexeme
    }

    pub(crate) fn eat_sym(&mut self, sym: Sym) -> bool {
        if self.peek() == Some(&Lex::Sym(sym)) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Lex::Ident(name)) if name == word) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.idx >= self.lexemes.len()
    }
}

/// Parses a value expression (no filter pipeline).
pub fn parse_expression(raw: &str) -> Result<Expression, TemplateError> {
    let mut cursor = Cursor {
        lexemes: lex(raw)?,
        idx: 0,
    };
    if cursor.at_end() {
        return Err(TemplateError::parse_message("empty expression"));
    }
    let expr = parse_or(&mut cursor, raw)?;
    if !cursor.at_end() {
        return Err(trailing(raw));
    }
    Ok(expr)
}

/// Parses a full output expression: value expression plus filter pipeline.
pub fn parse_output(raw: &str) -> Result<OutputExpr, TemplateError> {
    let mut cursor = Cursor {
        lexemes: lex(raw)?,
        idx: 0,
    };
    if cursor.at_end() {
        return Err(TemplateError::parse_message("empty expression"));
    }
    let expr = parse_or(&mut cursor, raw)?;
    let mut filters = Vec::new();
    while cursor.eat_sym(Sym::Pipe) {
        let Some(Lex::Ident(name)) = cursor.next() else {
            return Err(TemplateError::parse_message(format!(
                "expected filter name after '|' in '{}'",
                raw.trim()
            )));
        };
        let mut args = Vec::new();
        if cursor.eat_sym(Sym::Colon) {
            loop {
                args.push(parse_or(&mut cursor, raw)?);
                if !cursor.eat_sym(Sym::Comma) {
                    break;
                }
            }
        }
        filters.push(FilterCall { name, args });
    }
    if !cursor.at_end() {
        return Err(trailing(raw));
    }
    Ok(OutputExpr { expr, filters })
}

fn trailing(raw: &str) -> TemplateError {
    TemplateError::parse_message(format!(
        "unexpected trailing input in expression '{}'",
        raw.trim()
    ))
}

pub(crate) fn parse_or(cursor: &mut Cursor, raw: &str) -> Result<Expression, TemplateError> {
    let mut lhs = parse_and(cursor, raw)?;
    while cursor.eat_keyword("or") {
        let rhs = parse_and(cursor, raw)?;
        lhs = binary(BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_and(cursor: &mut Cursor, raw: &str) -> Result<Expression, TemplateError> {
    let mut lhs = parse_comparison(cursor, raw)?;
    while cursor.eat_keyword("and") {
        let rhs = parse_comparison(cursor, raw)?;
        lhs = binary(BinaryOp::And, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_comparison(cursor: &mut Cursor, raw: &str) -> Result<Expression, TemplateError> {
    let lhs = parse_unary(cursor, raw)?;
    let op = match cursor.peek() {
        Some(Lex::Sym(Sym::Eq)) => Some(BinaryOp::Eq),
        Some(Lex::Sym(Sym::Ne)) => Some(BinaryOp::Ne),
        Some(Lex::Sym(Sym::Lt)) => Some(BinaryOp::Lt),
        Some(Lex::Sym(Sym::Le)) => Some(BinaryOp::Le),
        Some(Lex::Sym(Sym::Gt)) => Some(BinaryOp::Gt),
        Some(Lex::Sym(Sym::Ge)) => Some(BinaryOp::Ge),
        Some(Lex::Ident(name)) if name == "contains" => Some(BinaryOp::Contains),
        _ => None,
    };
    let Some(op) = op else { return Ok(lhs) };
    cursor.next();
    let rhs = parse_unary(cursor, raw)?;
    Ok(binary(op, lhs, rhs))
}

pub(crate) fn parse_unary(cursor: &mut Cursor, raw: &str) -> Result<Expression, TemplateError> {
    if cursor.eat_keyword("not") {
        let inner = parse_unary(cursor, raw)?;
        return Ok(Expression::Not(Box::new(inner)));
    }
    parse_primary(cursor, raw)
}

fn parse_primary(cursor: &mut Cursor, raw: &str) -> Result<Expression, TemplateError> {
    match cursor.next() {
        Some(Lex::Int(n)) => Ok(Expression::Literal(Value::from(n))),
        Some(Lex::Float(n)) => Ok(Expression::Literal(Value::from(n))),
        Some(Lex::Str(s)) => Ok(Expression::Literal(Value::from(s))),
        Some(Lex::Ident(name)) => match name.as_str() {
            "true" => Ok(Expression::Literal(Value::Bool(true))),
            "false" => Ok(Expression::Literal(Value::Bool(false))),
            "nil" | "null" => Ok(Expression::Literal(Value::Null)),
            _ => parse_path(cursor, raw, name),
        },
        Some(Lex::Sym(Sym::LParen)) => {
            let first = parse_or(cursor, raw)?;
            if cursor.eat_sym(Sym::DotDot) {
                let second = parse_or(cursor, raw)?;
                if !cursor.eat_sym(Sym::RParen) {
                    return Err(expected(")", raw));
                }
                return Ok(Expression::Range(Box::new(first), Box::new(second)));
            }
            if !cursor.eat_sym(Sym::RParen) {
                return Err(expected(")", raw));
            }
            Ok(first)
        }
        _ => Err(TemplateError::parse_message(format!(
            "expected a value in expression '{}'",
            raw.trim()
        ))),
    }
}

fn parse_path(cursor: &mut Cursor, raw: &str, first: String) -> Result<Expression, TemplateError> {
    let mut segments = vec![Segment::Key(first)];
    loop {
        if cursor.eat_sym(Sym::Dot) {
            let Some(Lex::Ident(name)) = cursor.next() else {
                return Err(expected("identifier after '.'", raw));
            };
            segments.push(Segment::Key(name));
        } else if cursor.eat_sym(Sym::LBracket) {
            let index = parse_or(cursor, raw)?;
            if !cursor.eat_sym(Sym::RBracket) {
                return Err(expected("]", raw));
            }
            segments.push(match index {
                Expression::Literal(Value::String(key)) => Segment::Key(key),
                Expression::Literal(Value::Number(ref n)) if n.as_i64().is_some() => {
                    Segment::Index(n.as_i64().unwrap())
                }
                dynamic => Segment::Dynamic(Box::new(dynamic)),
            });
        } else {
            return Ok(Expression::Path(segments));
        }
    }
}

fn expected(what: &str, raw: &str) -> TemplateError {
    TemplateError::parse_message(format!(
        "expected {} in expression '{}'",
        what,
        raw.trim()
    ))
}

fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluates a value expression against a scope. Never suspends; only filter
/// pipelines can.
pub fn eval(expr: &Expression, scope: &Scope) -> Result<Value, TemplateError> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Path(segments) => {
            let mut steps = Vec::with_capacity(segments.len());
            for segment in segments {
                steps.push(match segment {
                    Segment::Key(key) => PathStep::Key(key.clone()),
                    Segment::Index(index) => PathStep::Index(*index),
                    Segment::Dynamic(inner) => match eval(inner, scope)? {
                        Value::String(key) => PathStep::Key(key),
                        Value::Number(n) => match n.as_i64() {
                            Some(index) => PathStep::Index(index),
                            None => return Ok(Value::Null),
                        },
                        _ => return Ok(Value::Null),
                    },
                });
            }
            Ok(scope.resolve(&steps))
        }
        Expression::Range(lo, hi) => {
            let lo = int_operand(&eval(lo, scope)?, "range bound")?;
            let hi = int_operand(&eval(hi, scope)?, "range bound")?;
            Ok(Value::Array((lo..=hi).map(Value::from).collect()))
        }
        Expression::Not(inner) => Ok(Value::Bool(is_falsy(&eval(inner, scope)?))),
        Expression::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, scope),
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    scope: &Scope,
) -> Result<Value, TemplateError> {
    match op {
        BinaryOp::And => {
            let left = eval(lhs, scope)?;
            if is_falsy(&left) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&eval(rhs, scope)?)))
        }
        BinaryOp::Or => {
            let left = eval(lhs, scope)?;
            if is_truthy(&left) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&eval(rhs, scope)?)))
        }
        _ => {
            let left = eval(lhs, scope)?;
            let right = eval(rhs, scope)?;
            match op {
                BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
                BinaryOp::Contains => Ok(Value::Bool(contains(&left, &right))),
                BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                    let (a, b) = match (as_number(&left), as_number(&right)) {
                        (Some(a), Some(b)) => (a, b),
                        _ => {
                            return Err(TemplateError::render(format!(
                                "cannot order {} against {}",
                                type_name(&left),
                                type_name(&right)
                            )));
                        }
                    };
                    Ok(Value::Bool(match op {
                        BinaryOp::Lt => a < b,
                        BinaryOp::Le => a <= b,
                        BinaryOp::Gt => a > b,
                        _ => a >= b,
                    }))
                }
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            }
        }
    }
}

/// Evaluates an output expression, running its filter pipeline left to right.
/// Suspends at each asynchronous filter stage.
pub async fn eval_output(
    output: &OutputExpr,
    scope: &Scope,
    filters: &FilterRegistry,
) -> Result<Value, TemplateError> {
    let mut value = eval(&output.expr, scope)?;
    for call in &output.filters {
        let Some(handler) = filters.get(&call.name) else {
            return Err(TemplateError::render(format!(
                "unknown filter '{}'",
                call.name
            )));
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(eval(arg, scope)?);
        }
        value = handler.apply(value, args).await.map_err(|e| {
            TemplateError::render(format!("filter '{}': {}", call.name, e.message()))
        })?;
    }
    Ok(value)
}

/// Parses and evaluates a standalone expression — the same path an output
/// node takes, for hosts that want a single value instead of a rendering.
pub async fn evaluate(
    raw: &str,
    scope: &Scope,
    filters: &FilterRegistry,
) -> Result<Value, TemplateError> {
    let output = parse_output(raw)?;
    eval_output(&output, scope, filters).await
}

// ---------------------------------------------------------------------------
// Value semantics
// ---------------------------------------------------------------------------

/// Falsy values are exactly `Null` and `false`; see the module docs.
pub fn is_falsy(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(false))
}

pub fn is_truthy(value: &Value) -> bool {
    !is_falsy(value)
}

/// The single output coercion rule: `Null` renders as empty text, arrays
/// concatenate their elements, objects render as compact JSON.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // f64 Display already drops a zero fraction (2.0 -> "2").
                format!("{}", n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_display).collect(),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(&to_display(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(entries) => match needle {
            Value::String(key) => entries.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn int_operand(value: &Value, what: &str) -> Result<i64, TemplateError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| TemplateError::render(format!("{} out of range", what))),
        other => Err(TemplateError::render(format!(
            "{} must be a number, got {}",
            what,
            type_name(other)
        ))),
    }
}

/// Number of elements/characters, for the `size` virtual property and filter.
pub(crate) fn size_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(entries) => Some(entries.len()),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
