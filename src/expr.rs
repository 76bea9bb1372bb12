//! Expression parser and evaluator for predicates and formulas.
//!
//! Supports expressions like:
//! - `rating * 2 + 1`
//! - `!image.isEmpty()`
//! - `round(track_scores * 100) / 10`
//! - `file.ext == 'md' && rating >= 4`
//! - `year(release_date) < 2010`
//! - `formula.score > 3 || note.artist.startsWith('D')`
//!
//! Property references may be dotted (`file.name`, `formula.total`). A
//! dotted path resolves to the longest prefix that names a property; the
//! remaining segments are member accesses such as `.length`.

use crate::record::Record;
use crate::value::{parse_number, Value};
use chrono::{Datelike, Local};
use std::borrow::Cow;
use thiserror::Error;

/// Maximum nesting of parentheses, calls and unary operators.
pub const MAX_DEPTH: usize = 64;
/// Maximum number of operator/call nodes in one expression.
pub const MAX_NODES: usize = 1024;
/// Maximum height of a parsed tree. Evaluation recurses once per level.
pub const MAX_HEIGHT: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("number with a leading zero at position {0}")]
    LeadingZero(usize),

    #[error("expected {expected}, got {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unsupported method '{0}'")]
    UnsupportedMethod(String),

    #[error("'{method}' is not supported on {target}")]
    TypeMismatch { method: String, target: String },

    #[error("cannot read '{0}' of null")]
    NullAccess(String),

    #[error("expression too complex")]
    TooComplex,

    #[error("property '{0}' has no value")]
    MissingInput(String),
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted property path, e.g. `["file", "name"]`
    Property(Vec<String>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    Method {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Member {
        target: Box<Expr>,
        member: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,    // !
    Negate, // -
    Plus,   // +
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,      // +
    Sub,      // -
    Mul,      // *
    Div,      // /
    Rem,      // %
    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    And,      // &&
    Or,       // ||
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Round,
    Floor,
    Ceil,
    Min,
    Max,
    Sqrt,
    Today,
    Now,
    Year,
    Month,
    Day,
    Date,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "abs" => Function::Abs,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "min" => Function::Min,
            "max" => Function::Max,
            "sqrt" => Function::Sqrt,
            "today" => Function::Today,
            "now" => Function::Now,
            "year" => Function::Year,
            "month" => Function::Month,
            "day" => Function::Day,
            "date" => Function::Date,
            _ => return None,
        };
        Some(function)
    }
}

/// Token types for lexing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    // Operators
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Not,      // !
    AndAnd,   // &&
    OrOr,     // ||
    Eq,       // ==
    Ne,       // !=
    StrictEq, // ===
    StrictNe, // !==
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    LParen,
    RParen,
    Comma,
    Dot,
    Eof,
}

/// Lexer for tokenizing expression strings
struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    /// Consume `c` if it is next.
    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a decimal literal. `01` and `007` are rejected like strict-mode
    /// legacy octals, so an unquoted `2010-01-01` is not arithmetic.
    fn read_number(&mut self) -> Result<Token, ExprError> {
        let start = self.pos;
        let mut num_str = String::new();
        self.read_digits(&mut num_str);
        if num_str.len() > 1 && num_str.starts_with('0') {
            return Err(ExprError::LeadingZero(start));
        }

        if self.peek() == Some('.') && self.input.get(self.pos + 1).map_or(false, |c| c.is_ascii_digit()) {
            num_str.push('.');
            self.advance();
            self.read_digits(&mut num_str);
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = self.input.get(self.pos + 1).copied();
            let digit_at = if matches!(sign, Some('+') | Some('-')) { 2 } else { 1 };
            if self.input.get(self.pos + digit_at).map_or(false, |c| c.is_ascii_digit()) {
                num_str.push('e');
                self.advance();
                if digit_at == 2 {
                    if let Some(sign) = self.advance() {
                        num_str.push(sign);
                    }
                }
                self.read_digits(&mut num_str);
            }
        }

        Ok(Token::Number(num_str.parse().unwrap_or(f64::NAN)))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.pos;
        self.advance(); // consume opening quote
        let mut s = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                self.advance(); // consume closing quote
                return Ok(Token::String(s));
            } else if c == '\\' {
                self.advance();
                if let Some(escaped) = self.advance() {
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        '\\' => s.push('\\'),
                        '\'' => s.push('\''),
                        '"' => s.push('"'),
                        _ => s.push(escaped),
                    }
                }
            } else {
                s.push(c);
                self.advance();
            }
        }

        Err(ExprError::UnterminatedString(start))
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();

        let pos = self.pos;
        let c = match self.peek() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };

        let token = match c {
            '(' => { self.advance(); Token::LParen }
            ')' => { self.advance(); Token::RParen }
            ',' => { self.advance(); Token::Comma }
            '.' => { self.advance(); Token::Dot }
            '+' => { self.advance(); Token::Plus }
            '-' => { self.advance(); Token::Minus }
            '*' => { self.advance(); Token::Star }
            '/' => { self.advance(); Token::Slash }
            '%' => { self.advance(); Token::Percent }
            '=' => {
                self.advance();
                if !self.eat('=') {
                    return Err(ExprError::UnexpectedChar { ch: '=', pos });
                }
                if self.eat('=') { Token::StrictEq } else { Token::Eq }
            }
            '!' => {
                self.advance();
                if self.eat('=') {
                    if self.eat('=') { Token::StrictNe } else { Token::Ne }
                } else {
                    Token::Not
                }
            }
            '<' => {
                self.advance();
                if self.eat('=') { Token::Le } else { Token::Lt }
            }
            '>' => {
                self.advance();
                if self.eat('=') { Token::Ge } else { Token::Gt }
            }
            '&' => {
                self.advance();
                if !self.eat('&') {
                    return Err(ExprError::UnexpectedChar { ch: '&', pos });
                }
                Token::AndAnd
            }
            '|' => {
                self.advance();
                if !self.eat('|') {
                    return Err(ExprError::UnexpectedChar { ch: '|', pos });
                }
                Token::OrOr
            }
            '\'' | '"' => self.read_string(c)?,
            _ if c.is_ascii_digit() => self.read_number()?,
            _ if c.is_alphabetic() || c == '_' || c == '$' => {
                let ident = self.read_ident();
                match ident.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" | "undefined" => Token::Null,
                    _ => Token::Ident(ident),
                }
            }
            _ => return Err(ExprError::UnexpectedChar { ch: c, pos }),
        };
        Ok(token)
    }
}

/// Parser for building expression AST
struct Parser {
    lexer: Lexer,
    current: Token,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ExprError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            depth: 0,
            nodes: 0,
        })
    }

    fn advance(&mut self) -> Result<(), ExprError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(self.unexpected(&format!("{:?}", expected)))
        }
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        ExprError::UnexpectedToken {
            expected: expected.to_string(),
            found: format!("{:?}", self.current),
        }
    }

    /// Count a composite node against the complexity budget.
    fn node(&mut self, expr: Expr) -> Result<Expr, ExprError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(ExprError::TooComplex);
        }
        Ok(expr)
    }

    /// Run a nested parse, bounded by `MAX_DEPTH`.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ExprError>) -> Result<T, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooComplex);
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Result<Expr, ExprError> {
        self.node(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Parse a full expression
    fn parse(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    /// Parse OR expressions (lowest precedence)
    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;

        while self.current == Token::OrOr {
            self.advance()?;
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right)?;
        }

        Ok(left)
    }

    /// Parse AND expressions
    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;

        while self.current == Token::AndAnd {
            self.advance()?;
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::And, left, right)?;
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_relational()?;

        loop {
            let op = match self.current {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::StrictEq => BinaryOp::StrictEq,
                Token::StrictNe => BinaryOp::StrictNe,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_relational()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_additive()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = self.binary(op, left, right)?;
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.current {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.advance()?;
        let operand = self.nested(|p| p.parse_unary())?;
        self.node(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parse member accesses and method calls: `a.b.c`, `x.length`, `s.split(',')`
    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;

        while self.current == Token::Dot {
            self.advance()?;
            let name = match &self.current {
                Token::Ident(name) => name.clone(),
                _ => return Err(self.unexpected("member name")),
            };
            self.advance()?;

            if self.current == Token::LParen {
                let args = self.parse_args()?;
                expr = self.node(Expr::Method {
                    target: Box::new(expr),
                    method: name,
                    args,
                })?;
            } else if let Expr::Property(path) = &mut expr {
                path.push(name);
            } else {
                expr = self.node(Expr::Member {
                    target: Box::new(expr),
                    member: name,
                })?;
            }
        }

        Ok(expr)
    }

    /// Parse `( arg, arg, ... )`
    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.current == Token::RParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.nested(|p| p.parse())?);
            match self.current {
                Token::Comma => self.advance()?,
                Token::RParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let expr = match self.current.clone() {
            Token::Number(n) => Expr::Literal(Value::Number(n)),
            Token::String(s) => Expr::Literal(Value::String(s)),
            Token::Bool(b) => Expr::Literal(Value::Bool(b)),
            Token::Null => Expr::Literal(Value::Null),
            Token::LParen => {
                self.advance()?;
                let expr = self.nested(|p| p.parse())?;
                self.expect(&Token::RParen)?;
                return Ok(expr);
            }
            Token::Ident(name) => {
                self.advance()?;
                if self.current == Token::LParen {
                    let function = Function::from_name(&name)
                        .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                    let args = self.parse_args()?;
                    return self.node(Expr::Call { function, args });
                }
                return Ok(Expr::Property(vec![name]));
            }
            _ => return Err(self.unexpected("value")),
        };
        self.advance()?;
        Ok(expr)
    }
}

/// Parse an expression string into an Expr AST.
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse()?;

    // Ensure we consumed all input
    if parser.current != Token::Eof {
        return Err(parser.unexpected("end of expression"));
    }

    // Operator and method chains are parsed iteratively, so only the finished
    // tree shows how deep evaluation will recurse.
    if !within_height(&expr, MAX_HEIGHT) {
        return Err(ExprError::TooComplex);
    }

    Ok(expr)
}

fn within_height(expr: &Expr, budget: usize) -> bool {
    if budget == 0 {
        return false;
    }
    let fits = |e: &Expr| within_height(e, budget - 1);
    match expr {
        Expr::Literal(_) | Expr::Property(_) => true,
        Expr::Unary { operand, .. } => fits(operand),
        Expr::Binary { left, right, .. } => fits(left) && fits(right),
        Expr::Call { args, .. } => args.iter().all(|arg| fits(arg)),
        Expr::Method { target, args, .. } => fits(target) && args.iter().all(|arg| fits(arg)),
        Expr::Member { target, .. } => fits(target),
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// How property references are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Missing properties read as null; values are used as stored.
    Predicate,
    /// Every referenced property must have a value; numeric-looking text
    /// and booleans are read as numbers.
    Formula,
}

/// Evaluate an expression against a record, reading missing properties as null.
pub fn eval_expr(expr: &Expr, record: &Record) -> Result<Value, ExprError> {
    Evaluator { record, mode: Mode::Predicate }.eval(expr)
}

/// Evaluate an expression in formula mode.
///
/// Fails with `ExprError::MissingInput` before evaluating anything if a
/// referenced property is missing, null or empty.
pub fn eval_formula_expr(expr: &Expr, record: &Record) -> Result<Value, ExprError> {
    let evaluator = Evaluator { record, mode: Mode::Formula };
    for path in property_paths(expr) {
        match resolve_path(record, path) {
            Some((value, _)) if !value.is_blank() => {}
            _ => return Err(ExprError::MissingInput(path.join("."))),
        }
    }
    evaluator.eval(expr)
}

/// Extract all property names referenced in an expression.
pub fn extract_properties(expr: &Expr) -> Vec<String> {
    let mut properties: Vec<String> = property_paths(expr).into_iter().map(|p| p.join(".")).collect();
    properties.sort();
    properties.dedup();
    properties
}

fn property_paths(expr: &Expr) -> Vec<&[String]> {
    let mut paths = Vec::new();
    collect_paths(expr, &mut paths);
    paths
}

fn collect_paths<'e>(expr: &'e Expr, paths: &mut Vec<&'e [String]>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Property(path) => paths.push(path.as_slice()),
        Expr::Unary { operand, .. } => collect_paths(operand, paths),
        Expr::Binary { left, right, .. } => {
            collect_paths(left, paths);
            collect_paths(right, paths);
        }
        Expr::Call { args, .. } => args.iter().for_each(|arg| collect_paths(arg, paths)),
        Expr::Method { target, method, args } => {
            if !is_has_property(target, method) {
                collect_paths(target, paths);
            }
            args.iter().for_each(|arg| collect_paths(arg, paths));
        }
        Expr::Member { target, .. } => collect_paths(target, paths),
    }
}

/// `file.hasProperty(...)` is a record query, not a method on a value.
fn is_has_property(target: &Expr, method: &str) -> bool {
    method == "hasProperty" && matches!(target, Expr::Property(path) if path.len() == 1 && path[0] == "file")
}

/// Resolve the longest prefix of `path` naming a property.
/// Returns the value and the segments left over for member access.
fn resolve_path<'r, 'p>(record: &'r Record, path: &'p [String]) -> Option<(Cow<'r, Value>, &'p [String])> {
    (1..=path.len()).rev().find_map(|split| {
        record
            .lookup(&path[..split].join("."))
            .map(|value| (value, &path[split..]))
    })
}

struct Evaluator<'a> {
    record: &'a Record,
    mode: Mode,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Property(path) => self.property(path),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Negate => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Call { function, args } => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>, _>>()?;
                Ok(call_function(*function, &args))
            }
            Expr::Method { target, method, args } => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>, _>>()?;
                if is_has_property(target, method) {
                    let name = args.first().map(Value::to_display).unwrap_or_default();
                    let present = self.record.lookup(&name).map_or(false, |v| !v.is_blank());
                    return Ok(Value::Bool(present));
                }
                let value = self.eval(target)?;
                call_method(&value, method, &args)
            }
            Expr::Member { target, member } => {
                let value = self.eval(target)?;
                self.member(&value, member)
            }
        }
    }

    fn property(&self, path: &[String]) -> Result<Value, ExprError> {
        let (value, members) = match resolve_path(self.record, path) {
            Some(found) => found,
            None if self.mode == Mode::Formula => {
                return Err(ExprError::MissingInput(path.join(".")));
            }
            None => (Cow::Owned(Value::Null), &path[path.len()..]),
        };

        let mut value = match self.mode {
            Mode::Predicate => value.into_owned(),
            Mode::Formula => formula_input(value.into_owned()),
        };
        for member in members {
            value = self.member(&value, member)?;
        }
        Ok(value)
    }

    /// Read `.length` and friends. A member the value does not have is null
    /// in predicates and NaN in formulas, so arithmetic over it has no value.
    fn member(&self, value: &Value, member: &str) -> Result<Value, ExprError> {
        match (member, value) {
            (_, Value::Null) => Err(ExprError::NullAccess(member.to_string())),
            ("length", Value::String(s)) => Ok(Value::Number(s.chars().count() as f64)),
            ("length", Value::List(items)) => Ok(Value::Number(items.len() as f64)),
            _ if self.mode == Mode::Formula => Ok(Value::Number(f64::NAN)),
            _ => Ok(Value::Null),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, ExprError> {
        let l = self.eval(left)?;

        // Short-circuit operators yield one of their operands.
        match op {
            BinaryOp::And if !l.is_truthy() => return Ok(l),
            BinaryOp::Or if l.is_truthy() => return Ok(l),
            BinaryOp::And | BinaryOp::Or => return self.eval(right),
            _ => {}
        }

        let r = self.eval(right)?;
        let value = match op {
            BinaryOp::Add => add(&l, &r),
            BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
            BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
            BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
            BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
            BinaryOp::Eq => Value::Bool(l.loose_eq(&r)),
            BinaryOp::Ne => Value::Bool(!l.loose_eq(&r)),
            BinaryOp::StrictEq => Value::Bool(l.strict_eq(&r)),
            BinaryOp::StrictNe => Value::Bool(!l.strict_eq(&r)),
            BinaryOp::Lt => Value::Bool(l.relational_cmp(&r).map_or(false, |o| o.is_lt())),
            BinaryOp::Le => Value::Bool(l.relational_cmp(&r).map_or(false, |o| o.is_le())),
            BinaryOp::Gt => Value::Bool(l.relational_cmp(&r).map_or(false, |o| o.is_gt())),
            BinaryOp::Ge => Value::Bool(l.relational_cmp(&r).map_or(false, |o| o.is_ge())),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(value)
    }
}

/// Formula inputs: numeric-looking text and booleans become numbers.
fn formula_input(value: Value) -> Value {
    match value {
        Value::String(ref s) => {
            let n = parse_number(s);
            if n.is_nan() {
                value
            } else {
                Value::Number(n)
            }
        }
        Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
        other => other,
    }
}

/// `+` concatenates when either side is text, otherwise adds numerically.
fn add(l: &Value, r: &Value) -> Value {
    let is_text = |v: &Value| matches!(v, Value::String(_) | Value::List(_));
    if is_text(l) || is_text(r) {
        Value::String(format!("{}{}", l.to_display(), r.to_display()))
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

fn call_function(function: Function, args: &[Value]) -> Value {
    let number = |i: usize| args.get(i).map_or(f64::NAN, Value::to_number);
    let date = || args.first().and_then(Value::as_date);

    match function {
        Function::Abs => Value::Number(number(0).abs()),
        Function::Round => Value::Number((number(0) + 0.5).floor()),
        Function::Floor => Value::Number(number(0).floor()),
        Function::Ceil => Value::Number(number(0).ceil()),
        Function::Sqrt => Value::Number(number(0).sqrt()),
        Function::Min => Value::Number(fold_numbers(args, f64::INFINITY, f64::min)),
        Function::Max => Value::Number(fold_numbers(args, f64::NEG_INFINITY, f64::max)),
        Function::Today => Local::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        Function::Now => Value::Date(Local::now().naive_local()),
        Function::Year => Value::Number(date().map_or(f64::NAN, |d| d.year() as f64)),
        Function::Month => Value::Number(date().map_or(f64::NAN, |d| d.month() as f64)),
        Function::Day => Value::Number(date().map_or(f64::NAN, |d| d.day() as f64)),
        Function::Date => date().map(Value::Date).unwrap_or(Value::Null),
    }
}

/// NaN in any argument poisons the result.
fn fold_numbers(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(Value::to_number).fold(init, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            f(acc, n)
        }
    })
}

fn call_method(value: &Value, method: &str, args: &[Value]) -> Result<Value, ExprError> {
    if method == "isEmpty" {
        return Ok(Value::Bool(value.is_empty_value()));
    }
    if value.is_null() {
        return Err(ExprError::NullAccess(method.to_string()));
    }

    let arg = args.first().map(Value::to_display).unwrap_or_else(|| "undefined".to_string());
    let mismatch = || ExprError::TypeMismatch {
        method: method.to_string(),
        target: value.to_display(),
    };

    let result = match (method, value) {
        ("contains" | "includes", Value::String(s)) => Value::Bool(s.contains(arg.as_str())),
        ("contains" | "includes", Value::List(items)) => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Value::Bool(items.iter().any(|item| item.strict_eq(&needle)))
        }
        ("startsWith", Value::String(s)) => Value::Bool(s.starts_with(arg.as_str())),
        ("endsWith", Value::String(s)) => Value::Bool(s.ends_with(arg.as_str())),
        ("split", Value::String(s)) => match args.first() {
            None => Value::List(vec![Value::String(s.clone())]),
            Some(_) if arg.is_empty() => Value::List(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Some(_) => Value::List(s.split(arg.as_str()).map(Value::from).collect()),
        },
        ("contains" | "includes" | "startsWith" | "endsWith" | "split", _) => return Err(mismatch()),
        _ => return Err(ExprError::UnsupportedMethod(method.to_string())),
    };
    Ok(result)
}
