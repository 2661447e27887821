//! JSONata subset evaluator for `{% … %}` expressions.
//!
//! JSONata-mode states use JSONata wherever JSONPath-mode states use paths
//! and templates. This module implements the operator subset those states
//! rely on: arithmetic, string concatenation (`&`), comparisons,
//! `and`/`or`, `in`, the conditional operator, object and array
//! constructors, field navigation, array indexing, variable references
//! (`$name`), the reserved `$states` binding, and the builtin functions
//! `$exists`, `$boolean`, `$not`, `$number`, `$string`, `$count`, `$sum`,
//! `$merge`, `$keys`, `$uppercase`, `$lowercase`.
//!
//! Evaluation follows JSONata's "undefined" model: navigating into a
//! missing field produces no value rather than an error, `$exists` observes
//! it, and undefined operands propagate through arithmetic. A whole
//! expression evaluating to nothing is a `States.Runtime` fault at the
//! state boundary.

use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value, json};

use crate::errors::StatesError;

pub const JSONATA_OPEN: &str = "{%";
pub const JSONATA_CLOSE: &str = "%}";

/// True when a string field value is a JSONata expression (`{% … %}`).
#[must_use]
pub fn is_jsonata_expression(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with(JSONATA_OPEN) && trimmed.ends_with(JSONATA_CLOSE)
}

/// The bindings visible to one expression evaluation.
///
/// `$states.input` is the state's effective input, `$states.result` the
/// task result (absent before the task ran), `$states.errorOutput` the
/// fault payload inside Catch processing, and `$states.context` the
/// execution context object. Any other `$name` resolves against the
/// workflow variables.
#[derive(Debug, Clone, Copy)]
pub struct JsonataScope<'a> {
    pub input: &'a Value,
    pub result: Option<&'a Value>,
    pub error_output: Option<&'a Value>,
    pub context: &'a Value,
    pub variables: &'a FxHashMap<String, Value>,
}

impl<'a> JsonataScope<'a> {
    fn states_object(&self) -> Value {
        let mut states = Map::new();
        states.insert("input".into(), self.input.clone());
        if let Some(result) = self.result {
            states.insert("result".into(), result.clone());
        }
        if let Some(error_output) = self.error_output {
            states.insert("errorOutput".into(), error_output.clone());
        }
        states.insert("context".into(), self.context.clone());
        Value::Object(states)
    }
}

/// Evaluate a `{% … %}` expression (the wrapper is stripped here).
///
/// # Examples
///
/// ```
/// use stepsim::paths::{JsonataScope, evaluate_jsonata};
/// use rustc_hash::FxHashMap;
/// use serde_json::json;
///
/// let input = json!({"a": 2});
/// let ctx = json!({});
/// let vars = FxHashMap::default();
/// let scope = JsonataScope {
///     input: &input,
///     result: None,
///     error_output: None,
///     context: &ctx,
///     variables: &vars,
/// };
/// let out = evaluate_jsonata("{% $states.input.a + 1 %}", &scope).unwrap();
/// assert_eq!(out, json!(3));
/// ```
pub fn evaluate_jsonata(expression: &str, scope: &JsonataScope) -> Result<Value, StatesError> {
    let trimmed = expression.trim();
    let body = trimmed
        .strip_prefix(JSONATA_OPEN)
        .and_then(|rest| rest.strip_suffix(JSONATA_CLOSE))
        .unwrap_or(trimmed);

    let tokens = lex(body).map_err(|reason| {
        StatesError::runtime(format!("JSONata lex error in '{body}': {reason}"))
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression(0).map_err(|reason| {
        StatesError::runtime(format!("JSONata parse error in '{body}': {reason}"))
    })?;
    if !parser.at_end() {
        return Err(StatesError::runtime(format!(
            "JSONata parse error in '{body}': trailing input"
        )));
    }

    match eval(&expr, scope)? {
        Some(value) => Ok(value),
        None => Err(StatesError::runtime(format!(
            "JSONata expression '{body}' produced no result"
        ))),
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Var(String),
    True,
    False,
    Null,
    And,
    Or,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(body: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = text.parse::<f64>().map_err(|_| format!("bad number '{text}'"))?;
                tokens.push(Token::Number(number));
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(d) if d == quote => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => return Err("unterminated string escape".into()),
                        },
                        Some(d) => text.push(d),
                        None => return Err("unterminated string".into()),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '$' => {
                chars.next();
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Var(name));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match name.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::In),
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "null" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(name)),
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '{' => {
                chars.next();
                tokens.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '&' => {
                chars.next();
                tokens.push(Token::Amp);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err("'!' is only valid as '!='".into());
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    InputField(String),
    Array(Vec<Expr>),
    Object(Vec<(Expr, Expr)>),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
}

#[derive(Debug, Clone, Copy)]
enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Or,
    And,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn binding_power(token: &Token) -> Option<(BinaryOp, u8)> {
    match token {
        Token::Or => Some((BinaryOp::Or, 1)),
        Token::And => Some((BinaryOp::And, 2)),
        Token::In => Some((BinaryOp::In, 3)),
        Token::Eq => Some((BinaryOp::Eq, 4)),
        Token::Ne => Some((BinaryOp::Ne, 4)),
        Token::Lt => Some((BinaryOp::Lt, 4)),
        Token::Le => Some((BinaryOp::Le, 4)),
        Token::Gt => Some((BinaryOp::Gt, 4)),
        Token::Ge => Some((BinaryOp::Ge, 4)),
        Token::Amp => Some((BinaryOp::Concat, 5)),
        Token::Plus => Some((BinaryOp::Add, 6)),
        Token::Minus => Some((BinaryOp::Sub, 6)),
        Token::Star => Some((BinaryOp::Mul, 7)),
        Token::Slash => Some((BinaryOp::Div, 7)),
        Token::Percent => Some((BinaryOp::Rem, 7)),
        _ => None,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        match self.next() {
            Some(found) if found == *token => Ok(()),
            Some(found) => Err(format!("expected {token:?}, found {found:?}")),
            None => Err(format!("expected {token:?}, found end of input")),
        }
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        loop {
            // Conditional binds loosest of all and associates right.
            if min_bp == 0 && matches!(self.peek(), Some(Token::Question)) {
                self.next();
                let then_branch = self.parse_expression(0)?;
                let else_branch = if matches!(self.peek(), Some(Token::Colon)) {
                    self.next();
                    Some(Box::new(self.parse_expression(0)?))
                } else {
                    None
                };
                left = Expr::Conditional(Box::new(left), Box::new(then_branch), else_branch);
                continue;
            }

            let Some((op, bp)) = self.peek().and_then(binding_power) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.next();
            let right = self.parse_expression(bp + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.next();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        Some(Token::Str(name)) => name,
                        other => return Err(format!("expected field name after '.', found {other:?}")),
                    };
                    expr = Expr::Field(Box::new(expr), name);
                }
                Some(Token::LBracket) => {
                    self.next();
                    let index = self.parse_expression(0)?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Var(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.next();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expression(0)?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.next();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(Token::Ident(name)) => Ok(Expr::InputField(name)),
            Some(Token::LParen) => {
                let inner = self.parse_expression(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_expression(0)?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let mut fields = Vec::new();
                if !matches!(self.peek(), Some(Token::RBrace)) {
                    loop {
                        let key = self.parse_expression(0)?;
                        self.expect(&Token::Colon)?;
                        let value = self.parse_expression(0)?;
                        fields.push((key, value));
                        if matches!(self.peek(), Some(Token::Comma)) {
                            self.next();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(Expr::Object(fields))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

type Evaluated = Result<Option<Value>, StatesError>;

fn eval(expr: &Expr, scope: &JsonataScope) -> Evaluated {
    match expr {
        Expr::Literal(value) => Ok(Some(value.clone())),
        Expr::Var(name) => match name.as_str() {
            "states" => Ok(Some(scope.states_object())),
            _ => Ok(scope.variables.get(name).cloned()),
        },
        Expr::InputField(name) => Ok(scope.input.get(name).cloned()),
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(value) = eval(item, scope)? {
                    out.push(value);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Expr::Object(fields) => {
            let mut map = Map::new();
            for (key_expr, value_expr) in fields {
                let Some(key) = eval(key_expr, scope)? else {
                    continue;
                };
                let key = match key {
                    Value::String(s) => s,
                    other => format_value(&other),
                };
                if let Some(value) = eval(value_expr, scope)? {
                    map.insert(key, value);
                }
            }
            Ok(Some(Value::Object(map)))
        }
        Expr::Field(base, name) => match eval(base, scope)? {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(map.get(name).cloned()),
            Some(Value::Array(items)) => {
                // JSONata maps field access over sequences.
                let mut hits = Vec::new();
                for item in items {
                    if let Some(found) = item.get(name) {
                        hits.push(found.clone());
                    }
                }
                match hits.len() {
                    0 => Ok(None),
                    1 => Ok(Some(hits.into_iter().next().expect("one element"))),
                    _ => Ok(Some(Value::Array(hits))),
                }
            }
            Some(_) => Ok(None),
        },
        Expr::Index(base, index) => {
            let Some(base) = eval(base, scope)? else {
                return Ok(None);
            };
            let Some(index) = eval(index, scope)? else {
                return Ok(None);
            };
            let Some(i) = index.as_f64() else {
                return Err(StatesError::runtime(format!(
                    "array index must be a number, found {}",
                    format_value(&index)
                )));
            };
            match base {
                Value::Array(items) => {
                    let i = if i < 0.0 { items.len() as f64 + i } else { i };
                    if i < 0.0 {
                        return Ok(None);
                    }
                    Ok(items.get(i as usize).cloned())
                }
                other => {
                    if i == 0.0 {
                        Ok(Some(other))
                    } else {
                        Ok(None)
                    }
                }
            }
        }
        Expr::Call(name, args) => eval_call(name, args, scope),
        Expr::Unary(UnaryOp::Neg, operand) => match eval(operand, scope)? {
            None => Ok(None),
            Some(value) => {
                let n = expect_number(&value, "unary '-'")?;
                Ok(Some(number_value(-n)))
            }
        },
        Expr::Binary(op, left, right) => eval_binary(*op, left, right, scope),
        Expr::Conditional(cond, then_branch, else_branch) => {
            let cond = eval(cond, scope)?;
            if truthy(cond.as_ref()) {
                eval(then_branch, scope)
            } else {
                match else_branch {
                    Some(branch) => eval(branch, scope),
                    None => Ok(None),
                }
            }
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &JsonataScope) -> Evaluated {
    // Logical operators coerce with $boolean semantics and short-circuit.
    match op {
        BinaryOp::And => {
            let left = eval(left, scope)?;
            if !truthy(left.as_ref()) {
                return Ok(Some(Value::Bool(false)));
            }
            let right = eval(right, scope)?;
            return Ok(Some(Value::Bool(truthy(right.as_ref()))));
        }
        BinaryOp::Or => {
            let left = eval(left, scope)?;
            if truthy(left.as_ref()) {
                return Ok(Some(Value::Bool(true)));
            }
            let right = eval(right, scope)?;
            return Ok(Some(Value::Bool(truthy(right.as_ref()))));
        }
        _ => {}
    }

    let left = eval(left, scope)?;
    let right = eval(right, scope)?;

    match op {
        BinaryOp::Eq => Ok(Some(Value::Bool(values_equal(left.as_ref(), right.as_ref())))),
        BinaryOp::Ne => Ok(Some(Value::Bool(!values_equal(left.as_ref(), right.as_ref())))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (Some(left), Some(right)) = (left, right) else {
                return Ok(Some(Value::Bool(false)));
            };
            let ordering = compare(&left, &right)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Some(Value::Bool(result)))
        }
        BinaryOp::In => {
            let (Some(left), Some(right)) = (left, right) else {
                return Ok(Some(Value::Bool(false)));
            };
            let contains = match right {
                Value::Array(items) => items.iter().any(|item| values_equal(Some(item), Some(&left))),
                other => values_equal(Some(&other), Some(&left)),
            };
            Ok(Some(Value::Bool(contains)))
        }
        BinaryOp::Concat => {
            let left = left.map(|v| format_value(&v)).unwrap_or_default();
            let right = right.map(|v| format_value(&v)).unwrap_or_default();
            Ok(Some(Value::String(format!("{left}{right}"))))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Some(left), Some(right)) = (left, right) else {
                return Ok(None);
            };
            let a = expect_number(&left, "arithmetic")?;
            let b = expect_number(&right, "arithmetic")?;
            let out = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(StatesError::runtime("division by zero"));
                    }
                    a / b
                }
                BinaryOp::Rem => {
                    if b == 0.0 {
                        return Err(StatesError::runtime("division by zero"));
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(Some(number_value(out)))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn eval_call(name: &str, args: &[Expr], scope: &JsonataScope) -> Evaluated {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, scope)?);
    }

    match name {
        "exists" => {
            let arg = values.first().cloned().flatten();
            Ok(Some(Value::Bool(arg.is_some())))
        }
        "boolean" => Ok(Some(Value::Bool(truthy(
            values.first().cloned().flatten().as_ref(),
        )))),
        "not" => Ok(Some(Value::Bool(!truthy(
            values.first().cloned().flatten().as_ref(),
        )))),
        "number" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(Some(Value::Number(n))),
            Some(Value::Bool(b)) => Ok(Some(json!(if b { 1 } else { 0 }))),
            Some(Value::String(s)) => {
                let parsed = s.trim().parse::<f64>().map_err(|_| {
                    StatesError::runtime(format!("$number could not parse '{s}'"))
                })?;
                Ok(Some(number_value(parsed)))
            }
            Some(other) => Err(StatesError::runtime(format!(
                "$number expects a number or string, found {}",
                format_value(&other)
            ))),
        },
        "string" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(value) => Ok(Some(Value::String(format_value(&value)))),
        },
        "count" => match values.first().cloned().flatten() {
            None => Ok(Some(json!(0))),
            Some(Value::Array(items)) => Ok(Some(json!(items.len()))),
            Some(_) => Ok(Some(json!(1))),
        },
        "sum" => match values.first().cloned().flatten() {
            None => Ok(Some(json!(0))),
            Some(Value::Array(items)) => {
                let mut total = 0.0;
                for item in &items {
                    total += expect_number(item, "$sum")?;
                }
                Ok(Some(number_value(total)))
            }
            Some(other) => Ok(Some(number_value(expect_number(&other, "$sum")?))),
        },
        "merge" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(Value::Array(items)) => {
                let mut merged = Map::new();
                for item in items {
                    match item {
                        Value::Object(map) => merged.extend(map),
                        other => {
                            return Err(StatesError::runtime(format!(
                                "$merge expects objects, found {}",
                                format_value(&other)
                            )));
                        }
                    }
                }
                Ok(Some(Value::Object(merged)))
            }
            Some(Value::Object(map)) => Ok(Some(Value::Object(map))),
            Some(other) => Err(StatesError::runtime(format!(
                "$merge expects an array of objects, found {}",
                format_value(&other)
            ))),
        },
        "keys" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            ))),
            Some(_) => Ok(None),
        },
        "uppercase" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(Value::String(s.to_uppercase()))),
            Some(other) => Ok(Some(Value::String(format_value(&other).to_uppercase()))),
        },
        "lowercase" => match values.first().cloned().flatten() {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(Value::String(s.to_lowercase()))),
            Some(other) => Ok(Some(Value::String(format_value(&other).to_lowercase()))),
        },
        other => Err(StatesError::runtime(format!("unknown function ${other}"))),
    }
}

// ============================================================================
// Value helpers
// ============================================================================

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        json!(n as i64)
    } else {
        Value::Number(Number::from_f64(n).unwrap_or_else(|| Number::from(0)))
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, StatesError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b)
                .ok_or_else(|| StatesError::runtime("cannot compare NaN"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(StatesError::runtime(format!(
            "cannot compare {} with {}",
            format_value(a),
            format_value(b)
        ))),
    }
}

fn expect_number(value: &Value, context: &str) -> Result<f64, StatesError> {
    value.as_f64().ok_or_else(|| {
        StatesError::runtime(format!(
            "{context} expects a number, found {}",
            format_value(value)
        ))
    })
}

/// Render a value the way `&` concatenation does: strings bare, numbers
/// without a trailing `.0`, everything else as compact JSON.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_over<'a>(
        input: &'a Value,
        variables: &'a FxHashMap<String, Value>,
        context: &'a Value,
    ) -> JsonataScope<'a> {
        JsonataScope {
            input,
            result: None,
            error_output: None,
            context,
            variables,
        }
    }

    #[test]
    fn recognizes_wrapped_expressions() {
        assert!(is_jsonata_expression("{% 1 + 1 %}"));
        assert!(is_jsonata_expression("  {% $states.input %}  "));
        assert!(!is_jsonata_expression("$.plain.path"));
        assert!(!is_jsonata_expression("{% unbalanced"));
    }

    #[test]
    fn arithmetic_and_precedence() {
        let input = json!({});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        assert_eq!(evaluate_jsonata("{% 2 + 3 * 4 %}", &scope).unwrap(), json!(14));
        assert_eq!(evaluate_jsonata("{% (2 + 3) * 4 %}", &scope).unwrap(), json!(20));
        assert_eq!(evaluate_jsonata("{% 10 % 3 %}", &scope).unwrap(), json!(1));
        assert_eq!(evaluate_jsonata("{% -2 + 5 %}", &scope).unwrap(), json!(3));
    }

    #[test]
    fn variable_and_states_bindings() {
        let input = json!({"total": 100});
        let mut vars = FxHashMap::default();
        vars.insert("orderTotal".to_string(), json!(1300));
        let ctx = json!({"Execution": {"Input": {"seed": 7}}});
        let scope = scope_over(&input, &vars, &ctx);

        assert_eq!(
            evaluate_jsonata("{% $orderTotal > 1000 %}", &scope).unwrap(),
            json!(true)
        );
        assert_eq!(
            evaluate_jsonata("{% $states.input.total %}", &scope).unwrap(),
            json!(100)
        );
        assert_eq!(
            evaluate_jsonata("{% $states.context.Execution.Input.seed %}", &scope).unwrap(),
            json!(7)
        );
    }

    #[test]
    fn concat_renders_integers_bare() {
        let input = json!({});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        assert_eq!(
            evaluate_jsonata("{% \"order-\" & 12 %}", &scope).unwrap(),
            json!("order-12")
        );
    }

    #[test]
    fn builtins() {
        let input = json!({"items": [1, 2, 3], "name": "ada"});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        assert_eq!(evaluate_jsonata("{% $count(items) %}", &scope).unwrap(), json!(3));
        assert_eq!(evaluate_jsonata("{% $sum(items) %}", &scope).unwrap(), json!(6));
        assert_eq!(
            evaluate_jsonata("{% $exists(missing) %}", &scope).unwrap(),
            json!(false)
        );
        assert_eq!(
            evaluate_jsonata("{% $uppercase(name) %}", &scope).unwrap(),
            json!("ADA")
        );
        assert_eq!(
            evaluate_jsonata("{% $merge([{\"a\": 1}, {\"b\": 2}]) %}", &scope).unwrap(),
            json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn object_and_array_constructors() {
        let input = json!({"a": 1});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        assert_eq!(
            evaluate_jsonata("{% {\"doubled\": a * 2, \"gone\": missing} %}", &scope).unwrap(),
            json!({"doubled": 2})
        );
        assert_eq!(
            evaluate_jsonata("{% [a, 2, \"x\"] %}", &scope).unwrap(),
            json!([1, 2, "x"])
        );
    }

    #[test]
    fn conditional_operator() {
        let input = json!({"n": 5});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        assert_eq!(
            evaluate_jsonata("{% n > 3 ? \"big\" : \"small\" %}", &scope).unwrap(),
            json!("big")
        );
    }

    #[test]
    fn unknown_function_is_runtime_fault() {
        let input = json!({});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        let err = evaluate_jsonata("{% $bogus(1) %}", &scope).unwrap_err();
        assert_eq!(err.error, StatesError::RUNTIME);
        assert!(err.cause.contains("bogus"));
    }

    #[test]
    fn missing_navigation_yields_no_result() {
        let input = json!({});
        let vars = FxHashMap::default();
        let ctx = json!({});
        let scope = scope_over(&input, &vars, &ctx);
        let err = evaluate_jsonata("{% missing.deeper %}", &scope).unwrap_err();
        assert_eq!(err.error, StatesError::RUNTIME);
        assert!(err.cause.contains("no result"));
    }
}
