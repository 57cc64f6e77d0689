//! Evaluator for the slice of GitHub Actions expression syntax the generated
//! workflows use.
//!
//! Supported: single-quoted strings, dotted context paths, `==`, `!=`, `&&`,
//! `||`, `!`, parentheses and the status functions `always()`, `success()`,
//! `failure()` and `cancelled()`. String comparison ignores ASCII case, as
//! the platform does.
use anyhow::{anyhow, Context as _, Result};
use regex::Regex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Str(value) => !value.is_empty(),
        }
    }

    fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(left), Value::Str(right)) => left.eq_ignore_ascii_case(right),
            (left, right) => left == right,
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Str(value) => value.clone(),
        }
    }
}

/// Flat map of context paths (`github.ref`, `needs.web.result`) to values.
#[derive(Debug, Clone, Default)]
pub struct ExprContext {
    values: BTreeMap<String, String>,
}

impl ExprContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.values
            .insert(path.to_ascii_lowercase(), value.to_string());
        self
    }

    fn lookup(&self, path: &str) -> Value {
        self.values
            .get(&path.to_ascii_lowercase())
            .map(|value| Value::Str(value.clone()))
            .unwrap_or(Value::Null)
    }

    fn needs_results(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(path, _)| path.starts_with("needs.") && path.ends_with(".result"))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Str(String),
    Path(String),
    LParen,
    RParen,
    Not,
    Eq,
    Ne,
    And,
    Or,
}

const STATUS_FUNCTIONS: [&str; 4] = ["always", "success", "failure", "cancelled"];

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        let next = chars.get(idx + 1).copied();
        match ch {
            c if c.is_whitespace() => idx += 1,
            '(' => {
                tokens.push(Token::LParen);
                idx += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                idx += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                idx += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                idx += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                idx += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                idx += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                idx += 2;
            }
            '\'' => {
                let mut literal = String::new();
                idx += 1;
                loop {
                    match chars.get(idx).copied() {
                        None => return Err(anyhow!("unterminated string in {input:?}")),
                        // '' escapes a quote inside a literal
                        Some('\'') if chars.get(idx + 1) == Some(&'\'') => {
                            literal.push('\'');
                            idx += 2;
                        }
                        Some('\'') => {
                            idx += 1;
                            break;
                        }
                        Some(c) => {
                            literal.push(c);
                            idx += 1;
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = idx;
                while chars
                    .get(idx)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '-' | '.'))
                {
                    idx += 1;
                }
                tokens.push(Token::Path(chars[start..idx].iter().collect()));
            }
            other => return Err(anyhow!("unexpected {other:?} in {input:?}")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a ExprContext,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(anyhow!("expected {expected:?}, found {other:?}")),
        }
    }

    fn or(&mut self) -> Result<Value> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and()?;
            left = if left.truthy() { left } else { right };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.unary()?;
            left = if left.truthy() { right } else { left };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.unary()?;
            return Ok(Value::Bool(!value.truthy()));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value> {
        let left = self.primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.advance();
                let right = self.primary()?;
                Ok(Value::Bool(left.loosely_equals(&right)))
            }
            Some(Token::Ne) => {
                self.advance();
                let right = self.primary()?;
                Ok(Value::Bool(!left.loosely_equals(&right)))
            }
            _ => Ok(left),
        }
    }

    fn primary(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::LParen) => {
                let value = self.or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Str(value)) => Ok(Value::Str(value)),
            Some(Token::Path(path)) if self.peek() == Some(&Token::LParen) => {
                self.advance();
                self.expect(Token::RParen)?;
                self.call(&path)
            }
            Some(Token::Path(path)) => Ok(match path.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => self.ctx.lookup(&path),
            }),
            other => Err(anyhow!("unexpected token {other:?}")),
        }
    }

    fn call(&self, name: &str) -> Result<Value> {
        let mut results = self.ctx.needs_results();
        let value = match name {
            "always" => true,
            "success" => results.all(|result| result == "success" || result == "skipped"),
            "failure" => results.any(|result| result == "failure"),
            "cancelled" => results.any(|result| result == "cancelled"),
            other => return Err(anyhow!("unsupported function {other}()")),
        };
        Ok(Value::Bool(value))
    }
}

/// Evaluate a bare expression (as written in an `if:` key).
pub fn evaluate(expression: &str, ctx: &ExprContext) -> Result<Value> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        ctx,
    };
    let value = parser
        .or()
        .with_context(|| format!("evaluate {expression:?}"))?;
    if parser.pos < parser.tokens.len() {
        return Err(anyhow!(
            "trailing input in {expression:?} at token {}",
            parser.pos
        ));
    }
    Ok(value)
}

/// Evaluate an `if:` condition. Like the platform, a condition without a
/// status function implicitly requires `success()`.
pub fn condition_holds(expression: &str, ctx: &ExprContext) -> Result<bool> {
    let stripped = strip_expression_markers(expression);
    let tokens = tokenize(stripped).with_context(|| format!("tokenize {expression:?}"))?;
    let uses_status = tokens.windows(2).any(|pair| match pair {
        [Token::Path(name), Token::LParen] => STATUS_FUNCTIONS.contains(&name.as_str()),
        _ => false,
    });
    let effective = if uses_status {
        stripped.to_string()
    } else {
        format!("success() && ({stripped})")
    };
    Ok(evaluate(&effective, ctx)?.truthy())
}

/// Replace every `${{ ... }}` in `text` with its evaluated value.
pub fn expand(text: &str, ctx: &ExprContext) -> Result<String> {
    let pattern = Regex::new(r"\$\{\{(.*?)\}\}").context("compile expression pattern")?;
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&evaluate(inner.as_str(), ctx)?.render());
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn strip_expression_markers(expression: &str) -> &str {
    let trimmed = expression.trim();
    trimmed
        .strip_prefix("${{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
