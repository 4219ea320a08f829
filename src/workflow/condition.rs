//! Restricted boolean expression grammar for `condition` and `loop` tasks (§4.D, §9 redesign
//! flag: workflows never get a host `eval`).
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := comparison ( "&&" comparison )*
//! comparison := unary ( ("=="|"!="|">="|"<="|">"|"<") unary )?
//! unary      := "!" unary | primary
//! primary    := "true" | "false" | number | string | path | "(" expr ")"
//! path       := identifier ( "." identifier )* | "{{" identifier ( "." identifier )* "}}"
//! ```
//!
//! `path` resolves against the execution's `scope` map; everything else is a literal. A path may
//! be written bare (`prev`) or wrapped in the `{{scope.key}}` syntax every other task field uses
//! for variable interpolation (`{{prev}}`) — both resolve identically, so the literal expression
//! text `"{{prev}} contains 'ok'"` an author writes is valid as-is. There is no function call,
//! assignment, or indexing syntax, and no way to reach outside `scope` — the whole point is that
//! an author-supplied expression cannot execute anything, only compare values already in scope.

use serde_json::Value;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::ConduitError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    True,
    False,
    Number(f64),
    Str(String),
    Path(String),
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Contains,
    StartsWith,
    EndsWith,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConduitError> {
    let mut chars: Peekable<Chars<'_>> = input.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '{' => {
                chars.next();
                if chars.next() != Some('{') {
                    return Err(ConduitError::Config(
                        "expected '{{' to begin a scope reference in condition expression".to_string(),
                    ));
                }
                let mut path = String::new();
                loop {
                    match chars.next() {
                        Some('}') if chars.peek() == Some(&'}') => {
                            chars.next();
                            break;
                        }
                        Some(ch) => path.push(ch),
                        None => {
                            return Err(ConduitError::Config(
                                "unterminated '{{...}}' scope reference in condition expression"
                                    .to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Path(path.trim().to_string()));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => {
                            return Err(ConduitError::Config(
                                "unterminated string literal in condition expression".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    return Err(ConduitError::Config(
                        "expected '==', found a single '='".to_string(),
                    ));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Neq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Gte);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Lte);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    return Err(ConduitError::Config("expected '&&'".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    return Err(ConduitError::Config("expected '||'".to_string()));
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut raw = String::new();
                raw.push(c);
                chars.next();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_digit() || n == '.' {
                        raw.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = raw.parse::<f64>().map_err(|_| {
                    ConduitError::Config(format!("invalid number literal: {raw}"))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut raw = String::new();
                raw.push(c);
                chars.next();
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '.' {
                        raw.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match raw.as_str() {
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    "contains" => tokens.push(Token::Contains),
                    "startswith" => tokens.push(Token::StartsWith),
                    "endswith" => tokens.push(Token::EndsWith),
                    _ => tokens.push(Token::Path(raw)),
                }
            }
            other => {
                return Err(ConduitError::Config(format!(
                    "unexpected character in condition expression: '{other}'"
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    scope: &'a HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<bool, ConduitError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<bool, ConduitError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and_expr()?;
            left = left || right;
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<bool, ConduitError> {
        let mut left = self.comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.comparison()?;
            left = left && right;
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<bool, ConduitError> {
        let left = self.unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Neq) => Token::Neq,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Gte) => Token::Gte,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Lte) => Token::Lte,
            Some(Token::Contains) => Token::Contains,
            Some(Token::StartsWith) => Token::StartsWith,
            Some(Token::EndsWith) => Token::EndsWith,
            _ => return as_bool(&left),
        };
        self.advance();
        let right = self.unary()?;
        compare(&left, &op, &right)
    }

    /// `unary` here produces a [`Value`] rather than a `bool` — comparisons need the operand
    /// values, and only a bare unary with no following operator ever collapses to a boolean.
    fn unary(&mut self) -> Result<Value, ConduitError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.unary()?;
            let b = as_bool(&inner)?;
            return Ok(Value::Bool(!b));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, ConduitError> {
        match self.advance().cloned() {
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Number(n)) => Ok(serde_json::json!(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Path(path)) => Ok(resolve_path(self.scope, &path)
                .cloned()
                .unwrap_or(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if self.advance() != Some(&Token::RParen) {
                    return Err(ConduitError::Config("expected closing ')'".to_string()));
                }
                Ok(Value::Bool(inner))
            }
            other => Err(ConduitError::Config(format!(
                "unexpected token in condition expression: {other:?}"
            ))),
        }
    }
}

fn resolve_path<'a>(scope: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = scope.get(first)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

fn as_bool(value: &Value) -> Result<bool, ConduitError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ConduitError::Config(format!(
            "expected boolean, found {other}"
        ))),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn compare(left: &Value, op: &Token, right: &Value) -> Result<bool, ConduitError> {
    match op {
        Token::Eq => Ok(left == right),
        Token::Neq => Ok(left != right),
        Token::Gt | Token::Gte | Token::Lt | Token::Lte => {
            let (l, r) = match (as_number(left), as_number(right)) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(ConduitError::Config(
                        "ordering comparisons require numeric operands".to_string(),
                    ))
                }
            };
            Ok(match op {
                Token::Gt => l > r,
                Token::Gte => l >= r,
                Token::Lt => l < r,
                Token::Lte => l <= r,
                _ => unreachable!(),
            })
        }
        Token::Contains => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(l.contains(r.as_str())),
            (Value::Array(items), r) => Ok(items.contains(r)),
            _ => Err(ConduitError::Config(
                "contains requires a string/string or array/value pair".to_string(),
            )),
        },
        Token::StartsWith => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(l.starts_with(r.as_str())),
            _ => Err(ConduitError::Config("startswith requires string operands".to_string())),
        },
        Token::EndsWith => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(l.ends_with(r.as_str())),
            _ => Err(ConduitError::Config("endswith requires string operands".to_string())),
        },
        _ => unreachable!("comparison() only dispatches comparison operators"),
    }
}

/// Evaluate a condition expression against `scope`, returning its boolean result.
pub fn evaluate(expression: &str, scope: &HashMap<String, Value>) -> Result<bool, ConduitError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        scope,
    };
    let result = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(ConduitError::Config(
            "trailing tokens after condition expression".to_string(),
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_with(key: &str, value: Value) -> HashMap<String, Value> {
        let mut scope = HashMap::new();
        scope.insert(key.to_string(), value);
        scope
    }

    #[test]
    fn numeric_comparison() {
        let scope = scope_with("count", json!(5));
        assert!(evaluate("count > 3", &scope).unwrap());
        assert!(!evaluate("count > 10", &scope).unwrap());
    }

    #[test]
    fn boolean_operators_and_precedence() {
        let scope = scope_with("count", json!(5));
        assert!(evaluate("count > 3 && count < 10", &scope).unwrap());
        assert!(evaluate("count > 100 || count < 10", &scope).unwrap());
        assert!(evaluate("!(count > 100)", &scope).unwrap());
    }

    #[test]
    fn dotted_path_resolution() {
        let scope = scope_with("invoice", json!({"status": "paid"}));
        assert!(evaluate("invoice.status == \"paid\"", &scope).unwrap());
    }

    #[test]
    fn rejects_unknown_syntax() {
        let scope = HashMap::new();
        assert!(evaluate("count > ", &scope).is_err());
    }

    #[test]
    fn missing_path_resolves_to_null_not_error() {
        let scope = HashMap::new();
        assert!(!evaluate("missing == true", &scope).unwrap());
    }

    #[test]
    fn string_operators() {
        let scope = scope_with("subject", json!("Invoice overdue: acme corp"));
        assert!(evaluate("subject contains \"overdue\"", &scope).unwrap());
        assert!(evaluate("subject startswith \"Invoice\"", &scope).unwrap());
        assert!(evaluate("subject endswith \"corp\"", &scope).unwrap());
        assert!(!evaluate("subject contains \"refund\"", &scope).unwrap());
    }

    /// §8 Scenario S3 gives the literal condition text `{{prev}} contains 'ok'` — the brace
    /// syntax every other task field uses for scope references must parse here too.
    #[test]
    fn braced_scope_reference_matches_spec_literal_syntax() {
        let scope = scope_with("prev", json!("ok"));
        assert!(evaluate("{{prev}} contains 'ok'", &scope).unwrap());

        let scope = scope_with("prev", json!("not ok"));
        assert!(evaluate("{{prev}} contains 'ok'", &scope).unwrap());

        let scope = scope_with("prev", json!("fail"));
        assert!(!evaluate("{{prev}} contains 'ok'", &scope).unwrap());
    }

    #[test]
    fn array_contains() {
        let scope = scope_with("tags", json!(["urgent", "billing"]));
        assert!(evaluate("tags contains \"urgent\"", &scope).unwrap());
        assert!(!evaluate("tags contains \"spam\"", &scope).unwrap());
    }
}
