//! Control expressions for `manage_if` / `manage_unless`
//!
//! A small boolean language over the fact/data environment:
//!
//! ```text
//! expr    := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "true" | "false" | path [("==" | "!=") string]
//! ```
//!
//! A bare path is truthy when it exists and is not `false`, `null`, `0`, or
//! empty. Comparisons are against quoted string literals; numbers and
//! booleans compare by their JSON text.

use anyhow::{Result, bail};
use declarative::{ExpressionEvaluator, TemplateEnvironment};
use serde_json::Value;

/// Evaluator for control expressions
#[derive(Debug, Default, Clone, Copy)]
pub struct Conditions;

impl ExpressionEvaluator for Conditions {
    fn evaluate(&self, expression: &str, env: &TemplateEnvironment) -> Result<bool> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            env,
        };
        let value = parser.or()?;
        if let Some(token) = parser.peek() {
            bail!("unexpected {token:?}");
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Not,
    And,
    Or,
    Eq,
    Ne,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' | '&' | '|' => {
                chars.next();
                if chars.next_if_eq(&c).is_none() {
                    bail!("expected '{c}{c}'");
                }
                tokens.push(match c {
                    '=' => Token::Eq,
                    '&' => Token::And,
                    _ => Token::Or,
                });
            }
            '"' | '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == c => break,
                        Some(ch) => literal.push(ch),
                        None => bail!("unterminated string literal"),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(ch) =
                    chars.next_if(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
                {
                    ident.push(ch);
                }
                tokens.push(Token::Ident(ident));
            }
            other => bail!("unexpected character '{other}'"),
        }
    }

    if tokens.is_empty() {
        bail!("empty expression");
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    env: &'a TemplateEnvironment,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // Both sides are always parsed so syntax errors surface regardless of values
    fn or(&mut self) -> Result<bool> {
        let mut value = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool> {
        let mut value = self.unary()?;
        while self.eat(&Token::And) {
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool> {
        if self.eat(&Token::Not) {
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool> {
        let env = self.env;
        match self.next().cloned() {
            Some(Token::LParen) => {
                let value = self.or()?;
                if !self.eat(&Token::RParen) {
                    bail!("expected ')'");
                }
                Ok(value)
            }
            Some(Token::Ident(ident)) => {
                let negate = match self.peek() {
                    Some(Token::Eq) => false,
                    Some(Token::Ne) => true,
                    _ => return Ok(literal_or_lookup(&ident, env)),
                };
                self.pos += 1;
                let Some(Token::Str(expected)) = self.next().cloned() else {
                    bail!("expected a quoted string after '{ident}'");
                };
                let equal = env.lookup(&ident).and_then(as_text).as_deref() == Some(&*expected);
                Ok(equal != negate)
            }
            Some(token) => bail!("unexpected {token:?}"),
            None => bail!("unexpected end of expression"),
        }
    }
}

fn literal_or_lookup(ident: &str, env: &TemplateEnvironment) -> bool {
    match ident {
        "true" => true,
        "false" => false,
        path => env.lookup(path).is_some_and(truthy),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expression: &str) -> Result<bool> {
        let env = TemplateEnvironment::new(
            json!({"os": {"family": "debian", "version": "12"}, "virtual": false}),
            json!({"web": true, "workers": 4, "role": "", "tags": []}),
        );
        Conditions.evaluate(expression, &env)
    }

    #[test]
    fn test_literals() {
        assert!(eval("true").unwrap());
        assert!(!eval("false").unwrap());
        assert!(eval("!false").unwrap());
        assert!(eval("!!true").unwrap());
    }

    #[test]
    fn test_comparisons() {
        assert!(eval(r#"facts.os.family == "debian""#).unwrap());
        assert!(eval("facts.os.family != 'redhat'").unwrap());
        assert!(eval(r#"data.workers == "4""#).unwrap());
        assert!(!eval(r#"facts.missing == "x""#).unwrap());
        assert!(eval(r#"facts.missing != "x""#).unwrap());
    }

    #[test]
    fn test_truthiness() {
        assert!(eval("data.web").unwrap());
        assert!(eval("data.workers").unwrap());
        assert!(!eval("data.role").unwrap());
        assert!(!eval("data.tags").unwrap());
        assert!(!eval("facts.virtual").unwrap());
        assert!(!eval("data.nothing").unwrap());
    }

    #[test]
    fn test_precedence() {
        // && binds tighter than ||
        assert!(eval("true || false && false").unwrap());
        assert!(!eval("(true || false) && false").unwrap());
        assert!(eval(r#"!facts.virtual && facts.os.family == "debian""#).unwrap());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(eval("").is_err());
        assert!(eval("data.web &&").is_err());
        assert!(eval("(true").is_err());
        assert!(eval("data.web = \"x\"").is_err());
        assert!(eval("data.web == other").is_err());
        assert!(eval("\"unterminated").is_err());
        assert!(eval("true false").is_err());
        assert!(eval("$HOME").is_err());
    }
}
