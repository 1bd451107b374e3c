//! Declarative policy expressions
//!
//! ```text
//! rule       := "allow" | "deny" | ("allow" | "deny") "if" expr | expr
//! expr       := and ( ("or" | "||") and )*
//! and        := unary ( ("and" | "&&") unary )*
//! unary      := ("not" | "!") unary | primary
//! primary    := "(" expr ")" | path [ cmp literal ] | literal
//! cmp        := "==" | "!=" | "<" | "<=" | ">" | ">="
//! literal    := "quoted" | 'quoted' | number | true | false | null | bareword
//! ```
//!
//! Paths are dotted fact names resolved against the context. Keywords are
//! case-insensitive.

use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

use crate::lifecycle::types::{lookup_path, Facts};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Truthiness of a fact
    Fact(String),
    Compare { path: String, op: CmpOp, value: Value },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// A parsed rule body
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// `None` for bare expressions
    pub effect: Option<Effect>,
    pub condition: Option<Expr>,
}

/// Result of evaluating a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    /// Whether the `if` condition (or bare expression) held, when there is one
    pub condition_met: Option<bool>,
}

impl Directive {
    pub fn evaluate(&self, facts: &Facts) -> Verdict {
        let condition_met = self.condition.as_ref().map(|c| c.eval(facts));
        let allowed = match (self.effect, condition_met) {
            (Some(Effect::Allow), None) => true,
            (Some(Effect::Deny), None) => false,
            (Some(Effect::Allow), Some(met)) => met,
            (Some(Effect::Deny), Some(met)) => !met,
            (None, Some(met)) => met,
            (None, None) => false,
        };
        Verdict { allowed, condition_met }
    }
}

impl Expr {
    pub fn eval(&self, facts: &Facts) -> bool {
        match self {
            Expr::Literal(value) => truthy(value),
            Expr::Fact(path) => lookup_path(facts, path).map(truthy).unwrap_or(false),
            Expr::Compare { path, op, value } => match lookup_path(facts, path) {
                Some(fact) => compare(fact, *op, value),
                // Missing facts are unequal to everything
                None => *op == CmpOp::Ne,
            },
            Expr::Not(inner) => !inner.eval(facts),
            Expr::And(a, b) => a.eval(facts) && b.eval(facts),
            Expr::Or(a, b) => a.eval(facts) || b.eval(facts),
        }
    }
}

/// `true`, non-zero numbers and non-empty strings/collections
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lowercased display form used for loose comparisons
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        Value::Null => "null".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

fn compare(fact: &Value, op: CmpOp, literal: &Value) -> bool {
    let ordering = match (as_number(fact), as_number(literal)) {
        (Some(a), Some(b)) if fact.is_number() || literal.is_number() => a.partial_cmp(&b),
        _ => match (fact, literal) {
            (Value::String(a), Value::String(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            _ => None,
        },
    };

    match op {
        CmpOp::Eq => ordering.map(|o| o == Ordering::Equal).unwrap_or_else(|| stringify(fact) == stringify(literal)),
        CmpOp::Ne => ordering.map(|o| o != Ordering::Equal).unwrap_or_else(|| stringify(fact) != stringify(literal)),
        CmpOp::Lt => ordering == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    AndOp,
    OrOp,
    Bang,
    Cmp(CmpOp),
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(ParseError::new(format!("expected '{}{}'", c, c), start));
                }
                tokens.push((if c == '&' { Token::AndOp } else { Token::OrOp }, start));
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let next_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_eq) {
                    ('=', true) => Token::Cmp(CmpOp::Eq),
                    ('!', true) => Token::Cmp(CmpOp::Ne),
                    ('<', true) => Token::Cmp(CmpOp::Le),
                    ('>', true) => Token::Cmp(CmpOp::Ge),
                    ('<', false) => Token::Cmp(CmpOp::Lt),
                    ('>', false) => Token::Cmp(CmpOp::Gt),
                    ('!', false) => Token::Bang,
                    _ => return Err(ParseError::new("expected '=='", start)),
                };
                i += if next_eq { 2 } else { 1 };
                tokens.push((token, start));
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::new("unterminated string", start)),
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Str(text), start));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| ParseError::new(format!("invalid number '{}'", text), start))?;
                tokens.push((Token::Num(number), start));
            }
            c if is_word_char(c) => {
                while i < chars.len() && (is_word_char(chars[i]) || chars[i] == '.') {
                    i += 1;
                }
                tokens.push((Token::Word(chars[start..i].iter().collect()), start));
            }
            other => return Err(ParseError::new(format!("unexpected character '{}'", other), start)),
        }
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn directive(&mut self) -> Result<Directive, ParseError> {
        let effect = if self.peek_keyword("allow") {
            Some(Effect::Allow)
        } else if self.peek_keyword("deny") {
            Some(Effect::Deny)
        } else {
            None
        };

        let condition = match effect {
            Some(_) => {
                self.advance();
                if self.peek().is_none() {
                    None
                } else if self.peek_keyword("if") {
                    self.advance();
                    Some(self.or_expr()?)
                } else {
                    return Err(ParseError::new("expected 'if' after allow/deny", self.offset()));
                }
            }
            None => Some(self.or_expr()?),
        };

        if self.peek().is_some() {
            return Err(ParseError::new("unexpected trailing input", self.offset()));
        }
        Ok(Directive { effect, condition })
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::OrOp)) || self.peek_keyword("or") {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        while matches!(self.peek(), Some(Token::AndOp)) || self.peek_keyword("and") {
            self.advance();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Some(Token::Bang)) || self.peek_keyword("not") {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let at = self.offset();
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ParseError::new("expected ')'", self.offset_before())),
                }
            }
            Some(Token::Word(word)) => {
                if let Some(value) = keyword_literal(&word) {
                    return Ok(Expr::Literal(value));
                }
                if is_reserved(&word) {
                    return Err(ParseError::new(format!("unexpected keyword '{}'", word), at));
                }
                if let Some(Token::Cmp(op)) = self.peek().cloned() {
                    self.advance();
                    let value = self.literal()?;
                    return Ok(Expr::Compare { path: word, op, value });
                }
                Ok(Expr::Fact(word))
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(_) => Err(ParseError::new("unexpected token", at)),
            None => Err(ParseError::new("unexpected end of expression", at)),
        }
    }

    fn literal(&mut self) -> Result<Value, ParseError> {
        let at = self.offset();
        match self.advance() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => Ok(number(n)),
            Some(Token::Word(word)) if !is_reserved(&word) || keyword_literal(&word).is_some() => {
                Ok(keyword_literal(&word).unwrap_or(Value::String(word)))
            }
            Some(_) => Err(ParseError::new("expected a literal after comparison", at)),
            None => Err(ParseError::new("expected a literal after comparison", at)),
        }
    }

    fn offset_before(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, p)| *p)
            .unwrap_or(self.end)
    }
}

fn keyword_literal(word: &str) -> Option<Value> {
    match word.to_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        _ => None,
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(
        word.to_lowercase().as_str(),
        "and" | "or" | "not" | "if" | "allow" | "deny" | "true" | "false" | "null"
    )
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Parse a declarative rule body
pub fn parse(input: &str) -> Result<Directive, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
    };
    parser.directive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facts() -> Facts {
        json!({
            "risk_tier": "High",
            "approved": true,
            "accuracy": 0.91,
            "owner": "",
            "model": { "card": { "status": "published" }, "reviews": 2 },
            "tags": ["vision"]
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn allowed(rule: &str) -> bool {
        parse(rule).unwrap().evaluate(&facts()).allowed
    }

    #[test]
    fn test_bare_markers() {
        assert!(allowed("allow"));
        assert!(!allowed("DENY"));
    }

    #[test]
    fn test_allow_and_deny_conditions() {
        assert!(allowed("allow if approved"));
        assert!(!allowed("deny if approved"));
        assert!(allowed("deny if risk_tier == low"));
        assert!(!allowed("deny if risk_tier == high and not owner"));
    }

    #[test]
    fn test_equality_is_case_insensitive_and_typed() {
        assert!(allowed("risk_tier == 'HIGH'"));
        assert!(allowed("model.card.status == published"));
        assert!(allowed("approved == true"));
        assert!(allowed("model.reviews == 2"));
        assert!(allowed("risk_tier != minimal"));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(allowed("accuracy >= 0.9 && model.reviews > 1"));
        assert!(!allowed("accuracy < 0.5"));
        assert!(allowed("model.reviews <= 2"));
    }

    #[test]
    fn test_missing_facts_are_falsy_and_unequal() {
        assert!(!allowed("ghost"));
        assert!(!allowed("ghost == null"));
        assert!(allowed("ghost != 'anything'"));
        assert!(!allowed("ghost > 1"));
        assert!(allowed("not ghost"));
    }

    #[test]
    fn test_truthiness_and_precedence() {
        assert!(allowed("tags"));
        assert!(!allowed("owner"));
        assert!(allowed("owner or approved and tags"));
        assert!(!allowed("(owner or approved) and ghost"));
        assert!(allowed("!(ghost || owner)"));
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parse("allow if (approved").unwrap_err();
        assert!(err.message.contains("')'"));

        assert!(parse("").is_err());
        assert!(parse("allow approved").is_err());
        assert!(parse("risk_tier = high").is_err());
        assert!(parse("approved and").is_err());
        assert!(parse("name == 'open").is_err());
        assert_eq!(parse("approved ) ").unwrap_err().position, 9);
    }
}
