//! Scripted policy assertions
//!
//! One `dotted.path: expected` assertion per line. Blank lines and lines
//! starting with `#` are ignored. Every assertion must hold for the rule to
//! pass; comparison is case-insensitive on the stringified value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::expr::stringify;
use crate::lifecycle::types::{lookup_path, Facts};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub line: usize,
    pub path: String,
    pub expected: String,
}

/// Per-assertion outcome, kept as rule evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub line: usize,
    pub path: String,
    pub expected: String,
    pub actual: Option<String>,
    pub passed: bool,
}

/// Parse a script into assertions
pub fn parse(content: &str) -> Result<Vec<Assertion>, ScriptError> {
    let mut assertions = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let Some((path, expected)) = text.split_once(':') else {
            return Err(ScriptError {
                line,
                message: format!("expected 'path: value', got '{}'", text),
            });
        };
        let path = path.trim();
        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(ScriptError {
                line,
                message: format!("invalid path '{}'", path),
            });
        }

        assertions.push(Assertion {
            line,
            path: path.to_string(),
            expected: unquote(expected.trim()).to_string(),
        });
    }
    Ok(assertions)
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

impl Assertion {
    pub fn check(&self, facts: &Facts) -> AssertionResult {
        let actual = lookup_path(facts, &self.path);
        let passed = actual.map(|v| matches(v, &self.expected)).unwrap_or(false);
        AssertionResult {
            line: self.line,
            path: self.path.clone(),
            expected: self.expected.clone(),
            actual: actual.map(display),
            passed,
        }
    }
}

fn matches(actual: &Value, expected: &str) -> bool {
    if let (Some(a), Ok(b)) = (actual.as_f64(), expected.trim().parse::<f64>()) {
        return a == b;
    }
    stringify(actual) == expected.to_lowercase()
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Check every assertion; the script holds when all of them do
pub fn run(assertions: &[Assertion], facts: &Facts) -> (bool, Vec<AssertionResult>) {
    let results: Vec<AssertionResult> = assertions.iter().map(|a| a.check(facts)).collect();
    let passed = results.iter().all(|r| r.passed);
    (passed, results)
}
