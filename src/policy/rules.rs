//! Policy rule records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use super::{expr, script};
use crate::error::{GovResult, GovernanceError};
use crate::lifecycle::Facts;

/// Rule severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Failed rules at this severity block promotion
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::High
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// How a rule's content is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `allow`, `deny`, `allow if EXPR`, `deny if EXPR` or a bare boolean EXPR
    DeclarativeExpr,
    /// One `dotted.path: expected` assertion per line
    Scripted,
}

/// A governance policy rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[validate(length(min = 1, max = 128, message = "Rule id must be 1-128 characters"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub dialect: Dialect,
    #[validate(length(min = 1, message = "Rule content is required"))]
    pub content: String,
    /// Framework the rule belongs to, used to pick recommendations
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PolicyRule {
    pub fn declarative(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Dialect::DeclarativeExpr, content)
    }

    pub fn scripted(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Dialect::Scripted, content)
    }

    fn new(id: impl Into<String>, dialect: Dialect, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            dialect,
            content: content.into(),
            framework: String::new(),
            severity: Severity::default(),
            category: String::new(),
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check that the content parses in its dialect
    pub fn validate_syntax(&self) -> GovResult<()> {
        self.validate()?;
        let parsed: Result<(), String> = match self.dialect {
            Dialect::DeclarativeExpr => expr::parse(&self.content).map(|_| ()).map_err(|e| e.to_string()),
            Dialect::Scripted => script::parse(&self.content).map(|_| ()).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| GovernanceError::InvalidRule {
            rule_id: self.id.clone(),
            message,
        })
    }
}

/// Outcome of evaluating one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    pub rule_id: String,
    pub passed: bool,
    /// 1.0 when passed, otherwise 0.0
    pub score: f64,
    pub evidence: Facts,
    pub recommendations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// Outcome of evaluating a rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub evaluations: Vec<PolicyEvaluation>,
    pub total_rules: usize,
    pub passed: usize,
    pub failed: usize,
    /// Disabled rules that were not evaluated
    pub skipped: usize,
    /// Ids of failed rules with severity high or critical
    pub blocking: Vec<String>,
}

impl PolicyReport {
    pub fn can_proceed(&self) -> bool {
        self.blocking.is_empty()
    }

    /// Share of evaluated rules that passed; 1.0 when nothing was evaluated
    pub fn pass_rate(&self) -> f64 {
        let evaluated = self.passed + self.failed;
        if evaluated == 0 {
            1.0
        } else {
            self.passed as f64 / evaluated as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: PolicyRule = serde_json::from_str(
            r#"{"id": "P1", "dialect": "declarative_expr", "content": "allow if approved"}"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.severity, Severity::Medium);
        assert!(rule.validate_syntax().is_ok());
    }

    #[test]
    fn test_validate_syntax_reports_rule_id() {
        let rule = PolicyRule::declarative("broken", "allow if (a ==");
        let err = rule.validate_syntax().unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidRule { ref rule_id, .. } if rule_id == "broken"));

        let rule = PolicyRule::scripted("script", "model.approved true");
        let err = rule.validate_syntax().unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::InvalidRule { ref rule_id, ref message } if rule_id == "script" && message.starts_with("line 1:")
        ));

        assert!(PolicyRule::scripted("ok", "model.approved: true").validate_syntax().is_ok());
    }

    #[test]
    fn test_blocking_severities() {
        assert!(!Severity::Medium.is_blocking());
        assert!(Severity::High.is_blocking());
        assert!(Severity::Critical.is_blocking());
    }
}
