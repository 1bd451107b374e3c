//! Policy Rule Evaluator
//!
//! Evaluates declarative and scripted rules against a fact map. A rule that
//! cannot be parsed fails with the parse error in its evidence; nothing here
//! returns an error at evaluation time.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::rules::{Dialect, PolicyEvaluation, PolicyReport, PolicyRule, Severity};
use super::{expr, script};
use crate::error::GovResult;
use crate::lifecycle::Facts;

/// Wildcard framework key in the recommendation table
const ANY_FRAMEWORK: &str = "*";

/// framework -> category -> recommendations
static RECOMMENDATIONS: Lazy<HashMap<&'static str, HashMap<&'static str, &'static [&'static str]>>> =
    Lazy::new(|| {
        let mut table: HashMap<&'static str, HashMap<&'static str, &'static [&'static str]>> = HashMap::new();

        table.entry("eu_ai_act").or_default().extend([
            (
                "human_oversight",
                &[
                    "Assign natural persons to oversee the system (EU AI Act Art. 14)",
                    "Document how operators can intervene or halt the system",
                ] as &[&str],
            ),
            (
                "prohibited_practice",
                &["Withdraw the use case: it falls under prohibited practices (EU AI Act Art. 5)"] as &[&str],
            ),
            (
                "transparency",
                &["Inform users they are interacting with an AI system (EU AI Act Art. 13)"] as &[&str],
            ),
            (
                "data_governance",
                &["Record data provenance and bias examination for training data (EU AI Act Art. 10)"] as &[&str],
            ),
        ]);

        table.entry("nist_ai_rmf").or_default().extend([
            (
                "documentation",
                &["Publish a model card covering intended use and limitations (NIST AI RMF MAP)"] as &[&str],
            ),
            (
                "bias",
                &["Measure fairness metrics across protected groups (NIST AI RMF MEASURE 2.11)"] as &[&str],
            ),
            (
                "accountability",
                &["Name an accountable owner for the AI system (NIST AI RMF GOVERN 2)"] as &[&str],
            ),
        ]);

        table.entry("iso_42001").or_default().extend([
            (
                "impact_assessment",
                &["Complete an AI system impact assessment (ISO/IEC 42001 6.1.4)"] as &[&str],
            ),
            ("policy", &["Have the AI policy approved by top management (ISO/IEC 42001 5.2)"] as &[&str]),
        ]);

        table.entry(ANY_FRAMEWORK).or_default().extend([
            ("security", &["Complete a security review before promotion"] as &[&str]),
            ("privacy", &["Minimise and mask personal data used by the system"] as &[&str]),
            ("documentation", &["Keep system documentation current"] as &[&str]),
            ("bias", &["Re-run bias analysis and document mitigations"] as &[&str]),
        ]);

        table
    });

const FALLBACK_RECOMMENDATION: &[&str] = &["Review the failed policy with the governance board"];

/// Look up recommendations for a failed rule: framework+category, then any
/// framework with the category, then a generic fallback
pub fn recommendations_for(framework: &str, category: &str) -> Vec<String> {
    let framework = framework.to_lowercase();
    let category = category.to_lowercase();
    [framework.as_str(), ANY_FRAMEWORK]
        .iter()
        .find_map(|f| RECOMMENDATIONS.get(*f).and_then(|by_category| by_category.get(category.as_str())))
        .copied()
        .unwrap_or(FALLBACK_RECOMMENDATION)
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Holds a rule set and evaluates it against fact maps
#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluator {
    rules: Vec<PolicyRule>,
}

impl PolicyEvaluator {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Evaluator preloaded with the built-in policy rules
    pub fn with_defaults() -> Self {
        Self::new(default_rules())
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Add a rule after checking its syntax
    pub fn add_rule(&mut self, rule: PolicyRule) -> GovResult<()> {
        rule.validate_syntax()?;
        self.rules.retain(|r| r.id != rule.id);
        self.rules.push(rule);
        Ok(())
    }

    /// Load rules from a JSON array file, rejecting the file on the first invalid rule
    pub fn load_json_file(&mut self, path: &Path) -> GovResult<usize> {
        let raw = std::fs::read_to_string(path)?;
        let rules: Vec<PolicyRule> = serde_json::from_str(&raw)?;
        for rule in &rules {
            rule.validate_syntax()?;
        }
        let count = rules.len();
        for rule in rules {
            self.add_rule(rule)?;
        }
        info!("📜 Loaded {} policy rules from {}", count, path.display());
        Ok(count)
    }

    /// Evaluate the held rules
    pub fn evaluate_rules(&self, facts: &Facts) -> PolicyReport {
        evaluate_all(&self.rules, facts)
    }

    /// Rules for one framework (rules without a framework always apply)
    pub fn rules_for(&self, framework: &str) -> Vec<PolicyRule> {
        self.rules
            .iter()
            .filter(|r| r.framework.is_empty() || r.framework.eq_ignore_ascii_case(framework))
            .cloned()
            .collect()
    }
}

/// Evaluate one rule
pub fn evaluate(rule: &PolicyRule, facts: &Facts) -> PolicyEvaluation {
    let mut evidence = Facts::new();
    evidence.insert("dialect".to_string(), json!(rule.dialect));

    let passed = match rule.dialect {
        Dialect::DeclarativeExpr => match expr::parse(&rule.content) {
            Ok(directive) => {
                let verdict = directive.evaluate(facts);
                evidence.insert("expression".to_string(), Value::String(rule.content.clone()));
                if let Some(met) = verdict.condition_met {
                    evidence.insert("conditionMet".to_string(), Value::Bool(met));
                }
                verdict.allowed
            }
            Err(e) => {
                evidence.insert("error".to_string(), Value::String(e.to_string()));
                false
            }
        },
        Dialect::Scripted => match script::parse(&rule.content) {
            Ok(assertions) => {
                let (passed, results) = script::run(&assertions, facts);
                evidence.insert("assertions".to_string(), json!(results));
                passed
            }
            Err(e) => {
                evidence.insert("error".to_string(), Value::String(e.to_string()));
                false
            }
        },
    };

    debug!("Policy rule '{}' {}", rule.id, if passed { "passed" } else { "failed" });

    PolicyEvaluation {
        rule_id: rule.id.clone(),
        passed,
        score: if passed { 1.0 } else { 0.0 },
        evidence,
        recommendations: if passed {
            Vec::new()
        } else {
            recommendations_for(&rule.framework, &rule.category)
        },
        evaluated_at: Utc::now(),
    }
}

/// Evaluate every enabled rule
pub fn evaluate_all(rules: &[PolicyRule], facts: &Facts) -> PolicyReport {
    let mut evaluations = Vec::new();
    let mut blocking = Vec::new();
    let mut skipped = 0;

    for rule in rules {
        if !rule.enabled {
            skipped += 1;
            continue;
        }
        let evaluation = evaluate(rule, facts);
        if !evaluation.passed && rule.severity.is_blocking() {
            blocking.push(rule.id.clone());
        }
        evaluations.push(evaluation);
    }

    let passed = evaluations.iter().filter(|e| e.passed).count();
    let failed = evaluations.len() - passed;

    PolicyReport {
        evaluations,
        total_rules: rules.len(),
        passed,
        failed,
        skipped,
        blocking,
    }
}

/// Built-in policy rules
pub fn default_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::declarative(
            "POL-001",
            "deny if risk_tier == high and not human_oversight.assigned",
        )
        .with_name("High-risk systems need assigned human oversight")
        .with_framework("eu_ai_act")
        .with_category("human_oversight")
        .with_severity(Severity::High),
        PolicyRule::declarative(
            "POL-002",
            "deny if use_case.social_scoring or use_case.subliminal_manipulation",
        )
        .with_name("No prohibited AI practices")
        .with_framework("eu_ai_act")
        .with_category("prohibited_practice")
        .with_severity(Severity::Critical),
        PolicyRule::declarative("POL-003", "deny if user_facing and not ai_disclosure")
            .with_name("Users are told they interact with AI")
            .with_framework("eu_ai_act")
            .with_category("transparency")
            .with_severity(Severity::Medium),
        PolicyRule::scripted("POL-004", "# model card must be signed off\nmodel_card.status: approved")
            .with_name("Model card approved")
            .with_framework("nist_ai_rmf")
            .with_category("documentation")
            .with_severity(Severity::Medium),
        PolicyRule::declarative("POL-005", "allow if owner")
            .with_name("System has an accountable owner")
            .with_framework("nist_ai_rmf")
            .with_category("accountability")
            .with_severity(Severity::Low),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn facts(value: Value) -> Facts {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_declarative_rule_failure_gets_table_recommendations() {
        let rule = &default_rules()[0];
        let evaluation = evaluate(rule, &facts(json!({ "risk_tier": "HIGH" })));
        assert!(!evaluation.passed);
        assert_eq!(evaluation.score, 0.0);
        assert_eq!(evaluation.evidence.get("conditionMet"), Some(&Value::Bool(true)));
        assert!(evaluation.recommendations[0].contains("Art. 14"));

        let evaluation = evaluate(
            rule,
            &facts(json!({ "risk_tier": "high", "human_oversight": { "assigned": true } })),
        );
        assert!(evaluation.passed);
        assert_eq!(evaluation.score, 1.0);
        assert!(evaluation.recommendations.is_empty());
    }

    #[test]
    fn test_scripted_rule_records_assertions() {
        let rule = PolicyRule::scripted("S1", "model_card.status: approved");
        let evaluation = evaluate(&rule, &facts(json!({ "model_card": { "status": "Approved" } })));
        assert!(evaluation.passed);
        assert!(evaluation.evidence.get("assertions").is_some());
    }

    #[test]
    fn test_unparseable_rule_fails_with_error_evidence() {
        let rule = PolicyRule::declarative("bad", "allow if (a").with_category("security");
        let evaluation = evaluate(&rule, &Facts::new());
        assert!(!evaluation.passed);
        assert!(evaluation.evidence.contains_key("error"));
        assert_eq!(
            evaluation.recommendations,
            vec!["Complete a security review before promotion".to_string()]
        );
    }

    #[test]
    fn test_recommendation_lookup_falls_back() {
        assert!(recommendations_for("EU_AI_ACT", "Transparency")[0].contains("Art. 13"));
        assert_eq!(recommendations_for("sox", "privacy").len(), 1);
        assert_eq!(recommendations_for("sox", "unknown"), vec![FALLBACK_RECOMMENDATION[0].to_string()]);
    }

    #[test]
    fn test_evaluate_all_counts_and_blocks() {
        let rules = vec![
            PolicyRule::declarative("ok", "allow"),
            PolicyRule::declarative("minor", "deny").with_severity(Severity::Low),
            PolicyRule::declarative("major", "deny").with_severity(Severity::Critical),
            PolicyRule::declarative("off", "deny").with_severity(Severity::Critical).disabled(),
        ];
        let report = evaluate_all(&rules, &Facts::new());

        assert_eq!(report.total_rules, 4);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.blocking, vec!["major"]);
        assert!(!report.can_proceed());
        assert_eq!(report.pass_rate(), 1.0 / 3.0);
    }

    #[test]
    fn test_default_rules_are_valid() {
        for rule in default_rules() {
            rule.validate_syntax().unwrap();
        }
        let evaluator = PolicyEvaluator::with_defaults();
        assert_eq!(evaluator.rules_for("nist_ai_rmf").len(), 2);
    }

    #[test]
    fn test_add_rule_rejects_bad_syntax_and_replaces_by_id() {
        let mut evaluator = PolicyEvaluator::default();
        assert!(evaluator.add_rule(PolicyRule::scripted("s", "no colon here")).is_err());

        evaluator.add_rule(PolicyRule::declarative("r", "deny")).unwrap();
        evaluator.add_rule(PolicyRule::declarative("r", "allow")).unwrap();
        assert_eq!(evaluator.rules().len(), 1);
        assert!(evaluator.evaluate_rules(&Facts::new()).can_proceed());
    }
}
