//! Policy-backed lifecycle check
//!
//! Attaches a rule set to a lifecycle stage: the rules are evaluated against
//! the stage's `input_data`. Blocking failures fail the check, lesser
//! failures only warn.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::evaluator::evaluate_all;
use super::rules::PolicyRule;
use crate::lifecycle::{Check, CheckOutcome, Facts, LifecycleContext};

pub struct PolicyCheck {
    rules: Vec<PolicyRule>,
}

impl PolicyCheck {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Check for PolicyCheck {
    /// An optional `framework` parameter restricts the rule set to that
    /// framework plus framework-less rules.
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        let framework = parameters.get("framework").and_then(Value::as_str);
        let rules: Vec<PolicyRule> = self
            .rules
            .iter()
            .filter(|r| match framework {
                Some(f) => r.framework.is_empty() || r.framework.eq_ignore_ascii_case(f),
                None => true,
            })
            .cloned()
            .collect();

        let report = evaluate_all(&rules, &context.input_data);
        let failed: Vec<&str> = report
            .evaluations
            .iter()
            .filter(|e| !e.passed)
            .map(|e| e.rule_id.as_str())
            .collect();

        let mut outcome = if !report.can_proceed() {
            CheckOutcome::fail(format!("Blocking policy failures: {}", report.blocking.join(", ")))
        } else if !failed.is_empty() {
            CheckOutcome::warn(format!("Non-blocking policy failures: {}", failed.join(", ")))
        } else {
            CheckOutcome::pass().with_message(format!("{} policy rules passed", report.passed))
        };

        let mut recommendations: Vec<String> = Vec::new();
        for evaluation in &report.evaluations {
            for r in &evaluation.recommendations {
                if !recommendations.contains(r) {
                    recommendations.push(r.clone());
                }
            }
        }
        outcome.recommendations = recommendations;

        Ok(outcome
            .with_score(report.pass_rate())
            .with_evidence("passed", json!(report.passed))
            .with_evidence("failed", json!(failed))
            .with_evidence("blocking", json!(report.blocking))
            .with_evidence("skipped", json!(report.skipped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleStage;
    use crate::policy::rules::Severity;

    fn context(input: Value) -> LifecycleContext {
        LifecycleContext::new("sys", LifecycleStage::Deployment, input.as_object().cloned().unwrap_or_default())
    }

    fn rules() -> Vec<PolicyRule> {
        vec![
            PolicyRule::declarative("oversight", "deny if risk_tier == high and not human_oversight.assigned")
                .with_framework("eu_ai_act")
                .with_category("human_oversight")
                .with_severity(Severity::High),
            PolicyRule::declarative("owner", "allow if owner")
                .with_framework("nist_ai_rmf")
                .with_severity(Severity::Low),
        ]
    }

    #[tokio::test]
    async fn test_blocking_failure_fails_the_check() {
        let outcome = PolicyCheck::new(rules())
            .execute(&context(json!({ "risk_tier": "high", "owner": "team" })), &Facts::new())
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score, Some(0.5));
        assert!(!outcome.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_minor_failure_only_warns() {
        let outcome = PolicyCheck::new(rules())
            .execute(&context(json!({ "risk_tier": "limited" })), &Facts::new())
            .await
            .unwrap();
        assert!(outcome.passed);
        assert!(outcome.warning);
    }

    #[tokio::test]
    async fn test_framework_parameter_filters_rules() {
        let mut params = Facts::new();
        params.insert("framework".to_string(), json!("eu_ai_act"));
        let outcome = PolicyCheck::new(rules())
            .execute(&context(json!({ "risk_tier": "limited" })), &params)
            .await
            .unwrap();
        assert!(outcome.passed);
        assert!(!outcome.warning);
        assert_eq!(outcome.score, Some(1.0));
    }
}
