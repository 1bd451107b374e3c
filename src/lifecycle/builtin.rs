//! Built-in Checks
//!
//! The default check set registered at startup. Concrete bias and quality
//! statistics are computed upstream; these checks read the precomputed values
//! from `input_data` and compare them with thresholds carried in each
//! definition's parameters, so deployments can retune them without code.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::check::{Check, CheckOutcome};
use super::registry::CheckRegistry;
use super::types::{CheckCategory, CheckDefinition, Facts, LifecycleContext, LifecycleStage};
use crate::compliance::evidence::is_present;
use crate::error::GovResult;

// =============================================================================
// CHECK KINDS
// =============================================================================

/// Passes when any of the `paths` parameter entries resolves to a non-empty value
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceCheck;

#[async_trait]
impl Check for PresenceCheck {
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        let paths = string_list(parameters, "paths");
        if paths.is_empty() {
            anyhow::bail!("presence check has no 'paths' parameter");
        }

        match paths.iter().find(|p| context.lookup(p).map(is_present).unwrap_or(false)) {
            Some(found) => Ok(CheckOutcome::pass()
                .with_message(format!("Found '{}'", found))
                .with_evidence("found", json!(found))),
            None => Ok(CheckOutcome::fail(format!("None of [{}] supplied", paths.join(", ")))
                .with_evidence("expected", json!(paths))
                .with_recommendation(format!("Supply '{}' in the stage input", paths[0]))),
        }
    }
}

/// Direction of a threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    AtLeast,
    AtMost,
}

/// Compares the numeric fact at `metric` against `threshold`
#[derive(Debug, Clone, Copy)]
pub struct ThresholdCheck {
    bound: Bound,
}

impl ThresholdCheck {
    pub fn at_least() -> Self {
        Self { bound: Bound::AtLeast }
    }

    pub fn at_most() -> Self {
        Self { bound: Bound::AtMost }
    }
}

#[async_trait]
impl Check for ThresholdCheck {
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        let metric = parameters
            .get("metric")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("threshold check has no 'metric' parameter"))?;
        let threshold = parameters
            .get("threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("threshold check has no numeric 'threshold' parameter"))?;

        let Some(value) = context.lookup(metric).and_then(Value::as_f64) else {
            return Ok(CheckOutcome::fail(format!("Metric '{}' was not supplied", metric))
                .with_evidence("metric", json!(metric))
                .with_recommendation(format!("Compute '{}' before running this stage", metric)));
        };

        let (passed, score, op) = match self.bound {
            Bound::AtLeast => (value >= threshold, ratio(value, threshold), ">="),
            Bound::AtMost => (value <= threshold, ratio(threshold, value), "<="),
        };

        let outcome = if passed {
            CheckOutcome::pass().with_message(format!("{} = {} ({} {})", metric, value, op, threshold))
        } else {
            CheckOutcome::fail(format!("{} = {} violates {} {}", metric, value, op, threshold))
                .with_recommendation(format!("Bring '{}' to {} {} before promotion", metric, op, threshold))
        };

        Ok(outcome
            .with_score(score)
            .with_evidence("metric", json!(metric))
            .with_evidence("value", json!(value))
            .with_evidence("threshold", json!(threshold)))
    }
}

/// Passes when the boolean fact at `flag` is `true`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalCheck;

#[async_trait]
impl Check for ApprovalCheck {
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        let flag = parameters
            .get("flag")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("approval check has no 'flag' parameter"))?;

        Ok(match context.lookup(flag).and_then(Value::as_bool) {
            Some(true) => CheckOutcome::pass().with_evidence(flag, Value::Bool(true)),
            Some(false) => CheckOutcome::fail(format!("'{}' is not approved", flag))
                .with_evidence(flag, Value::Bool(false))
                .with_recommendation(format!("Obtain sign-off recorded as '{}'", flag)),
            None => CheckOutcome::fail(format!("No approval recorded at '{}'", flag))
                .with_recommendation(format!("Record the sign-off as '{}: true'", flag)),
        })
    }
}

/// Screens the PII report: clean passes, detected-but-masked warns, unmasked fails
#[derive(Debug, Clone, Copy, Default)]
pub struct PiiScreeningCheck;

#[async_trait]
impl Check for PiiScreeningCheck {
    async fn execute(&self, context: &LifecycleContext, _parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        let Some(report) = context.lookup("pii") else {
            return Ok(CheckOutcome::skip("No PII screening report supplied"));
        };

        let detected = report.get("detected").and_then(Value::as_bool).unwrap_or(false);
        let masked = report.get("masked").and_then(Value::as_bool).unwrap_or(false);
        let fields = report.get("fields").cloned().unwrap_or(Value::Array(vec![]));

        Ok(match (detected, masked) {
            (false, _) => CheckOutcome::pass().with_message("No PII detected"),
            (true, true) => CheckOutcome::warn("PII detected and masked")
                .with_evidence("fields", fields)
                .with_recommendation("Confirm masking is irreversible before training"),
            (true, false) => CheckOutcome::fail("Unmasked PII detected")
                .with_evidence("fields", fields)
                .with_recommendation("Mask or drop PII fields before training"),
        })
    }
}

// =============================================================================
// DEFAULT SET
// =============================================================================

/// Definitions of the built-in checks, paired with their implementations
pub fn builtin_checks(timeout_ms: u64) -> Vec<(CheckDefinition, Arc<dyn Check>)> {
    use CheckCategory::*;
    use LifecycleStage::*;

    let presence = |id: &str, stage, category, paths: &[&str]| {
        let def = CheckDefinition::new(id, stage, timeout_ms)
            .with_category(category)
            .with_parameter("paths", json!(paths));
        (def, Arc::new(PresenceCheck) as Arc<dyn Check>)
    };
    let threshold = |id: &str, stage, category, metric: &str, value: f64, check: ThresholdCheck| {
        let def = CheckDefinition::new(id, stage, timeout_ms)
            .with_category(category)
            .with_parameter("metric", json!(metric))
            .with_parameter("threshold", json!(value));
        (def, Arc::new(check) as Arc<dyn Check>)
    };
    let approval = |id: &str, stage, category, flag: &str| {
        let def = CheckDefinition::new(id, stage, timeout_ms)
            .with_category(category)
            .with_parameter("flag", json!(flag));
        (def, Arc::new(ApprovalCheck) as Arc<dyn Check>)
    };

    let (schema, schema_check) = presence("data_schema_present", Ingestion, DataQuality, &["schema", "data_schema"]);
    let (quality, quality_check) =
        threshold("data_quality_threshold", Ingestion, DataQuality, "data_quality.score", 0.8, ThresholdCheck::at_least());
    let (card, card_check) = presence("model_card_present", Validation, Documentation, &["model_card"]);
    let (oversight, oversight_check) = presence(
        "human_oversight_defined",
        Deployment,
        Policy,
        &["human_oversight.plan", "human_oversight_plan"],
    );

    vec![
        (
            schema.with_description("Input dataset declares a schema"),
            schema_check,
        ),
        (
            quality
                .with_description("Data quality score meets the minimum")
                .depends_on("data_schema_present"),
            quality_check,
        ),
        (
            CheckDefinition::new("pii_screening", Ingestion, timeout_ms)
                .with_category(Privacy)
                .with_description("PII in the dataset is absent or masked")
                .depends_on("data_schema_present")
                .optional(),
            Arc::new(PiiScreeningCheck) as Arc<dyn Check>,
        ),
        presence(
            "training_data_documented",
            Training,
            Documentation,
            &["training_data.documentation", "dataset_documentation"],
        ),
        threshold(
            "bias_metrics_threshold",
            Validation,
            Bias,
            "bias.disparate_impact",
            0.8,
            ThresholdCheck::at_least(),
        ),
        threshold(
            "performance_threshold",
            Validation,
            Performance,
            "performance.accuracy",
            0.8,
            ThresholdCheck::at_least(),
        ),
        (
            card.with_description("Model card published")
                .depends_on("performance_threshold")
                .optional(),
            card_check,
        ),
        approval("security_review_complete", Deployment, Security, "security_review.completed"),
        (
            oversight
                .with_description("Human oversight responsibilities are assigned")
                .depends_on("security_review_complete"),
            oversight_check,
        ),
        threshold(
            "drift_within_bounds",
            Monitoring,
            Performance,
            "monitoring.drift_score",
            0.2,
            ThresholdCheck::at_most(),
        ),
        approval("retraining_approved", Retraining, Policy, "retraining.approved"),
        presence(
            "data_retention_plan",
            Decommission,
            Privacy,
            &["data_retention.plan", "data_retention_plan"],
        ),
    ]
}

/// Register the built-in checks
pub async fn register_builtin(registry: &CheckRegistry, timeout_ms: u64) -> GovResult<usize> {
    let checks = builtin_checks(timeout_ms);
    let count = checks.len();
    for (definition, check) in checks {
        registry.add(definition, check).await?;
    }
    info!("🧩 Registered {} built-in checks", count);
    Ok(count)
}

fn string_list(parameters: &Facts, key: &str) -> Vec<String> {
    match parameters.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// `numerator / denominator` in [0, 1]; a non-positive denominator counts as met
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return if numerator >= denominator { 1.0 } else { 0.0 };
    }
    (numerator / denominator).clamp(0.0, 1.0)
}
