//! The check callable contract
//!
//! Concrete analyzers (bias, privacy, security, documentation...) plug into the
//! registry by implementing [`Check`]. Closures can be adapted with [`check_fn`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::types::{Facts, LifecycleContext};

/// What a check callable reports back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub evidence: Facts,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Passed, but with findings worth surfacing
    #[serde(default)]
    pub warning: bool,
    /// The check does not apply to this input
    #[serde(default)]
    pub skipped: bool,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            warning: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            skipped: true,
            message: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: Value) -> Self {
        self.evidence.insert(key.into(), value);
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}

/// A single governance test.
///
/// Implementations must be safe to abandon: when a check overruns its timeout
/// the executor stops waiting but the future may keep running in the background.
#[async_trait]
pub trait Check: Send + Sync {
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome>;
}

/// Closure-backed check, see [`check_fn`]
pub struct FnCheck<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> Check for FnCheck<F>
where
    F: Fn(Arc<LifecycleContext>, Facts) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CheckOutcome>> + Send + 'static,
{
    async fn execute(&self, context: &LifecycleContext, parameters: &Facts) -> anyhow::Result<CheckOutcome> {
        (self.func)(Arc::new(context.clone()), parameters.clone()).await
    }
}

/// Wrap an async closure as a registrable check
pub fn check_fn<F, Fut>(func: F) -> Arc<dyn Check>
where
    F: Fn(Arc<LifecycleContext>, Facts) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckOutcome>> + Send + 'static,
{
    Arc::new(FnCheck { func })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::types::LifecycleStage;
    use serde_json::json;

    #[tokio::test]
    async fn test_check_fn_receives_context_and_parameters() {
        let check = check_fn(|ctx, params| async move {
            let limit = params.get("limit").and_then(Value::as_f64).unwrap_or(0.0);
            let value = ctx.lookup("accuracy").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(if value >= limit {
                CheckOutcome::pass().with_score(value)
            } else {
                CheckOutcome::fail("below limit")
            })
        });

        let mut input = Facts::new();
        input.insert("accuracy".to_string(), json!(0.93));
        let context = LifecycleContext::new("sys", LifecycleStage::Validation, input);
        let mut params = Facts::new();
        params.insert("limit".to_string(), json!(0.9));

        let outcome = check.execute(&context, &params).await.unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, Some(0.93));
    }

    #[test]
    fn test_outcome_contract_deserializes_minimal_payload() {
        let outcome: CheckOutcome = serde_json::from_value(json!({ "passed": false })).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.score.is_none());
        assert!(!outcome.warning && !outcome.skipped);
    }
}
