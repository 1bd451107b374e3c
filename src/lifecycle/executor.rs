//! Check Executor
//!
//! Runs one check against its time budget and normalizes whatever happens
//! (pass, fail, error, panic, timeout) into a [`CheckResult`]. Nothing a
//! callable does escapes as an error: errors, panics and timeouts all end
//! `Failed` with score 0 and the cause recorded in evidence.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, instrument, warn};

use super::check::CheckOutcome;
use super::registry::RegisteredCheck;
use super::types::{CheckResult, CheckStatus, LifecycleContext};

/// Stateless executor; independent calls may run concurrently
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckExecutor;

impl CheckExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a check, racing it against `definition.timeout_ms`.
    ///
    /// The callable runs on its own task. On timeout the task is detached
    /// rather than killed, so callables must tolerate being abandoned.
    #[instrument(skip_all, fields(check = %registered.definition.id, system = %context.system_id))]
    pub async fn execute(&self, registered: &RegisteredCheck, context: Arc<LifecycleContext>) -> CheckResult {
        let definition = &registered.definition;
        let budget = Duration::from_millis(definition.timeout_ms);
        let started = Instant::now();

        let mut result = CheckResult::pending(definition.id.clone());
        result.status = CheckStatus::Running;
        debug!("Running check '{}' (timeout {}ms)", definition.id, definition.timeout_ms);

        let check = Arc::clone(&registered.check);
        let parameters = definition.parameters.clone();
        let handle = tokio::spawn(async move { check.execute(&context, &parameters).await });

        match tokio::time::timeout(budget, handle).await {
            Ok(Ok(Ok(outcome))) => Self::apply_outcome(&mut result, outcome),
            Ok(Ok(Err(err))) => {
                warn!("Check '{}' raised an error: {:#}", definition.id, err);
                result.status = CheckStatus::Failed;
                result.message = format!("Check raised an error: {}", err);
                result.evidence.insert("error".to_string(), Value::String(format!("{:#}", err)));
            }
            Ok(Err(join_err)) => {
                let text = Self::join_error_text(join_err);
                warn!("Check '{}' aborted: {}", definition.id, text);
                result.status = CheckStatus::Failed;
                result.message = format!("Check aborted: {}", text);
                result.evidence.insert("error".to_string(), Value::String(text));
                result.evidence.insert("panicked".to_string(), Value::Bool(true));
            }
            Err(_) => {
                warn!("⏱️  Check '{}' timed out after {}ms", definition.id, definition.timeout_ms);
                result.status = CheckStatus::Failed;
                result.message = format!("Check timed out after {}ms", definition.timeout_ms);
                result.evidence.insert("timeout".to_string(), Value::Bool(true));
                result.evidence.insert("timeoutMs".to_string(), json!(definition.timeout_ms));
            }
        }

        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result.timestamp = Utc::now();

        debug!(
            "Check '{}' finished: status={}, score={:.2}, {}ms",
            definition.id, result.status, result.score, result.execution_time_ms
        );
        result
    }

    fn apply_outcome(result: &mut CheckResult, outcome: CheckOutcome) {
        let status = if outcome.skipped {
            CheckStatus::Skipped
        } else if outcome.passed && outcome.warning {
            CheckStatus::Warning
        } else if outcome.passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        };

        // Only a passing outcome keeps the reported score
        result.status = status;
        result.score = match status {
            CheckStatus::Passed | CheckStatus::Warning => outcome.score.map(clamp_score).unwrap_or(1.0),
            _ => 0.0,
        };
        result.message = outcome.message.unwrap_or_else(|| match status {
            CheckStatus::Passed => "Check passed".to_string(),
            CheckStatus::Warning => "Check passed with warnings".to_string(),
            CheckStatus::Skipped => "Check not applicable".to_string(),
            _ => "Check failed".to_string(),
        });
        result.evidence = outcome.evidence;
        result.recommendations = outcome.recommendations;
    }

    fn join_error_text(err: JoinError) -> String {
        if err.is_panic() {
            let payload = err.into_panic();
            if let Some(s) = payload.downcast_ref::<&str>() {
                return format!("panic: {}", s);
            }
            if let Some(s) = payload.downcast_ref::<String>() {
                return format!("panic: {}", s);
            }
            return "panic".to_string();
        }
        "task cancelled".to_string()
    }
}

/// Clamp a reported score into [0, 1]; NaN counts as 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
