//! Stage Aggregator
//!
//! Runs every check of one lifecycle stage in dependency order, collects all
//! results (a failing required check never stops the rest), decides
//! `all_passed` and emits the [`LifecycleEvent`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::executor::CheckExecutor;
use super::registry::{CheckRegistry, RegisteredCheck};
use super::resolver::DependencyResolver;
use super::types::{CheckDefinition, CheckResult, CheckStatus, Facts, LifecycleContext, LifecycleEvent, LifecycleStage};
use crate::audit::{AuditSink, RecentHistory};
use crate::config::{CyclePolicy, ExecutionConfig};
use crate::error::{GovResult, GovernanceError};

/// Result of one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub event: LifecycleEvent,
    /// Required checks that did not pass, in execution order
    pub required_failures: Vec<String>,
    /// Optional checks that did not pass, in execution order
    pub optional_failures: Vec<String>,
}

impl StageOutcome {
    pub fn passed(&self) -> bool {
        self.event.all_passed
    }
}

/// `true` iff every required definition has a `passed` result.
/// A stage without required checks passes vacuously.
pub fn all_required_passed(definitions: &[CheckDefinition], results: &BTreeMap<String, CheckResult>) -> bool {
    definitions
        .iter()
        .filter(|d| d.required)
        .all(|d| results.get(&d.id).map(|r| r.status == CheckStatus::Passed).unwrap_or(false))
}

pub struct StageAggregator {
    registry: Arc<CheckRegistry>,
    executor: CheckExecutor,
    sink: Arc<dyn AuditSink>,
    history: Arc<RecentHistory>,
    config: ExecutionConfig,
}

impl StageAggregator {
    pub fn new(
        registry: Arc<CheckRegistry>,
        sink: Arc<dyn AuditSink>,
        history: Arc<RecentHistory>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            registry,
            executor: CheckExecutor::new(),
            sink,
            history,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<CheckRegistry> {
        &self.registry
    }

    /// Convenience wrapper building the context from its parts
    pub async fn run_stage(
        &self,
        system_id: &str,
        stage: LifecycleStage,
        input_data: Facts,
    ) -> GovResult<StageOutcome> {
        self.run(LifecycleContext::new(system_id, stage, input_data)).await
    }

    /// Run a whole stage.
    ///
    /// Only configuration problems (bad dependencies, a cycle under
    /// [`CyclePolicy::Reject`]) return an error, and they do so before any
    /// check has run.
    pub async fn run(&self, context: LifecycleContext) -> GovResult<StageOutcome> {
        let stage = context.stage;
        let checks = self.registry.validated_checks_for(stage).await?;
        let definitions: Vec<CheckDefinition> = checks.iter().map(|c| c.definition.clone()).collect();

        let resolution = DependencyResolver::resolve(&definitions);
        if resolution.cycle_detected && self.config.cycle_policy == CyclePolicy::Reject {
            error!("❌ Refusing to run stage {}: dependency cycle", stage);
            return Err(GovernanceError::CycleDetected {
                stage,
                checks: resolution.unresolved,
            });
        }

        info!(
            "🚦 Running {} stage for {} ({} checks, {} levels{})",
            stage,
            context.system_id,
            checks.len(),
            resolution.levels.len(),
            if self.config.parallel_levels { ", parallel" } else { "" }
        );
        let started = Instant::now();

        let by_id: HashMap<String, RegisteredCheck> =
            checks.into_iter().map(|c| (c.definition.id.clone(), c)).collect();
        let context = Arc::new(context);

        let mut results = BTreeMap::new();
        if self.config.parallel_levels {
            for level in &resolution.levels {
                self.run_level(level, &by_id, &context, &mut results).await;
            }
        } else {
            for id in &resolution.order {
                if let Some(registered) = by_id.get(id) {
                    let result = self.executor.execute(registered, Arc::clone(&context)).await;
                    results.insert(id.clone(), result);
                }
            }
        }

        let all_passed = all_required_passed(&definitions, &results);
        let (required_failures, optional_failures) = Self::split_failures(&resolution.order, &by_id, &results);

        let event = LifecycleEvent::new(
            &context,
            results,
            resolution.order,
            all_passed,
            resolution.cycle_detected,
        );

        if let Err(e) = self.sink.persist_event(&event).await {
            warn!("⚠️  Failed to persist lifecycle event {}: {}", event.id, e);
        }
        self.history.record_event(event.clone()).await;

        info!(
            "{} {} stage for {}: {} / {} checks passed, {} required failures ({}ms)",
            if all_passed { "✅" } else { "⛔" },
            stage,
            event.system_id,
            event.total_checks - event.failed_checks().len(),
            event.total_checks,
            required_failures.len(),
            started.elapsed().as_millis()
        );

        Ok(StageOutcome {
            event,
            required_failures,
            optional_failures,
        })
    }

    /// Run one dependency level concurrently
    async fn run_level(
        &self,
        level: &[String],
        by_id: &HashMap<String, RegisteredCheck>,
        context: &Arc<LifecycleContext>,
        results: &mut BTreeMap<String, CheckResult>,
    ) {
        let mut set = JoinSet::new();
        for id in level {
            if let Some(registered) = by_id.get(id).cloned() {
                let executor = self.executor;
                let context = Arc::clone(context);
                set.spawn(async move { executor.execute(&registered, context).await });
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => {
                    results.insert(result.check_id.clone(), result);
                }
                Err(e) => warn!("Check task in level [{}] was lost: {}", level.join(", "), e),
            }
        }

        // The executor catches callable failures, so this only covers a lost task
        for id in level {
            results.entry(id.clone()).or_insert_with(|| {
                let mut result = CheckResult::pending(id.clone());
                result.status = CheckStatus::Failed;
                result.message = "Check task did not report a result".to_string();
                result
                    .evidence
                    .insert("error".to_string(), serde_json::Value::String("task lost".to_string()));
                result
            });
        }
    }

    fn split_failures(
        order: &[String],
        by_id: &HashMap<String, RegisteredCheck>,
        results: &BTreeMap<String, CheckResult>,
    ) -> (Vec<String>, Vec<String>) {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        for id in order {
            let failed = results.get(id).map(|r| r.status != CheckStatus::Passed).unwrap_or(true);
            if !failed {
                continue;
            }
            match by_id.get(id) {
                Some(c) if c.definition.required => required.push(id.clone()),
                Some(_) => optional.push(id.clone()),
                None => {}
            }
        }
        (required, optional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::lifecycle::check::{check_fn, Check, CheckOutcome};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const STAGE: LifecycleStage = LifecycleStage::Validation;

    fn passing() -> Arc<dyn Check> {
        check_fn(|_, _| async { Ok(CheckOutcome::pass()) })
    }

    fn failing() -> Arc<dyn Check> {
        check_fn(|_, _| async { Ok(CheckOutcome::fail("nope")) })
    }

    fn recording(log: Arc<Mutex<Vec<String>>>, id: &'static str, passed: bool) -> Arc<dyn Check> {
        check_fn(move |_, _| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(id.to_string());
                Ok(if passed {
                    CheckOutcome::pass()
                } else {
                    CheckOutcome::fail(format!("{} failed", id))
                })
            }
        })
    }

    /// Logs `<id>:start` and `<id>:end` around a short sleep
    fn recording_span(log: Arc<Mutex<Vec<String>>>, id: &'static str) -> Arc<dyn Check> {
        check_fn(move |_, _| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{}:start", id));
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                log.lock().unwrap().push(format!("{}:end", id));
                Ok(CheckOutcome::pass())
            }
        })
    }

    fn aggregator(registry: CheckRegistry, config: ExecutionConfig) -> (StageAggregator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let aggregator = StageAggregator::new(
            Arc::new(registry),
            sink.clone(),
            Arc::new(RecentHistory::new(10)),
            config,
        );
        (aggregator, sink)
    }

    #[tokio::test]
    async fn test_failed_required_check_does_not_stop_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = CheckRegistry::new();
        registry
            .add(CheckDefinition::new("A", STAGE, 1_000), recording(log.clone(), "A", false))
            .await
            .unwrap();
        registry
            .add(
                CheckDefinition::new("B", STAGE, 1_000).depends_on("A"),
                recording(log.clone(), "B", true),
            )
            .await
            .unwrap();
        registry
            .add(
                CheckDefinition::new("C", STAGE, 1_000).depends_on("A").optional(),
                recording(log.clone(), "C", true),
            )
            .await
            .unwrap();

        let (aggregator, sink) = aggregator(registry, ExecutionConfig::default());
        let outcome = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
        assert!(!outcome.passed());
        assert_eq!(outcome.event.total_checks, 3);
        assert_eq!(outcome.required_failures, vec!["A"]);
        assert!(outcome.optional_failures.is_empty());
        assert!(outcome.event.verify_checksum());
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_optional_checks_never_affect_all_passed() {
        for optional_passes in [true, false] {
            let registry = CheckRegistry::new();
            registry
                .add(CheckDefinition::new("req", STAGE, 1_000), passing())
                .await
                .unwrap();
            registry
                .add(
                    CheckDefinition::new("opt", STAGE, 1_000).optional(),
                    if optional_passes { passing() } else { failing() },
                )
                .await
                .unwrap();

            let (aggregator, _) = aggregator(registry, ExecutionConfig::default());
            let outcome = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap();
            assert!(outcome.passed(), "optional_passes={}", optional_passes);
            assert_eq!(outcome.optional_failures.is_empty(), optional_passes);
        }
    }

    #[tokio::test]
    async fn test_warning_on_required_check_fails_the_stage() {
        let registry = CheckRegistry::new();
        registry
            .add(
                CheckDefinition::new("borderline", STAGE, 1_000),
                check_fn(|_, _| async { Ok(CheckOutcome::warn("close to limit")) }),
            )
            .await
            .unwrap();

        let (aggregator, _) = aggregator(registry, ExecutionConfig::default());
        let outcome = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap();
        assert!(!outcome.passed());
    }

    #[tokio::test]
    async fn test_empty_stage_passes_vacuously() {
        let (aggregator, sink) = aggregator(CheckRegistry::new(), ExecutionConfig::default());
        let outcome = aggregator.run_stage("sys", LifecycleStage::Monitoring, Facts::new()).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.event.total_checks, 0);
        assert_eq!(sink.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_dependency_aborts_before_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = CheckRegistry::new();
        registry
            .add(CheckDefinition::new("first", STAGE, 1_000), recording(log.clone(), "first", true))
            .await
            .unwrap();
        registry
            .add(
                CheckDefinition::new("second", STAGE, 1_000).depends_on("missing"),
                recording(log.clone(), "second", true),
            )
            .await
            .unwrap();

        let (aggregator, sink) = aggregator(registry, ExecutionConfig::default());
        let err = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap_err();

        assert!(err.is_configuration());
        assert!(log.lock().unwrap().is_empty());
        assert!(sink.events().await.is_empty());
    }

    async fn cyclic_registry() -> CheckRegistry {
        let registry = CheckRegistry::new();
        registry
            .add(CheckDefinition::new("x", STAGE, 1_000).depends_on("y"), passing())
            .await
            .unwrap();
        registry
            .add(CheckDefinition::new("y", STAGE, 1_000).depends_on("x"), passing())
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_cycle_fallback_runs_everything_and_flags_event() {
        let (aggregator, _) = aggregator(cyclic_registry().await, ExecutionConfig::default());
        let outcome = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap();
        assert!(outcome.event.cycle_detected);
        assert_eq!(outcome.event.execution_order, vec!["x", "y"]);
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn test_cycle_reject_policy_errors() {
        let config = ExecutionConfig {
            cycle_policy: CyclePolicy::Reject,
            ..ExecutionConfig::default()
        };
        let (aggregator, _) = aggregator(cyclic_registry().await, config);
        let result = aggregator.run_stage("sys", STAGE, Facts::new()).await;
        assert!(matches!(result, Err(GovernanceError::CycleDetected { .. })));
    }

    #[tokio::test]
    async fn test_parallel_levels_collect_every_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = CheckRegistry::new();
        registry
            .add(CheckDefinition::new("load", STAGE, 1_000), recording_span(log.clone(), "load"))
            .await
            .unwrap();
        for id in ["fairness", "accuracy", "robustness"] {
            registry
                .add(
                    CheckDefinition::new(id, STAGE, 1_000).depends_on("load"),
                    recording_span(log.clone(), id),
                )
                .await
                .unwrap();
        }
        registry
            .add(
                CheckDefinition::new("slow", STAGE, 20).depends_on("load"),
                check_fn(|_, _| async {
                    std::future::pending::<()>().await;
                    Ok(CheckOutcome::pass())
                }),
            )
            .await
            .unwrap();

        let config = ExecutionConfig {
            parallel_levels: true,
            ..ExecutionConfig::default()
        };
        let (aggregator, _) = aggregator(registry, config);
        let outcome = aggregator.run_stage("sys", STAGE, Facts::new()).await.unwrap();

        assert_eq!(outcome.event.total_checks, 5);
        assert_eq!(outcome.event.results["slow"].status, CheckStatus::Failed);
        assert_eq!(
            outcome.event.results["slow"].evidence.get("timeout"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(outcome.required_failures, vec!["slow"]);
        assert!(!outcome.passed());

        // Dependents start only after their dependency finished, and run side by side
        let log = log.lock().unwrap().clone();
        let at = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        let dependents = ["fairness", "accuracy", "robustness"];
        for id in dependents {
            assert!(at("load:end") < at(format!("{}:start", id).as_str()), "{:?}", log);
        }
        let last_start = dependents.iter().map(|id| at(format!("{}:start", id).as_str())).max().unwrap();
        let first_end = dependents.iter().map(|id| at(format!("{}:end", id).as_str())).min().unwrap();
        assert!(last_start < first_end, "{:?}", log);
    }

    #[test]
    fn test_all_required_passed_property() {
        let defs = vec![
            CheckDefinition::new("r1", STAGE, 10),
            CheckDefinition::new("r2", STAGE, 10),
            CheckDefinition::new("o1", STAGE, 10).optional(),
        ];
        let statuses = [
            CheckStatus::Passed,
            CheckStatus::Failed,
            CheckStatus::Warning,
            CheckStatus::Skipped,
            CheckStatus::Timeout,
            CheckStatus::Error,
        ];

        for r1 in statuses {
            for r2 in statuses {
                for o1 in statuses {
                    let mut results = BTreeMap::new();
                    for (id, status) in [("r1", r1), ("r2", r2), ("o1", o1)] {
                        let mut result = CheckResult::pending(id);
                        result.status = status;
                        results.insert(id.to_string(), result);
                    }
                    let expected = r1 == CheckStatus::Passed && r2 == CheckStatus::Passed;
                    assert_eq!(all_required_passed(&defs, &results), expected);
                }
            }
        }
    }
}
