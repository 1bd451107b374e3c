//! Governance core state
//!
//! Everything a process needs to run stages and gate decisions, built once
//! from [`Settings`] and shared by `Arc`. No ambient globals.

use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditSink, GovernanceSummary, RecentHistory, TracingSink};
use crate::compliance::{ComplianceScorer, FrameworkAssessment, FrameworkCatalog};
use crate::config::Settings;
use crate::error::GovResult;
use crate::gate::{GateDecision, GovernanceGate};
use crate::lifecycle::builtin::register_builtin;
use crate::lifecycle::{
    Check, CheckCategory, CheckDefinition, CheckRegistry, Facts, LifecycleContext, LifecycleStage, StageAggregator,
    StageOutcome,
};
use crate::policy::{PolicyCheck, PolicyEvaluator};

/// Id of the optional deployment check that runs the loaded policy rules
pub const POLICY_CHECK_ID: &str = "policy_rules_satisfied";

/// Process-scoped governance state
pub struct GovernanceCore {
    pub settings: Settings,

    /// Check registry (built-ins plus runtime registrations)
    pub registry: Arc<CheckRegistry>,

    /// Policy rules (built-ins plus the optional rules file)
    pub policies: Arc<PolicyEvaluator>,

    /// Bounded recent history for summaries
    pub history: Arc<RecentHistory>,

    pub aggregator: Arc<StageAggregator>,

    pub scorer: Arc<ComplianceScorer>,

    pub gate: GovernanceGate,
}

impl GovernanceCore {
    /// Build with the structured-log audit sink
    pub async fn build(settings: Settings) -> GovResult<Self> {
        Self::with_sink(settings, Arc::new(TracingSink)).await
    }

    /// Build with a caller-supplied persistence boundary
    pub async fn with_sink(settings: Settings, sink: Arc<dyn AuditSink>) -> GovResult<Self> {
        let mut catalog = FrameworkCatalog::with_defaults();
        if let Some(path) = &settings.catalog.frameworks_path {
            catalog.load_json_file(path)?;
        }

        let mut policies = PolicyEvaluator::with_defaults();
        if let Some(path) = &settings.catalog.policy_rules_path {
            policies.load_json_file(path)?;
        }

        let registry = Arc::new(CheckRegistry::new());
        register_builtin(&registry, settings.execution.default_timeout_ms).await?;
        registry
            .add(
                CheckDefinition::new(POLICY_CHECK_ID, LifecycleStage::Deployment, settings.execution.default_timeout_ms)
                    .with_category(CheckCategory::Policy)
                    .with_description("Loaded policy rules hold for the deployment input")
                    .optional(),
                Arc::new(PolicyCheck::new(policies.rules().to_vec())),
            )
            .await?;

        let history = Arc::new(RecentHistory::new(settings.history_capacity));
        let aggregator = Arc::new(StageAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&sink),
            Arc::clone(&history),
            settings.execution.clone(),
        ));
        let scorer = Arc::new(ComplianceScorer::new(Arc::new(catalog), settings.scoring.clone()));
        let gate = GovernanceGate::new(
            Arc::clone(&aggregator),
            Arc::clone(&scorer),
            sink,
            Arc::clone(&history),
            settings.scoring.clone(),
        );

        info!(
            "🛡️  Governance core ready: {} checks, {} frameworks, {} policy rules",
            registry.len().await,
            scorer.catalog().len(),
            policies.rules().len()
        );
        registry.log_summary().await;

        Ok(Self {
            settings,
            registry,
            policies: Arc::new(policies),
            history,
            aggregator,
            scorer,
            gate,
        })
    }

    /// Plug in a concrete analyzer at runtime
    pub async fn register_check(&self, definition: CheckDefinition, check: Arc<dyn Check>) -> GovResult<()> {
        self.registry.add(definition, check).await
    }

    pub async fn run_stage(&self, system_id: &str, stage: LifecycleStage, input_data: Facts) -> GovResult<StageOutcome> {
        self.aggregator.run_stage(system_id, stage, input_data).await
    }

    pub async fn assess(&self, system_id: &str, framework: &str, evidence: &Facts) -> GovResult<FrameworkAssessment> {
        self.gate.assess(system_id, framework, evidence).await
    }

    /// Run a stage and an assessment and return the gate decision
    pub async fn decide(
        &self,
        system_id: &str,
        stage: LifecycleStage,
        input_data: Facts,
        framework: &str,
        evidence: &Facts,
    ) -> GovResult<GateDecision> {
        let context = LifecycleContext::new(system_id, stage, input_data);
        let (decision, _, _) = self.gate.evaluate(context, framework, evidence).await?;
        Ok(decision)
    }

    pub async fn summary(&self, system_id: &str) -> GovernanceSummary {
        self.history.summary(system_id).await
    }
}

/// Type alias for shared state
pub type SharedCore = Arc<GovernanceCore>;
