//! Governance Gate
//!
//! Combines a stage run and a framework assessment into the single
//! deploy/no-deploy decision consumed outside the core.
//!
//! `deploy_allowed = stage passed AND compliance acceptable AND no prohibited violation`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, RecentHistory};
use crate::compliance::{ComplianceScorer, ComplianceStatus, FrameworkAssessment};
use crate::config::ScoringConfig;
use crate::error::GovResult;
use crate::lifecycle::{Facts, LifecycleContext, LifecycleStage, StageAggregator, StageOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RequiredCheckFailed,
    LowComplianceScore,
    ProhibitedViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Structured alert handed to the out-of-process dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub system_id: String,
    /// Check id, framework id or control id the alert is about
    pub subject: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl GovernanceAlert {
    fn new(kind: AlertKind, severity: AlertSeverity, system_id: &str, subject: &str, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            system_id: system_id.to_string(),
            subject: subject.to_string(),
            message,
            raised_at: Utc::now(),
        }
    }
}

/// The externally consumed decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub system_id: String,
    pub stage: LifecycleStage,
    pub framework: String,
    pub deploy_allowed: bool,
    pub stage_passed: bool,
    pub compliance_status: ComplianceStatus,
    pub compliance_score: f64,
    pub prohibited_violations: usize,
    pub blocking_reasons: Vec<String>,
    pub alerts: Vec<GovernanceAlert>,
    pub event_id: Uuid,
    pub assessment_id: Uuid,
    pub decided_at: DateTime<Utc>,
}

pub struct GovernanceGate {
    aggregator: Arc<StageAggregator>,
    scorer: Arc<ComplianceScorer>,
    sink: Arc<dyn AuditSink>,
    history: Arc<RecentHistory>,
    thresholds: ScoringConfig,
}

impl GovernanceGate {
    pub fn new(
        aggregator: Arc<StageAggregator>,
        scorer: Arc<ComplianceScorer>,
        sink: Arc<dyn AuditSink>,
        history: Arc<RecentHistory>,
        thresholds: ScoringConfig,
    ) -> Self {
        Self {
            aggregator,
            scorer,
            sink,
            history,
            thresholds,
        }
    }

    pub fn aggregator(&self) -> &Arc<StageAggregator> {
        &self.aggregator
    }

    pub fn scorer(&self) -> &Arc<ComplianceScorer> {
        &self.scorer
    }

    /// Run the stage, assess the evidence and decide
    pub async fn evaluate(
        &self,
        context: LifecycleContext,
        framework: &str,
        evidence: &Facts,
    ) -> GovResult<(GateDecision, StageOutcome, FrameworkAssessment)> {
        // Fail on an unknown framework before any check runs
        self.scorer.catalog().get(framework)?;

        let system_id = context.system_id.clone();
        let outcome = self.aggregator.run(context).await?;
        let assessment = self.assess(&system_id, framework, evidence).await?;
        let decision = self.decide(&outcome, &assessment);
        Ok((decision, outcome, assessment))
    }

    /// Score evidence, hand the assessment to the sink and remember it
    pub async fn assess(&self, system_id: &str, framework: &str, evidence: &Facts) -> GovResult<FrameworkAssessment> {
        let assessment = self.scorer.assess(system_id, framework, evidence)?;
        if let Err(e) = self.sink.persist_assessment(&assessment).await {
            warn!("⚠️  Failed to persist assessment {}: {}", assessment.id, e);
        }
        self.history.record_assessment(assessment.clone()).await;
        Ok(assessment)
    }

    /// Combine a stage outcome and an assessment into a decision
    pub fn decide(&self, outcome: &StageOutcome, assessment: &FrameworkAssessment) -> GateDecision {
        let event = &outcome.event;
        let system_id = event.system_id.as_str();
        let risk = &assessment.risk_assessment;

        let stage_passed = event.all_passed;
        let compliance_ok = assessment.overall_status.is_acceptable();
        let prohibited = assessment.any_prohibited_violation();
        let deploy_allowed = stage_passed && compliance_ok && !prohibited;

        let mut blocking_reasons = Vec::new();
        let mut alerts = Vec::new();

        if !stage_passed {
            blocking_reasons.push(format!(
                "Stage {} required checks did not pass: {}",
                event.stage,
                outcome.required_failures.join(", ")
            ));
        }
        for check_id in &outcome.required_failures {
            let Some(result) = event.results.get(check_id) else {
                continue;
            };
            alerts.push(GovernanceAlert::new(
                AlertKind::RequiredCheckFailed,
                AlertSeverity::Warning,
                system_id,
                check_id,
                format!("Check '{}' ended {}: {}", check_id, result.status, result.message),
            ));
        }

        if !compliance_ok {
            blocking_reasons.push(format!(
                "{} compliance is {} ({:.1}/100)",
                assessment.framework, assessment.overall_status, assessment.compliance_score
            ));
        }
        if assessment.compliance_score < self.thresholds.alert_score_threshold {
            alerts.push(GovernanceAlert::new(
                AlertKind::LowComplianceScore,
                AlertSeverity::Warning,
                system_id,
                &assessment.framework,
                format!(
                    "{} compliance score {:.1} is below {:.1}",
                    assessment.framework, assessment.compliance_score, self.thresholds.alert_score_threshold
                ),
            ));
        }

        if prohibited {
            blocking_reasons.push(format!(
                "Prohibited-practice controls not satisfied: {}",
                risk.prohibited_controls.join(", ")
            ));
            for control in &risk.prohibited_controls {
                alerts.push(GovernanceAlert::new(
                    AlertKind::ProhibitedViolation,
                    AlertSeverity::Critical,
                    system_id,
                    control,
                    format!("Prohibited-practice control {} is non-compliant", control),
                ));
            }
        }

        info!(
            "{} Gate for {} at {} against {}: score={:.1}, status={}, reasons={}",
            if deploy_allowed { "🟢" } else { "🔴" },
            system_id,
            event.stage,
            assessment.framework,
            assessment.compliance_score,
            assessment.overall_status,
            blocking_reasons.len()
        );

        GateDecision {
            system_id: system_id.to_string(),
            stage: event.stage,
            framework: assessment.framework.clone(),
            deploy_allowed,
            stage_passed,
            compliance_status: assessment.overall_status,
            compliance_score: assessment.compliance_score,
            prohibited_violations: risk.prohibited_violations,
            blocking_reasons,
            alerts,
            event_id: event.id,
            assessment_id: assessment.id,
            decided_at: Utc::now(),
        }
    }
}
