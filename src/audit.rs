//! Audit Trail
//!
//! The persistence boundary for lifecycle events and framework assessments,
//! plus the small in-memory history the core keeps for summary queries.
//! Durable storage lives behind [`AuditSink`]; the core never re-reads it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::compliance::{ComplianceStatus, FrameworkAssessment};
use crate::error::GovResult;
use crate::lifecycle::{LifecycleEvent, LifecycleStage};

// =============================================================================
// PERSISTENCE BOUNDARY
// =============================================================================

/// Receives every event and assessment right after it is created
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist_event(&self, event: &LifecycleEvent) -> GovResult<()>;

    async fn persist_assessment(&self, assessment: &FrameworkAssessment) -> GovResult<()>;
}

/// Writes records to the structured log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn persist_event(&self, event: &LifecycleEvent) -> GovResult<()> {
        info!(
            target: "aigov_gate::audit",
            event_id = %event.id,
            system_id = %event.system_id,
            stage = %event.stage,
            all_passed = event.all_passed,
            total_checks = event.total_checks,
            cycle_detected = event.cycle_detected,
            checksum = %event.checksum,
            "lifecycle event recorded"
        );
        Ok(())
    }

    async fn persist_assessment(&self, assessment: &FrameworkAssessment) -> GovResult<()> {
        info!(
            target: "aigov_gate::audit",
            assessment_id = %assessment.id,
            system_id = %assessment.system_id,
            framework = %assessment.framework,
            score = assessment.compliance_score,
            status = %assessment.overall_status,
            gaps = assessment.gaps.len(),
            "framework assessment recorded"
        );
        Ok(())
    }
}

/// Keeps every record in memory (tests, embedding callers)
#[derive(Default)]
pub struct MemorySink {
    events: RwLock<Vec<LifecycleEvent>>,
    assessments: RwLock<Vec<FrameworkAssessment>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().await.clone()
    }

    pub async fn assessments(&self) -> Vec<FrameworkAssessment> {
        self.assessments.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn persist_event(&self, event: &LifecycleEvent) -> GovResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn persist_assessment(&self, assessment: &FrameworkAssessment) -> GovResult<()> {
        self.assessments.write().await.push(assessment.clone());
        Ok(())
    }
}

/// Fans records out to several sinks; the first failure is reported after all ran
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutSink {
    async fn persist_event(&self, event: &LifecycleEvent) -> GovResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.persist_event(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn persist_assessment(&self, assessment: &FrameworkAssessment) -> GovResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.persist_assessment(assessment).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// =============================================================================
// RECENT HISTORY
// =============================================================================

/// Bounded ring buffers of the latest events and assessments
pub struct RecentHistory {
    capacity: usize,
    events: RwLock<VecDeque<LifecycleEvent>>,
    assessments: RwLock<VecDeque<FrameworkAssessment>>,
}

impl RecentHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            assessments: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn record_event(&self, event: LifecycleEvent) {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        debug!("History: recorded {} event for {}", event.stage, event.system_id);
        events.push_back(event);
    }

    pub async fn record_assessment(&self, assessment: FrameworkAssessment) {
        let mut assessments = self.assessments.write().await;
        if assessments.len() == self.capacity {
            assessments.pop_front();
        }
        assessments.push_back(assessment);
    }

    /// Most recent events first, optionally filtered by system
    pub async fn recent_events(&self, system_id: Option<&str>, limit: usize) -> Vec<LifecycleEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .rev()
            .filter(|e| system_id.map(|id| e.system_id == id).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Latest assessment of a system, optionally for one framework
    pub async fn latest_assessment(&self, system_id: &str, framework: Option<&str>) -> Option<FrameworkAssessment> {
        let assessments = self.assessments.read().await;
        assessments
            .iter()
            .rev()
            .find(|a| a.system_id == system_id && framework.map(|f| a.framework == f).unwrap_or(true))
            .cloned()
    }

    /// Roll the retained history of one system into a summary
    pub async fn summary(&self, system_id: &str) -> GovernanceSummary {
        let events = self.events.read().await;
        let mut summary = GovernanceSummary::empty(system_id);

        for event in events.iter().filter(|e| e.system_id == system_id) {
            summary.stage_runs += 1;
            if event.all_passed {
                summary.stages_passed += 1;
            }
            summary.latest_stage = Some(event.stage);
            summary.latest_stage_passed = Some(event.all_passed);
            summary.failing_checks = event
                .failed_checks()
                .into_iter()
                .map(|r| r.check_id.clone())
                .collect();
            summary.last_activity = Some(event.timestamp);
        }
        drop(events);

        if let Some(assessment) = self.latest_assessment(system_id, None).await {
            summary.latest_framework = Some(assessment.framework.clone());
            summary.latest_compliance_score = Some(assessment.compliance_score);
            summary.latest_compliance_status = Some(assessment.overall_status);
            if summary.last_activity.map_or(true, |t| assessment.assessed_at > t) {
                summary.last_activity = Some(assessment.assessed_at);
            }
        }

        summary
    }
}

/// Snapshot of what the history knows about one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSummary {
    pub system_id: String,
    pub stage_runs: usize,
    pub stages_passed: usize,
    pub latest_stage: Option<LifecycleStage>,
    pub latest_stage_passed: Option<bool>,
    /// Checks that did not pass in the latest stage run
    pub failing_checks: Vec<String>,
    pub latest_framework: Option<String>,
    pub latest_compliance_score: Option<f64>,
    pub latest_compliance_status: Option<ComplianceStatus>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl GovernanceSummary {
    fn empty(system_id: &str) -> Self {
        Self {
            system_id: system_id.to_string(),
            stage_runs: 0,
            stages_passed: 0,
            latest_stage: None,
            latest_stage_passed: None,
            failing_checks: Vec::new(),
            latest_framework: None,
            latest_compliance_score: None,
            latest_compliance_status: None,
            last_activity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::persistence_error;
    use crate::lifecycle::{CheckResult, CheckStatus, Facts, LifecycleContext};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn event(system: &str, stage: LifecycleStage, failing: &[&str]) -> LifecycleEvent {
        let context = LifecycleContext::new(system, stage, Facts::new());
        let mut results = BTreeMap::new();
        for id in ["ok"].iter().chain(failing.iter()) {
            let mut result = CheckResult::pending(*id);
            result.status = if failing.contains(id) {
                CheckStatus::Failed
            } else {
                CheckStatus::Passed
            };
            results.insert(id.to_string(), result);
        }
        let order = results.keys().cloned().collect();
        LifecycleEvent::new(&context, results, order, failing.is_empty(), false)
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn persist_event(&self, _event: &LifecycleEvent) -> GovResult<()> {
            Err(persistence_error("disk full"))
        }

        async fn persist_assessment(&self, _assessment: &FrameworkAssessment) -> GovResult<()> {
            Err(persistence_error("disk full"))
        }
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let history = RecentHistory::new(2);
        history.record_event(event("a", LifecycleStage::Ingestion, &[])).await;
        history.record_event(event("a", LifecycleStage::Training, &[])).await;
        history.record_event(event("a", LifecycleStage::Validation, &[])).await;

        let stages: Vec<LifecycleStage> = history
            .recent_events(None, 10)
            .await
            .into_iter()
            .map(|e| e.stage)
            .collect();
        assert_eq!(stages, vec![LifecycleStage::Validation, LifecycleStage::Training]);
    }

    #[tokio::test]
    async fn test_summary_reflects_latest_stage_run() {
        let history = RecentHistory::new(10);
        history.record_event(event("sys", LifecycleStage::Ingestion, &[])).await;
        history
            .record_event(event("sys", LifecycleStage::Validation, &["bias_metrics_threshold"]))
            .await;
        history.record_event(event("other", LifecycleStage::Deployment, &[])).await;

        let summary = history.summary("sys").await;
        assert_eq!(summary.stage_runs, 2);
        assert_eq!(summary.stages_passed, 1);
        assert_eq!(summary.latest_stage, Some(LifecycleStage::Validation));
        assert_eq!(summary.latest_stage_passed, Some(false));
        assert_eq!(summary.failing_checks, vec!["bias_metrics_threshold"]);
        assert!(summary.latest_compliance_score.is_none());

        let unknown = history.summary("nobody").await;
        assert_eq!(unknown.stage_runs, 0);
        assert!(unknown.last_activity.is_none());
    }

    #[tokio::test]
    async fn test_memory_sink_and_fanout() {
        let memory = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new(vec![Arc::new(FailingSink), memory.clone(), Arc::new(TracingSink)]);

        let result = fanout.persist_event(&event("sys", LifecycleStage::Deployment, &[])).await;
        assert!(result.is_err());
        assert_eq!(memory.events().await.len(), 1);
    }
}
