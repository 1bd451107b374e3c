//! Compliance Scorer
//!
//! Scores every control of a framework against supplied evidence and rolls the
//! results up into a framework assessment with a risk view.
//!
//! Per control:
//! - evidence coverage = present required evidence types / required types
//! - requirement satisfaction = satisfied requirements / requirements
//! - control score = mean of the two
//!
//! The framework score is the mean control score x 100.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::evidence::EvidenceIndex;
use super::frameworks::{FrameworkCatalog, RegulatoryControl, RiskCategory};
use crate::config::ScoringConfig;
use crate::error::GovResult;
use crate::lifecycle::Facts;

/// Compliance status of a control or a whole framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

impl ComplianceStatus {
    /// Compliant or partially compliant
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, ComplianceStatus::NonCompliant)
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Compliant => write!(f, "compliant"),
            ComplianceStatus::PartiallyCompliant => write!(f, "partially compliant"),
            ComplianceStatus::NonCompliant => write!(f, "non-compliant"),
        }
    }
}

/// Overall risk level derived from control outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unacceptable,
}

/// What is missing for a control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapKind {
    MissingEvidence { evidence_type: String },
    UnmetRequirement { requirement: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceGap {
    pub control_id: String,
    pub risk_category: RiskCategory,
    #[serde(flatten)]
    pub kind: GapKind,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub high_risk_violations: usize,
    pub prohibited_violations: usize,
    pub high_risk_controls: Vec<String>,
    pub prohibited_controls: Vec<String>,
    /// A prohibited-category failure blocks deployment regardless of score
    pub blocking: bool,
}

/// Score breakdown for one control
#[derive(Debug, Clone, PartialEq)]
pub struct ControlScore {
    pub evidence_coverage: f64,
    pub requirement_satisfaction: f64,
    pub score: f64,
    pub missing_evidence: Vec<String>,
    pub unmet_requirements: Vec<String>,
}

/// Result of assessing one system against one framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkAssessment {
    pub id: Uuid,
    pub framework: String,
    pub system_id: String,
    pub overall_status: ComplianceStatus,
    /// Percentage in [0, 100]
    pub compliance_score: f64,
    pub control_status: BTreeMap<String, ComplianceStatus>,
    pub control_scores: BTreeMap<String, f64>,
    pub risk_assessment: RiskAssessment,
    pub gaps: Vec<ComplianceGap>,
    pub recommendations: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

impl FrameworkAssessment {
    pub fn any_prohibited_violation(&self) -> bool {
        self.risk_assessment.prohibited_violations > 0
    }
}

/// Scores systems against frameworks from a catalog
#[derive(Debug, Clone)]
pub struct ComplianceScorer {
    catalog: Arc<FrameworkCatalog>,
    thresholds: ScoringConfig,
}

impl ComplianceScorer {
    pub fn new(catalog: Arc<FrameworkCatalog>, thresholds: ScoringConfig) -> Self {
        Self { catalog, thresholds }
    }

    pub fn catalog(&self) -> &FrameworkCatalog {
        &self.catalog
    }

    /// Assess a system against a framework. Fails only for unknown frameworks.
    pub fn assess(&self, system_id: &str, framework_id: &str, evidence: &Facts) -> GovResult<FrameworkAssessment> {
        let framework = self.catalog.get(framework_id)?;
        let index = EvidenceIndex::build(evidence);

        let mut control_status = BTreeMap::new();
        let mut control_scores = BTreeMap::new();
        let mut gaps = Vec::new();
        let mut high_risk_controls = Vec::new();
        let mut prohibited_controls = Vec::new();
        let mut total = 0.0;

        for control in &framework.controls {
            let scored = Self::score_control(control, &index);
            let status = self.status_for(scored.score);
            debug!(
                "Control {}: coverage={:.2} satisfaction={:.2} score={:.2} ({})",
                control.id, scored.evidence_coverage, scored.requirement_satisfaction, scored.score, status
            );

            if status == ComplianceStatus::NonCompliant {
                match control.risk_category {
                    RiskCategory::Prohibited => prohibited_controls.push(control.id.clone()),
                    RiskCategory::HighRisk => high_risk_controls.push(control.id.clone()),
                    _ => {}
                }
            }

            gaps.extend(Self::gaps_for(control, &scored));
            total += scored.score;
            control_status.insert(control.id.clone(), status);
            control_scores.insert(control.id.clone(), scored.score);
        }

        // Zero controls is vacuously satisfied
        let mean = if framework.controls.is_empty() {
            1.0
        } else {
            total / framework.controls.len() as f64
        };
        let compliance_score = (mean * 100.0).clamp(0.0, 100.0);
        let overall_status = self.status_for(mean);

        let risk_assessment = self.risk_assessment(mean, high_risk_controls, prohibited_controls);
        let recommendations = Self::recommendations(framework.controls.as_slice(), &control_status, &gaps);

        info!(
            "📋 {} assessment for {}: score={:.1}, status={}, risk={:?}, gaps={}",
            framework.id,
            system_id,
            compliance_score,
            overall_status,
            risk_assessment.risk_level,
            gaps.len()
        );

        Ok(FrameworkAssessment {
            id: Uuid::new_v4(),
            framework: framework.id.clone(),
            system_id: system_id.to_string(),
            overall_status,
            compliance_score,
            control_status,
            control_scores,
            risk_assessment,
            gaps,
            recommendations,
            assessed_at: Utc::now(),
        })
    }

    /// Score one control against indexed evidence
    pub fn score_control(control: &RegulatoryControl, index: &EvidenceIndex) -> ControlScore {
        let missing_evidence: Vec<String> = control
            .required_evidence
            .iter()
            .filter(|t| !index.has_type(t))
            .cloned()
            .collect();
        let unmet_requirements: Vec<String> = control
            .requirements
            .iter()
            .filter(|r| !index.satisfies(r))
            .cloned()
            .collect();

        let evidence_coverage = ratio(
            control.required_evidence.len() - missing_evidence.len(),
            control.required_evidence.len(),
        );
        let requirement_satisfaction = ratio(
            control.requirements.len() - unmet_requirements.len(),
            control.requirements.len(),
        );

        ControlScore {
            evidence_coverage,
            requirement_satisfaction,
            score: (evidence_coverage + requirement_satisfaction) / 2.0,
            missing_evidence,
            unmet_requirements,
        }
    }

    /// Map a [0, 1] score onto a status using the configured thresholds
    pub fn status_for(&self, score: f64) -> ComplianceStatus {
        if score >= self.thresholds.compliant_threshold {
            ComplianceStatus::Compliant
        } else if score >= self.thresholds.partial_threshold {
            ComplianceStatus::PartiallyCompliant
        } else {
            ComplianceStatus::NonCompliant
        }
    }

    fn risk_assessment(
        &self,
        mean: f64,
        high_risk_controls: Vec<String>,
        prohibited_controls: Vec<String>,
    ) -> RiskAssessment {
        let risk_level = if !prohibited_controls.is_empty() {
            RiskLevel::Unacceptable
        } else if !high_risk_controls.is_empty() {
            RiskLevel::High
        } else if mean < self.thresholds.partial_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskAssessment {
            risk_level,
            high_risk_violations: high_risk_controls.len(),
            prohibited_violations: prohibited_controls.len(),
            blocking: !prohibited_controls.is_empty(),
            high_risk_controls,
            prohibited_controls,
        }
    }

    fn gaps_for(control: &RegulatoryControl, scored: &ControlScore) -> Vec<ComplianceGap> {
        let missing = scored.missing_evidence.iter().map(|evidence_type| ComplianceGap {
            control_id: control.id.clone(),
            risk_category: control.risk_category,
            kind: GapKind::MissingEvidence {
                evidence_type: evidence_type.clone(),
            },
            description: format!("Missing evidence '{}' for control {}", evidence_type, control.id),
        });
        let unmet = scored.unmet_requirements.iter().map(|requirement| ComplianceGap {
            control_id: control.id.clone(),
            risk_category: control.risk_category,
            kind: GapKind::UnmetRequirement {
                requirement: requirement.clone(),
            },
            description: format!("Requirement not evidenced for control {}: {}", control.id, requirement),
        });
        missing.chain(unmet).collect()
    }

    /// One recommendation per gap of a non-compliant or partial control,
    /// prohibited and high-risk controls first
    fn recommendations(
        controls: &[RegulatoryControl],
        control_status: &BTreeMap<String, ComplianceStatus>,
        gaps: &[ComplianceGap],
    ) -> Vec<String> {
        let mut ordered: Vec<&RegulatoryControl> = controls
            .iter()
            .filter(|c| control_status.get(&c.id) != Some(&ComplianceStatus::Compliant))
            .collect();
        ordered.sort_by(|a, b| b.risk_category.cmp(&a.risk_category));

        let mut recommendations = Vec::new();
        for control in ordered {
            let label = if control.title.is_empty() { &control.id } else { &control.title };
            for gap in gaps.iter().filter(|g| g.control_id == control.id) {
                let text = match &gap.kind {
                    GapKind::MissingEvidence { evidence_type } => {
                        format!("[{}] Provide '{}' evidence for {}", control.id, evidence_type, label)
                    }
                    GapKind::UnmetRequirement { requirement } => {
                        format!("[{}] Document how this is met: {}", control.id, requirement)
                    }
                };
                recommendations.push(text);
            }
        }
        recommendations
    }
}

fn ratio(satisfied: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        satisfied as f64 / total as f64
    }
}
