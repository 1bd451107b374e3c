//! Lifecycle data model
//!
//! Stages of an AI system's life, check definitions, per-check results and the
//! append-only events a stage run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{validation_error, GovernanceError};

/// Key/value bag used for input data, parameters and evidence
pub type Facts = Map<String, Value>;

/// Phase of an AI system's life that governance checks attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Ingestion,
    Training,
    Validation,
    Deployment,
    Monitoring,
    Retraining,
    Decommission,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 7] = [
        LifecycleStage::Ingestion,
        LifecycleStage::Training,
        LifecycleStage::Validation,
        LifecycleStage::Deployment,
        LifecycleStage::Monitoring,
        LifecycleStage::Retraining,
        LifecycleStage::Decommission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Ingestion => "ingestion",
            LifecycleStage::Training => "training",
            LifecycleStage::Validation => "validation",
            LifecycleStage::Deployment => "deployment",
            LifecycleStage::Monitoring => "monitoring",
            LifecycleStage::Retraining => "retraining",
            LifecycleStage::Decommission => "decommission",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        LifecycleStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| validation_error(format!("Unknown lifecycle stage '{}'", s)))
    }
}

/// Grouping for checks, used for reporting and recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Bias,
    Privacy,
    Security,
    Performance,
    Documentation,
    DataQuality,
    Policy,
    Custom,
}

impl Default for CheckCategory {
    fn default() -> Self {
        CheckCategory::Custom
    }
}

/// Status of a single check. `Pending` and `Running` are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Warning,
    Skipped,
    Timeout,
    Error,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckStatus::Pending | CheckStatus::Running)
    }

    /// Failed, timed out or errored
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Failed | CheckStatus::Timeout | CheckStatus::Error)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Running => "running",
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::Warning => "warning",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Timeout => "timeout",
            CheckStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Declarative description of a governance check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckDefinition {
    #[validate(length(min = 1, max = 128, message = "Check id must be between 1 and 128 characters"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stage: LifecycleStage,
    #[serde(default = "default_required")]
    pub required: bool,
    #[validate(range(min = 1, message = "Check timeout must be positive"))]
    pub timeout_ms: u64,
    /// Ids of checks in the same stage that must run first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parameters: Facts,
    #[serde(default)]
    pub category: CheckCategory,
}

fn default_required() -> bool {
    true
}

impl CheckDefinition {
    pub fn new(id: impl Into<String>, stage: LifecycleStage, timeout_ms: u64) -> Self {
        let id = id.into();
        Self {
            name: id.replace('_', " "),
            id,
            description: String::new(),
            stage,
            required: true,
            timeout_ms,
            dependencies: Vec::new(),
            parameters: Facts::new(),
            category: CheckCategory::Custom,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn with_category(mut self, category: CheckCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Outcome of one check execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check_id: String,
    pub status: CheckStatus,
    pub score: f64,
    pub message: String,
    pub evidence: Facts,
    pub recommendations: Vec<String>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    /// A result in the initial `Pending` state
    pub fn pending(check_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            status: CheckStatus::Pending,
            score: 0.0,
            message: String::new(),
            evidence: Facts::new(),
            recommendations: Vec::new(),
            execution_time_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Immutable input to one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleContext {
    pub system_id: String,
    pub stage: LifecycleStage,
    #[serde(default)]
    pub input_data: Facts,
    pub created_at: DateTime<Utc>,
}

impl LifecycleContext {
    pub fn new(system_id: impl Into<String>, stage: LifecycleStage, input_data: Facts) -> Self {
        Self {
            system_id: system_id.into(),
            stage,
            input_data,
            created_at: Utc::now(),
        }
    }

    /// Resolve a dotted path (`metrics.bias.disparate_impact`) in the input data
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.input_data, path)
    }
}

/// Walk a dotted path through nested JSON objects
pub fn lookup_path<'a>(facts: &'a Facts, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.').map(str::trim);
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = facts.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Append-only audit record of one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub system_id: String,
    pub stage: LifecycleStage,
    pub results: BTreeMap<String, CheckResult>,
    pub execution_order: Vec<String>,
    pub all_passed: bool,
    pub total_checks: usize,
    pub cycle_detected: bool,
    pub timestamp: DateTime<Utc>,
    pub checksum: String,
}

impl LifecycleEvent {
    pub fn new(
        context: &LifecycleContext,
        results: BTreeMap<String, CheckResult>,
        execution_order: Vec<String>,
        all_passed: bool,
        cycle_detected: bool,
    ) -> Self {
        let checksum = Self::compute_checksum(&context.system_id, context.stage, &results, all_passed);
        Self {
            id: Uuid::new_v4(),
            system_id: context.system_id.clone(),
            stage: context.stage,
            total_checks: results.len(),
            results,
            execution_order,
            all_passed,
            cycle_detected,
            timestamp: Utc::now(),
            checksum,
        }
    }

    /// Compute checksum from the recorded outcome
    pub fn compute_checksum(
        system_id: &str,
        stage: LifecycleStage,
        results: &BTreeMap<String, CheckResult>,
        all_passed: bool,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", system_id, stage, all_passed).as_bytes());

        // BTreeMap iteration is already sorted by check id
        for (id, result) in results {
            hasher.update(format!("{}={}:{:.6}", id, result.status, result.score).as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    /// True when the recorded checksum still matches the recorded results
    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.system_id, self.stage, &self.results, self.all_passed) == self.checksum
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.results.values().filter(|r| !r.passed()).collect()
    }
}
