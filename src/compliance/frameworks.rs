//! Regulatory frameworks and their controls
//!
//! Built-in catalog for the EU AI Act, NIST AI RMF and ISO/IEC 42001, plus
//! loading of additional frameworks from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::info;
use validator::Validate;

use crate::error::{validation_error, GovResult, GovernanceError};

/// Risk tier of a control (EU AI Act tiers, applied to every framework)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    MinimalRisk,
    LimitedRisk,
    HighRisk,
    Prohibited,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCategory::MinimalRisk => write!(f, "minimal risk"),
            RiskCategory::LimitedRisk => write!(f, "limited risk"),
            RiskCategory::HighRisk => write!(f, "high risk"),
            RiskCategory::Prohibited => write!(f, "prohibited"),
        }
    }
}

/// One requirement within a framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegulatoryControl {
    #[validate(length(min = 1, message = "Control id is required"))]
    pub id: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub title: String,
    pub risk_category: RiskCategory,
    /// Evidence type keys expected in the evidence bag
    #[serde(default)]
    pub required_evidence: Vec<String>,
    /// Free-text requirements matched against evidence text
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl RegulatoryControl {
    fn new(
        id: &str,
        title: &str,
        risk_category: RiskCategory,
        required_evidence: &[&str],
        requirements: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            framework: String::new(),
            title: title.to_string(),
            risk_category,
            required_evidence: required_evidence.iter().map(|s| s.to_string()).collect(),
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A named set of regulatory controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Framework {
    #[validate(length(min = 1, message = "Framework id is required"))]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    #[validate(nested)]
    pub controls: Vec<RegulatoryControl>,
}

impl Framework {
    pub fn new(id: impl Into<String>, name: impl Into<String>, controls: Vec<RegulatoryControl>) -> Self {
        let mut framework = Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            controls,
        };
        framework.stamp_controls();
        framework
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Controls always carry their owning framework id
    fn stamp_controls(&mut self) {
        for control in &mut self.controls {
            control.framework = self.id.clone();
        }
    }
}

/// Registry of frameworks available to the scorer
#[derive(Debug, Clone, Default)]
pub struct FrameworkCatalog {
    frameworks: BTreeMap<String, Framework>,
}

impl FrameworkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with the built-in frameworks
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.insert(Self::eu_ai_act());
        catalog.insert(Self::nist_ai_rmf());
        catalog.insert(Self::iso_42001());
        catalog
    }

    /// Add a framework, validating it first. Replaces an existing one with the same id.
    pub fn add(&mut self, framework: Framework) -> GovResult<()> {
        framework.validate()?;
        let mut seen = std::collections::HashSet::new();
        for control in &framework.controls {
            if !seen.insert(control.id.as_str()) {
                return Err(validation_error(format!(
                    "Framework '{}' declares control '{}' twice",
                    framework.id, control.id
                )));
            }
        }
        self.insert(framework);
        Ok(())
    }

    fn insert(&mut self, mut framework: Framework) {
        framework.stamp_controls();
        self.frameworks.insert(framework.id.clone(), framework);
    }

    pub fn get(&self, id: &str) -> GovResult<&Framework> {
        self.frameworks
            .get(id)
            .ok_or_else(|| GovernanceError::UnknownFramework(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.frameworks.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.frameworks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
    }

    /// Load extra frameworks from a JSON array file
    pub fn load_json_file(&mut self, path: &Path) -> GovResult<usize> {
        let raw = std::fs::read_to_string(path)?;
        let count = self.load_json_str(&raw)?;
        info!("📚 Loaded {} frameworks from {}", count, path.display());
        Ok(count)
    }

    pub fn load_json_str(&mut self, raw: &str) -> GovResult<usize> {
        let frameworks: Vec<Framework> = serde_json::from_str(raw)?;
        let count = frameworks.len();
        for framework in frameworks {
            self.add(framework)?;
        }
        Ok(count)
    }

    // =========================================================================
    // BUILT-IN FRAMEWORKS
    // =========================================================================

    fn eu_ai_act() -> Framework {
        use RiskCategory::*;
        Framework::new(
            "eu_ai_act",
            "EU Artificial Intelligence Act",
            vec![
                RegulatoryControl::new(
                    "EU-AIA-5",
                    "Prohibited AI practices",
                    Prohibited,
                    &["prohibited_practice_assessment"],
                    &[
                        "No subliminal or manipulative techniques",
                        "No social scoring of natural persons",
                        "No untargeted biometric identification",
                    ],
                ),
                RegulatoryControl::new(
                    "EU-AIA-9",
                    "Risk management system",
                    HighRisk,
                    &["risk_management_plan"],
                    &["Risk management process documented", "Residual risks evaluated"],
                ),
                RegulatoryControl::new(
                    "EU-AIA-10",
                    "Data and data governance",
                    HighRisk,
                    &["data_governance_policy", "dataset_documentation"],
                    &["Training data examined for bias", "Data provenance recorded"],
                ),
                RegulatoryControl::new(
                    "EU-AIA-11",
                    "Technical documentation",
                    HighRisk,
                    &["technical_documentation"],
                    &["Technical documentation maintained"],
                ),
                RegulatoryControl::new(
                    "EU-AIA-13",
                    "Transparency and provision of information",
                    LimitedRisk,
                    &["model_card"],
                    &["Users informed about intended purpose and limitations"],
                ),
                RegulatoryControl::new(
                    "EU-AIA-14",
                    "Human oversight",
                    HighRisk,
                    &["human_oversight_plan"],
                    &["Human oversight measures assigned"],
                ),
                RegulatoryControl::new(
                    "EU-AIA-15",
                    "Accuracy, robustness and cybersecurity",
                    HighRisk,
                    &["performance_report", "security_assessment"],
                    &["Accuracy metrics declared", "Robustness tested against adversarial inputs"],
                ),
            ],
        )
        .with_version("2024/1689")
    }

    fn nist_ai_rmf() -> Framework {
        use RiskCategory::*;
        Framework::new(
            "nist_ai_rmf",
            "NIST AI Risk Management Framework",
            vec![
                RegulatoryControl::new(
                    "GOVERN-1",
                    "Policies and accountability",
                    LimitedRisk,
                    &["ai_policy"],
                    &["Roles and accountability defined"],
                ),
                RegulatoryControl::new(
                    "MAP-1",
                    "Context and intended use",
                    LimitedRisk,
                    &["use_case_description"],
                    &["Intended purpose and context documented"],
                ),
                RegulatoryControl::new(
                    "MEASURE-2",
                    "Trustworthiness evaluation",
                    HighRisk,
                    &["bias_report", "performance_report"],
                    &["Fairness metrics measured", "Performance evaluated"],
                ),
                RegulatoryControl::new(
                    "MANAGE-4",
                    "Monitoring and incident response",
                    MinimalRisk,
                    &["monitoring_plan"],
                    &["Incident response procedure defined"],
                ),
            ],
        )
        .with_version("1.0")
    }

    fn iso_42001() -> Framework {
        use RiskCategory::*;
        Framework::new(
            "iso_42001",
            "ISO/IEC 42001 AI Management System",
            vec![
                RegulatoryControl::new(
                    "ISO42001-5.2",
                    "AI policy",
                    LimitedRisk,
                    &["ai_policy"],
                    &["AI policy approved by management"],
                ),
                RegulatoryControl::new(
                    "ISO42001-6.1.4",
                    "AI system impact assessment",
                    HighRisk,
                    &["impact_assessment"],
                    &["Impact on individuals and society assessed"],
                ),
                RegulatoryControl::new(
                    "ISO42001-A.7",
                    "Data for AI systems",
                    LimitedRisk,
                    &["dataset_documentation"],
                    &["Data quality and provenance documented"],
                ),
            ],
        )
        .with_version("2023")
    }
}
