//! Compliance Module
//!
//! Scores an AI system's evidence against regulatory frameworks:
//!
//! 1. **Frameworks**: catalog of controls (EU AI Act, NIST AI RMF, ISO/IEC 42001, custom JSON)
//! 2. **Evidence**: presence and keyword index over the supplied evidence bag
//! 3. **Scorer**: per-control scores, gaps and risk rolled into a framework assessment

pub mod evidence;
pub mod frameworks;
pub mod scorer;

// Re-export main types for convenient access
pub use frameworks::{Framework, FrameworkCatalog, RegulatoryControl, RiskCategory};
pub use scorer::{
    ComplianceGap, ComplianceScorer, ComplianceStatus, FrameworkAssessment, GapKind, RiskAssessment, RiskLevel,
};
