//! AIGov Gate - AI governance gate
//!
//! Staged lifecycle checks, policy rules and regulatory compliance scoring,
//! combined into a single deploy decision:
//! - **Lifecycle**: dependency-ordered, timeout-bounded checks per lifecycle stage
//! - **Policy**: declarative and scripted governance rules
//! - **Compliance**: evidence scored against EU AI Act, NIST AI RMF and ISO/IEC 42001 controls
//! - **Gate**: stage outcome + framework assessment -> deploy allowed or not

pub mod audit;
pub mod compliance;
pub mod config;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod policy;
pub mod state;

pub use config::Settings;
pub use error::{GovResult, GovernanceError};
pub use gate::{GateDecision, GovernanceGate};
pub use state::GovernanceCore;
