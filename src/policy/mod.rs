//! Policy Module
//!
//! Governance rules written in two dialects and evaluated against facts:
//!
//! 1. **Rules**: rule records, severities and reports
//! 2. **Expr**: the declarative `allow` / `deny if ...` expression language
//! 3. **Script**: line-oriented `path: expected` assertions
//! 4. **Evaluator**: evaluation, recommendation lookup and rule loading
//! 5. **Check**: runs a rule set as a lifecycle check

pub mod check;
pub mod evaluator;
pub mod expr;
pub mod rules;
pub mod script;

// Re-export main types for convenient access
pub use check::PolicyCheck;
pub use evaluator::{evaluate, evaluate_all, PolicyEvaluator};
pub use rules::{Dialect, PolicyEvaluation, PolicyReport, PolicyRule, Severity};
